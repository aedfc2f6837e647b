//! Sparse grid density estimation with offline/online matrix decompositions
//!
//! The system matrix of the density estimation problem is factorized once ("offline"), persisted
//! in a cache keyed by the model configuration, and reused by cheap "online" solves. Refinement
//! and coarsening of the grid update the factors incrementally when the decomposition allows it.
//! A distributed variant partitions the factors block-cyclically over a grid of workers.

mod error;

pub mod base;
pub mod database;
pub mod fitting;
pub mod grid;
pub mod offline;
pub mod online;
pub mod parallel;
pub mod prelude;
pub use crate::error::*;
