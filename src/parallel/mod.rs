//! Implements the distributed backend: process grid, block-cyclic containers and coordinator

mod coordinator;
mod distributed_matrix;
mod distributed_vector;
mod process_grid;
pub use crate::parallel::coordinator::*;
pub use crate::parallel::distributed_matrix::*;
pub use crate::parallel::distributed_vector::*;
pub use crate::parallel::process_grid::*;
