//! Implements the sparse grid and basis collaborators consumed by the decomposition engine

mod basis;
mod factory;
mod operation;
mod sparse_grid;
pub use crate::grid::basis::Basis1d;
pub use crate::grid::factory::*;
pub use crate::grid::operation::*;
pub use crate::grid::sparse_grid::*;
