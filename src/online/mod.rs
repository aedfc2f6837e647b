//! Implements the online phase: streaming right-hand side, λ selection and structural updates

mod cross_validation;
mod online_solver;
mod refinement;
pub use crate::online::cross_validation::*;
pub use crate::online::online_solver::*;
pub use crate::online::refinement::*;
