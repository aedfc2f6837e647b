//! Implements the offline phase: system matrix assembly, factorizations, and persistence

pub(crate) mod dense;
mod decomposition_offline;
mod factor_cholesky;
mod factor_eigen;
mod factor_ichol;
mod factor_lu;
mod factor_ortho_adapt;
mod factorization;
mod store;
mod system_matrix;
pub use crate::offline::decomposition_offline::*;
pub use crate::offline::factor_cholesky::*;
pub use crate::offline::factor_eigen::*;
pub use crate::offline::factor_ichol::*;
pub use crate::offline::factor_lu::*;
pub use crate::offline::factor_ortho_adapt::*;
pub use crate::offline::factorization::*;
pub use crate::offline::store::*;
pub use crate::offline::system_matrix::*;
