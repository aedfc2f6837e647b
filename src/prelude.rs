//! Makes available common structures needed to fit a density
//!
//! You may write `use sgde::prelude::*` in your code and obtain
//! access to commonly used functionality.

pub use crate::base::{CoefficientVector, Dataset, DecompositionType, FitterConfig, Samples, DEFAULT_TEST_DIR};
pub use crate::database::{DecompositionDatabase, FingerprintKey};
pub use crate::fitting::ModelFittingDensityEstimation;
pub use crate::grid::{BasisOperator, GridFactory, HierarchicalOperator, SparseGrid};
pub use crate::offline::{DecompositionOffline, StoredDecomposition, StoredHeader, SystemMatrixBuilder};
pub use crate::online::{OnlineSolver, RefinementAdapter, RefinementOutcome};
pub use crate::parallel::{DistributedCoordinator, ProcessGrid};
