//! Implements the model fitting façade for density estimation

mod model_fitting;
pub use crate::fitting::model_fitting::*;
