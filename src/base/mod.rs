//! Implements the configuration, data containers, and shared definitions

mod coefficients;
mod config;
mod constants;
mod dataset;
mod enums;
mod parameters;
mod samples;
pub use crate::base::coefficients::*;
pub use crate::base::config::*;
pub use crate::base::constants::*;
pub use crate::base::dataset::*;
pub use crate::base::enums::*;
pub use crate::base::parameters::*;
pub use crate::base::samples::*;
