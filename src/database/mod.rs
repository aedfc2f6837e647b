//! Implements the decomposition cache: configuration fingerprints and the append-only index

mod cache_index;
mod fingerprint;
pub use crate::database::cache_index::*;
pub use crate::database::fingerprint::*;
