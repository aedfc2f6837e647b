use crate::base::{DensityConfig, GridConfig, RefinementConfig, RegularizationConfig};
use crate::grid::canonical_interactions;
use crate::SgdeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Holds the deterministic key identifying a decomposition in the cache
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct FingerprintKey(String);

/// Holds the configuration fields encoded in a fingerprint
#[derive(Serialize)]
struct FingerprintRecord<'a> {
    grid: GridConfig,
    refinement: &'a RefinementConfig,
    regularization: &'a RegularizationConfig,
    density: &'a DensityConfig,
}

impl FingerprintKey {
    /// Computes the fingerprint of a configuration
    ///
    /// The interaction groups are canonicalized first, thus lists naming the same groups in a
    /// different order yield the same key.
    pub fn new(
        grid: &GridConfig,
        refinement: &RefinementConfig,
        regularization: &RegularizationConfig,
        density: &DensityConfig,
    ) -> Result<Self, SgdeError> {
        let mut canonical = grid.clone();
        canonical.interactions = canonical_interactions(&grid.interactions);
        let record = FingerprintRecord {
            grid: canonical,
            refinement,
            regularization,
            density,
        };
        let text = serde_json::to_string(&record)
            .map_err(|e| SgdeError::Format(format!("cannot encode fingerprint: {}", e)))?;
        Ok(FingerprintKey(text))
    }

    /// Wraps an existing key (e.g., read from the index file)
    pub fn from_string(key: String) -> Self {
        FingerprintKey(key)
    }

    /// Returns the key as text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a 64-bit FNV-1a hash of the key (used to name stored files)
    pub fn hash64(&self) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in self.0.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    /// Returns the file stem used for stored decompositions
    pub fn file_stem(&self) -> String {
        format!("{:016x}", self.hash64())
    }
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
