/// Defines an auxiliary directory where the test files are saved
pub const DEFAULT_TEST_DIR: &str = "/tmp/sgde/test";

/// Defines the extension of persisted decomposition files
pub const DECOMPOSITION_FILE_EXTENSION: &str = "dec";

/// Defines the smallest absolute pivot accepted by the factorizations
pub const PIVOT_TOLERANCE: f64 = 1e-300;
