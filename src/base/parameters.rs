use super::{BasisType, BoundaryType, DecompositionType, RegularizationType, StencilType};
use serde::{Deserialize, Serialize};

/// Holds the parameters of the sparse grid
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GridConfig {
    /// Space dimension (overwritten by the number of columns of the dataset on fit)
    pub dim: usize,

    /// Level of the regular sparse grid (≥ 1)
    pub level: usize,

    /// Treatment of the domain boundary
    pub boundary: BoundaryType,

    /// One-dimensional basis
    pub basis: BasisType,

    /// Groups of dimensions allowed to interact (empty means no restriction)
    pub interactions: Vec<Vec<usize>>,
}

/// Holds the parameters of the regularization
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct RegularizationConfig {
    /// Regularization operator
    pub kind: RegularizationType,

    /// Regularization strength λ (≥ 0)
    pub lambda: f64,
}

/// Holds the options specific to density estimation
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct DensityConfig {
    /// Algorithm used to factorize the system matrix
    pub decomposition: DecompositionType,

    /// Rescale the coefficients such that the density integrates to one
    pub normalize: bool,

    /// Forgetting rate β ∈ [0,1) applied to previous data on streaming updates
    pub beta: f64,
}

/// Holds the options of the cross-validated selection of λ
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct CrossValidationConfig {
    /// Enables the cross-validation
    pub enable: bool,

    /// Smallest candidate λ
    pub lambda_start: f64,

    /// Largest candidate λ
    pub lambda_end: f64,

    /// Number of candidates between lambda_start and lambda_end (inclusive)
    pub lambda_steps: usize,

    /// Distributes the candidates logarithmically instead of linearly
    pub log_scale: bool,

    /// Share of the samples held out for scoring, in (0,1)
    pub test_fraction: f64,

    /// Shuffles the samples before splitting
    pub shuffle: bool,

    /// Seed of the shuffle
    pub seed: u64,
}

/// Holds the options of the adaptive refinement and coarsening
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct RefinementConfig {
    /// Maximum number of refinement cycles
    pub n_refinements: usize,

    /// Number of points whose children are created in each cycle
    pub points_to_refine: usize,

    /// Maximum number of leaves removed in each cycle
    pub points_to_coarsen: usize,

    /// Leaves with |α| below this threshold may be removed
    pub coarsening_threshold: f64,
}

/// Holds the location of the decomposition cache
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path of the append-only index file (None disables the cache)
    pub filepath: Option<String>,

    /// Directory where missed decompositions are written back (None disables the write-back)
    pub store_dir: Option<String>,
}

/// Holds the layout of the distributed computation
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ParallelConfig {
    /// Enables the distributed path
    pub enable: bool,

    /// Number of rows of the process grid
    pub process_rows: usize,

    /// Number of columns of the process grid
    pub process_cols: usize,

    /// Total number of workers (workers beyond rows × cols are outside the grid)
    pub n_process: usize,

    /// Number of rows of each block
    pub row_block_size: usize,

    /// Number of columns of each block
    pub col_block_size: usize,
}

/// Holds the description of an image-like geometry used to derive interactions
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GeometryConfig {
    /// Resolution of the image, e.g., `[4, 4]` for 16 pixels (one dimension per pixel)
    pub resolution: Vec<usize>,

    /// Stencil relating the pixels
    pub stencil: StencilType,
}

impl GridConfig {
    /// Allocates a new instance with a linear basis and no interactions
    pub fn new(dim: usize, level: usize) -> Self {
        GridConfig {
            dim,
            level,
            boundary: BoundaryType::NoBoundary,
            basis: BasisType::Linear,
            interactions: Vec::new(),
        }
    }
}

impl RegularizationConfig {
    /// Allocates a new instance with the identity operator
    pub fn new(lambda: f64) -> Self {
        RegularizationConfig {
            kind: RegularizationType::Identity,
            lambda,
        }
    }
}

impl DensityConfig {
    /// Allocates a new instance with normalization enabled and no forgetting
    pub fn new(decomposition: DecompositionType) -> Self {
        DensityConfig {
            decomposition,
            normalize: true,
            beta: 0.0,
        }
    }
}

impl CrossValidationConfig {
    /// Allocates a new (disabled) instance
    pub fn new() -> Self {
        CrossValidationConfig {
            enable: false,
            lambda_start: 1e-6,
            lambda_end: 1e-1,
            lambda_steps: 6,
            log_scale: true,
            test_fraction: 0.2,
            shuffle: true,
            seed: 42,
        }
    }

    /// Returns the candidate values of λ in ascending order
    pub fn candidates(&self) -> Vec<f64> {
        if self.lambda_steps <= 1 {
            return vec![self.lambda_start];
        }
        let n = self.lambda_steps - 1;
        let mut values: Vec<f64> = (0..self.lambda_steps)
            .map(|k| {
                let t = k as f64 / n as f64;
                if self.log_scale {
                    let a = f64::log10(self.lambda_start);
                    let b = f64::log10(self.lambda_end);
                    f64::powf(10.0, a + t * (b - a))
                } else {
                    self.lambda_start + t * (self.lambda_end - self.lambda_start)
                }
            })
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values
    }
}

impl RefinementConfig {
    /// Allocates a new instance with no refinement cycles
    pub fn new() -> Self {
        RefinementConfig {
            n_refinements: 0,
            points_to_refine: 1,
            points_to_coarsen: 0,
            coarsening_threshold: 0.0,
        }
    }
}

impl ParallelConfig {
    /// Allocates a new (disabled) instance with a single worker
    pub fn new() -> Self {
        ParallelConfig {
            enable: false,
            process_rows: 1,
            process_cols: 1,
            n_process: 1,
            row_block_size: 64,
            col_block_size: 64,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::CrossValidationConfig;
    use russell_lab::approx_eq;

    #[test]
    fn candidates_work() {
        let mut cv = CrossValidationConfig::new();
        cv.lambda_start = 1e-4;
        cv.lambda_end = 1e-1;
        cv.lambda_steps = 4;
        let values = cv.candidates();
        assert_eq!(values.len(), 4);
        approx_eq(values[0], 1e-4, 1e-15);
        approx_eq(values[1], 1e-3, 1e-15);
        approx_eq(values[2], 1e-2, 1e-15);
        approx_eq(values[3], 1e-1, 1e-15);

        cv.log_scale = false;
        cv.lambda_start = 0.0;
        cv.lambda_end = 1.0;
        cv.lambda_steps = 3;
        assert_eq!(cv.candidates(), vec![0.0, 0.5, 1.0]);

        cv.lambda_steps = 1;
        assert_eq!(cv.candidates(), vec![0.0]);
    }
}
