use super::{BoundaryType, CrossValidationConfig, DatabaseConfig, DecompositionType, DensityConfig};
use super::{GridConfig, ParallelConfig, RefinementConfig, RegularizationConfig};
use crate::SgdeError;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Holds all configuration data of a density-estimation fit
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FitterConfig {
    /// Sparse grid parameters
    pub grid: GridConfig,

    /// Regularization parameters
    pub regularization: RegularizationConfig,

    /// Density-estimation options (decomposition, normalization, forgetting rate)
    pub density: DensityConfig,

    /// Cross-validated selection of λ
    pub cross_validation: CrossValidationConfig,

    /// Adaptive refinement and coarsening
    pub refinement: RefinementConfig,

    /// Decomposition cache
    pub database: DatabaseConfig,

    /// Distributed layout
    pub parallel: ParallelConfig,
}

impl FitterConfig {
    /// Allocates a new instance with default values
    ///
    /// # Default values
    ///
    /// * Level 2 sparse grid with linear basis and no boundary
    /// * λ = 1e-4 with identity regularization
    /// * Cholesky decomposition with normalization
    /// * No cross-validation, refinement, cache, or distribution
    pub fn new(dim: usize) -> Self {
        FitterConfig {
            grid: GridConfig::new(dim, 2),
            regularization: RegularizationConfig::new(1e-4),
            density: DensityConfig::new(DecompositionType::Cholesky),
            cross_validation: CrossValidationConfig::new(),
            refinement: RefinementConfig::new(),
            database: DatabaseConfig::default(),
            parallel: ParallelConfig::new(),
        }
    }

    /// Sets the level of the sparse grid
    pub fn set_level(&mut self, level: usize) -> Result<&mut Self, SgdeError> {
        if level < 1 {
            return Err(SgdeError::Configuration("level must be ≥ 1".to_string()));
        }
        self.grid.level = level;
        Ok(self)
    }

    /// Sets the regularization strength
    pub fn set_lambda(&mut self, lambda: f64) -> Result<&mut Self, SgdeError> {
        if lambda < 0.0 || !lambda.is_finite() {
            return Err(SgdeError::Configuration("lambda must be finite and ≥ 0.0".to_string()));
        }
        self.regularization.lambda = lambda;
        Ok(self)
    }

    /// Sets the decomposition algorithm
    pub fn set_decomposition(&mut self, kind: DecompositionType) -> Result<&mut Self, SgdeError> {
        self.density.decomposition = kind;
        Ok(self)
    }

    /// Sets the forgetting rate of streaming updates
    pub fn set_beta(&mut self, beta: f64) -> Result<&mut Self, SgdeError> {
        if !(0.0..1.0).contains(&beta) {
            return Err(SgdeError::Configuration("beta must be in [0, 1)".to_string()));
        }
        self.density.beta = beta;
        Ok(self)
    }

    /// Sets the interaction groups of a geometry-aware grid
    pub fn set_interactions(&mut self, interactions: Vec<Vec<usize>>) -> Result<&mut Self, SgdeError> {
        for group in &interactions {
            if let Some(d) = group.iter().find(|&&d| d >= self.grid.dim) {
                return Err(SgdeError::Configuration(format!(
                    "interaction index {} exceeds the dimension {}",
                    d, self.grid.dim
                )));
            }
        }
        self.grid.interactions = interactions;
        Ok(self)
    }

    /// Sets the distributed layout and enables the distributed path
    pub fn set_parallel(
        &mut self,
        process_rows: usize,
        process_cols: usize,
        n_process: usize,
        block_size: usize,
    ) -> Result<&mut Self, SgdeError> {
        let previous = self.parallel;
        self.parallel = ParallelConfig {
            enable: true,
            process_rows,
            process_cols,
            n_process,
            row_block_size: block_size,
            col_block_size: block_size,
        };
        if let Some(msg) = self.validate_parallel() {
            self.parallel = previous;
            return Err(SgdeError::Configuration(msg));
        }
        Ok(self)
    }

    /// Validates all data
    ///
    /// Returns a message with the inconsistent data, or returns None if everything is all right.
    pub fn validate(&self) -> Option<String> {
        if self.grid.level < 1 {
            return Some(format!("grid.level = {} is invalid; it must be ≥ 1", self.grid.level));
        }
        if self.grid.boundary == BoundaryType::Boundary {
            return Some("grid.boundary = Boundary is not available for density estimation".to_string());
        }
        if self.regularization.lambda < 0.0 || !self.regularization.lambda.is_finite() {
            return Some(format!(
                "regularization.lambda = {:?} is invalid; it must be finite and ≥ 0.0",
                self.regularization.lambda
            ));
        }
        if !(0.0..1.0).contains(&self.density.beta) {
            return Some(format!(
                "density.beta = {:?} is invalid; it must be in [0, 1)",
                self.density.beta
            ));
        }
        let cv = &self.cross_validation;
        if cv.enable {
            if cv.lambda_steps < 1 {
                return Some("cross_validation.lambda_steps must be ≥ 1".to_string());
            }
            if cv.lambda_start < 0.0 || cv.lambda_end < cv.lambda_start {
                return Some("cross_validation requires 0 ≤ lambda_start ≤ lambda_end".to_string());
            }
            if cv.log_scale && cv.lambda_start <= 0.0 {
                return Some("cross_validation.lambda_start must be > 0 with log_scale".to_string());
            }
            if cv.test_fraction <= 0.0 || cv.test_fraction >= 1.0 {
                return Some(format!(
                    "cross_validation.test_fraction = {:?} is invalid; it must be in (0, 1)",
                    cv.test_fraction
                ));
            }
        }
        if self.parallel.enable {
            return self.validate_parallel();
        }
        None
    }

    /// Validates the distributed layout
    fn validate_parallel(&self) -> Option<String> {
        let p = &self.parallel;
        if p.process_rows < 1 || p.process_cols < 1 {
            return Some("parallel.process_rows and parallel.process_cols must be ≥ 1".to_string());
        }
        if p.process_rows * p.process_cols > p.n_process {
            return Some(format!(
                "the process grid {}×{} requires more than the {} available workers",
                p.process_rows, p.process_cols, p.n_process
            ));
        }
        if p.row_block_size < 1 || p.col_block_size < 1 {
            return Some("parallel block sizes must be ≥ 1".to_string());
        }
        None
    }

    /// Reads a JSON file containing the configuration
    ///
    /// # Input
    ///
    /// * `full_path` -- may be a String, &str, or Path
    pub fn read_json<P>(full_path: &P) -> Result<Self, SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let path = Path::new(full_path).to_path_buf();
        let file = File::open(&path).map_err(|e| SgdeError::io(&path, e))?;
        let buffered = BufReader::new(file);
        let config = serde_json::from_reader(buffered)
            .map_err(|e| SgdeError::Format(format!("cannot parse JSON configuration: {}", e)))?;
        Ok(config)
    }

    /// Writes a JSON file with the configuration
    ///
    /// # Input
    ///
    /// * `full_path` -- may be a String, &str, or Path
    pub fn write_json<P>(&self, full_path: &P) -> Result<(), SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let path = Path::new(full_path).to_path_buf();
        if let Some(p) = path.parent() {
            fs::create_dir_all(p).map_err(|e| SgdeError::io(p, e))?;
        }
        let mut file = File::create(&path).map_err(|e| SgdeError::io(&path, e))?;
        serde_json::to_writer_pretty(&mut file, &self)
            .map_err(|e| SgdeError::Format(format!("cannot write JSON configuration: {}", e)))?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
