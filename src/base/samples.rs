use super::Dataset;
use crate::SgdeError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use russell_lab::Matrix;

/// Generates synthetic samples in the unit hypercube
pub struct Samples {}

impl Samples {
    /// Returns samples of a normal distribution truncated to the open unit hypercube
    ///
    /// # Input
    ///
    /// * `n_sample` -- number of samples
    /// * `mean` -- mean of each dimension (defines the dimension)
    /// * `std_dev` -- standard deviation of each dimension
    /// * `seed` -- seed of the random number generator
    pub fn gaussian(n_sample: usize, mean: &[f64], std_dev: &[f64], seed: u64) -> Result<Dataset, SgdeError> {
        if mean.len() != std_dev.len() {
            return Err(SgdeError::Configuration(
                "mean and std_dev must have the same length".to_string(),
            ));
        }
        let dim = mean.len();
        let mut normals = Vec::with_capacity(dim);
        for d in 0..dim {
            if mean[d] <= 0.0 || mean[d] >= 1.0 {
                return Err(SgdeError::Configuration("the mean must be inside (0, 1)".to_string()));
            }
            let normal = Normal::new(mean[d], std_dev[d])
                .map_err(|e| SgdeError::Configuration(format!("invalid normal distribution: {}", e)))?;
            normals.push(normal);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut samples = Matrix::new(n_sample, dim);
        for i in 0..n_sample {
            for d in 0..dim {
                // rejection keeps the samples inside the domain of the grid
                let value = loop {
                    let x = normals[d].sample(&mut rng);
                    if x > 0.0 && x < 1.0 {
                        break x;
                    }
                };
                samples.set(i, d, value);
            }
        }
        Ok(Dataset::new(samples))
    }

    /// Returns uniformly distributed samples in the open unit hypercube
    pub fn uniform(n_sample: usize, dim: usize, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut samples = Matrix::new(n_sample, dim);
        for i in 0..n_sample {
            for d in 0..dim {
                samples.set(i, d, rng.random_range(1e-9..1.0));
            }
        }
        Dataset::new(samples)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
