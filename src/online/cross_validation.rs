use super::basis_sums;
use crate::base::{CrossValidationConfig, Dataset};
use crate::grid::{BasisOperator, SparseGrid};
use crate::offline::{DecompositionOffline, GenericFactorization};
use crate::SgdeError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use russell_lab::{mat_vec_mul, vec_inner, Matrix, Vector};

/// Selects the regularization strength on a held-out split of the samples
///
/// Each candidate λ is scored with the L2 risk of the density fitted on the training split:
///
/// ```text
/// score(λ) = αᵀ A α − (2 / M_test) Σ_test f(x)
/// ```
///
/// The candidate with the smallest score wins; ties keep the smallest λ.
pub struct CrossValidation<'a> {
    config: &'a CrossValidationConfig,
}

impl<'a> CrossValidation<'a> {
    /// Allocates a new instance
    pub fn new(config: &'a CrossValidationConfig) -> Self {
        CrossValidation { config }
    }

    /// Splits the samples into training and test sets
    pub fn split(&self, dataset: &Dataset) -> Result<(Dataset, Dataset), SgdeError> {
        let n = dataset.n_sample();
        let n_test = f64::round(n as f64 * self.config.test_fraction) as usize;
        if n_test == 0 || n_test >= n {
            return Err(SgdeError::Configuration(format!(
                "cannot split {} samples with test fraction {}",
                n, self.config.test_fraction
            )));
        }
        let mut order: Vec<usize> = (0..n).collect();
        if self.config.shuffle {
            let mut rng = StdRng::seed_from_u64(self.config.seed);
            order.shuffle(&mut rng);
        }
        let (test, train) = order.split_at(n_test);
        Ok((dataset.subset(train), dataset.subset(test)))
    }

    /// Returns the score of every candidate λ (candidates in ascending order)
    pub fn scores(
        &self,
        offline: &DecompositionOffline,
        grid: &SparseGrid,
        operator: &dyn BasisOperator,
        dataset: &Dataset,
    ) -> Result<Vec<(f64, f64)>, SgdeError> {
        let (train, test) = self.split(dataset)?;
        let a = offline.system_matrix()?;
        let n = a.nrow();
        let train_sums = basis_sums(grid, operator, &train)?;
        let test_sums = Vector::from(&basis_sums(grid, operator, &test)?);
        let mut b = Vector::new(n);
        for i in 0..n {
            b[i] = train_sums[i] / train.n_sample() as f64;
        }
        let mut results = Vec::new();
        for lambda in self.config.candidates() {
            let alpha = solve_for(offline, &a, &b, lambda)?;
            let energy = quadratic_form(&a, &alpha)?;
            let fit = vec_inner(&alpha, &test_sums);
            let score = energy - 2.0 * fit / test.n_sample() as f64;
            log::debug!("cross-validation λ = {:e}: score = {:e}", lambda, score);
            results.push((lambda, score));
        }
        Ok(results)
    }

    /// Returns the candidate λ with the smallest score
    pub fn select_lambda(
        &self,
        offline: &DecompositionOffline,
        grid: &SparseGrid,
        operator: &dyn BasisOperator,
        dataset: &Dataset,
    ) -> Result<f64, SgdeError> {
        let scores = self.scores(offline, grid, operator, dataset)?;
        let mut best: Option<(f64, f64)> = None;
        for (lambda, score) in scores {
            if !score.is_finite() {
                continue;
            }
            match best {
                Some((_, s)) if score >= s => {}
                _ => best = Some((lambda, score)),
            }
        }
        let (lambda, score) = best.ok_or_else(|| {
            SgdeError::Numerical("no candidate λ produced a finite cross-validation score".to_string())
        })?;
        log::info!("cross-validation selected λ = {:e} (score = {:e})", lambda, score);
        Ok(lambda)
    }
}

/// Solves (A + λI) α = b reusing the offline factors whenever they are valid for λ
fn solve_for(offline: &DecompositionOffline, a: &Matrix, b: &Vector, lambda: f64) -> Result<Vector, SgdeError> {
    let mut alpha = Vector::new(b.dim());
    let factorization = offline.decomposed()?;
    match factorization.actual.embedded_lambda() {
        Some(embedded) if embedded != lambda => {
            let fresh = GenericFactorization::new(offline.kind(), a, lambda)?;
            fresh.actual.solve(&mut alpha, b, lambda)?;
        }
        _ => factorization.actual.solve(&mut alpha, b, lambda)?,
    }
    Ok(alpha)
}

/// Returns xᵀ A x
fn quadratic_form(a: &Matrix, x: &Vector) -> Result<f64, SgdeError> {
    let mut ax = Vector::new(a.nrow());
    mat_vec_mul(&mut ax, 1.0, a, x).map_err(SgdeError::lab)?;
    Ok(vec_inner(x, &ax))
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
