use super::CrossValidation;
use crate::base::{CoefficientVector, CrossValidationConfig, Dataset, DensityConfig};
use crate::grid::{BasisOperator, SparseGrid};
use crate::offline::DecompositionOffline;
use crate::SgdeError;
use rayon::prelude::*;
use russell_lab::Vector;

/// Computes the sums Σ_m φ_i(x_m) for all grid points i
pub fn basis_sums(grid: &SparseGrid, operator: &dyn BasisOperator, dataset: &Dataset) -> Result<Vec<f64>, SgdeError> {
    if dataset.dim() != grid.dim() {
        return Err(SgdeError::Configuration(format!(
            "the dataset dimension ({}) must equal the grid dimension ({})",
            dataset.dim(),
            grid.dim()
        )));
    }
    let rows: Vec<Vec<f64>> = (0..dataset.n_sample()).map(|m| dataset.row(m)).collect();
    let sums: Vec<f64> = (0..grid.size())
        .into_par_iter()
        .map(|i| rows.iter().map(|x| operator.basis_value(grid, i, x)).sum::<f64>())
        .collect();
    Ok(sums)
}

/// Implements the online phase: right-hand side accumulation and coefficient computation
///
/// The right-hand side is kept as a weighted sum `s` and a weight `w` so that new batches can be
/// streamed in with the forgetting rate β:
///
/// ```text
/// s ← (1 − β) s + Σ_new φ(x)
/// w ← (1 − β) w + M_new
/// b = s / w
/// ```
pub struct OnlineSolver {
    /// Density-estimation options
    density: DensityConfig,

    /// Cross-validation options
    cross_validation: CrossValidationConfig,

    /// Weighted sum of basis values
    weighted_sum: CoefficientVector,

    /// Weight of the accumulated samples
    total_weight: f64,

    /// Regularization strength chosen by the last cross-validation (if any)
    selected_lambda: Option<f64>,
}

impl OnlineSolver {
    /// Allocates a new instance without data
    pub fn new(density: DensityConfig, cross_validation: CrossValidationConfig) -> Self {
        OnlineSolver {
            density,
            cross_validation,
            weighted_sum: CoefficientVector::new(0),
            total_weight: 0.0,
            selected_lambda: None,
        }
    }

    /// Adds a batch of samples to the right-hand side
    pub fn accumulate(&mut self, grid: &SparseGrid, operator: &dyn BasisOperator, dataset: &Dataset) -> Result<(), SgdeError> {
        if dataset.n_sample() == 0 {
            return Err(SgdeError::Configuration("the dataset has no samples".to_string()));
        }
        let sums = basis_sums(grid, operator, dataset)?;
        self.fold(&sums, dataset.n_sample())
    }

    /// Folds precomputed basis sums of `count` samples into the right-hand side
    pub fn fold(&mut self, sums: &[f64], count: usize) -> Result<(), SgdeError> {
        if self.total_weight == 0.0 && self.weighted_sum.dim() != sums.len() {
            self.weighted_sum = CoefficientVector::new(sums.len());
        }
        if self.weighted_sum.dim() != sums.len() {
            return Err(SgdeError::Configuration(format!(
                "the right-hand side has {} entries but the batch has {}",
                self.weighted_sum.dim(),
                sums.len()
            )));
        }
        let keep = 1.0 - self.density.beta;
        let s = self.weighted_sum.as_mut_vector();
        for (i, value) in sums.iter().enumerate() {
            s[i] = keep * s[i] + value;
        }
        self.total_weight = keep * self.total_weight + count as f64;
        Ok(())
    }

    /// Returns the right-hand side b = s / w
    pub fn rhs(&self) -> Result<Vector, SgdeError> {
        if self.total_weight == 0.0 {
            return Err(SgdeError::State("no samples were accumulated yet"));
        }
        let mut b = self.weighted_sum.as_vector().clone();
        for i in 0..b.dim() {
            b[i] /= self.total_weight;
        }
        Ok(b)
    }

    /// Computes the density coefficients for a new batch of samples
    ///
    /// With `cross_validate`, λ is first selected on a held-out split (see [CrossValidation])
    /// and the offline factors are adjusted to the selected λ.
    pub fn compute_coefficients(
        &mut self,
        offline: &mut DecompositionOffline,
        grid: &SparseGrid,
        operator: &dyn BasisOperator,
        dataset: &Dataset,
        cross_validate: bool,
    ) -> Result<CoefficientVector, SgdeError> {
        if cross_validate {
            let lambda = CrossValidation::new(&self.cross_validation).select_lambda(offline, grid, operator, dataset)?;
            offline.set_lambda(lambda)?;
            self.selected_lambda = Some(lambda);
        }
        self.accumulate(grid, operator, dataset)?;
        self.solve(offline)
    }

    /// Solves the system with the accumulated right-hand side
    pub fn solve(&self, offline: &DecompositionOffline) -> Result<CoefficientVector, SgdeError> {
        let b = self.rhs()?;
        let mut alpha = Vector::new(b.dim());
        offline.solve(&mut alpha, &b)?;
        Ok(CoefficientVector::from_vector(alpha))
    }

    /// Adjusts the right-hand side after a structural change of the grid
    ///
    /// The entries at `deleted` are removed first (survivors keep their order); then zeros are
    /// appended up to `new_point_count` entries.
    pub fn update_rhs(&mut self, new_point_count: usize, deleted: &[usize]) -> Result<(), SgdeError> {
        self.weighted_sum.remove_indices(deleted)?;
        if new_point_count > self.weighted_sum.dim() {
            self.weighted_sum.resize_zero(new_point_count);
        }
        Ok(())
    }

    /// Rescales the coefficients such that the density integrates to one over the unit domain
    pub fn normalize(alpha: &mut CoefficientVector, grid: &SparseGrid, operator: &dyn BasisOperator) -> Result<(), SgdeError> {
        if alpha.dim() != grid.size() {
            return Err(SgdeError::Configuration(format!(
                "the number of coefficients ({}) must equal the grid size ({})",
                alpha.dim(),
                grid.size()
            )));
        }
        let integral: f64 = (0..grid.size())
            .map(|i| alpha.as_slice()[i] * operator.integral(grid, i))
            .sum();
        if !integral.is_finite() || f64::abs(integral) < f64::MIN_POSITIVE {
            return Err(SgdeError::Numerical(format!(
                "cannot normalize a density whose integral is {:e}",
                integral
            )));
        }
        alpha.scale(1.0 / integral);
        Ok(())
    }

    /// Returns whether the coefficients should be normalized
    pub fn normalize_enabled(&self) -> bool {
        self.density.normalize
    }

    /// Returns the λ selected by the last cross-validation
    pub fn selected_lambda(&self) -> Option<f64> {
        self.selected_lambda
    }

    /// Returns the weight of the accumulated samples
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Returns the number of entries of the right-hand side
    pub fn dim(&self) -> usize {
        self.weighted_sum.dim()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
