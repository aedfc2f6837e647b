use crate::base::{CoefficientVector, Dataset, FitterConfig, DECOMPOSITION_FILE_EXTENSION};
use crate::database::{DecompositionDatabase, FingerprintKey};
use crate::grid::{BasisOperator, GridFactory, HierarchicalOperator, SparseGrid};
use crate::offline::dense::sorted_unique_indices;
use crate::offline::DecompositionOffline;
use crate::online::{CrossValidation, OnlineSolver, RefinementAdapter, RefinementOutcome};
use crate::parallel::{DistributedCoordinator, DistributedFactorization};
use crate::SgdeError;
use rayon::prelude::*;
use std::path::Path;

/// Holds the distributed state of a model
struct Distributed {
    coordinator: DistributedCoordinator,
    factors: DistributedFactorization,
}

/// Fits sparse grid densities with the offline/online splitting
///
/// The offline factorization is looked up in the decomposition cache (if configured), otherwise
/// built, decomposed and written back. The online phase then computes the coefficients, either
/// serially or on the process grid when the parallel configuration is enabled.
///
/// # Examples
///
/// ```
/// use sgde::base::{FitterConfig, Samples};
/// use sgde::fitting::ModelFittingDensityEstimation;
/// use sgde::SgdeError;
///
/// fn main() -> Result<(), SgdeError> {
///     let mut config = FitterConfig::new(2);
///     config.set_level(3)?.set_lambda(1e-3)?;
///     let dataset = Samples::gaussian(200, &[0.5, 0.5], &[0.1, 0.1], 7)?;
///     let mut model = ModelFittingDensityEstimation::new(config)?;
///     model.fit(&dataset)?;
///     assert!(model.evaluate(&[0.5, 0.5])? > 1.0);
///     Ok(())
/// }
/// ```
pub struct ModelFittingDensityEstimation {
    config: FitterConfig,
    operator: HierarchicalOperator,
    grid: Option<SparseGrid>,
    alpha: CoefficientVector,
    offline: Option<DecompositionOffline>,
    online: Option<OnlineSolver>,
    distributed: Option<Distributed>,
    refinements_performed: usize,
}

impl ModelFittingDensityEstimation {
    /// Allocates a new (unfitted) instance
    pub fn new(config: FitterConfig) -> Result<Self, SgdeError> {
        if let Some(msg) = config.validate() {
            return Err(SgdeError::Configuration(msg));
        }
        Ok(ModelFittingDensityEstimation {
            config,
            operator: HierarchicalOperator::new(),
            grid: None,
            alpha: CoefficientVector::new(0),
            offline: None,
            online: None,
            distributed: None,
            refinements_performed: 0,
        })
    }

    /// Fits the density to the samples, discarding any previous state
    ///
    /// The grid dimension is taken from the number of columns of the dataset.
    pub fn fit(&mut self, dataset: &Dataset) -> Result<(), SgdeError> {
        self.reset();
        self.config.grid.dim = dataset.dim();
        let grid = GridFactory::build_grid(&self.config.grid)?;
        log::info!("fitting {} samples on a {}-d grid with {} points", dataset.n_sample(), grid.dim(), grid.size());
        let mut offline = self.offline_object(&grid)?;
        let mut online = OnlineSolver::new(self.config.density, self.config.cross_validation);
        let alpha = if self.config.parallel.enable {
            let coordinator = DistributedCoordinator::new(&self.config.parallel)?;
            if self.config.cross_validation.enable {
                self.select_lambda(&mut offline, &grid, dataset)?;
            }
            let factors = coordinator.sync_decomposition(&offline)?;
            let shards = coordinator.compute_density_parallel(&mut online, &factors, &grid, &self.operator, dataset)?;
            let alpha = coordinator.broadcast_coefficients(&shards);
            self.distributed = Some(Distributed { coordinator, factors });
            alpha
        } else {
            let cross_validate = self.config.cross_validation.enable;
            online.compute_coefficients(&mut offline, &grid, &self.operator, dataset, cross_validate)?
        };
        self.alpha = alpha;
        if self.config.density.normalize {
            OnlineSolver::normalize(&mut self.alpha, &grid, &self.operator)?;
        }
        self.grid = Some(grid);
        self.offline = Some(offline);
        self.online = Some(online);
        Ok(())
    }

    /// Streams new samples into the model (fits on the first call)
    pub fn update(&mut self, dataset: &Dataset) -> Result<(), SgdeError> {
        if self.grid.is_none() {
            return self.fit(dataset);
        }
        let (grid, offline, online) = match (&self.grid, &mut self.offline, &mut self.online) {
            (Some(g), Some(f), Some(o)) => (g, f, o),
            _ => return Err(SgdeError::State("the model was not fitted yet")),
        };
        let cross_validate = self.config.cross_validation.enable;
        let alpha = match &mut self.distributed {
            Some(distributed) => {
                if cross_validate {
                    let lambda = CrossValidation::new(&self.config.cross_validation).select_lambda(
                        offline,
                        grid,
                        &self.operator,
                        dataset,
                    )?;
                    offline.set_lambda(lambda)?;
                    distributed.factors = distributed.coordinator.sync_decomposition(offline)?;
                }
                let shards = distributed.coordinator.compute_density_parallel(
                    online,
                    &distributed.factors,
                    grid,
                    &self.operator,
                    dataset,
                )?;
                distributed.coordinator.broadcast_coefficients(&shards)
            }
            None => online.compute_coefficients(offline, grid, &self.operator, dataset, cross_validate)?,
        };
        self.alpha = alpha;
        if self.config.density.normalize {
            OnlineSolver::normalize(&mut self.alpha, grid, &self.operator)?;
        }
        Ok(())
    }

    /// Performs one coarsening and refinement cycle driven by the surpluses
    ///
    /// Returns false (and does nothing) if the model is not refinable or if the configured
    /// number of cycles was reached. The new grid is checked before it replaces the current one,
    /// so a rejected cycle leaves the model unchanged.
    pub fn refine(&mut self) -> Result<bool, SgdeError> {
        if !self.is_refinable() || self.refinements_performed >= self.config.refinement.n_refinements {
            return Ok(false);
        }
        let refinement = self.config.refinement;
        let mut grid = self.grid.clone().ok_or(SgdeError::State("the model was not fitted yet"))?;
        let deleted = if refinement.points_to_coarsen > 0 {
            grid.coarsen(
                self.alpha.as_slice(),
                refinement.coarsening_threshold,
                refinement.points_to_coarsen,
            )?
        } else {
            Vec::new()
        };
        let mut surpluses = self.alpha.clone();
        surpluses.remove_indices(&deleted)?;
        let added = grid.refine(surpluses.as_slice(), refinement.points_to_refine)?;
        let new_count = grid.size();
        self.check_refinement(&grid, new_count, &deleted)?;
        log::info!("refinement cycle removed {} and added {} points", deleted.len(), added);
        self.grid = Some(grid);
        self.refine_with(new_count, &deleted)?;
        self.refinements_performed += 1;
        Ok(true)
    }

    /// Accounts for a grid that was coarsened (indices `deleted`) and then refined to `new_count`
    /// points
    ///
    /// The coefficients of removed points are dropped and new points start at zero; the
    /// factorization and right-hand side are updated. If the factorization had to be invalidated,
    /// the system is rebuilt from the grid and the returned outcome says so. The inputs and the
    /// distributed layout of the new system are checked before anything is modified.
    pub fn refine_with(&mut self, new_count: usize, deleted: &[usize]) -> Result<RefinementOutcome, SgdeError> {
        let removed = match &self.grid {
            Some(grid) => self.check_refinement(grid, new_count, deleted)?,
            None => return Err(SgdeError::State("the model was not fitted yet")),
        };
        let (grid, offline, online) = match (&self.grid, &mut self.offline, &mut self.online) {
            (Some(g), Some(f), Some(o)) => (g, f, o),
            _ => return Err(SgdeError::State("the model was not fitted yet")),
        };
        let old_count = self.alpha.dim() - removed.len();
        self.alpha.remove_indices(&removed)?;
        self.alpha.resize_zero(new_count);

        let adapter = RefinementAdapter::new(&self.operator);
        let mut outcome = adapter.apply_coarsening(offline, &removed)?;
        if outcome.is_updated() {
            outcome = adapter.apply_refinement(offline, grid, new_count - old_count)?;
        }
        online.update_rhs(new_count, &removed)?;
        if let RefinementOutcome::Invalidated { reason } = &outcome {
            log::warn!("rebuilding the {} decomposition from the grid ({})", offline.kind(), reason);
            offline.build_matrix(grid, &self.operator)?;
            offline.decompose()?;
        }
        if let Some(distributed) = &mut self.distributed {
            distributed.factors = distributed.coordinator.sync_decomposition(offline)?;
        }
        Ok(outcome)
    }

    /// Checks a structural change against the coefficients and the process grid
    ///
    /// Returns the sorted indices of the removed points.
    fn check_refinement(&self, grid: &SparseGrid, new_count: usize, deleted: &[usize]) -> Result<Vec<usize>, SgdeError> {
        if grid.size() != new_count {
            return Err(SgdeError::Configuration(format!(
                "the grid has {} points but the new point count is {}",
                grid.size(),
                new_count
            )));
        }
        let removed = sorted_unique_indices(deleted, self.alpha.dim())?;
        let old_count = self.alpha.dim() - removed.len();
        if new_count < old_count {
            return Err(SgdeError::Configuration(format!(
                "the new point count ({}) is smaller than the number of remaining points ({})",
                new_count, old_count
            )));
        }
        if let Some(distributed) = &self.distributed {
            distributed.coordinator.check_dimension(new_count)?;
        }
        Ok(removed)
    }

    /// Evaluates the density at a point
    pub fn evaluate(&self, x: &[f64]) -> Result<f64, SgdeError> {
        let grid = self.grid.as_ref().ok_or(SgdeError::State("the model was not fitted yet"))?;
        self.operator.evaluate(grid, self.alpha.as_slice(), x)
    }

    /// Evaluates the density at every sample
    pub fn evaluate_many(&self, samples: &Dataset) -> Result<Vec<f64>, SgdeError> {
        let grid = self.grid.as_ref().ok_or(SgdeError::State("the model was not fitted yet"))?;
        match &self.distributed {
            Some(distributed) => {
                let shards =
                    distributed
                        .coordinator
                        .evaluate_parallel(grid, &self.operator, self.alpha.as_slice(), samples)?;
                let values = shards
                    .to_local(0)
                    .ok_or(SgdeError::State("the master did not receive the results"))?;
                Ok(values.as_data().clone())
            }
            None => (0..samples.n_sample())
                .into_par_iter()
                .map(|m| self.operator.evaluate(grid, self.alpha.as_slice(), &samples.row(m)))
                .collect(),
        }
    }

    /// Returns whether the model can be refined incrementally
    pub fn is_refinable(&self) -> bool {
        match (&self.grid, &self.offline) {
            (Some(_), Some(offline)) => offline.kind().supports_incremental_update(),
            _ => false,
        }
    }

    /// Clears the grid, the decomposition and the coefficients
    pub fn reset(&mut self) {
        self.grid = None;
        self.alpha = CoefficientVector::new(0);
        self.offline = None;
        self.online = None;
        self.distributed = None;
        self.refinements_performed = 0;
    }

    /// Returns the configuration
    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    /// Returns the grid (None before fitting)
    pub fn grid(&self) -> Option<&SparseGrid> {
        self.grid.as_ref()
    }

    /// Returns the coefficients
    pub fn coefficients(&self) -> &CoefficientVector {
        &self.alpha
    }

    /// Returns the offline object (None before fitting)
    pub fn offline(&self) -> Option<&DecompositionOffline> {
        self.offline.as_ref()
    }

    /// Returns the online object (None before fitting)
    pub fn online(&self) -> Option<&OnlineSolver> {
        self.online.as_ref()
    }

    /// Returns the number of refinement cycles performed since the last fit
    pub fn refinements_performed(&self) -> usize {
        self.refinements_performed
    }

    /// Returns whether the model runs on the process grid
    pub fn is_distributed(&self) -> bool {
        self.distributed.is_some()
    }

    /// Loads the decomposition from the cache or builds (and writes back) a new one
    fn offline_object(&self, grid: &SparseGrid) -> Result<DecompositionOffline, SgdeError> {
        let lambda = self.config.regularization.lambda;
        let key = FingerprintKey::new(
            &self.config.grid,
            &self.config.refinement,
            &self.config.regularization,
            &self.config.density,
        )?;
        let mut database = match &self.config.database.filepath {
            Some(path) => Some(DecompositionDatabase::open(path)?),
            None => None,
        };
        if let Some(db) = &database {
            if let Some(path) = db.lookup(&key)? {
                let mut offline = DecompositionOffline::from_file(&path, lambda)?;
                if offline.dim() != grid.size() {
                    return Err(SgdeError::Format(format!(
                        "the cached decomposition {} has {} rows but the grid has {} points",
                        path,
                        offline.dim(),
                        grid.size()
                    )));
                }
                if !offline.kind().reconstructs_exactly() {
                    log::warn!("{} factors cannot reproduce the system matrix; assembling it from the grid", offline.kind());
                    offline.attach_matrix(grid, &self.operator)?;
                }
                return Ok(offline);
            }
        }
        let mut offline = DecompositionOffline::new(self.config.density.decomposition, lambda, grid.interactions().clone());
        offline.build_matrix(grid, &self.operator)?;
        offline.decompose()?;
        if let Some(dir) = &self.config.database.store_dir {
            let path = Path::new(dir)
                .join(key.file_stem())
                .with_extension(DECOMPOSITION_FILE_EXTENSION);
            offline.store(&path)?;
            if let Some(db) = &mut database {
                db.register(&key, &path)?;
            }
            log::info!("stored the decomposition in {:?}", path);
        }
        Ok(offline)
    }

    /// Selects λ by cross-validation and adjusts the offline factors
    fn select_lambda(&self, offline: &mut DecompositionOffline, grid: &SparseGrid, dataset: &Dataset) -> Result<(), SgdeError> {
        let cv = CrossValidation::new(&self.config.cross_validation);
        let lambda = cv.select_lambda(offline, grid, &self.operator, dataset)?;
        offline.set_lambda(lambda)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::ModelFittingDensityEstimation;
    use crate::base::{DecompositionType, FitterConfig, Samples, DEFAULT_TEST_DIR};
    use crate::online::RefinementOutcome;
    use crate::SgdeError;
    use russell_lab::array_approx_eq;
    use std::fs;

    fn config(kind: DecompositionType) -> Result<FitterConfig, SgdeError> {
        let mut config = FitterConfig::new(2);
        config.set_level(3)?.set_lambda(1e-3)?.set_decomposition(kind)?;
        Ok(config)
    }

    #[test]
    fn unfitted_model_captures_errors() -> Result<(), SgdeError> {
        let mut model = ModelFittingDensityEstimation::new(config(DecompositionType::Cholesky)?)?;
        assert!(matches!(model.evaluate(&[0.5, 0.5]), Err(SgdeError::State(_))));
        assert!(matches!(model.refine_with(3, &[]), Err(SgdeError::State(_))));
        assert!(!model.is_refinable());
        assert!(!model.refine()?);

        let mut bad = FitterConfig::new(2);
        bad.regularization.lambda = -1.0;
        assert!(matches!(
            ModelFittingDensityEstimation::new(bad),
            Err(SgdeError::Configuration(_))
        ));
        Ok(())
    }

    #[test]
    fn fit_update_and_evaluate_work() -> Result<(), SgdeError> {
        let dataset = Samples::gaussian(300, &[0.5, 0.5], &[0.1, 0.1], 1)?;
        let mut model = ModelFittingDensityEstimation::new(config(DecompositionType::Cholesky)?)?;
        model.update(&dataset)?; // first update fits
        assert_eq!(model.grid().map(|g| g.size()), Some(17));
        assert!(model.evaluate(&[0.5, 0.5])? > model.evaluate(&[0.1, 0.9])?);

        let more = Samples::gaussian(300, &[0.5, 0.5], &[0.1, 0.1], 2)?;
        model.update(&more)?;
        assert_eq!(model.online().map(|o| o.total_weight()), Some(600.0));
        let values = model.evaluate_many(&more)?;
        assert_eq!(values.len(), 300);
        assert_eq!(values[7], model.evaluate(&more.row(7))?);
        Ok(())
    }

    #[test]
    fn refine_cycle_works() -> Result<(), SgdeError> {
        let dataset = Samples::gaussian(300, &[0.3, 0.6], &[0.1, 0.1], 4)?;
        let mut config = config(DecompositionType::Cholesky)?;
        config.refinement.n_refinements = 2;
        config.refinement.points_to_refine = 2;
        let mut model = ModelFittingDensityEstimation::new(config)?;
        model.fit(&dataset)?;
        assert!(model.is_refinable());
        let before = model.coefficients().as_slice().to_vec();
        assert!(model.refine()?);
        let size = model.grid().map(|g| g.size()).unwrap_or(0);
        assert!(size > before.len());
        assert_eq!(model.coefficients().dim(), size);
        // untouched coefficients are kept and new points start at zero
        array_approx_eq(&model.coefficients().as_slice()[..before.len()], &before, 1e-15);
        assert!(model.coefficients().as_slice()[before.len()..].iter().all(|&a| a == 0.0));
        assert!(model.refine()?);
        assert!(!model.refine()?);
        assert_eq!(model.refinements_performed(), 2);

        // the refined factors serve the next update
        model.update(&dataset)?;
        assert!(model.evaluate(&[0.3, 0.6])? > 0.0);
        Ok(())
    }

    #[test]
    fn refine_with_reports_degradation() -> Result<(), SgdeError> {
        let dataset = Samples::gaussian(200, &[0.5, 0.5], &[0.15, 0.15], 5)?;
        let point = [0.4, 0.45];
        for kind in [DecompositionType::Lu, DecompositionType::Cholesky] {
            let mut model = ModelFittingDensityEstimation::new(config(kind)?)?;
            model.fit(&dataset)?;
            assert_eq!(model.is_refinable(), kind == DecompositionType::Cholesky);
            let kept = model.coefficients().as_slice()[..16].to_vec();
            // remove the last point and append it again
            let outcome = model.refine_with(17, &[16])?;
            if kind == DecompositionType::Lu {
                assert!(matches!(outcome, RefinementOutcome::Invalidated { .. }));
            } else {
                assert_eq!(outcome, RefinementOutcome::Updated);
            }
            array_approx_eq(&model.coefficients().as_slice()[..16], &kept, 1e-15);
            assert_eq!(model.coefficients().as_slice()[16], 0.0);
            assert!(model.offline().map(|o| o.is_decomposed()) == Some(true));
            model.update(&dataset)?;
            assert!(model.evaluate(&point)? > 0.0);
        }

        let mut model = ModelFittingDensityEstimation::new(config(DecompositionType::Lu)?)?;
        model.fit(&dataset)?;
        assert!(!model.refine()?);
        assert!(matches!(model.refine_with(16, &[]), Err(SgdeError::Configuration(_))));
        assert!(matches!(model.refine_with(17, &[17]), Err(SgdeError::Configuration(_))));
        model.reset();
        assert!(model.grid().is_none());
        assert_eq!(model.refinements_performed(), 0);
        Ok(())
    }

    #[test]
    fn distributed_fit_matches_serial_fit() -> Result<(), SgdeError> {
        let dataset = Samples::gaussian(250, &[0.45, 0.55], &[0.12, 0.12], 9)?;
        let mut serial = ModelFittingDensityEstimation::new(config(DecompositionType::Cholesky)?)?;
        serial.fit(&dataset)?;
        let mut config = config(DecompositionType::Cholesky)?;
        config.set_parallel(2, 2, 5, 4)?;
        let mut distributed = ModelFittingDensityEstimation::new(config)?;
        distributed.fit(&dataset)?;
        assert!(distributed.is_distributed());
        array_approx_eq(
            distributed.coefficients().as_slice(),
            serial.coefficients().as_slice(),
            1e-9,
        );
        let values = distributed.evaluate_many(&dataset)?;
        let correct = serial.evaluate_many(&dataset)?;
        array_approx_eq(&values, &correct, 1e-8);
        Ok(())
    }

    #[test]
    fn rejected_refinement_leaves_the_model_unchanged() -> Result<(), SgdeError> {
        let dataset = Samples::gaussian(300, &[0.5, 0.5], &[0.1, 0.1], 6)?;
        let mut config = config(DecompositionType::Cholesky)?;
        config.set_parallel(2, 2, 4, 5)?;
        config.refinement.n_refinements = 1;
        config.refinement.points_to_coarsen = 12;
        config.refinement.coarsening_threshold = 1e10;
        config.refinement.points_to_refine = 0;
        let mut model = ModelFittingDensityEstimation::new(config)?;
        model.fit(&dataset)?;
        let alpha = model.coefficients().as_slice().to_vec();

        // removing the 12 leaves leaves 5 rows: one 5×5 block for a 2×2 process grid
        assert!(matches!(model.refine(), Err(SgdeError::Configuration(_))));
        assert_eq!(model.grid().map(|g| g.size()), Some(17));
        assert_eq!(model.coefficients().as_slice(), alpha.as_slice());
        assert_eq!(model.offline().map(|o| o.dim()), Some(17));
        assert_eq!(model.refinements_performed(), 0);

        let more = Samples::gaussian(100, &[0.5, 0.5], &[0.1, 0.1], 7)?;
        model.update(&more)?;
        assert_eq!(model.coefficients().dim(), 17);
        assert!(model.evaluate(&[0.5, 0.5])? > 0.0);
        Ok(())
    }

    #[test]
    fn cache_is_written_back_and_reused() -> Result<(), SgdeError> {
        let dir = format!("{}/model_fitting_cache", DEFAULT_TEST_DIR);
        fs::remove_dir_all(&dir).unwrap_or_default();
        let mut config = config(DecompositionType::Cholesky)?;
        config.database.filepath = Some(format!("{}/index.jsonl", dir));
        config.database.store_dir = Some(dir.clone());
        let dataset = Samples::gaussian(200, &[0.5, 0.5], &[0.1, 0.1], 3)?;

        let mut first = ModelFittingDensityEstimation::new(config.clone())?;
        first.fit(&dataset)?;
        assert!(first.offline().map(|o| o.lhs().is_some()) == Some(true));
        let stored: Vec<_> = fs::read_dir(&dir)
            .map_err(|e| SgdeError::io(&dir, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "dec") == Some(true))
            .collect();
        assert_eq!(stored.len(), 1);

        let mut second = ModelFittingDensityEstimation::new(config)?;
        second.fit(&dataset)?;
        // loaded from the cache: only the factors are held
        assert!(second.offline().map(|o| o.lhs().is_none()) == Some(true));
        array_approx_eq(second.coefficients().as_slice(), first.coefficients().as_slice(), 1e-15);
        Ok(())
    }

    #[test]
    fn cached_incomplete_factors_come_with_the_system_matrix() -> Result<(), SgdeError> {
        let dir = format!("{}/model_fitting_cache_ichol", DEFAULT_TEST_DIR);
        fs::remove_dir_all(&dir).unwrap_or_default();
        let mut config = config(DecompositionType::IChol)?;
        config.database.filepath = Some(format!("{}/index.jsonl", dir));
        config.database.store_dir = Some(dir.clone());
        config.cross_validation.enable = true;
        let dataset = Samples::gaussian(200, &[0.5, 0.5], &[0.1, 0.1], 5)?;

        let mut first = ModelFittingDensityEstimation::new(config.clone())?;
        first.fit(&dataset)?;
        let mut second = ModelFittingDensityEstimation::new(config)?;
        second.fit(&dataset)?;
        // the matrix is assembled from the grid instead of being reconstructed from IC(0)
        assert!(second.offline().map(|o| o.lhs().is_some()) == Some(true));
        array_approx_eq(second.coefficients().as_slice(), first.coefficients().as_slice(), 1e-12);
        Ok(())
    }
}
