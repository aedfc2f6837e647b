use super::distributed_matrix::{check_layout, reduce_sum};
use super::{DistributedMatrix, DistributedVector, ProcessGrid};
use crate::base::{CoefficientVector, Dataset, DecompositionType, ParallelConfig};
use crate::grid::{BasisOperator, SparseGrid};
use crate::offline::dense::tridiagonal_solve;
use crate::offline::{DecompositionOffline, FactorView};
use crate::online::OnlineSolver;
use crate::SgdeError;
use russell_lab::Matrix;

/// Holds the factors of a decomposition distributed over the process grid
pub enum DistributedFactors {
    /// Lower factor L with L Lᵀ = A + λI
    LowerTriangular(DistributedMatrix),

    /// Packed L\U factors and the row permutation
    Lu { lu: DistributedMatrix, perm: Vec<usize> },

    /// Eigenvectors and eigenvalues (replicated)
    Spectral { vectors: DistributedMatrix, values: Vec<f64> },

    /// Orthogonal matrix and tridiagonal bands (replicated)
    Tridiagonal {
        q: DistributedMatrix,
        diag: Vec<f64>,
        sub: Vec<f64>,
    },

    /// Explicit inverse of A + λI
    Inverse(DistributedMatrix),
}

/// Holds a consistent distributed view of the offline factorization
pub struct DistributedFactorization {
    kind: DecompositionType,
    lambda: f64,
    dim: usize,
    factors: DistributedFactors,
}

impl DistributedFactorization {
    /// Returns the decomposition type
    pub fn kind(&self) -> DecompositionType {
        self.kind
    }

    /// Returns the number of rows of the system
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the distributed factors
    pub fn factors(&self) -> &DistributedFactors {
        &self.factors
    }

    /// Solves (A + λI) x = b with distributed triangular solves or matrix-vector products
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, SgdeError> {
        if b.len() != self.dim {
            return Err(SgdeError::Configuration(format!(
                "solve requires a vector of dimension {} (got {})",
                self.dim,
                b.len()
            )));
        }
        match &self.factors {
            DistributedFactors::LowerTriangular(l) => {
                let mut x = b.to_vec();
                l.forward_substitution(&mut x, false)?;
                l.backward_substitution(&mut x, true)?;
                Ok(x)
            }
            DistributedFactors::Lu { lu, perm } => {
                let mut x: Vec<f64> = perm.iter().map(|&p| b[p]).collect();
                lu.forward_substitution(&mut x, true)?;
                lu.backward_substitution(&mut x, false)?;
                Ok(x)
            }
            DistributedFactors::Spectral { vectors, values } => {
                let mut y = vectors.gemv(b, true)?;
                for (j, value) in y.iter_mut().enumerate() {
                    let shifted = values[j] + self.lambda;
                    if shifted == 0.0 || !shifted.is_finite() {
                        return Err(SgdeError::Numerical(format!(
                            "eigenvalue {} plus λ vanishes; the system is singular",
                            j
                        )));
                    }
                    *value /= shifted;
                }
                vectors.gemv(&y, false)
            }
            DistributedFactors::Tridiagonal { q, diag, sub } => {
                let mut y = q.gemv(b, true)?;
                tridiagonal_solve(diag, sub, self.lambda, &mut y)?;
                q.gemv(&y, false)
            }
            DistributedFactors::Inverse(p) => p.gemv(b, false),
        }
    }
}

/// Coordinates the distributed variant of the density estimation over a process grid
pub struct DistributedCoordinator {
    grid: ProcessGrid,
    row_block: usize,
    col_block: usize,
}

impl DistributedCoordinator {
    /// Allocates a new instance from the parallel configuration
    pub fn new(config: &ParallelConfig) -> Result<Self, SgdeError> {
        let grid = ProcessGrid::from_config(config)?;
        DistributedCoordinator::with_grid(grid, config.row_block_size, config.col_block_size)
    }

    /// Allocates a new instance with an existing process grid
    pub fn with_grid(grid: ProcessGrid, row_block: usize, col_block: usize) -> Result<Self, SgdeError> {
        if row_block == 0 || col_block == 0 {
            return Err(SgdeError::Configuration("block sizes must be ≥ 1".to_string()));
        }
        Ok(DistributedCoordinator {
            grid,
            row_block,
            col_block,
        })
    }

    /// Returns the process grid
    pub fn process_grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// Checks that an n×n system can be distributed over the process grid
    pub fn check_dimension(&self, n: usize) -> Result<(), SgdeError> {
        check_layout(&self.grid, n, n, self.row_block, self.col_block)
    }

    /// Distributes a matrix block-cyclically
    pub fn partition(&self, a: &Matrix) -> Result<DistributedMatrix, SgdeError> {
        let d = DistributedMatrix::from_shared(a, self.grid, self.row_block, self.col_block)?;
        log::debug!(
            "partitioned {}×{} matrix over {}×{} workers with {}×{} blocks",
            a.nrow(),
            a.ncol(),
            self.grid.rows(),
            self.grid.cols(),
            self.row_block,
            self.col_block
        );
        Ok(d)
    }

    /// Distributes a vector over the process rows
    pub fn partition_vector(&self, values: &[f64]) -> Result<DistributedVector, SgdeError> {
        DistributedVector::from_slice(values, self.grid, self.row_block)
    }

    /// Gathers a distributed matrix; only the master (rank 0) receives it
    pub fn gather(&self, distributed: &DistributedMatrix, rank: usize) -> Option<Matrix> {
        distributed.to_local(rank)
    }

    /// Gathers a distributed matrix and hands a copy to every worker
    pub fn broadcast(&self, distributed: &DistributedMatrix) -> Matrix {
        distributed.to_local_broadcast()
    }

    /// Derives the distributed view of freshly computed (or updated) offline factors
    ///
    /// Must be called after every decomposition or structural update and before any
    /// distributed solve.
    pub fn sync_decomposition(&self, offline: &DecompositionOffline) -> Result<DistributedFactorization, SgdeError> {
        let factorization = offline.decomposed()?;
        let factors = match factorization.actual.view() {
            FactorView::LowerTriangular(l) => DistributedFactors::LowerTriangular(self.partition(l)?),
            FactorView::Lu { lu, perm } => DistributedFactors::Lu {
                lu: self.partition(lu)?,
                perm: perm.to_vec(),
            },
            FactorView::Spectral { vectors, values } => DistributedFactors::Spectral {
                vectors: self.partition(vectors)?,
                values: values.to_vec(),
            },
            FactorView::Tridiagonal { q, diag, sub } => DistributedFactors::Tridiagonal {
                q: self.partition(q)?,
                diag: diag.to_vec(),
                sub: sub.to_vec(),
            },
            FactorView::Inverse(p) => DistributedFactors::Inverse(self.partition(p)?),
        };
        log::info!(
            "synchronized {} factors with {} rows over {} workers",
            offline.kind(),
            factorization.actual.dim(),
            self.grid.n_in_grid()
        );
        Ok(DistributedFactorization {
            kind: offline.kind(),
            lambda: offline.lambda(),
            dim: factorization.actual.dim(),
            factors,
        })
    }

    /// Evaluates the density at every sample; workers compute the entries of their shards
    pub fn evaluate_parallel(
        &self,
        grid: &SparseGrid,
        operator: &dyn BasisOperator,
        alpha: &[f64],
        samples: &Dataset,
    ) -> Result<DistributedVector, SgdeError> {
        if samples.dim() != grid.dim() {
            return Err(SgdeError::Configuration(format!(
                "the sample dimension ({}) must equal the grid dimension ({})",
                samples.dim(),
                grid.dim()
            )));
        }
        DistributedVector::from_shards(self.grid, samples.n_sample(), self.row_block, |rows| {
            rows.iter()
                .map(|&m| operator.evaluate(grid, alpha, &samples.row(m)))
                .collect()
        })
    }

    /// Computes the density coefficients on the process grid
    ///
    /// The samples are split over the in-grid workers, the partial basis sums are reduced into
    /// the streaming right-hand side, and the system is solved with the distributed factors.
    pub fn compute_density_parallel(
        &self,
        online: &mut OnlineSolver,
        factorization: &DistributedFactorization,
        grid: &SparseGrid,
        operator: &dyn BasisOperator,
        dataset: &Dataset,
    ) -> Result<DistributedVector, SgdeError> {
        if dataset.n_sample() == 0 {
            return Err(SgdeError::Configuration("the dataset has no samples".to_string()));
        }
        if dataset.dim() != grid.dim() {
            return Err(SgdeError::Configuration(format!(
                "the dataset dimension ({}) must equal the grid dimension ({})",
                dataset.dim(),
                grid.dim()
            )));
        }
        if factorization.dim() != grid.size() {
            return Err(SgdeError::State("the distributed factors are out of sync with the grid"));
        }
        let n_workers = self.grid.n_in_grid();
        let n_sample = dataset.n_sample();
        let partials = self.grid.run(|rank, _, _| {
            let start = rank * n_sample / n_workers;
            let end = (rank + 1) * n_sample / n_workers;
            let mut sums = vec![0.0; grid.size()];
            for m in start..end {
                let x = dataset.row(m);
                for (i, s) in sums.iter_mut().enumerate() {
                    *s += operator.basis_value(grid, i, &x);
                }
            }
            Ok(sums)
        })?;
        let sums = reduce_sum(partials, grid.size());
        online.fold(&sums, n_sample)?;
        let b = online.rhs()?;
        let alpha = factorization.solve(b.as_data())?;
        self.partition_vector(&alpha)
    }

    /// Gathers distributed coefficients and hands a copy to every worker
    pub fn broadcast_coefficients(&self, alpha: &DistributedVector) -> CoefficientVector {
        CoefficientVector::from_vector(alpha.to_local_broadcast())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{DistributedCoordinator, DistributedFactors};
    use crate::base::{BasisType, CrossValidationConfig, DecompositionType, DensityConfig, ParallelConfig, Samples};
    use crate::grid::{BasisOperator, HierarchicalOperator, SparseGrid};
    use crate::offline::DecompositionOffline;
    use crate::online::{OnlineSolver, RefinementAdapter};
    use crate::parallel::ProcessGrid;
    use crate::SgdeError;
    use russell_lab::{array_approx_eq, mat_approx_eq, Matrix, Vector};

    fn coordinator(rows: usize, cols: usize, n_process: usize, block: usize) -> Result<DistributedCoordinator, SgdeError> {
        let mut config = ParallelConfig::new();
        config.enable = true;
        config.process_rows = rows;
        config.process_cols = cols;
        config.n_process = n_process;
        config.row_block_size = block;
        config.col_block_size = block;
        DistributedCoordinator::new(&config)
    }

    #[test]
    fn new_captures_errors() -> Result<(), SgdeError> {
        assert!(matches!(coordinator(2, 2, 3, 4), Err(SgdeError::Configuration(_))));
        assert!(matches!(coordinator(2, 2, 4, 0), Err(SgdeError::Configuration(_))));
        let c = coordinator(2, 2, 4, 4)?;
        assert!(matches!(c.partition(&Matrix::new(6, 6)), Err(SgdeError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn partition_gather_broadcast_work() -> Result<(), SgdeError> {
        let c = coordinator(2, 2, 5, 3)?;
        let mut a = Matrix::new(8, 7);
        for i in 0..8 {
            for j in 0..7 {
                a.set(i, j, i as f64 - 0.5 * j as f64);
            }
        }
        let d = c.partition(&a)?;
        let gathered = c.gather(&d, 0).ok_or(SgdeError::State("master received nothing"))?;
        assert_eq!(gathered.as_data(), a.as_data());
        assert!(c.gather(&d, 1).is_none());
        assert!(c.gather(&d, 4).is_none());
        mat_approx_eq(&c.broadcast(&d), &a, 1e-15);
        Ok(())
    }

    #[test]
    fn distributed_solve_matches_local_solve() -> Result<(), SgdeError> {
        let grid = SparseGrid::regular(2, 3, BasisType::Linear, Vec::new());
        let op = HierarchicalOperator::new();
        let c = coordinator(2, 2, 4, 4)?;
        let b: Vec<f64> = (0..grid.size()).map(|i| 1.0 / (1.0 + i as f64)).collect();
        let kinds = [
            DecompositionType::Cholesky,
            DecompositionType::Lu,
            DecompositionType::Eigen,
            DecompositionType::OrthoAdapt,
            DecompositionType::IChol,
        ];
        for kind in kinds {
            let mut offline = DecompositionOffline::new(kind, 1e-2, Vec::new());
            offline.build_matrix(&grid, &op)?;
            offline.decompose()?;
            let distributed = c.sync_decomposition(&offline)?;
            assert_eq!(distributed.kind(), kind);
            let mut correct = Vector::new(grid.size());
            offline.solve(&mut correct, &Vector::from(&b))?;
            array_approx_eq(&distributed.solve(&b)?, correct.as_data(), 1e-9);
        }

        // refined OrthoAdapt factors are distributed as an explicit inverse
        let mut refined = grid.clone();
        let mut offline = DecompositionOffline::new(DecompositionType::OrthoAdapt, 1e-2, Vec::new());
        offline.build_matrix(&refined, &op)?;
        offline.decompose()?;
        let added = refined.refine(&vec![1.0; refined.size()], 1)?;
        RefinementAdapter::new(&op).apply_refinement(&mut offline, &refined, added)?;
        let distributed = c.sync_decomposition(&offline)?;
        assert!(matches!(distributed.factors(), DistributedFactors::Inverse(_)));
        let b: Vec<f64> = vec![1.0; refined.size()];
        let mut correct = Vector::new(refined.size());
        offline.solve(&mut correct, &Vector::from(&b))?;
        array_approx_eq(&distributed.solve(&b)?, correct.as_data(), 1e-9);
        assert!(matches!(distributed.solve(&b[1..]), Err(SgdeError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn compute_density_parallel_matches_serial() -> Result<(), SgdeError> {
        let grid = SparseGrid::regular(2, 3, BasisType::ModLinear, Vec::new());
        let op = HierarchicalOperator::new();
        let dataset = Samples::gaussian(200, &[0.4, 0.6], &[0.1, 0.2], 3)?;
        let mut offline = DecompositionOffline::new(DecompositionType::Cholesky, 1e-3, Vec::new());
        offline.build_matrix(&grid, &op)?;
        offline.decompose()?;

        let density = DensityConfig::new(DecompositionType::Cholesky);
        let mut serial = OnlineSolver::new(density.clone(), CrossValidationConfig::new());
        let correct = serial.compute_coefficients(&mut offline, &grid, &op, &dataset, false)?;

        let c = coordinator(2, 2, 6, 3)?;
        let factors = c.sync_decomposition(&offline)?;
        let mut parallel = OnlineSolver::new(density, CrossValidationConfig::new());
        let alpha = c.compute_density_parallel(&mut parallel, &factors, &grid, &op, &dataset)?;
        let alpha = c.broadcast_coefficients(&alpha);
        array_approx_eq(alpha.as_slice(), correct.as_slice(), 1e-9);
        assert_eq!(parallel.total_weight(), 200.0);

        let evaluated = c.evaluate_parallel(&grid, &op, alpha.as_slice(), &dataset)?;
        let values = evaluated.to_local(0).ok_or(SgdeError::State("master received nothing"))?;
        for m in [0, 57, 199] {
            let expected = op.evaluate(&grid, correct.as_slice(), &dataset.row(m))?;
            assert!(f64::abs(values[m] - expected) < 1e-9 * f64::max(1.0, expected.abs()));
        }
        Ok(())
    }

    #[test]
    fn workers_outside_the_grid_hold_nothing() -> Result<(), SgdeError> {
        let process_grid = ProcessGrid::new(1, 2, 4)?;
        let c = DistributedCoordinator::with_grid(process_grid, 2, 2)?;
        let d = c.partition(&Matrix::from(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]))?;
        assert!(d.local(0).is_some());
        assert!(d.local(1).is_some());
        assert!(d.local(2).is_none());
        assert!(d.local(3).is_none());
        // every worker still receives the broadcast
        assert_eq!(c.broadcast(&d).get(1, 2), 6.0);
        Ok(())
    }
}
