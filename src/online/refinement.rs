use crate::grid::{BasisOperator, SparseGrid};
use crate::offline::dense::{complement, sorted_unique_indices, submatrix};
use crate::offline::{DecompositionOffline, SystemMatrixBuilder};
use crate::SgdeError;
use russell_lab::Matrix;

/// Reports the effect of a structural change on the factorization
#[derive(Clone, Debug, PartialEq)]
pub enum RefinementOutcome {
    /// The factors were updated incrementally and remain valid
    Updated,

    /// The factors could not follow the change; the caller must rebuild and decompose the system
    ///
    /// Kinds without incremental updates drop their factors and hold the updated system matrix.
    /// A failed incremental update keeps the prior factors and system matrix unchanged.
    Invalidated { reason: String },
}

impl RefinementOutcome {
    /// Returns whether the factors are still valid
    pub fn is_updated(&self) -> bool {
        matches!(self, RefinementOutcome::Updated)
    }
}

/// Keeps the offline factors consistent with a refined or coarsened grid
///
/// Decompositions supporting incremental updates are updated in place. Other kinds are
/// invalidated. If an incremental update fails, the decomposition is left as it was before the
/// call. Both cases are reported as a degradation; a rebuild never happens behind the caller's back.
pub struct RefinementAdapter<'a> {
    operator: &'a dyn BasisOperator,
}

impl<'a> RefinementAdapter<'a> {
    /// Allocates a new instance
    pub fn new(operator: &'a dyn BasisOperator) -> Self {
        RefinementAdapter { operator }
    }

    /// Accounts for `added` points appended at the end of the grid
    ///
    /// The grid must already contain the new points.
    pub fn apply_refinement(
        &self,
        offline: &mut DecompositionOffline,
        grid: &SparseGrid,
        added: usize,
    ) -> Result<RefinementOutcome, SgdeError> {
        if !offline.is_decomposed() {
            return Err(SgdeError::State("the system matrix was not decomposed yet"));
        }
        if added == 0 {
            return Ok(RefinementOutcome::Updated);
        }
        let n_old = offline.dim();
        if grid.size() != n_old + added {
            return Err(SgdeError::Configuration(format!(
                "the grid has {} points but {} + {} were expected",
                grid.size(),
                n_old,
                added
            )));
        }
        let builder = SystemMatrixBuilder::new(self.operator);
        let (b, c) = builder.build_refinement_block(grid, added)?;
        let augmented = offline.lhs().map(|a| augment(a, &b, &c));
        let kind = offline.kind();
        if !kind.supports_incremental_update() {
            if let Some(a) = augmented {
                offline.set_lhs(a);
            }
            return Ok(invalidate(offline, format!("{} does not support incremental updates", kind)));
        }
        let lambda = offline.lambda();
        let result = offline.decomposed_mut()?.actual.refine(&b, &c, lambda);
        match result {
            Ok(()) => {
                if let Some(a) = augmented {
                    offline.set_lhs(a);
                }
                log::info!("{} factors refined incrementally: {} → {} rows", kind, n_old, n_old + added);
                Ok(RefinementOutcome::Updated)
            }
            Err(e) => Ok(keep_prior(format!("incremental refinement failed: {}", e))),
        }
    }

    /// Accounts for the removal of the points at `deleted` (indices before the removal)
    pub fn apply_coarsening(
        &self,
        offline: &mut DecompositionOffline,
        deleted: &[usize],
    ) -> Result<RefinementOutcome, SgdeError> {
        if !offline.is_decomposed() {
            return Err(SgdeError::State("the system matrix was not decomposed yet"));
        }
        if deleted.is_empty() {
            return Ok(RefinementOutcome::Updated);
        }
        let n_old = offline.dim();
        let removed = sorted_unique_indices(deleted, n_old)?;
        let kept = complement(n_old, &removed);
        let reduced = offline.lhs().map(|a| submatrix(a, &kept, &kept));
        let kind = offline.kind();
        if !kind.supports_incremental_update() {
            if let Some(a) = reduced {
                offline.set_lhs(a);
            }
            return Ok(invalidate(offline, format!("{} does not support incremental updates", kind)));
        }
        let lambda = offline.lambda();
        let result = offline.decomposed_mut()?.actual.coarsen(&removed, lambda);
        match result {
            Ok(()) => {
                if let Some(a) = reduced {
                    offline.set_lhs(a);
                }
                log::info!(
                    "{} factors coarsened incrementally: {} → {} rows",
                    kind,
                    n_old,
                    n_old - removed.len()
                );
                Ok(RefinementOutcome::Updated)
            }
            Err(e) => Ok(keep_prior(format!("incremental coarsening failed: {}", e))),
        }
    }
}

/// Invalidates the factors and reports why
fn invalidate(offline: &mut DecompositionOffline, reason: String) -> RefinementOutcome {
    log::warn!("factorization invalidated, a full rebuild is required: {}", reason);
    offline.invalidate();
    RefinementOutcome::Invalidated { reason }
}

/// Reports a failed incremental update; the prior factors describe the grid before the change
fn keep_prior(reason: String) -> RefinementOutcome {
    log::warn!("prior factorization kept, a full rebuild is required: {}", reason);
    RefinementOutcome::Invalidated { reason }
}

/// Returns [[A, B], [Bᵀ, C]]
fn augment(a: &Matrix, b: &Matrix, c: &Matrix) -> Matrix {
    let n = a.nrow();
    let k = c.nrow();
    let mut m = Matrix::new(n + k, n + k);
    for i in 0..n {
        for j in 0..n {
            m.set(i, j, a.get(i, j));
        }
        for j in 0..k {
            m.set(i, n + j, b.get(i, j));
            m.set(n + j, i, b.get(i, j));
        }
    }
    for i in 0..k {
        for j in 0..k {
            m.set(n + i, n + j, c.get(i, j));
        }
    }
    m
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
