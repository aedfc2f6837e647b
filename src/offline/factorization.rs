use super::{FactorCholesky, FactorEigen, FactorIChol, FactorLu, FactorOrthoAdapt};
use crate::base::DecompositionType;
use crate::SgdeError;
use russell_lab::{Matrix, Vector};

/// Exposes the stored factors so that they can be distributed over a worker grid
pub enum FactorView<'a> {
    /// Lower factor L with L Lᵀ = A + λI (Cholesky and IChol)
    LowerTriangular(&'a Matrix),

    /// Packed L\U factors and the row permutation with P (A + λI) = L U
    Lu { lu: &'a Matrix, perm: &'a [usize] },

    /// Eigenvectors (columns) and ascending eigenvalues with A = V D Vᵀ
    Spectral { vectors: &'a Matrix, values: &'a [f64] },

    /// Orthogonal matrix and tridiagonal bands with A = Q T Qᵀ
    Tridiagonal { q: &'a Matrix, diag: &'a [f64], sub: &'a [f64] },

    /// Explicit inverse of A + λI
    Inverse(&'a Matrix),
}

/// Defines the trait for the factorizations of the system matrix
pub trait FactorizationTrait: Send + Sync {
    /// Returns the decomposition type
    fn kind(&self) -> DecompositionType;

    /// Returns the number of rows (and columns) of the factorized matrix
    fn dim(&self) -> usize;

    /// Returns the λ embedded in the factors, if any
    ///
    /// Factors computed for A + λI can only be solved with the same λ.
    fn embedded_lambda(&self) -> Option<f64>;

    /// Solves (A + λI) x = b
    fn solve(&self, x: &mut Vector, b: &Vector, lambda: f64) -> Result<(), SgdeError>;

    /// Reconstructs A + λI from the factors
    fn reconstruct(&self, lambda: f64) -> Result<Matrix, SgdeError>;

    /// Returns the matrix persisted by the decomposition store
    fn payload(&self) -> Result<Matrix, SgdeError>;

    /// Returns a view of the factors
    fn view(&self) -> FactorView<'_>;

    /// Updates the factors after appending rows and columns to A
    ///
    /// `b` couples the old rows with the new ones and `c` couples the new rows among themselves.
    /// On failure, the factors are left untouched.
    fn refine(&mut self, _b: &Matrix, _c: &Matrix, _lambda: f64) -> Result<(), SgdeError> {
        Err(SgdeError::NotSupported("this decomposition cannot be refined incrementally"))
    }

    /// Updates the factors after removing the rows and columns listed in `removed`
    ///
    /// On failure, the factors are left untouched.
    fn coarsen(&mut self, _removed: &[usize], _lambda: f64) -> Result<(), SgdeError> {
        Err(SgdeError::NotSupported("this decomposition cannot be coarsened incrementally"))
    }
}

/// Holds a factorization, wrapping an "actual" implementation
pub struct GenericFactorization {
    /// Connects to the "actual" implementation
    pub actual: Box<dyn FactorizationTrait>,
}

impl GenericFactorization {
    /// Factorizes A (+ λI, depending on the decomposition type)
    pub fn new(kind: DecompositionType, a: &Matrix, lambda: f64) -> Result<Self, SgdeError> {
        let (nrow, ncol) = a.dims();
        if nrow != ncol || nrow == 0 {
            return Err(SgdeError::Configuration(format!(
                "the system matrix must be square and non-empty (got {}×{})",
                nrow, ncol
            )));
        }
        let actual: Box<dyn FactorizationTrait> = match kind {
            DecompositionType::Lu => Box::new(FactorLu::new(a, lambda)?),
            DecompositionType::Eigen => Box::new(FactorEigen::new(a)?),
            DecompositionType::Cholesky => Box::new(FactorCholesky::new(a, lambda)?),
            DecompositionType::IChol => Box::new(FactorIChol::new(a, lambda)?),
            DecompositionType::OrthoAdapt => Box::new(FactorOrthoAdapt::new(a)?),
        };
        Ok(GenericFactorization { actual })
    }

    /// Restores a factorization from a persisted payload
    pub fn from_payload(kind: DecompositionType, payload: Matrix, lambda: f64) -> Result<Self, SgdeError> {
        let actual: Box<dyn FactorizationTrait> = match kind {
            DecompositionType::Lu => Box::new(FactorLu::from_payload(payload, lambda)?),
            DecompositionType::Eigen => Box::new(FactorEigen::from_payload(payload)?),
            DecompositionType::Cholesky => Box::new(FactorCholesky::from_payload(payload, lambda)?),
            DecompositionType::IChol => Box::new(FactorIChol::from_payload(payload, lambda)?),
            DecompositionType::OrthoAdapt => Box::new(FactorOrthoAdapt::from_payload(payload)?),
        };
        Ok(GenericFactorization { actual })
    }
}

/// Checks that the requested λ equals the λ embedded in the factors
pub(crate) fn check_lambda(embedded: f64, lambda: f64) -> Result<(), SgdeError> {
    if embedded != lambda {
        return Err(SgdeError::State(
            "the factors were computed for another regularization strength",
        ));
    }
    Ok(())
}

/// Checks the dimensions of a persisted payload with `extra` rows beyond the square block
pub(crate) fn check_payload(payload: &Matrix, extra: usize, kind: DecompositionType) -> Result<usize, SgdeError> {
    let (nrow, ncol) = payload.dims();
    if ncol == 0 || nrow != ncol + extra {
        return Err(SgdeError::Format(format!(
            "a {} payload must have {} rows for {} columns (got {})",
            kind,
            ncol + extra,
            ncol,
            nrow
        )));
    }
    Ok(ncol)
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::GenericFactorization;
    use crate::base::DecompositionType;
    use crate::offline::dense::tests::spd_sample;
    use crate::offline::regularized;
    use crate::SgdeError;
    use russell_lab::{mat_approx_eq, vec_approx_eq, Matrix, Vector};

    #[test]
    fn new_captures_non_square_matrix() {
        let a = Matrix::new(2, 3);
        assert!(matches!(
            GenericFactorization::new(DecompositionType::Lu, &a, 0.0),
            Err(SgdeError::Configuration(_))
        ));
    }

    #[test]
    fn all_factorizations_reconstruct_and_solve() -> Result<(), SgdeError> {
        let lambda = 0.25;
        let a = spd_sample(6);
        let m = regularized(&a, lambda);
        let b = Vector::from(&[1.0, -2.0, 0.5, 3.0, 0.0, 1.5]);
        let mut reference = Vector::new(6);
        let chol = GenericFactorization::new(DecompositionType::Cholesky, &a, lambda)?;
        chol.actual.solve(&mut reference, &b, lambda)?;
        for kind in DecompositionType::all() {
            let fac = GenericFactorization::new(kind, &a, lambda)?;
            assert_eq!(fac.actual.kind(), kind);
            assert_eq!(fac.actual.dim(), 6);
            // the sample matrix is dense, so IC(0) is the complete factorization
            mat_approx_eq(&fac.actual.reconstruct(lambda)?, &m, 1e-12);
            let mut x = Vector::new(6);
            fac.actual.solve(&mut x, &b, lambda)?;
            vec_approx_eq(&x, &reference, 1e-12);
        }
        Ok(())
    }

    #[test]
    fn payload_round_trip_preserves_solution() -> Result<(), SgdeError> {
        let lambda = 0.1;
        let a = spd_sample(4);
        let b = Vector::from(&[1.0, 2.0, 3.0, 4.0]);
        for kind in DecompositionType::all() {
            let fac = GenericFactorization::new(kind, &a, lambda)?;
            let restored = GenericFactorization::from_payload(kind, fac.actual.payload()?, lambda)?;
            let mut x1 = Vector::new(4);
            let mut x2 = Vector::new(4);
            fac.actual.solve(&mut x1, &b, lambda)?;
            restored.actual.solve(&mut x2, &b, lambda)?;
            vec_approx_eq(&x1, &x2, 0.0);
        }
        Ok(())
    }

    #[test]
    fn embedded_lambda_is_checked() -> Result<(), SgdeError> {
        let a = spd_sample(3);
        let b = Vector::from(&[1.0, 1.0, 1.0]);
        let mut x = Vector::new(3);
        for kind in DecompositionType::all() {
            let fac = GenericFactorization::new(kind, &a, 0.5)?;
            let res = fac.actual.solve(&mut x, &b, 0.25);
            if kind.lambda_free() {
                assert_eq!(fac.actual.embedded_lambda(), None);
                assert!(res.is_ok());
            } else {
                assert_eq!(fac.actual.embedded_lambda(), Some(0.5));
                assert!(matches!(res, Err(SgdeError::State(_))));
            }
        }
        Ok(())
    }
}
