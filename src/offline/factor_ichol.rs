use super::dense::{cholesky_solve, lower_times_transpose};
use super::factorization::{check_lambda, check_payload};
use super::{regularized, FactorView, FactorizationTrait};
use crate::base::DecompositionType;
use crate::SgdeError;
use russell_lab::{Matrix, Vector};

/// Implements the incomplete Cholesky factorization IC(0) of A + λI
///
/// The lower factor keeps the sparsity pattern of the lower triangle of A + λI; fill-in is
/// discarded. For patterns without fill-in (e.g., tridiagonal or dense matrices) the factors
/// are exact.
pub struct FactorIChol {
    /// Lower factor
    l: Matrix,

    /// Regularization strength embedded in L
    lambda: f64,
}

impl FactorIChol {
    /// Computes the IC(0) factors of A + λI
    pub fn new(a: &Matrix, lambda: f64) -> Result<Self, SgdeError> {
        let m = regularized(a, lambda);
        let n = m.nrow();
        let pattern: Vec<bool> = (0..n * n).map(|p| m.get(p % n, p / n) != 0.0).collect();
        let in_pattern = |i: usize, j: usize| pattern[i + j * n];
        let mut l = Matrix::new(n, n);
        for j in 0..n {
            for i in j..n {
                l.set(i, j, m.get(i, j));
            }
        }
        for k in 0..n {
            let pivot = l.get(k, k);
            if !(pivot > 0.0) || !pivot.is_finite() {
                return Err(SgdeError::Numerical(format!(
                    "incomplete Cholesky breakdown (pivot {} = {:e})",
                    k, pivot
                )));
            }
            let lkk = f64::sqrt(pivot);
            l.set(k, k, lkk);
            for i in (k + 1)..n {
                if in_pattern(i, k) {
                    l.set(i, k, l.get(i, k) / lkk);
                }
            }
            for j in (k + 1)..n {
                let ljk = l.get(j, k);
                if ljk == 0.0 {
                    continue;
                }
                for i in j..n {
                    if in_pattern(i, j) {
                        l.set(i, j, l.get(i, j) - l.get(i, k) * ljk);
                    }
                }
            }
        }
        Ok(FactorIChol { l, lambda })
    }

    /// Restores the factorization from the lower factor (n × n)
    pub fn from_payload(payload: Matrix, lambda: f64) -> Result<Self, SgdeError> {
        check_payload(&payload, 0, DecompositionType::IChol)?;
        Ok(FactorIChol { l: payload, lambda })
    }
}

impl FactorizationTrait for FactorIChol {
    fn kind(&self) -> DecompositionType {
        DecompositionType::IChol
    }

    fn dim(&self) -> usize {
        self.l.nrow()
    }

    fn embedded_lambda(&self) -> Option<f64> {
        Some(self.lambda)
    }

    fn solve(&self, x: &mut Vector, b: &Vector, lambda: f64) -> Result<(), SgdeError> {
        check_lambda(self.lambda, lambda)?;
        cholesky_solve(&self.l, x, b)
    }

    fn reconstruct(&self, lambda: f64) -> Result<Matrix, SgdeError> {
        check_lambda(self.lambda, lambda)?;
        lower_times_transpose(&self.l)
    }

    fn payload(&self) -> Result<Matrix, SgdeError> {
        Ok(self.l.clone())
    }

    fn view(&self) -> FactorView<'_> {
        FactorView::LowerTriangular(&self.l)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::FactorIChol;
    use crate::offline::{regularized, FactorizationTrait};
    use crate::SgdeError;
    use russell_lab::{mat_approx_eq, Matrix};

    #[test]
    fn tridiagonal_pattern_is_exact() -> Result<(), SgdeError> {
        let a = Matrix::from(&[
            [2.0, -1.0, 0.0, 0.0],
            [-1.0, 2.0, -1.0, 0.0],
            [0.0, -1.0, 2.0, -1.0],
            [0.0, 0.0, -1.0, 2.0],
        ]);
        let fac = FactorIChol::new(&a, 0.5)?;
        mat_approx_eq(&fac.reconstruct(0.5)?, &regularized(&a, 0.5), 1e-14);
        assert_eq!(fac.l.get(2, 0), 0.0);
        assert_eq!(fac.l.get(3, 1), 0.0);
        Ok(())
    }

    #[test]
    fn fill_in_is_discarded() -> Result<(), SgdeError> {
        // arrow matrix: exact Cholesky would fill (2,1)
        let a = Matrix::from(&[[4.0, 1.0, 1.0], [1.0, 4.0, 0.0], [1.0, 0.0, 4.0]]);
        let fac = FactorIChol::new(&a, 0.0)?;
        assert_eq!(fac.l.get(2, 1), 0.0);
        let approx = fac.reconstruct(0.0)?;
        assert_eq!(approx.get(0, 0), 4.0);
        assert!(f64::abs(approx.get(2, 1)) > 0.0);
        Ok(())
    }

    #[test]
    fn new_captures_breakdown() {
        let a = Matrix::from(&[[1.0, 2.0], [2.0, 1.0]]);
        assert!(matches!(FactorIChol::new(&a, 0.0), Err(SgdeError::Numerical(_))));
    }
}
