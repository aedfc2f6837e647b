use super::dense::{backward_upper, check_dims, forward_lower};
use super::factorization::{check_lambda, check_payload};
use super::{regularized, FactorView, FactorizationTrait};
use crate::base::{DecompositionType, PIVOT_TOLERANCE};
use crate::SgdeError;
use russell_lab::{Matrix, Vector};

/// Implements the LU factorization with partial pivoting P (A + λI) = L U
pub struct FactorLu {
    /// Packed factors: strictly lower part of L (unit diagonal) and upper part of U
    lu: Matrix,

    /// Row permutation: row i of P M is row perm[i] of M
    perm: Vec<usize>,

    /// Regularization strength embedded in the factors
    lambda: f64,
}

impl FactorLu {
    /// Factorizes A + λI
    pub fn new(a: &Matrix, lambda: f64) -> Result<Self, SgdeError> {
        let mut lu = regularized(a, lambda);
        let n = lu.nrow();
        let mut perm: Vec<usize> = (0..n).collect();
        for k in 0..n {
            let mut p = k;
            for i in (k + 1)..n {
                if f64::abs(lu.get(i, k)) > f64::abs(lu.get(p, k)) {
                    p = i;
                }
            }
            let pivot = lu.get(p, k);
            if f64::abs(pivot) < PIVOT_TOLERANCE || !pivot.is_finite() {
                return Err(SgdeError::Numerical(format!("matrix is singular (column {})", k)));
            }
            if p != k {
                for j in 0..n {
                    let tmp = lu.get(k, j);
                    lu.set(k, j, lu.get(p, j));
                    lu.set(p, j, tmp);
                }
                perm.swap(k, p);
            }
            for i in (k + 1)..n {
                let factor = lu.get(i, k) / pivot;
                lu.set(i, k, factor);
                for j in (k + 1)..n {
                    lu.set(i, j, lu.get(i, j) - factor * lu.get(k, j));
                }
            }
        }
        Ok(FactorLu { lu, perm, lambda })
    }

    /// Restores the factorization from the packed factors followed by one permutation row ((n+1) × n)
    pub fn from_payload(payload: Matrix, lambda: f64) -> Result<Self, SgdeError> {
        let n = check_payload(&payload, 1, DecompositionType::Lu)?;
        let mut seen = vec![false; n];
        let mut perm = Vec::with_capacity(n);
        for j in 0..n {
            let value = payload.get(n, j);
            let index = value as usize;
            if value < 0.0 || value.fract() != 0.0 || index >= n || seen[index] {
                return Err(SgdeError::Format("the LU permutation row is invalid".to_string()));
            }
            seen[index] = true;
            perm.push(index);
        }
        let mut lu = Matrix::new(n, n);
        for i in 0..n {
            for j in 0..n {
                lu.set(i, j, payload.get(i, j));
            }
        }
        Ok(FactorLu { lu, perm, lambda })
    }
}

impl FactorizationTrait for FactorLu {
    fn kind(&self) -> DecompositionType {
        DecompositionType::Lu
    }

    fn dim(&self) -> usize {
        self.lu.nrow()
    }

    fn embedded_lambda(&self) -> Option<f64> {
        Some(self.lambda)
    }

    fn solve(&self, x: &mut Vector, b: &Vector, lambda: f64) -> Result<(), SgdeError> {
        check_lambda(self.lambda, lambda)?;
        check_dims(self.dim(), x, b)?;
        for (i, &p) in self.perm.iter().enumerate() {
            x[i] = b[p];
        }
        let data = x.as_mut_data();
        forward_lower(&self.lu, data, true);
        backward_upper(&self.lu, data);
        Ok(())
    }

    fn reconstruct(&self, lambda: f64) -> Result<Matrix, SgdeError> {
        check_lambda(self.lambda, lambda)?;
        let n = self.dim();
        let mut m = Matrix::new(n, n);
        for i in 0..n {
            for j in 0..n {
                // (L U)_ij = Σ_{k ≤ min(i,j)} L_ik U_kj with L_ii = 1
                let mut s = 0.0;
                for k in 0..=usize::min(i, j) {
                    let lik = if k == i { 1.0 } else { self.lu.get(i, k) };
                    s += lik * self.lu.get(k, j);
                }
                m.set(self.perm[i], j, s);
            }
        }
        Ok(m)
    }

    fn payload(&self) -> Result<Matrix, SgdeError> {
        let n = self.dim();
        let mut payload = Matrix::new(n + 1, n);
        for i in 0..n {
            for j in 0..n {
                payload.set(i, j, self.lu.get(i, j));
            }
        }
        for (j, &p) in self.perm.iter().enumerate() {
            payload.set(n, j, p as f64);
        }
        Ok(payload)
    }

    fn view(&self) -> FactorView<'_> {
        FactorView::Lu {
            lu: &self.lu,
            perm: &self.perm,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::FactorLu;
    use crate::offline::FactorizationTrait;
    use crate::SgdeError;
    use russell_lab::{mat_approx_eq, vec_approx_eq, Matrix, Vector};

    #[test]
    fn new_and_solve_work() -> Result<(), SgdeError> {
        // non-symmetric matrix requiring pivoting
        let a = Matrix::from(&[[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [3.0, 0.0, 1.0]]);
        let fac = FactorLu::new(&a, 0.0)?;
        assert_eq!(fac.perm[0], 2);
        mat_approx_eq(&fac.reconstruct(0.0)?, &a, 1e-14);
        let b = Vector::from(&[5.0, 3.0, 6.0]);
        let mut x = Vector::new(3);
        fac.solve(&mut x, &b, 0.0)?;
        let mut residual = Vector::new(3);
        for i in 0..3 {
            residual[i] = (0..3).map(|j| a.get(i, j) * x[j]).sum::<f64>();
        }
        vec_approx_eq(&residual, &b, 1e-14);
        Ok(())
    }

    #[test]
    fn new_captures_singular_matrix() {
        let a = Matrix::from(&[[1.0, 2.0], [2.0, 4.0]]);
        assert!(matches!(FactorLu::new(&a, 0.0), Err(SgdeError::Numerical(_))));
    }

    #[test]
    fn from_payload_captures_invalid_permutation() -> Result<(), SgdeError> {
        let a = Matrix::from(&[[2.0, 1.0], [1.0, 2.0]]);
        let mut payload = FactorLu::new(&a, 0.0)?.payload()?;
        assert_eq!(payload.dims(), (3, 2));
        payload.set(2, 1, payload.get(2, 0));
        assert!(matches!(FactorLu::from_payload(payload, 0.0), Err(SgdeError::Format(_))));
        let square = Matrix::new(2, 2);
        assert!(matches!(FactorLu::from_payload(square, 0.0), Err(SgdeError::Format(_))));
        Ok(())
    }
}
