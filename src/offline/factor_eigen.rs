use super::dense::check_dims;
use super::factorization::check_payload;
use super::{FactorView, FactorizationTrait};
use crate::base::DecompositionType;
use crate::SgdeError;
use russell_lab::{mat_eigen_sym, mat_mat_mul, mat_vec_mul, vec_mat_mul, Matrix, Vector};

/// Implements the symmetric eigen-decomposition A = V D Vᵀ
///
/// The factors do not depend on λ; the solve applies (D + λI)⁻¹.
pub struct FactorEigen {
    /// Eigenvectors stored as columns
    vectors: Matrix,

    /// Eigenvalues in ascending order
    values: Vec<f64>,
}

impl FactorEigen {
    /// Computes the eigen-decomposition of the lower triangle of A (dsyev)
    pub fn new(a: &Matrix) -> Result<Self, SgdeError> {
        let n = a.nrow();
        if n == 0 {
            return Ok(FactorEigen {
                vectors: Matrix::new(0, 0),
                values: Vec::new(),
            });
        }
        if a.as_data().iter().any(|v| !v.is_finite()) {
            return Err(SgdeError::Numerical("matrix has non-finite entries".to_string()));
        }
        let mut vectors = a.clone();
        let mut values = Vector::new(n);
        mat_eigen_sym(&mut values, &mut vectors, false).map_err(SgdeError::lab)?;
        Ok(FactorEigen {
            vectors,
            values: values.as_data().clone(),
        })
    }

    /// Restores the decomposition from the eigenvectors followed by one eigenvalue row ((n+1) × n)
    pub fn from_payload(payload: Matrix) -> Result<Self, SgdeError> {
        let n = check_payload(&payload, 1, DecompositionType::Eigen)?;
        let mut vectors = Matrix::new(n, n);
        for i in 0..n {
            for j in 0..n {
                vectors.set(i, j, payload.get(i, j));
            }
        }
        let values = (0..n).map(|j| payload.get(n, j)).collect();
        Ok(FactorEigen { vectors, values })
    }

    /// Returns the eigenvalues in ascending order
    pub fn eigenvalues(&self) -> &[f64] {
        &self.values
    }
}

impl FactorizationTrait for FactorEigen {
    fn kind(&self) -> DecompositionType {
        DecompositionType::Eigen
    }

    fn dim(&self) -> usize {
        self.values.len()
    }

    fn embedded_lambda(&self) -> Option<f64> {
        None
    }

    /// Computes x = V (D + λI)⁻¹ Vᵀ b
    fn solve(&self, x: &mut Vector, b: &Vector, lambda: f64) -> Result<(), SgdeError> {
        let n = self.dim();
        check_dims(n, x, b)?;
        // y = Vᵀ b
        let mut y = Vector::new(n);
        vec_mat_mul(&mut y, 1.0, b, &self.vectors).map_err(SgdeError::lab)?;
        for j in 0..n {
            let shifted = self.values[j] + lambda;
            if shifted == 0.0 || !shifted.is_finite() {
                return Err(SgdeError::Numerical(format!(
                    "eigenvalue {} plus λ vanishes; the system is singular",
                    j
                )));
            }
            y[j] /= shifted;
        }
        mat_vec_mul(x, 1.0, &self.vectors, &y).map_err(SgdeError::lab)
    }

    fn reconstruct(&self, lambda: f64) -> Result<Matrix, SgdeError> {
        let n = self.dim();
        // V (D + λI) Vᵀ
        let mut scaled = self.vectors.clone();
        for j in 0..n {
            for i in 0..n {
                scaled.set(i, j, scaled.get(i, j) * (self.values[j] + lambda));
            }
        }
        let mut m = Matrix::new(n, n);
        mat_mat_mul(&mut m, 1.0, &scaled, &self.vectors.transposed(), 0.0).map_err(SgdeError::lab)?;
        Ok(m)
    }

    fn payload(&self) -> Result<Matrix, SgdeError> {
        let n = self.dim();
        let mut payload = Matrix::new(n + 1, n);
        for i in 0..n {
            for j in 0..n {
                payload.set(i, j, self.vectors.get(i, j));
            }
        }
        for j in 0..n {
            payload.set(n, j, self.values[j]);
        }
        Ok(payload)
    }

    fn view(&self) -> FactorView<'_> {
        FactorView::Spectral {
            vectors: &self.vectors,
            values: &self.values,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::FactorEigen;
    use crate::offline::{regularized, FactorizationTrait};
    use crate::SgdeError;
    use russell_lab::{approx_eq, mat_approx_eq, vec_approx_eq, Matrix, Vector};

    #[test]
    fn eigenvalues_are_correct_and_sorted() -> Result<(), SgdeError> {
        // eigenvalues of [[2,1],[1,2]] are 1 and 3
        let a = Matrix::from(&[[2.0, 1.0], [1.0, 2.0]]);
        let fac = FactorEigen::new(&a)?;
        approx_eq(fac.eigenvalues()[0], 1.0, 1e-14);
        approx_eq(fac.eigenvalues()[1], 3.0, 1e-14);
        mat_approx_eq(&fac.reconstruct(0.0)?, &a, 1e-14);
        Ok(())
    }

    #[test]
    fn solve_works_for_any_lambda() -> Result<(), SgdeError> {
        let a = Matrix::from(&[[4.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]]);
        let fac = FactorEigen::new(&a)?;
        let b = Vector::from(&[1.0, 2.0, 3.0]);
        for lambda in [0.0, 0.5, 10.0] {
            let mut x = Vector::new(3);
            fac.solve(&mut x, &b, lambda)?;
            let m = regularized(&a, lambda);
            let mut mx = Vector::new(3);
            for i in 0..3 {
                mx[i] = (0..3).map(|j| m.get(i, j) * x[j]).sum::<f64>();
            }
            vec_approx_eq(&mx, &b, 1e-13);
        }
        Ok(())
    }

    #[test]
    fn solve_captures_singular_shift() -> Result<(), SgdeError> {
        let a = Matrix::from(&[[2.0, 0.0], [0.0, 1.0]]);
        let fac = FactorEigen::new(&a)?;
        let b = Vector::from(&[1.0, 1.0]);
        let mut x = Vector::new(2);
        assert!(matches!(fac.solve(&mut x, &b, -1.0), Err(SgdeError::Numerical(_))));
        Ok(())
    }
}
