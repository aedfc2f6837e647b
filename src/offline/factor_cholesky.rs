use super::dense::{cholesky, cholesky_rank_one_update, cholesky_solve, forward_lower, lower_times_transpose};
use super::dense::{complement, sorted_unique_indices, submatrix};
use super::factorization::{check_lambda, check_payload};
use super::{regularized, FactorView, FactorizationTrait};
use crate::base::DecompositionType;
use crate::SgdeError;
use russell_lab::{mat_t_mat_mul, Matrix, Vector};

/// Implements the Cholesky factorization A + λI = L Lᵀ with incremental updates
pub struct FactorCholesky {
    /// Lower factor
    l: Matrix,

    /// Regularization strength embedded in L
    lambda: f64,
}

impl FactorCholesky {
    /// Factorizes A + λI
    pub fn new(a: &Matrix, lambda: f64) -> Result<Self, SgdeError> {
        let l = cholesky(&regularized(a, lambda))?;
        Ok(FactorCholesky { l, lambda })
    }

    /// Restores the factorization from the lower factor (n × n)
    pub fn from_payload(payload: Matrix, lambda: f64) -> Result<Self, SgdeError> {
        check_payload(&payload, 0, DecompositionType::Cholesky)?;
        Ok(FactorCholesky { l: payload, lambda })
    }
}

impl FactorizationTrait for FactorCholesky {
    fn kind(&self) -> DecompositionType {
        DecompositionType::Cholesky
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

    /// Appends k rows: L21 = (L⁻¹ B)ᵀ and L22 = chol(C + λI − L21 L21ᵀ)
    fn refine(&mut self, b: &Matrix, c: &Matrix, lambda: f64) -> Result<(), SgdeError> {
        check_lambda(self.lambda, lambda)?;
        let n = self.l.nrow();
        let k = c.nrow();
        if b.dims() != (n, k) || c.ncol() != k {
            return Err(SgdeError::Configuration(format!(
                "refinement blocks must be {}×{} and {}×{}",
                n, k, k, k
            )));
        }
        // W = L⁻¹ B, column by column
        let mut w = Matrix::new(n, k);
        let mut column = vec![0.0; n];
        for j in 0..k {
            for i in 0..n {
                column[i] = b.get(i, j);
            }
            forward_lower(&self.l, &mut column, false);
            for i in 0..n {
                w.set(i, j, column[i]);
            }
        }
        // S = C + λI − Wᵀ W
        let mut s = regularized(c, lambda);
        mat_t_mat_mul(&mut s, -1.0, &w, &w, 1.0).map_err(SgdeError::lab)?;
        let l22 = cholesky(&s)?;
        let mut l = Matrix::new(n + k, n + k);
        for i in 0..n {
            for j in 0..=i {
                l.set(i, j, self.l.get(i, j));
            }
        }
        for p in 0..k {
            for j in 0..n {
                l.set(n + p, j, w.get(j, p));
            }
            for q in 0..=p {
                l.set(n + p, n + q, l22.get(p, q));
            }
        }
        self.l = l;
        Ok(())
    }

    /// Removes rows in descending order, folding each removed column into the trailing block
    fn coarsen(&mut self, removed: &[usize], lambda: f64) -> Result<(), SgdeError> {
        check_lambda(self.lambda, lambda)?;
        let sorted = sorted_unique_indices(removed, self.l.nrow())?;
        let mut l = self.l.clone();
        for &j in sorted.iter().rev() {
            let n = l.nrow();
            let keep = complement(n, &[j]);
            let mut reduced = submatrix(&l, &keep, &keep);
            let mut x: Vec<f64> = keep.iter().map(|&i| if i > j { l.get(i, j) } else { 0.0 }).collect();
            cholesky_rank_one_update(&mut reduced, &mut x, j);
            l = reduced;
        }
        self.l = l;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
