use super::dense::{check_dims, complement, inverse, mat_vec, sorted_unique_indices, submatrix, tridiagonal_solve};
use super::factorization::{check_lambda, check_payload};
use super::{FactorView, FactorizationTrait};
use crate::base::DecompositionType;
use crate::SgdeError;
use super::regularized;
use russell_lab::{mat_mat_mul, mat_t_mat_mul, mat_vec_mul, vec_inner, Matrix, Vector};

/// Holds the explicit inverse of A + λI after incremental updates
struct AdaptedInverse {
    /// Regularization strength embedded in the inverse
    lambda: f64,

    /// (A + λI)⁻¹
    inverse: Matrix,
}

/// Implements the orthogonal tridiagonalization A = Q T Qᵀ with adaptive updates
///
/// The tridiagonal form does not depend on λ. After the first refinement or coarsening, the
/// factors switch to an explicit inverse of A + λI that is updated with Schur complements.
pub struct FactorOrthoAdapt {
    /// Orthogonal matrix
    q: Matrix,

    /// Diagonal of T
    diag: Vec<f64>,

    /// Sub-diagonal of T (n − 1 entries)
    sub: Vec<f64>,

    /// Explicit inverse once the factors have been adapted
    adapted: Option<AdaptedInverse>,
}

impl FactorOrthoAdapt {
    /// Reduces the symmetric matrix A to tridiagonal form using Householder reflections
    pub fn new(a: &Matrix) -> Result<Self, SgdeError> {
        let n = a.nrow();
        let mut t = a.clone();
        let mut q = Matrix::new(n, n);
        for i in 0..n {
            q.set(i, i, 1.0);
        }
        let mut v = Vector::new(n);
        let mut p = Vector::new(n);
        let mut qv = Vector::new(n);
        for k in 0..n.saturating_sub(2) {
            let norm_x = ((k + 1)..n).map(|i| t.get(i, k) * t.get(i, k)).sum::<f64>().sqrt();
            if !norm_x.is_finite() {
                return Err(SgdeError::Numerical("matrix has non-finite entries".to_string()));
            }
            if norm_x == 0.0 {
                continue;
            }
            let x0 = t.get(k + 1, k);
            let alpha = if x0 >= 0.0 { -norm_x } else { norm_x };
            v.fill(0.0);
            for i in (k + 1)..n {
                v[i] = t.get(i, k);
            }
            v[k + 1] -= alpha;
            let vtv = vec_inner(&v, &v);
            if vtv == 0.0 {
                continue;
            }
            let beta = 2.0 / vtv;
            // H T H = T − v wᵀ − w vᵀ with p = β T v and w = p − (β/2)(vᵀp) v
            mat_vec_mul(&mut p, beta, &t, &v).map_err(SgdeError::lab)?;
            let vtp = vec_inner(&v, &p);
            let w = Vector::initialized(n, |i| p[i] - 0.5 * beta * vtp * v[i]);
            for i in 0..n {
                for j in 0..n {
                    let update = v[i] * w[j] + w[i] * v[j];
                    if update != 0.0 {
                        t.set(i, j, t.get(i, j) - update);
                    }
                }
            }
            mat_vec_mul(&mut qv, 1.0, &q, &v).map_err(SgdeError::lab)?;
            for i in 0..n {
                for j in (k + 1)..n {
                    q.set(i, j, q.get(i, j) - beta * qv[i] * v[j]);
                }
            }
        }
        let diag = (0..n).map(|i| t.get(i, i)).collect();
        let sub = (0..n.saturating_sub(1)).map(|i| t.get(i + 1, i)).collect();
        Ok(FactorOrthoAdapt {
            q,
            diag,
            sub,
            adapted: None,
        })
    }

    /// Restores the factors from Q followed by a diagonal row and a sub-diagonal row ((n+2) × n)
    pub fn from_payload(payload: Matrix) -> Result<Self, SgdeError> {
        let n = check_payload(&payload, 2, DecompositionType::OrthoAdapt)?;
        let mut q = Matrix::new(n, n);
        for i in 0..n {
            for j in 0..n {
                q.set(i, j, payload.get(i, j));
            }
        }
        let diag = (0..n).map(|j| payload.get(n, j)).collect();
        let sub = (0..n.saturating_sub(1)).map(|j| payload.get(n + 1, j)).collect();
        Ok(FactorOrthoAdapt {
            q,
            diag,
            sub,
            adapted: None,
        })
    }

    /// Returns whether the factors were switched to an explicit inverse
    pub fn is_adapted(&self) -> bool {
        self.adapted.is_some()
    }

    /// Solves with Q (T + λI)⁻¹ Qᵀ
    fn solve_tridiagonal_form(&self, b: &Vector, lambda: f64) -> Result<Vector, SgdeError> {
        let mut y = mat_vec(&self.q, b, true)?;
        tridiagonal_solve(&self.diag, &self.sub, lambda, y.as_mut_data())?;
        mat_vec(&self.q, &y, false)
    }

    /// Returns the current (A + λI)⁻¹
    fn current_inverse(&self, lambda: f64) -> Result<Matrix, SgdeError> {
        if let Some(adapted) = &self.adapted {
            check_lambda(adapted.lambda, lambda)?;
            return Ok(adapted.inverse.clone());
        }
        let n = self.diag.len();
        let mut inverse = Matrix::new(n, n);
        let mut e = Vector::new(n);
        for j in 0..n {
            e.fill(0.0);
            e[j] = 1.0;
            let column = self.solve_tridiagonal_form(&e, lambda)?;
            for i in 0..n {
                inverse.set(i, j, column[i]);
            }
        }
        Ok(inverse)
    }
}

impl FactorizationTrait for FactorOrthoAdapt {
    fn kind(&self) -> DecompositionType {
        DecompositionType::OrthoAdapt
    }

    fn dim(&self) -> usize {
        match &self.adapted {
            Some(adapted) => adapted.inverse.nrow(),
            None => self.diag.len(),
        }
    }

    fn embedded_lambda(&self) -> Option<f64> {
        self.adapted.as_ref().map(|adapted| adapted.lambda)
    }

    fn solve(&self, x: &mut Vector, b: &Vector, lambda: f64) -> Result<(), SgdeError> {
        check_dims(self.dim(), x, b)?;
        let result = match &self.adapted {
            Some(adapted) => {
                check_lambda(adapted.lambda, lambda)?;
                mat_vec(&adapted.inverse, b, false)?
            }
            None => self.solve_tridiagonal_form(b, lambda)?,
        };
        x.as_mut_data().copy_from_slice(result.as_data());
        Ok(())
    }

    fn reconstruct(&self, lambda: f64) -> Result<Matrix, SgdeError> {
        if let Some(adapted) = &self.adapted {
            check_lambda(adapted.lambda, lambda)?;
            return inverse(&adapted.inverse);
        }
        let n = self.diag.len();
        // Q (T + λI) Qᵀ
        let mut qt = Matrix::new(n, n);
        for i in 0..n {
            for j in 0..n {
                let mut s = self.q.get(i, j) * (self.diag[j] + lambda);
                if j > 0 {
                    s += self.q.get(i, j - 1) * self.sub[j - 1];
                }
                if j + 1 < n {
                    s += self.q.get(i, j + 1) * self.sub[j];
                }
                qt.set(i, j, s);
            }
        }
        let mut m = Matrix::new(n, n);
        mat_mat_mul(&mut m, 1.0, &qt, &self.q.transposed(), 0.0).map_err(SgdeError::lab)?;
        Ok(m)
    }

    fn payload(&self) -> Result<Matrix, SgdeError> {
        if self.adapted.is_some() {
            return Err(SgdeError::State("adapted OrthoAdapt factors cannot be persisted"));
        }
        let n = self.diag.len();
        let mut payload = Matrix::new(n + 2, n);
        for i in 0..n {
            for j in 0..n {
                payload.set(i, j, self.q.get(i, j));
            }
        }
        for j in 0..n {
            payload.set(n, j, self.diag[j]);
        }
        for j in 0..n.saturating_sub(1) {
            payload.set(n + 1, j, self.sub[j]);
        }
        Ok(payload)
    }

    fn view(&self) -> FactorView<'_> {
        match &self.adapted {
            Some(adapted) => FactorView::Inverse(&adapted.inverse),
            None => FactorView::Tridiagonal {
                q: &self.q,
                diag: &self.diag,
                sub: &self.sub,
            },
        }
    }

    /// Appends k rows: with W = P B and S = C + λI − Bᵀ W, the new inverse is
    /// [[P + W S⁻¹ Wᵀ, −W S⁻¹], [−S⁻¹ Wᵀ, S⁻¹]]
    fn refine(&mut self, b: &Matrix, c: &Matrix, lambda: f64) -> Result<(), SgdeError> {
        let n = self.dim();
        let k = c.nrow();
        if b.dims() != (n, k) || c.ncol() != k {
            return Err(SgdeError::Configuration(format!(
                "refinement blocks must be {}×{} and {}×{}",
                n, k, k, k
            )));
        }
        let p = self.current_inverse(lambda)?;
        let mut w = Matrix::new(n, k);
        mat_mat_mul(&mut w, 1.0, &p, b, 0.0).map_err(SgdeError::lab)?;
        let mut s = regularized(c, lambda);
        mat_t_mat_mul(&mut s, -1.0, b, &w, 1.0).map_err(SgdeError::lab)?;
        let s_inv = inverse(&s)?;
        // U = W S⁻¹ and P + U Wᵀ
        let mut u = Matrix::new(n, k);
        mat_mat_mul(&mut u, 1.0, &w, &s_inv, 0.0).map_err(SgdeError::lab)?;
        let mut top_left = p;
        mat_mat_mul(&mut top_left, 1.0, &u, &w.transposed(), 1.0).map_err(SgdeError::lab)?;
        let mut updated = Matrix::new(n + k, n + k);
        for i in 0..n {
            for j in 0..n {
                updated.set(i, j, top_left.get(i, j));
            }
            for j in 0..k {
                updated.set(i, n + j, -u.get(i, j));
                updated.set(n + j, i, -u.get(i, j));
            }
        }
        for r in 0..k {
            for q in 0..k {
                updated.set(n + r, n + q, s_inv.get(r, q));
            }
        }
        self.adapted = Some(AdaptedInverse {
            lambda,
            inverse: updated,
        });
        Ok(())
    }

    /// Removes rows R from the kept set K: the new inverse is P_KK − P_KR (P_RR)⁻¹ P_RK
    fn coarsen(&mut self, removed: &[usize], lambda: f64) -> Result<(), SgdeError> {
        let n = self.dim();
        let removed = sorted_unique_indices(removed, n)?;
        let p = self.current_inverse(lambda)?;
        let kept = complement(n, &removed);
        let p_kk = submatrix(&p, &kept, &kept);
        let p_kr = submatrix(&p, &kept, &removed);
        let p_rr_inv = inverse(&submatrix(&p, &removed, &removed))?;
        // Z = P_KR P_RR⁻¹
        let mut z = Matrix::new(kept.len(), removed.len());
        mat_mat_mul(&mut z, 1.0, &p_kr, &p_rr_inv, 0.0).map_err(SgdeError::lab)?;
        let mut updated = p_kk;
        mat_mat_mul(&mut updated, -1.0, &z, &p_kr.transposed(), 1.0).map_err(SgdeError::lab)?;
        self.adapted = Some(AdaptedInverse {
            lambda,
            inverse: updated,
        });
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
