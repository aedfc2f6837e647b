//! Dense kernels shared by the factorizations

use crate::SgdeError;
use russell_lab::{mat_cholesky, mat_inverse, mat_mat_mul, mat_vec_mul, vec_mat_mul, Matrix, Vector};

/// Computes the lower Cholesky factor L of a symmetric positive-definite matrix (M = L Lᵀ)
pub(crate) fn cholesky(m: &Matrix) -> Result<Matrix, SgdeError> {
    let n = m.nrow();
    let mut l = m.clone();
    if n == 0 {
        return Ok(l);
    }
    mat_cholesky(&mut l, false).map_err(SgdeError::lab)?;
    for j in 0..n {
        if !l.get(j, j).is_finite() {
            return Err(SgdeError::Numerical(format!("Cholesky pivot {} is not finite", j)));
        }
        // dpotrf leaves the upper triangle untouched
        for i in 0..j {
            l.set(i, j, 0.0);
        }
    }
    Ok(l)
}

/// Performs the rank-one update L Lᵀ + x xᵀ on the trailing block starting at `start`
///
/// Only the entries `x[start..]` are used; `x` is overwritten.
pub(crate) fn cholesky_rank_one_update(l: &mut Matrix, x: &mut [f64], start: usize) {
    let n = l.nrow();
    for k in start..n {
        let lkk = l.get(k, k);
        let r = f64::hypot(lkk, x[k]);
        let c = r / lkk;
        let s = x[k] / lkk;
        l.set(k, k, r);
        for i in (k + 1)..n {
            let lik = (l.get(i, k) + s * x[i]) / c;
            l.set(i, k, lik);
            x[i] = c * x[i] - s * lik;
        }
    }
}

/// Solves L y = b in place (b ← y)
pub(crate) fn forward_lower(l: &Matrix, b: &mut [f64], unit_diagonal: bool) {
    let n = l.nrow();
    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= l.get(i, k) * b[k];
        }
        b[i] = if unit_diagonal { s } else { s / l.get(i, i) };
    }
}

/// Solves Lᵀ x = y in place (y ← x)
pub(crate) fn backward_lower_transposed(l: &Matrix, y: &mut [f64]) {
    let n = l.nrow();
    for i in (0..n).rev() {
        let mut s = y[i];
        for k in (i + 1)..n {
            s -= l.get(k, i) * y[k];
        }
        y[i] = s / l.get(i, i);
    }
}

/// Solves U x = y in place (y ← x) using the upper triangle of `u`
pub(crate) fn backward_upper(u: &Matrix, y: &mut [f64]) {
    let n = u.ncol();
    for i in (0..n).rev() {
        let mut s = y[i];
        for k in (i + 1)..n {
            s -= u.get(i, k) * y[k];
        }
        y[i] = s / u.get(i, i);
    }
}

/// Solves (L Lᵀ) x = b with a lower factor
pub(crate) fn cholesky_solve(l: &Matrix, x: &mut Vector, b: &Vector) -> Result<(), SgdeError> {
    check_dims(l.nrow(), x, b)?;
    let data = x.as_mut_data();
    data.copy_from_slice(b.as_data());
    forward_lower(l, data, false);
    backward_lower_transposed(l, data);
    Ok(())
}

/// Returns L Lᵀ for a lower factor
pub(crate) fn lower_times_transpose(l: &Matrix) -> Result<Matrix, SgdeError> {
    let n = l.nrow();
    let mut m = Matrix::new(n, n);
    mat_mat_mul(&mut m, 1.0, l, &l.transposed(), 0.0).map_err(SgdeError::lab)?;
    Ok(m)
}

/// Returns the inverse of a square matrix
pub(crate) fn inverse(m: &Matrix) -> Result<Matrix, SgdeError> {
    let (nrow, ncol) = m.dims();
    let mut inv = Matrix::new(nrow, ncol);
    mat_inverse(&mut inv, m).map_err(SgdeError::lab)?;
    Ok(inv)
}

/// Returns y = A x (or y = Aᵀ x if `transposed`)
pub(crate) fn mat_vec(a: &Matrix, x: &Vector, transposed: bool) -> Result<Vector, SgdeError> {
    if transposed {
        let mut y = Vector::new(a.ncol());
        vec_mat_mul(&mut y, 1.0, x, a).map_err(SgdeError::lab)?;
        Ok(y)
    } else {
        let mut y = Vector::new(a.nrow());
        mat_vec_mul(&mut y, 1.0, a, x).map_err(SgdeError::lab)?;
        Ok(y)
    }
}

/// Returns the submatrix with the given rows and columns
pub(crate) fn submatrix(a: &Matrix, rows: &[usize], cols: &[usize]) -> Matrix {
    let mut sub = Matrix::new(rows.len(), cols.len());
    for (r, &i) in rows.iter().enumerate() {
        for (c, &j) in cols.iter().enumerate() {
            sub.set(r, c, a.get(i, j));
        }
    }
    sub
}

/// Solves (T + shift I) y = r in place with the Thomas algorithm
///
/// T is the symmetric tridiagonal matrix with diagonal `diag` and sub-diagonal `sub`.
pub(crate) fn tridiagonal_solve(diag: &[f64], sub: &[f64], shift: f64, y: &mut [f64]) -> Result<(), SgdeError> {
    let n = diag.len();
    if n == 0 {
        return Ok(());
    }
    let mut c = vec![0.0; n];
    let mut m = diag[0] + shift;
    for i in 0..n {
        if i > 0 {
            m = diag[i] + shift - sub[i - 1] * c[i - 1];
        }
        if m == 0.0 || !m.is_finite() {
            return Err(SgdeError::Numerical(format!("tridiagonal system is singular (row {})", i)));
        }
        if i + 1 < n {
            c[i] = sub[i] / m;
        }
        y[i] = if i > 0 { (y[i] - sub[i - 1] * y[i - 1]) / m } else { y[i] / m };
    }
    for i in (0..n - 1).rev() {
        y[i] -= c[i] * y[i + 1];
    }
    Ok(())
}

/// Returns the indices in 0..n that are not in `removed`
pub(crate) fn complement(n: usize, removed: &[usize]) -> Vec<usize> {
    let mut keep = vec![true; n];
    for &i in removed {
        keep[i] = false;
    }
    (0..n).filter(|&i| keep[i]).collect()
}

/// Returns the sorted unique indices, checking that all are below n
pub(crate) fn sorted_unique_indices(indices: &[usize], n: usize) -> Result<Vec<usize>, SgdeError> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if let Some(&i) = sorted.last() {
        if i >= n {
            return Err(SgdeError::Configuration(format!(
                "cannot remove index {} from a system with {} rows",
                i, n
            )));
        }
    }
    Ok(sorted)
}

/// Checks the dimensions of the solution and right-hand side vectors
pub(crate) fn check_dims(n: usize, x: &Vector, b: &Vector) -> Result<(), SgdeError> {
    if x.dim() != n || b.dim() != n {
        return Err(SgdeError::Configuration(format!(
            "solve requires vectors of dimension {} (x: {}, b: {})",
            n,
            x.dim(),
            b.dim()
        )));
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
pub(crate) mod tests {
    use super::{cholesky, cholesky_rank_one_update, inverse, lower_times_transpose, mat_vec, submatrix};
    use crate::SgdeError;
    use russell_lab::{mat_approx_eq, vec_approx_eq, Matrix, Vector};

    /// Returns a symmetric positive-definite sample matrix
    pub(crate) fn spd_sample(n: usize) -> Matrix {
        let mut m = Matrix::new(n, n);
        for i in 0..n {
            for j in 0..n {
                let value = 1.0 / (1.0 + (i as f64 - j as f64).abs());
                m.set(i, j, value);
            }
            m.set(i, i, m.get(i, i) + n as f64);
        }
        m
    }

    #[test]
    fn cholesky_works() -> Result<(), SgdeError> {
        let m = Matrix::from(&[[4.0, 2.0, 2.0], [2.0, 5.0, 3.0], [2.0, 3.0, 6.0]]);
        let l = cholesky(&m)?;
        let correct = Matrix::from(&[
            [2.0, 0.0, 0.0],
            [1.0, 2.0, 0.0],
            [1.0, 1.0, f64::sqrt(3.0)],
        ]);
        mat_approx_eq(&l, &correct, 1e-15);
        mat_approx_eq(&lower_times_transpose(&l)?, &m, 1e-14);
        assert_eq!(cholesky(&Matrix::new(0, 0))?.dims(), (0, 0));
        Ok(())
    }

    #[test]
    fn cholesky_captures_indefinite_matrix() {
        let m = Matrix::from(&[[1.0, 2.0], [2.0, 1.0]]);
        assert!(matches!(cholesky(&m), Err(SgdeError::Numerical(_))));
    }

    #[test]
    fn rank_one_update_works() -> Result<(), SgdeError> {
        let m = spd_sample(5);
        let mut l = cholesky(&m)?;
        let x = [0.0, 0.0, 1.0, -2.0, 0.5];
        let mut updated = m.clone();
        for i in 2..5 {
            for j in 2..5 {
                updated.set(i, j, updated.get(i, j) + x[i] * x[j]);
            }
        }
        let mut work = x.to_vec();
        cholesky_rank_one_update(&mut l, &mut work, 2);
        mat_approx_eq(&lower_times_transpose(&l)?, &updated, 1e-13);
        Ok(())
    }

    #[test]
    fn inverse_works() -> Result<(), SgdeError> {
        let m = spd_sample(4);
        let inv = inverse(&m)?;
        for j in 0..4 {
            let column = Vector::initialized(4, |i| inv.get(i, j));
            let mut e = Vector::new(4);
            e[j] = 1.0;
            vec_approx_eq(&mat_vec(&m, &column, false)?, &e, 1e-14);
        }
        let sub = submatrix(&m, &[0, 2], &[1]);
        assert_eq!(sub.dims(), (2, 1));
        assert_eq!(sub.get(1, 0), m.get(2, 1));
        Ok(())
    }

    #[test]
    fn mat_vec_handles_transpose() -> Result<(), SgdeError> {
        let a = Matrix::from(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let y = mat_vec(&a, &Vector::from(&[1.0, 0.0, -1.0]), false)?;
        vec_approx_eq(&y, &[-2.0, -2.0], 1e-15);
        let z = mat_vec(&a, &Vector::from(&[1.0, -1.0]), true)?;
        vec_approx_eq(&z, &[-3.0, -3.0, -3.0], 1e-15);
        Ok(())
    }
}
