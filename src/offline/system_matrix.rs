use crate::grid::{BasisOperator, SparseGrid};
use crate::SgdeError;
use russell_lab::Matrix;

/// Assembles the (unregularized) system matrix A_ij = ⟨φ_i, φ_j⟩
pub struct SystemMatrixBuilder<'a> {
    operator: &'a dyn BasisOperator,
}

impl<'a> SystemMatrixBuilder<'a> {
    /// Allocates a new instance
    pub fn new(operator: &'a dyn BasisOperator) -> Self {
        SystemMatrixBuilder { operator }
    }

    /// Builds the full N×N matrix (N = grid size)
    pub fn build(&self, grid: &SparseGrid) -> Result<Matrix, SgdeError> {
        let n = grid.size();
        if n == 0 {
            return Err(SgdeError::Configuration("the grid has no points".to_string()));
        }
        let mut a = Matrix::new(n, n);
        for i in 0..n {
            for j in i..n {
                let value = self.operator.l2_dot(grid, i, j);
                a.set(i, j, value);
                a.set(j, i, value);
            }
        }
        Ok(a)
    }

    /// Builds only the entries associated with the last `n_new` points of the grid
    ///
    /// Returns `(B, C)` where `B` (n_old × n_new) couples the old points with the new ones and
    /// `C` (n_new × n_new) couples the new points among themselves. The values are identical to
    /// the corresponding entries of [SystemMatrixBuilder::build].
    pub fn build_refinement_block(&self, grid: &SparseGrid, n_new: usize) -> Result<(Matrix, Matrix), SgdeError> {
        let n = grid.size();
        if n_new > n {
            return Err(SgdeError::Configuration(format!(
                "cannot build {} new rows for a grid with {} points",
                n_new, n
            )));
        }
        let n_old = n - n_new;
        let mut b = Matrix::new(n_old, n_new);
        let mut c = Matrix::new(n_new, n_new);
        for i in 0..n_old {
            for k in 0..n_new {
                b.set(i, k, self.operator.l2_dot(grid, i, n_old + k));
            }
        }
        for k in 0..n_new {
            for m in k..n_new {
                let value = self.operator.l2_dot(grid, n_old + k, n_old + m);
                c.set(k, m, value);
                c.set(m, k, value);
            }
        }
        Ok((b, c))
    }
}

/// Returns `A + λI`
pub fn regularized(a: &Matrix, lambda: f64) -> Matrix {
    let mut m = a.clone();
    for i in 0..usize::min(m.nrow(), m.ncol()) {
        m.set(i, i, m.get(i, i) + lambda);
    }
    m
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{regularized, SystemMatrixBuilder};
    use crate::base::BasisType;
    use crate::grid::{HierarchicalOperator, SparseGrid};
    use crate::SgdeError;

    #[test]
    fn build_works() -> Result<(), SgdeError> {
        let grid = SparseGrid::regular(2, 3, BasisType::Linear, Vec::new());
        let op = HierarchicalOperator::new();
        let builder = SystemMatrixBuilder::new(&op);
        let a = builder.build(&grid)?;
        assert_eq!(a.dims(), (17, 17));
        for i in 0..17 {
            assert!(a.get(i, i) > 0.0);
            for j in 0..17 {
                assert_eq!(a.get(i, j), a.get(j, i));
            }
        }
        let m = regularized(&a, 0.5);
        assert_eq!(m.get(3, 3), a.get(3, 3) + 0.5);
        assert_eq!(m.get(3, 4), a.get(3, 4));
        Ok(())
    }

    #[test]
    fn build_handles_empty_grid() {
        let grid = SparseGrid::new(2, BasisType::Linear, Vec::new());
        let op = HierarchicalOperator::new();
        let builder = SystemMatrixBuilder::new(&op);
        assert!(matches!(builder.build(&grid), Err(SgdeError::Configuration(_))));
    }

    #[test]
    fn refinement_block_matches_full_build() -> Result<(), SgdeError> {
        let mut grid = SparseGrid::regular(2, 2, BasisType::ModLinear, Vec::new());
        let alpha = vec![1.0; grid.size()];
        let n_new = grid.refine(&alpha, 2)?;
        assert!(n_new > 0);
        let op = HierarchicalOperator::new();
        let builder = SystemMatrixBuilder::new(&op);
        let full = builder.build(&grid)?;
        let (b, c) = builder.build_refinement_block(&grid, n_new)?;
        let n_old = grid.size() - n_new;
        for i in 0..n_old {
            for k in 0..n_new {
                assert_eq!(b.get(i, k), full.get(i, n_old + k));
            }
        }
        for k in 0..n_new {
            for m in 0..n_new {
                assert_eq!(c.get(k, m), full.get(n_old + k, n_old + m));
            }
        }
        assert!(matches!(
            builder.build_refinement_block(&grid, grid.size() + 1),
            Err(SgdeError::Configuration(_))
        ));
        Ok(())
    }
}
