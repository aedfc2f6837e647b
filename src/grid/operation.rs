use super::SparseGrid;
use crate::SgdeError;

/// Defines the numeric kernels of a basis, consumed by the decomposition engine
pub trait BasisOperator: Send + Sync {
    /// Returns the L2 inner product of the basis functions of points i and j
    fn l2_dot(&self, grid: &SparseGrid, i: usize, j: usize) -> f64;

    /// Returns the value of the basis function of point i at x
    fn basis_value(&self, grid: &SparseGrid, i: usize, x: &[f64]) -> f64;

    /// Returns the integral of the basis function of point i over the unit hypercube
    fn integral(&self, grid: &SparseGrid, i: usize) -> f64;

    /// Evaluates the sparse grid function Σ αᵢ φᵢ(x)
    fn evaluate(&self, grid: &SparseGrid, alpha: &[f64], x: &[f64]) -> Result<f64, SgdeError> {
        if alpha.len() != grid.size() {
            return Err(SgdeError::Configuration(format!(
                "the number of coefficients ({}) must equal the grid size ({})",
                alpha.len(),
                grid.size()
            )));
        }
        if x.len() != grid.dim() {
            return Err(SgdeError::Configuration(format!(
                "the point dimension ({}) must equal the grid dimension ({})",
                x.len(),
                grid.dim()
            )));
        }
        let mut sum = 0.0;
        for i in 0..grid.size() {
            if alpha[i] != 0.0 {
                sum += alpha[i] * self.basis_value(grid, i, x);
            }
        }
        Ok(sum)
    }
}

/// Implements the tensor-product kernels of the hierarchical bases of [SparseGrid]
#[derive(Clone, Copy, Debug, Default)]
pub struct HierarchicalOperator {}

impl HierarchicalOperator {
    /// Allocates a new instance
    pub fn new() -> Self {
        HierarchicalOperator {}
    }
}

impl BasisOperator for HierarchicalOperator {
    fn l2_dot(&self, grid: &SparseGrid, i: usize, j: usize) -> f64 {
        let basis = grid.basis();
        let (a, b) = (grid.point(i), grid.point(j));
        let mut product = 1.0;
        for d in 0..grid.dim() {
            product *= basis.l2_product(a.level[d], a.index[d], b.level[d], b.index[d]);
            if product == 0.0 {
                return 0.0;
            }
        }
        product
    }

    fn basis_value(&self, grid: &SparseGrid, i: usize, x: &[f64]) -> f64 {
        let basis = grid.basis();
        let p = grid.point(i);
        let mut value = 1.0;
        for d in 0..grid.dim() {
            value *= basis.eval(p.level[d], p.index[d], x[d]);
            if value == 0.0 {
                return 0.0;
            }
        }
        value
    }

    fn integral(&self, grid: &SparseGrid, i: usize) -> f64 {
        let basis = grid.basis();
        let p = grid.point(i);
        (0..grid.dim()).map(|d| basis.integral(p.level[d], p.index[d])).product()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
