use super::ProcessGrid;
use crate::SgdeError;
use russell_lab::Matrix;

/// Returns the number of rows (or columns) of a block-cyclic dimension owned by a process
///
/// `n` entries are split into blocks of `block` entries dealt cyclically over `nprocs`
/// processes; `iproc` is the process coordinate along this dimension.
pub fn numroc(n: usize, block: usize, iproc: usize, nprocs: usize) -> usize {
    let n_blocks = n / block;
    let mut count = (n_blocks / nprocs) * block;
    let extra = n_blocks % nprocs;
    if iproc < extra {
        count += block;
    } else if iproc == extra {
        count += n % block;
    }
    count
}

/// Maps a global index to the owning process coordinate and the local index
pub fn global_to_local(global: usize, block: usize, nprocs: usize) -> (usize, usize) {
    let b = global / block;
    (b % nprocs, (b / nprocs) * block + global % block)
}

/// Maps a local index of process `iproc` to the global index
pub fn local_to_global(local: usize, block: usize, iproc: usize, nprocs: usize) -> usize {
    ((local / block) * nprocs + iproc) * block + local % block
}

/// Checks that a block-cyclic layout gives every worker of the grid at least one block
pub(crate) fn check_layout(
    grid: &ProcessGrid,
    nrow: usize,
    ncol: usize,
    row_block: usize,
    col_block: usize,
) -> Result<(), SgdeError> {
    if row_block == 0 || col_block == 0 {
        return Err(SgdeError::Configuration("block sizes must be ≥ 1".to_string()));
    }
    if nrow == 0 || ncol == 0 {
        return Err(SgdeError::Configuration(format!(
            "cannot distribute an empty {}×{} matrix",
            nrow, ncol
        )));
    }
    let row_blocks = (nrow + row_block - 1) / row_block;
    let col_blocks = (ncol + col_block - 1) / col_block;
    if row_blocks < grid.rows() || col_blocks < grid.cols() {
        return Err(SgdeError::Configuration(format!(
            "a {}×{} matrix with {}×{} blocks has {}×{} blocks, fewer than the {}×{} process grid",
            nrow,
            ncol,
            row_block,
            col_block,
            row_blocks,
            col_blocks,
            grid.rows(),
            grid.cols()
        )));
    }
    Ok(())
}

/// Holds a dense matrix distributed block-cyclically over a process grid
///
/// Each in-grid worker owns a local matrix whose dimensions follow [numroc]; workers outside the
/// grid own nothing.
#[derive(Clone, Debug)]
pub struct DistributedMatrix {
    grid: ProcessGrid,
    nrow: usize,
    ncol: usize,
    row_block: usize,
    col_block: usize,

    /// Local blocks indexed by rank (None outside the grid)
    locals: Vec<Option<Matrix>>,
}

impl DistributedMatrix {
    /// Allocates a zero matrix
    pub fn new(grid: ProcessGrid, nrow: usize, ncol: usize, row_block: usize, col_block: usize) -> Result<Self, SgdeError> {
        check_layout(&grid, nrow, ncol, row_block, col_block)?;
        let locals = grid.run(|_, prow, pcol| {
            let lr = numroc(nrow, row_block, prow, grid.rows());
            let lc = numroc(ncol, col_block, pcol, grid.cols());
            Ok(Matrix::new(lr, lc))
        })?;
        Ok(DistributedMatrix {
            grid,
            nrow,
            ncol,
            row_block,
            col_block,
            locals,
        })
    }

    /// Distributes a matrix available to every worker (each worker copies its own blocks)
    pub fn from_shared(a: &Matrix, grid: ProcessGrid, row_block: usize, col_block: usize) -> Result<Self, SgdeError> {
        let (nrow, ncol) = a.dims();
        check_layout(&grid, nrow, ncol, row_block, col_block)?;
        let locals = grid.run(|_, prow, pcol| {
            let lr = numroc(nrow, row_block, prow, grid.rows());
            let lc = numroc(ncol, col_block, pcol, grid.cols());
            let mut local = Matrix::new(lr, lc);
            for li in 0..lr {
                let i = local_to_global(li, row_block, prow, grid.rows());
                for lj in 0..lc {
                    let j = local_to_global(lj, col_block, pcol, grid.cols());
                    local.set(li, lj, a.get(i, j));
                }
            }
            Ok(local)
        })?;
        Ok(DistributedMatrix {
            grid,
            nrow,
            ncol,
            row_block,
            col_block,
            locals,
        })
    }

    /// Returns the process grid
    pub fn process_grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// Returns the global dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.nrow, self.ncol)
    }

    /// Returns the block sizes (rows, columns)
    pub fn block_sizes(&self) -> (usize, usize) {
        (self.row_block, self.col_block)
    }

    /// Returns the local matrix of a worker (None outside the grid)
    pub fn local(&self, rank: usize) -> Option<&Matrix> {
        self.locals.get(rank).and_then(|m| m.as_ref())
    }

    /// Returns the rank owning the global entry (i, j)
    pub fn owner(&self, i: usize, j: usize) -> usize {
        let (prow, _) = global_to_local(i, self.row_block, self.grid.rows());
        let (pcol, _) = global_to_local(j, self.col_block, self.grid.cols());
        self.grid.rank_of(prow, pcol)
    }

    /// Returns the global entry (i, j) as stored by its owner
    ///
    /// # Panics
    ///
    /// Panics if the indices are out of range.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (prow, li) = global_to_local(i, self.row_block, self.grid.rows());
        let (pcol, lj) = global_to_local(j, self.col_block, self.grid.cols());
        match &self.locals[self.grid.rank_of(prow, pcol)] {
            Some(local) => local.get(li, lj),
            None => 0.0,
        }
    }

    /// Sets the global entry (i, j) at its owner
    ///
    /// # Panics
    ///
    /// Panics if the indices are out of range.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let (prow, li) = global_to_local(i, self.row_block, self.grid.rows());
        let (pcol, lj) = global_to_local(j, self.col_block, self.grid.cols());
        let rank = self.grid.rank_of(prow, pcol);
        if let Some(local) = &mut self.locals[rank] {
            local.set(li, lj, value);
        }
    }

    /// Gathers the global matrix at the master (rank 0); other workers receive None
    pub fn to_local(&self, rank: usize) -> Option<Matrix> {
        if rank == 0 {
            Some(self.assemble())
        } else {
            None
        }
    }

    /// Gathers the global matrix and broadcasts it to every worker
    pub fn to_local_broadcast(&self) -> Matrix {
        self.assemble()
    }

    /// Computes y = A x (or y = Aᵀ x) with per-worker partial products and a sum reduction
    pub fn gemv(&self, x: &[f64], transposed: bool) -> Result<Vec<f64>, SgdeError> {
        let (n_in, n_out) = if transposed { (self.nrow, self.ncol) } else { (self.ncol, self.nrow) };
        if x.len() != n_in {
            return Err(SgdeError::Configuration(format!(
                "gemv requires a vector of dimension {} (got {})",
                n_in,
                x.len()
            )));
        }
        let partials = self.grid.run(|rank, prow, pcol| {
            let mut y = vec![0.0; n_out];
            if let Some(local) = &self.locals[rank] {
                let (lr, lc) = local.dims();
                for li in 0..lr {
                    let i = local_to_global(li, self.row_block, prow, self.grid.rows());
                    for lj in 0..lc {
                        let j = local_to_global(lj, self.col_block, pcol, self.grid.cols());
                        if transposed {
                            y[j] += local.get(li, lj) * x[i];
                        } else {
                            y[i] += local.get(li, lj) * x[j];
                        }
                    }
                }
            }
            Ok(y)
        })?;
        Ok(reduce_sum(partials, n_out))
    }

    /// Solves L y = b in place using the lower triangle of this matrix
    ///
    /// Processes one block row at a time: the off-diagonal contributions are computed by the
    /// owners and reduced; the diagonal block is then solved at the diagonal owners.
    pub fn forward_substitution(&self, b: &mut [f64], unit_diagonal: bool) -> Result<(), SgdeError> {
        self.check_square_solve(b.len())?;
        let n = self.nrow;
        let mut r0 = 0;
        while r0 < n {
            let r1 = usize::min(r0 + self.row_block, n);
            let y: &[f64] = &*b;
            let partials = self.grid.run(|rank, prow, pcol| {
                let mut acc = vec![0.0; r1 - r0];
                self.for_each_local(rank, prow, pcol, |i, j, value| {
                    if i >= r0 && i < r1 && j < r0 {
                        acc[i - r0] += value * y[j];
                    }
                });
                Ok(acc)
            })?;
            let contributions = reduce_sum(partials, r1 - r0);
            for i in r0..r1 {
                let mut s = b[i] - contributions[i - r0];
                for j in r0..i {
                    s -= self.get(i, j) * b[j];
                }
                b[i] = if unit_diagonal { s } else { self.divide_by_diagonal(s, i)? };
            }
            r0 = r1;
        }
        Ok(())
    }

    /// Solves U x = y in place using the upper triangle of this matrix, or Lᵀ x = y using the
    /// lower triangle if `transposed`
    pub fn backward_substitution(&self, y: &mut [f64], transposed: bool) -> Result<(), SgdeError> {
        self.check_square_solve(y.len())?;
        let n = self.nrow;
        let n_blocks = (n + self.row_block - 1) / self.row_block;
        for k in (0..n_blocks).rev() {
            let r0 = k * self.row_block;
            let r1 = usize::min(r0 + self.row_block, n);
            let x: &[f64] = &*y;
            let partials = self.grid.run(|rank, prow, pcol| {
                let mut acc = vec![0.0; r1 - r0];
                self.for_each_local(rank, prow, pcol, |i, j, value| {
                    // entry (row, col) of the triangular operator
                    let (row, col) = if transposed { (j, i) } else { (i, j) };
                    if row >= r0 && row < r1 && col >= r1 {
                        acc[row - r0] += value * x[col];
                    }
                });
                Ok(acc)
            })?;
            let contributions = reduce_sum(partials, r1 - r0);
            for i in (r0..r1).rev() {
                let mut s = y[i] - contributions[i - r0];
                for j in (i + 1)..r1 {
                    let value = if transposed { self.get(j, i) } else { self.get(i, j) };
                    s -= value * y[j];
                }
                y[i] = self.divide_by_diagonal(s, i)?;
            }
        }
        Ok(())
    }

    /// Calls `f(i, j, value)` for every local entry of a worker, with global indices
    fn for_each_local<F>(&self, rank: usize, prow: usize, pcol: usize, mut f: F)
    where
        F: FnMut(usize, usize, f64),
    {
        if let Some(local) = &self.locals[rank] {
            let (lr, lc) = local.dims();
            for li in 0..lr {
                let i = local_to_global(li, self.row_block, prow, self.grid.rows());
                for lj in 0..lc {
                    let j = local_to_global(lj, self.col_block, pcol, self.grid.cols());
                    f(i, j, local.get(li, lj));
                }
            }
        }
    }

    fn divide_by_diagonal(&self, s: f64, i: usize) -> Result<f64, SgdeError> {
        let d = self.get(i, i);
        if d == 0.0 || !d.is_finite() {
            return Err(SgdeError::Numerical(format!("zero pivot at row {} of the distributed factor", i)));
        }
        Ok(s / d)
    }

    fn check_square_solve(&self, len: usize) -> Result<(), SgdeError> {
        if self.nrow != self.ncol || len != self.nrow {
            return Err(SgdeError::Configuration(format!(
                "triangular solve requires a square matrix and a vector of matching dimension ({}×{}, {})",
                self.nrow, self.ncol, len
            )));
        }
        Ok(())
    }

    fn assemble(&self) -> Matrix {
        let mut a = Matrix::new(self.nrow, self.ncol);
        for rank in 0..self.grid.n_in_grid() {
            if let Some((prow, pcol)) = self.grid.coords(rank) {
                self.for_each_local(rank, prow, pcol, |i, j, value| a.set(i, j, value));
            }
        }
        a
    }
}

/// Sums the partial results of all workers in rank order
pub(crate) fn reduce_sum(partials: Vec<Option<Vec<f64>>>, n: usize) -> Vec<f64> {
    let mut total = vec![0.0; n];
    for partial in partials.into_iter().flatten() {
        for (t, p) in total.iter_mut().zip(partial) {
            *t += p;
        }
    }
    total
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
