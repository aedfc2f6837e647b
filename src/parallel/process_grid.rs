use crate::base::ParallelConfig;
use crate::SgdeError;
use rayon::prelude::*;

/// Holds the rectangular grid of cooperating workers
///
/// Workers are identified by their rank in `0..n_process`. The first `rows × cols` ranks form the
/// logical grid (row-major); the remaining ranks are outside the grid. Rank 0 is the master.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessGrid {
    rows: usize,
    cols: usize,
    n_process: usize,
}

impl ProcessGrid {
    /// Allocates a new instance
    ///
    /// Returns [SgdeError::NotSupported] if the crate was built without the `distributed` feature.
    pub fn new(rows: usize, cols: usize, n_process: usize) -> Result<Self, SgdeError> {
        if !cfg!(feature = "distributed") {
            return Err(SgdeError::NotSupported("the distributed backend is not available in this build"));
        }
        if rows == 0 || cols == 0 {
            return Err(SgdeError::Configuration(format!(
                "the process grid must have at least one row and one column (got {}×{})",
                rows, cols
            )));
        }
        if rows * cols > n_process {
            return Err(SgdeError::Configuration(format!(
                "a {}×{} process grid needs at least {} workers (got {})",
                rows,
                cols,
                rows * cols,
                n_process
            )));
        }
        Ok(ProcessGrid { rows, cols, n_process })
    }

    /// Allocates a new instance from the configuration
    pub fn from_config(config: &ParallelConfig) -> Result<Self, SgdeError> {
        ProcessGrid::new(config.process_rows, config.process_cols, config.n_process)
    }

    /// Returns the number of process rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of process columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the total number of workers
    pub fn n_process(&self) -> usize {
        self.n_process
    }

    /// Returns the number of workers in the logical grid
    pub fn n_in_grid(&self) -> usize {
        self.rows * self.cols
    }

    /// Returns whether the worker belongs to the logical grid
    pub fn is_in_grid(&self, rank: usize) -> bool {
        rank < self.n_in_grid()
    }

    /// Returns the (row, column) coordinates of an in-grid worker
    pub fn coords(&self, rank: usize) -> Option<(usize, usize)> {
        if self.is_in_grid(rank) {
            Some((rank / self.cols, rank % self.cols))
        } else {
            None
        }
    }

    /// Returns the rank of the worker at (row, column)
    pub fn rank_of(&self, prow: usize, pcol: usize) -> usize {
        prow * self.cols + pcol
    }

    /// Runs a compute kernel on every worker
    ///
    /// In-grid workers run concurrently; workers outside the grid do nothing and yield None.
    /// Returns the results indexed by rank. The first error aborts the whole operation.
    pub(crate) fn run<T, F>(&self, kernel: F) -> Result<Vec<Option<T>>, SgdeError>
    where
        T: Send,
        F: Fn(usize, usize, usize) -> Result<T, SgdeError> + Sync,
    {
        let in_grid: Vec<T> = (0..self.n_in_grid())
            .into_par_iter()
            .map(|rank| kernel(rank, rank / self.cols, rank % self.cols))
            .collect::<Result<Vec<T>, SgdeError>>()?;
        let mut results: Vec<Option<T>> = in_grid.into_iter().map(Some).collect();
        results.resize_with(self.n_process, || None);
        Ok(results)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
