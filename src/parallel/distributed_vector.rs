use super::{global_to_local, local_to_global, numroc, ProcessGrid};
use crate::SgdeError;
use russell_lab::Vector;

/// Holds a vector distributed block-cyclically over the rows of a process grid
///
/// The vector is laid out as an n×1 distributed matrix: only the workers of process column 0
/// hold entries; a worker may own an empty shard when there are fewer blocks than process rows.
#[derive(Clone, Debug)]
pub struct DistributedVector {
    grid: ProcessGrid,
    len: usize,
    block: usize,

    /// Local shards indexed by rank (None for workers not in process column 0)
    locals: Vec<Option<Vector>>,
}

impl DistributedVector {
    /// Allocates a zero vector
    pub fn new(grid: ProcessGrid, len: usize, block: usize) -> Result<Self, SgdeError> {
        DistributedVector::from_slice(&vec![0.0; len], grid, block)
    }

    /// Distributes values available to every worker
    pub fn from_slice(values: &[f64], grid: ProcessGrid, block: usize) -> Result<Self, SgdeError> {
        if block == 0 {
            return Err(SgdeError::Configuration("block size must be ≥ 1".to_string()));
        }
        let len = values.len();
        let locals = grid.run(|_, prow, pcol| {
            if pcol != 0 {
                return Ok(None);
            }
            let n_local = numroc(len, block, prow, grid.rows());
            let mut local = Vector::new(n_local);
            for l in 0..n_local {
                local[l] = values[local_to_global(l, block, prow, grid.rows())];
            }
            Ok(Some(local))
        })?;
        Ok(DistributedVector {
            grid,
            len,
            block,
            locals: locals.into_iter().map(Option::flatten).collect(),
        })
    }

    /// Builds the vector from shards computed by the in-grid workers of process column 0
    ///
    /// `compute(prow, globals)` returns the entries at the given global indices.
    pub(crate) fn from_shards<F>(grid: ProcessGrid, len: usize, block: usize, compute: F) -> Result<Self, SgdeError>
    where
        F: Fn(&[usize]) -> Result<Vec<f64>, SgdeError> + Sync,
    {
        if block == 0 {
            return Err(SgdeError::Configuration("block size must be ≥ 1".to_string()));
        }
        let locals = grid.run(|_, prow, pcol| {
            if pcol != 0 {
                return Ok(None);
            }
            let n_local = numroc(len, block, prow, grid.rows());
            let globals: Vec<usize> = (0..n_local).map(|l| local_to_global(l, block, prow, grid.rows())).collect();
            let values = compute(&globals)?;
            if values.len() != n_local {
                return Err(SgdeError::Configuration(format!(
                    "worker at process row {} produced {} entries instead of {}",
                    prow,
                    values.len(),
                    n_local
                )));
            }
            Ok(Some(Vector::from(&values)))
        })?;
        Ok(DistributedVector {
            grid,
            len,
            block,
            locals: locals.into_iter().map(Option::flatten).collect(),
        })
    }

    /// Returns the global length
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the vector has no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the block size
    pub fn block(&self) -> usize {
        self.block
    }

    /// Returns the local shard of a worker (None if the worker holds no entries)
    pub fn local(&self, rank: usize) -> Option<&Vector> {
        self.locals.get(rank).and_then(|v| v.as_ref())
    }

    /// Returns the global entry i as stored by its owner
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    pub fn get(&self, i: usize) -> f64 {
        let (prow, l) = global_to_local(i, self.block, self.grid.rows());
        match &self.locals[self.grid.rank_of(prow, 0)] {
            Some(local) => local[l],
            None => 0.0,
        }
    }

    /// Changes the length, keeping the leading entries and filling new entries with zeros
    pub fn resize(&mut self, len: usize) -> Result<(), SgdeError> {
        let mut values = self.assemble();
        values.resize(len, 0.0);
        *self = DistributedVector::from_slice(&values, self.grid, self.block)?;
        Ok(())
    }

    /// Gathers the global vector at the master (rank 0); other workers receive None
    pub fn to_local(&self, rank: usize) -> Option<Vector> {
        if rank == 0 {
            Some(Vector::from(&self.assemble()))
        } else {
            None
        }
    }

    /// Gathers the global vector and broadcasts it to every worker
    pub fn to_local_broadcast(&self) -> Vector {
        Vector::from(&self.assemble())
    }

    fn assemble(&self) -> Vec<f64> {
        let mut values = vec![0.0; self.len];
        for prow in 0..self.grid.rows() {
            if let Some(local) = &self.locals[self.grid.rank_of(prow, 0)] {
                for l in 0..local.dim() {
                    values[local_to_global(l, self.block, prow, self.grid.rows())] = local[l];
                }
            }
        }
        values
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
