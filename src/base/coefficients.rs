use crate::SgdeError;
use russell_lab::Vector;
use serde::{Deserialize, Serialize};

/// Holds one value per grid point (coefficients α or right-hand side b)
///
/// The ordering of the entries follows the ordering of the grid points. Coarsening removes
/// entries while preserving the order of the survivors; refinement appends zeros.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CoefficientVector {
    values: Vector,
}

impl CoefficientVector {
    /// Allocates a new instance filled with zeros
    pub fn new(dim: usize) -> Self {
        CoefficientVector { values: Vector::new(dim) }
    }

    /// Allocates a new instance from a vector
    pub fn from_vector(values: Vector) -> Self {
        CoefficientVector { values }
    }

    /// Returns the number of entries
    pub fn dim(&self) -> usize {
        self.values.dim()
    }

    /// Returns the underlying vector
    pub fn as_vector(&self) -> &Vector {
        &self.values
    }

    /// Returns the underlying (mutable) vector
    pub fn as_mut_vector(&mut self) -> &mut Vector {
        &mut self.values
    }

    /// Returns the entries as a slice
    pub fn as_slice(&self) -> &[f64] {
        self.values.as_data().as_slice()
    }

    /// Consumes this instance and returns the underlying vector
    pub fn into_vector(self) -> Vector {
        self.values
    }

    /// Resizes to `dim` entries keeping the leading values; new entries are zero
    pub fn resize_zero(&mut self, dim: usize) {
        let n = usize::min(dim, self.values.dim());
        let mut values = Vector::new(dim);
        for i in 0..n {
            values[i] = self.values[i];
        }
        self.values = values;
    }

    /// Removes the entries at the given indices preserving the order of the others
    ///
    /// Duplicated indices are removed once.
    pub fn remove_indices(&mut self, indices: &[usize]) -> Result<(), SgdeError> {
        let dim = self.values.dim();
        let mut remove = vec![false; dim];
        for &i in indices {
            if i >= dim {
                return Err(SgdeError::Configuration(format!(
                    "cannot remove index {} from a vector with {} entries",
                    i, dim
                )));
            }
            remove[i] = true;
        }
        let survivors: Vec<f64> = (0..dim).filter(|&i| !remove[i]).map(|i| self.values[i]).collect();
        self.values = Vector::from(&survivors);
        Ok(())
    }

    /// Multiplies all entries by a factor
    pub fn scale(&mut self, factor: f64) {
        for i in 0..self.values.dim() {
            self.values[i] *= factor;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
