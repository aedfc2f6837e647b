use crate::SgdeError;
use russell_lab::{Matrix, Vector};

/// Holds a set of samples (one sample per row) and optional targets
#[derive(Clone, Debug)]
pub struct Dataset {
    samples: Matrix,
    targets: Option<Vector>,
}

impl Dataset {
    /// Allocates a new instance from a (n_sample, dim) matrix
    pub fn new(samples: Matrix) -> Self {
        Dataset { samples, targets: None }
    }

    /// Allocates a new instance with one target value per sample
    pub fn with_targets(samples: Matrix, targets: Vector) -> Result<Self, SgdeError> {
        if targets.dim() != samples.nrow() {
            return Err(SgdeError::Configuration(format!(
                "the number of targets ({}) must equal the number of samples ({})",
                targets.dim(),
                samples.nrow()
            )));
        }
        Ok(Dataset {
            samples,
            targets: Some(targets),
        })
    }

    /// Allocates a new instance from a list of rows
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, SgdeError> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut samples = Matrix::new(rows.len(), dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(SgdeError::Configuration(format!(
                    "row {} has {} columns but {} were expected",
                    i,
                    row.len(),
                    dim
                )));
            }
            for (j, value) in row.iter().enumerate() {
                samples.set(i, j, *value);
            }
        }
        Ok(Dataset { samples, targets: None })
    }

    /// Returns the number of samples
    pub fn n_sample(&self) -> usize {
        self.samples.nrow()
    }

    /// Returns the dimension of the samples
    pub fn dim(&self) -> usize {
        self.samples.ncol()
    }

    /// Returns the sample matrix
    pub fn samples(&self) -> &Matrix {
        &self.samples
    }

    /// Returns the targets, if any
    pub fn targets(&self) -> Option<&Vector> {
        self.targets.as_ref()
    }

    /// Copies the i-th sample into `x`
    pub fn row_into(&self, i: usize, x: &mut [f64]) {
        for j in 0..self.samples.ncol() {
            x[j] = self.samples.get(i, j);
        }
    }

    /// Returns a copy of the i-th sample
    pub fn row(&self, i: usize) -> Vec<f64> {
        let mut x = vec![0.0; self.samples.ncol()];
        self.row_into(i, &mut x);
        x
    }

    /// Returns a new dataset with the selected rows (targets included)
    pub fn subset(&self, rows: &[usize]) -> Dataset {
        let dim = self.dim();
        let mut samples = Matrix::new(rows.len(), dim);
        for (k, &i) in rows.iter().enumerate() {
            for j in 0..dim {
                samples.set(k, j, self.samples.get(i, j));
            }
        }
        let targets = self.targets.as_ref().map(|t| {
            let mut sub = Vector::new(rows.len());
            for (k, &i) in rows.iter().enumerate() {
                sub[k] = t[i];
            }
            sub
        });
        Dataset { samples, targets }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
