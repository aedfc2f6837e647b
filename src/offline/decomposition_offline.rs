use super::{regularized, GenericFactorization, StoredDecomposition, SystemMatrixBuilder};
use crate::base::DecompositionType;
use crate::grid::{BasisOperator, SparseGrid};
use crate::SgdeError;
use russell_lab::{Matrix, Vector};
use std::ffi::OsStr;

/// Holds the offline part of the density estimation: the system matrix and its factorization
///
/// The factorization is valid only after a successful [DecompositionOffline::decompose] (or a
/// successful load) and until the next structural change that could not be applied
/// incrementally. Accessing invalid factors yields [SgdeError::State].
pub struct DecompositionOffline {
    /// Decomposition type
    kind: DecompositionType,

    /// Regularization strength
    lambda: f64,

    /// Interaction groups of the grid the matrix was built for
    interactions: Vec<Vec<usize>>,

    /// Unregularized system matrix A (absent after loading from a file)
    lhs: Option<Matrix>,

    /// Factorization (None if not decomposed or invalidated)
    factorization: Option<GenericFactorization>,
}

impl DecompositionOffline {
    /// Allocates a new instance (nothing is built yet)
    pub fn new(kind: DecompositionType, lambda: f64, interactions: Vec<Vec<usize>>) -> Self {
        DecompositionOffline {
            kind,
            lambda,
            interactions,
            lhs: None,
            factorization: None,
        }
    }

    /// Restores an instance from a persisted decomposition
    ///
    /// For decompositions that embed λ in the factors, `lambda` must be the regularization
    /// strength used when the file was written (it is part of the cache fingerprint).
    pub fn from_file<P>(full_path: &P, lambda: f64) -> Result<Self, SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let stored = StoredDecomposition::load(full_path)?;
        let factorization = GenericFactorization::from_payload(stored.kind, stored.payload, lambda)?;
        log::info!(
            "loaded {} decomposition with {} rows from {:?}",
            stored.kind,
            factorization.actual.dim(),
            full_path.as_ref()
        );
        Ok(DecompositionOffline {
            kind: stored.kind,
            lambda,
            interactions: stored.interactions,
            lhs: None,
            factorization: Some(factorization),
        })
    }

    /// Writes the factors to a file
    pub fn store<P>(&self, full_path: &P) -> Result<(), SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let stored = StoredDecomposition {
            kind: self.kind,
            interactions: self.interactions.clone(),
            payload: self.decomposed()?.actual.payload()?,
        };
        stored.save(full_path)
    }

    /// Assembles the system matrix A for the grid (discarding previous factors)
    pub fn build_matrix(&mut self, grid: &SparseGrid, operator: &dyn BasisOperator) -> Result<(), SgdeError> {
        let builder = SystemMatrixBuilder::new(operator);
        let a = builder.build(grid)?;
        self.interactions = grid.interactions().clone();
        self.lhs = Some(a);
        self.factorization = None;
        Ok(())
    }

    /// Assembles the system matrix A for the grid while keeping the current factors
    ///
    /// Used after a load when the factors alone cannot reproduce A.
    pub fn attach_matrix(&mut self, grid: &SparseGrid, operator: &dyn BasisOperator) -> Result<(), SgdeError> {
        let n = self.decomposed()?.actual.dim();
        if grid.size() != n {
            return Err(SgdeError::Configuration(format!(
                "the grid has {} points but the factors have {} rows",
                grid.size(),
                n
            )));
        }
        let builder = SystemMatrixBuilder::new(operator);
        self.lhs = Some(builder.build(grid)?);
        Ok(())
    }

    /// Factorizes the system matrix
    ///
    /// On failure, the instance is left without valid factors.
    pub fn decompose(&mut self) -> Result<(), SgdeError> {
        self.factorization = None;
        let a = self
            .lhs
            .as_ref()
            .ok_or(SgdeError::State("the system matrix was not built yet"))?;
        let factorization = GenericFactorization::new(self.kind, a, self.lambda)?;
        log::info!("decomposed {}×{} system matrix with {}", a.nrow(), a.ncol(), self.kind);
        self.factorization = Some(factorization);
        Ok(())
    }

    /// Changes the regularization strength
    ///
    /// Factors that embed λ are recomputed from the system matrix; λ-free factors are kept.
    pub fn set_lambda(&mut self, lambda: f64) -> Result<(), SgdeError> {
        if lambda == self.lambda {
            return Ok(());
        }
        let embedded = match &self.factorization {
            Some(f) => f.actual.embedded_lambda().is_some(),
            None => false,
        };
        if embedded {
            let a = self.system_matrix()?;
            self.lhs = Some(a);
            self.lambda = lambda;
            self.decompose()?;
        } else {
            self.lambda = lambda;
        }
        Ok(())
    }

    /// Returns the unregularized system matrix A
    ///
    /// Reconstructs A from the factors when the matrix itself was not kept (e.g., after a load).
    /// Incomplete factors cannot reproduce A; use [DecompositionOffline::attach_matrix] first.
    pub fn system_matrix(&self) -> Result<Matrix, SgdeError> {
        if let Some(a) = &self.lhs {
            return Ok(a.clone());
        }
        if !self.kind.reconstructs_exactly() {
            return Err(SgdeError::State(
                "the system matrix is not held and cannot be recovered from incomplete factors",
            ));
        }
        let m = self.decomposed()?.actual.reconstruct(self.lambda)?;
        Ok(regularized(&m, -self.lambda))
    }

    /// Solves (A + λI) x = b with the current factors
    pub fn solve(&self, x: &mut Vector, b: &Vector) -> Result<(), SgdeError> {
        self.decomposed()?.actual.solve(x, b, self.lambda)
    }

    /// Returns the factors or a state error if they are not valid
    pub fn decomposed(&self) -> Result<&GenericFactorization, SgdeError> {
        self.factorization
            .as_ref()
            .ok_or(SgdeError::State("the system matrix was not decomposed yet"))
    }

    /// Returns the factors (mutable) or a state error if they are not valid
    pub(crate) fn decomposed_mut(&mut self) -> Result<&mut GenericFactorization, SgdeError> {
        self.factorization
            .as_mut()
            .ok_or(SgdeError::State("the system matrix was not decomposed yet"))
    }

    /// Returns whether valid factors are available
    pub fn is_decomposed(&self) -> bool {
        self.factorization.is_some()
    }

    /// Marks the factors as invalid
    pub(crate) fn invalidate(&mut self) {
        self.factorization = None;
    }

    /// Returns the system matrix A if it is held
    pub fn lhs(&self) -> Option<&Matrix> {
        self.lhs.as_ref()
    }

    /// Replaces the held system matrix (used by structural updates)
    pub(crate) fn set_lhs(&mut self, a: Matrix) {
        self.lhs = Some(a);
    }

    /// Returns the decomposition type
    pub fn kind(&self) -> DecompositionType {
        self.kind
    }

    /// Returns the regularization strength
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Returns the interaction groups
    pub fn interactions(&self) -> &Vec<Vec<usize>> {
        &self.interactions
    }

    /// Returns the number of rows of the system
    pub fn dim(&self) -> usize {
        match (&self.factorization, &self.lhs) {
            (Some(f), _) => f.actual.dim(),
            (None, Some(a)) => a.nrow(),
            (None, None) => 0,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
