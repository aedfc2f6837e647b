use serde::{Deserialize, Serialize};
use std::fmt;

/// Defines the algorithm used to factorize the system matrix
///
/// Note: The fixed numbering scheme is the tag written to the header of persisted decompositions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum DecompositionType {
    /// LU decomposition with partial pivoting of `A + λI`
    Lu = 0,

    /// Symmetric eigen-decomposition `A = V D Vᵀ` (λ is applied at solve time)
    Eigen = 1,

    /// Cholesky decomposition `A + λI = L Lᵀ`
    Cholesky = 2,

    /// Incomplete Cholesky IC(0) of `A + λI` restricted to the sparsity pattern of the matrix
    IChol = 3,

    /// Orthogonal tridiagonalization `A = Q T Qᵀ` with adaptive inverse updates
    OrthoAdapt = 4,
}

impl DecompositionType {
    /// Returns all available decomposition types
    pub fn all() -> [DecompositionType; 5] {
        [
            DecompositionType::Lu,
            DecompositionType::Eigen,
            DecompositionType::Cholesky,
            DecompositionType::IChol,
            DecompositionType::OrthoAdapt,
        ]
    }

    /// Returns the integer tag written to persisted files
    pub fn tag(&self) -> i64 {
        *self as i64
    }

    /// Returns the decomposition type corresponding to a persisted tag
    pub fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            0 => Some(DecompositionType::Lu),
            1 => Some(DecompositionType::Eigen),
            2 => Some(DecompositionType::Cholesky),
            3 => Some(DecompositionType::IChol),
            4 => Some(DecompositionType::OrthoAdapt),
            _ => None,
        }
    }

    /// Returns whether the factors can be updated when grid points are added or removed
    pub fn supports_incremental_update(&self) -> bool {
        match self {
            DecompositionType::Cholesky => true,
            DecompositionType::OrthoAdapt => true,
            DecompositionType::Lu => false,
            DecompositionType::Eigen => false,
            DecompositionType::IChol => false,
        }
    }

    /// Returns whether A + λI can be recovered exactly from the factors
    ///
    /// IC(0) discards fill-in, so its factors only approximate the system matrix.
    pub fn reconstructs_exactly(&self) -> bool {
        !matches!(self, DecompositionType::IChol)
    }

    /// Returns whether the factors do not depend on the regularization strength λ
    ///
    /// λ-free decompositions can be solved with any λ without factorizing again.
    pub fn lambda_free(&self) -> bool {
        matches!(self, DecompositionType::Eigen | DecompositionType::OrthoAdapt)
    }
}

impl fmt::Display for DecompositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecompositionType::Lu => "LU",
            DecompositionType::Eigen => "Eigen",
            DecompositionType::Cholesky => "Cholesky",
            DecompositionType::IChol => "IChol",
            DecompositionType::OrthoAdapt => "OrthoAdapt",
        };
        write!(f, "{}", name)
    }
}

/// Defines the one-dimensional hierarchical basis
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum BasisType {
    /// Piecewise linear hat functions vanishing on the boundary
    Linear,

    /// Modified linear functions: constant on level 1, extrapolated towards the boundary
    ModLinear,
}

/// Defines the treatment of the domain boundary
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum BoundaryType {
    /// No grid points on the boundary
    NoBoundary,

    /// Grid points on the boundary (not available for density estimation grids)
    Boundary,
}

/// Defines the regularization operator added to the system matrix
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum RegularizationType {
    /// Identity operator: the system matrix is `A + λI`
    Identity,
}

/// Defines the stencil used to derive interactions from a geometry
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum StencilType {
    /// Every dimension interacts with every other dimension (no restriction)
    None,

    /// Pixels interact with their right and bottom neighbours
    DirectNeighbour,
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::DecompositionType;

    #[test]
    fn tags_work() {
        for kind in DecompositionType::all() {
            assert_eq!(DecompositionType::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(DecompositionType::from_tag(5), None);
        assert_eq!(DecompositionType::from_tag(-1), None);
        assert_eq!(DecompositionType::Cholesky.tag(), 2);
    }

    #[test]
    fn capabilities_work() {
        assert!(DecompositionType::Cholesky.supports_incremental_update());
        assert!(DecompositionType::OrthoAdapt.supports_incremental_update());
        assert!(!DecompositionType::Lu.supports_incremental_update());
        assert!(!DecompositionType::Eigen.supports_incremental_update());
        assert!(!DecompositionType::IChol.supports_incremental_update());
        assert!(DecompositionType::Eigen.lambda_free());
        assert!(!DecompositionType::Cholesky.lambda_free());
        assert!(DecompositionType::Lu.reconstructs_exactly());
        assert!(!DecompositionType::IChol.reconstructs_exactly());
        assert_eq!(format!("{}", DecompositionType::OrthoAdapt), "OrthoAdapt");
    }
}
