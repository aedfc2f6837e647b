use super::SparseGrid;
use crate::base::{BoundaryType, GeometryConfig, GridConfig, StencilType};
use crate::SgdeError;

/// Builds sparse grids and interaction lists from configurations
pub struct GridFactory {}

impl GridFactory {
    /// Builds a regular sparse grid
    ///
    /// The interaction groups are canonicalized (see [canonical_interactions]) before use.
    pub fn build_grid(config: &GridConfig) -> Result<SparseGrid, SgdeError> {
        if config.dim < 1 {
            return Err(SgdeError::Configuration("grid dimension must be ≥ 1".to_string()));
        }
        if config.level < 1 {
            return Err(SgdeError::Configuration("grid level must be ≥ 1".to_string()));
        }
        if config.boundary == BoundaryType::Boundary {
            return Err(SgdeError::Configuration(
                "grids with boundary points are not available for density estimation".to_string(),
            ));
        }
        for group in &config.interactions {
            if let Some(d) = group.iter().find(|&&d| d >= config.dim) {
                return Err(SgdeError::Configuration(format!(
                    "interaction index {} exceeds the dimension {}",
                    d, config.dim
                )));
            }
        }
        let interactions = canonical_interactions(&config.interactions);
        Ok(SparseGrid::regular(config.dim, config.level, config.basis, interactions))
    }

    /// Returns the interaction groups of an image-like geometry
    ///
    /// Each pixel is one dimension, numbered row by row. With [StencilType::DirectNeighbour],
    /// the groups are the empty group, every single pixel, and every pair of horizontally or
    /// vertically adjacent pixels. With [StencilType::None], no restriction is returned.
    pub fn get_interactions(geometry: &GeometryConfig) -> Result<Vec<Vec<usize>>, SgdeError> {
        if geometry.stencil == StencilType::None {
            return Ok(Vec::new());
        }
        let (ncol, nrow) = match geometry.resolution.as_slice() {
            [n] => (*n, 1),
            [w, h] => (*w, *h),
            _ => {
                return Err(SgdeError::Configuration(
                    "the direct-neighbour stencil requires a 1D or 2D resolution".to_string(),
                ))
            }
        };
        if ncol < 1 || nrow < 1 {
            return Err(SgdeError::Configuration("the resolution must be ≥ 1".to_string()));
        }
        let mut groups = vec![Vec::new()];
        for r in 0..nrow {
            for c in 0..ncol {
                let p = r * ncol + c;
                groups.push(vec![p]);
                if c + 1 < ncol {
                    groups.push(vec![p, p + 1]);
                }
                if r + 1 < nrow {
                    groups.push(vec![p, p + ncol]);
                }
            }
        }
        Ok(canonical_interactions(&groups))
    }
}

/// Returns the canonical form of a list of interaction groups
///
/// Each group is sorted and deduplicated; then the list of groups is sorted and deduplicated.
/// Two lists naming the same groups in different orders have the same canonical form.
pub fn canonical_interactions(interactions: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = interactions
        .iter()
        .map(|group| {
            let mut g = group.clone();
            g.sort_unstable();
            g.dedup();
            g
        })
        .collect();
    groups.sort();
    groups.dedup();
    groups
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{canonical_interactions, GridFactory};
    use crate::base::{BoundaryType, GeometryConfig, GridConfig, StencilType};
    use crate::SgdeError;

    #[test]
    fn build_grid_works() -> Result<(), SgdeError> {
        let mut config = GridConfig::new(2, 3);
        config.interactions = vec![vec![1], vec![0, 0], vec![0]];
        let grid = GridFactory::build_grid(&config)?;
        assert_eq!(grid.interactions(), &vec![vec![0], vec![1]]);
        assert_eq!(grid.size(), 13);
        Ok(())
    }

    #[test]
    fn build_grid_handles_errors() {
        let config = GridConfig::new(0, 3);
        assert!(matches!(GridFactory::build_grid(&config), Err(SgdeError::Configuration(_))));
        let config = GridConfig::new(2, 0);
        assert!(matches!(GridFactory::build_grid(&config), Err(SgdeError::Configuration(_))));
        let mut config = GridConfig::new(2, 2);
        config.boundary = BoundaryType::Boundary;
        assert!(matches!(GridFactory::build_grid(&config), Err(SgdeError::Configuration(_))));
        let mut config = GridConfig::new(2, 2);
        config.interactions = vec![vec![0, 2]];
        assert!(matches!(GridFactory::build_grid(&config), Err(SgdeError::Configuration(_))));
    }

    #[test]
    fn canonical_interactions_works() {
        let a = canonical_interactions(&[vec![2, 1], vec![0], vec![1, 2]]);
        let b = canonical_interactions(&[vec![0], vec![1, 2]]);
        assert_eq!(a, b);
        assert_eq!(a, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn get_interactions_works() -> Result<(), SgdeError> {
        // 0 1
        // 2 3
        let geometry = GeometryConfig {
            resolution: vec![2, 2],
            stencil: StencilType::DirectNeighbour,
        };
        let groups = GridFactory::get_interactions(&geometry)?;
        assert_eq!(
            groups,
            vec![
                vec![],
                vec![0],
                vec![0, 1],
                vec![0, 2],
                vec![1],
                vec![1, 3],
                vec![2],
                vec![2, 3],
                vec![3],
            ]
        );
        let geometry = GeometryConfig {
            resolution: vec![2, 2, 2],
            stencil: StencilType::DirectNeighbour,
        };
        assert!(matches!(
            GridFactory::get_interactions(&geometry),
            Err(SgdeError::Configuration(_))
        ));
        let geometry = GeometryConfig {
            resolution: vec![3],
            stencil: StencilType::None,
        };
        assert_eq!(GridFactory::get_interactions(&geometry)?.len(), 0);
        Ok(())
    }
}
