use super::basis::width;
use super::Basis1d;
use crate::base::BasisType;
use crate::SgdeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Holds the level and index vectors of a grid point
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct GridPoint {
    /// Level along each dimension (≥ 1)
    pub level: Vec<u32>,

    /// Odd index along each dimension
    pub index: Vec<u32>,
}

impl GridPoint {
    /// Allocates the root point (level 1, index 1 along all dimensions)
    pub fn root(dim: usize) -> Self {
        GridPoint {
            level: vec![1; dim],
            index: vec![1; dim],
        }
    }

    /// Returns the coordinates of the point in the unit hypercube
    pub fn coordinates(&self) -> Vec<f64> {
        self.level
            .iter()
            .zip(&self.index)
            .map(|(&l, &i)| i as f64 * width(l))
            .collect()
    }

    /// Returns the sum of the levels
    pub fn level_sum(&self) -> u32 {
        self.level.iter().sum()
    }

    /// Returns the dimensions along which the point is refined (level > 1)
    pub fn active_dims(&self) -> Vec<usize> {
        (0..self.level.len()).filter(|&d| self.level[d] > 1).collect()
    }

    /// Returns the left and right children along dimension `d`
    pub fn children(&self, d: usize) -> [GridPoint; 2] {
        let mut left = self.clone();
        let mut right = self.clone();
        left.level[d] += 1;
        right.level[d] += 1;
        left.index[d] = 2 * self.index[d] - 1;
        right.index[d] = 2 * self.index[d] + 1;
        [left, right]
    }

    /// Returns the hierarchical parent along dimension `d` (None on level 1)
    pub fn parent(&self, d: usize) -> Option<GridPoint> {
        if self.level[d] <= 1 {
            return None;
        }
        let mut parent = self.clone();
        parent.level[d] -= 1;
        let half = self.index[d] / 2;
        parent.index[d] = if half % 2 == 1 { half } else { half + 1 };
        Some(parent)
    }
}

/// Implements a sparse grid without boundary points
///
/// Points are stored in insertion order; refinement appends new points at the end and
/// coarsening removes points preserving the order of the survivors.
#[derive(Clone, Debug)]
pub struct SparseGrid {
    dim: usize,
    basis: Basis1d,
    interactions: Vec<Vec<usize>>,
    points: Vec<GridPoint>,
    lookup: HashMap<GridPoint, usize>,
}

impl SparseGrid {
    /// Allocates an empty grid
    ///
    /// # Input
    ///
    /// * `dim` -- space dimension
    /// * `basis` -- one-dimensional basis
    /// * `interactions` -- groups of interacting dimensions (empty means no restriction)
    pub fn new(dim: usize, basis: BasisType, interactions: Vec<Vec<usize>>) -> Self {
        SparseGrid {
            dim,
            basis: Basis1d::new(basis),
            interactions,
            points: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Allocates a regular sparse grid with `|l|₁ ≤ level + dim - 1`
    pub fn regular(dim: usize, level: usize, basis: BasisType, interactions: Vec<Vec<usize>>) -> Self {
        let mut grid = SparseGrid::new(dim, basis, interactions);
        if dim == 0 || level == 0 {
            return grid;
        }
        let max_sum = (level + dim - 1) as u32;
        let mut levels = Vec::new();
        collect_levels(dim, max_sum, &mut vec![1; dim], 0, &mut levels);
        for levels_of_point in levels {
            let mut indices = Vec::new();
            collect_indices(&levels_of_point, &mut vec![1; dim], 0, &mut indices);
            for index in indices {
                grid.insert(GridPoint {
                    level: levels_of_point.clone(),
                    index,
                });
            }
        }
        grid
    }

    /// Returns the number of grid points
    pub fn size(&self) -> usize {
        self.points.len()
    }

    /// Returns the space dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the one-dimensional basis
    pub fn basis(&self) -> &Basis1d {
        &self.basis
    }

    /// Returns the groups of interacting dimensions
    pub fn interactions(&self) -> &Vec<Vec<usize>> {
        &self.interactions
    }

    /// Returns the i-th grid point
    pub fn point(&self, i: usize) -> &GridPoint {
        &self.points[i]
    }

    /// Returns the coordinates of the i-th grid point
    pub fn coordinates(&self, i: usize) -> Vec<f64> {
        self.points[i].coordinates()
    }

    /// Returns the position of a point, if present
    pub fn index_of(&self, point: &GridPoint) -> Option<usize> {
        self.lookup.get(point).copied()
    }

    /// Returns whether the interactions admit the point
    ///
    /// A point is admitted if its refined dimensions form a subset of some interaction group.
    pub fn is_admitted(&self, point: &GridPoint) -> bool {
        if self.interactions.is_empty() {
            return true;
        }
        let active = point.active_dims();
        if active.is_empty() {
            return true;
        }
        self.interactions
            .iter()
            .any(|group| active.iter().all(|d| group.contains(d)))
    }

    /// Appends a point if it is admitted and not present yet; returns whether it was added
    pub fn insert(&mut self, point: GridPoint) -> bool {
        if self.lookup.contains_key(&point) || !self.is_admitted(&point) {
            return false;
        }
        self.lookup.insert(point.clone(), self.points.len());
        self.points.push(point);
        true
    }

    /// Returns whether the i-th point has no children in the grid
    pub fn is_leaf(&self, i: usize) -> bool {
        let point = &self.points[i];
        (0..self.dim).all(|d| point.children(d).iter().all(|c| !self.lookup.contains_key(c)))
    }

    /// Refines the points with the largest surpluses |α_i|
    ///
    /// All missing (admitted) children of the selected points are appended, together with their
    /// missing ancestors. Returns the number of added points.
    pub fn refine(&mut self, alpha: &[f64], points_to_refine: usize) -> Result<usize, SgdeError> {
        if alpha.len() != self.points.len() {
            return Err(SgdeError::Configuration(format!(
                "the number of surpluses ({}) must equal the grid size ({})",
                alpha.len(),
                self.points.len()
            )));
        }
        let mut candidates: Vec<usize> = (0..self.points.len())
            .filter(|&i| {
                let point = &self.points[i];
                (0..self.dim).any(|d| {
                    point
                        .children(d)
                        .iter()
                        .any(|c| !self.lookup.contains_key(c) && self.is_admitted(c))
                })
            })
            .collect();
        candidates.sort_by(|&a, &b| f64::abs(alpha[b]).total_cmp(&f64::abs(alpha[a])).then(a.cmp(&b)));
        candidates.truncate(points_to_refine);
        let old_size = self.points.len();
        for i in candidates {
            let point = self.points[i].clone();
            for d in 0..self.dim {
                for child in point.children(d) {
                    if self.is_admitted(&child) {
                        self.insert_with_ancestors(child);
                    }
                }
            }
        }
        Ok(self.points.len() - old_size)
    }

    /// Removes leaves with small surpluses |α_i| < threshold
    ///
    /// At most `points_to_coarsen` leaves are removed, the smallest surpluses first; at least one
    /// point always remains. Returns the removed indices in ascending order.
    pub fn coarsen(
        &mut self,
        alpha: &[f64],
        threshold: f64,
        points_to_coarsen: usize,
    ) -> Result<Vec<usize>, SgdeError> {
        if alpha.len() != self.points.len() {
            return Err(SgdeError::Configuration(format!(
                "the number of surpluses ({}) must equal the grid size ({})",
                alpha.len(),
                self.points.len()
            )));
        }
        let limit = usize::min(points_to_coarsen, self.points.len().saturating_sub(1));
        let mut candidates: Vec<usize> = (0..self.points.len())
            .filter(|&i| f64::abs(alpha[i]) < threshold && self.is_leaf(i))
            .collect();
        candidates.sort_by(|&a, &b| f64::abs(alpha[a]).total_cmp(&f64::abs(alpha[b])).then(a.cmp(&b)));
        candidates.truncate(limit);
        candidates.sort();
        self.remove(&candidates);
        Ok(candidates)
    }

    /// Removes the points at the given (ascending, unique) indices
    pub(crate) fn remove(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let mut k = 0;
        let mut survivors = Vec::with_capacity(self.points.len() - indices.len());
        for (i, point) in self.points.drain(..).enumerate() {
            if k < indices.len() && indices[k] == i {
                k += 1;
                continue;
            }
            survivors.push(point);
        }
        self.points = survivors;
        self.lookup = self.points.iter().enumerate().map(|(i, p)| (p.clone(), i)).collect();
    }

    /// Inserts a point after inserting its missing ancestors
    fn insert_with_ancestors(&mut self, point: GridPoint) {
        if self.lookup.contains_key(&point) {
            return;
        }
        for d in 0..self.dim {
            if let Some(parent) = point.parent(d) {
                self.insert_with_ancestors(parent);
            }
        }
        self.insert(point);
    }
}

/// Collects all level vectors with entries ≥ 1 and sum ≤ max_sum
fn collect_levels(dim: usize, max_sum: u32, current: &mut Vec<u32>, d: usize, out: &mut Vec<Vec<u32>>) {
    if d == dim {
        out.push(current.clone());
        return;
    }
    let used: u32 = current[..d].iter().sum();
    let remaining_min = (dim - d - 1) as u32;
    let mut l = 1;
    while used + l + remaining_min <= max_sum {
        current[d] = l;
        collect_levels(dim, max_sum, current, d + 1, out);
        l += 1;
    }
    current[d] = 1;
}

/// Collects all odd index vectors of a level vector
fn collect_indices(level: &[u32], current: &mut Vec<u32>, d: usize, out: &mut Vec<Vec<u32>>) {
    if d == level.len() {
        out.push(current.clone());
        return;
    }
    let max = (1u32 << level[d]) - 1;
    let mut i = 1;
    while i <= max {
        current[d] = i;
        collect_indices(level, current, d + 1, out);
        i += 2;
    }
    current[d] = 1;
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{GridPoint, SparseGrid};
    use crate::base::BasisType;
    use crate::SgdeError;

    #[test]
    fn grid_point_works() {
        let p = GridPoint {
            level: vec![2, 1],
            index: vec![3, 1],
        };
        assert_eq!(p.coordinates(), vec![0.75, 0.5]);
        assert_eq!(p.level_sum(), 3);
        assert_eq!(p.active_dims(), vec![0]);
        let [left, right] = p.children(1);
        assert_eq!(left.level, vec![2, 2]);
        assert_eq!(left.index, vec![3, 1]);
        assert_eq!(right.index, vec![3, 3]);
        assert_eq!(p.parent(0), Some(GridPoint::root(2)));
        assert_eq!(p.parent(1), None);
        let q = GridPoint {
            level: vec![3],
            index: vec![5],
        };
        assert_eq!(q.parent(0).map(|p| p.index), Some(vec![3]));
    }

    #[test]
    fn regular_works() {
        // number of points of regular sparse grids without boundary
        assert_eq!(SparseGrid::regular(1, 3, BasisType::Linear, Vec::new()).size(), 7);
        assert_eq!(SparseGrid::regular(2, 2, BasisType::Linear, Vec::new()).size(), 5);
        assert_eq!(SparseGrid::regular(2, 3, BasisType::Linear, Vec::new()).size(), 17);
        assert_eq!(SparseGrid::regular(3, 3, BasisType::Linear, Vec::new()).size(), 31);
        assert_eq!(SparseGrid::regular(0, 3, BasisType::Linear, Vec::new()).size(), 0);
        let grid = SparseGrid::regular(2, 3, BasisType::Linear, Vec::new());
        assert_eq!(grid.point(0), &GridPoint::root(2));
        assert_eq!(grid.coordinates(0), vec![0.5, 0.5]);
        assert_eq!(grid.index_of(&GridPoint::root(2)), Some(0));
    }

    #[test]
    fn interactions_restrict_points() {
        // only dimension 0 may be refined alone; dimension 1 stays at level 1
        let grid = SparseGrid::regular(2, 3, BasisType::Linear, vec![vec![0]]);
        assert_eq!(grid.size(), 7);
        let grid = SparseGrid::regular(2, 3, BasisType::Linear, vec![vec![0], vec![1]]);
        assert_eq!(grid.size(), 13);
    }

    #[test]
    fn refine_works() -> Result<(), SgdeError> {
        let mut grid = SparseGrid::regular(1, 2, BasisType::Linear, Vec::new());
        assert_eq!(grid.size(), 3);
        // largest surplus at point 2 (level 2, index 3)
        let added = grid.refine(&[0.1, 0.2, 0.9], 1)?;
        assert_eq!(added, 2);
        assert_eq!(grid.size(), 5);
        assert_eq!(grid.coordinates(3), vec![0.625]);
        assert_eq!(grid.coordinates(4), vec![0.875]);
        assert!(matches!(grid.refine(&[0.1], 1), Err(SgdeError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn coarsen_works() -> Result<(), SgdeError> {
        let mut grid = SparseGrid::regular(1, 3, BasisType::Linear, Vec::new());
        assert_eq!(grid.size(), 7);
        let alpha: Vec<f64> = (0..7).map(|i| 1.0 + i as f64).collect();
        let mut small = alpha.clone();
        let leaves: Vec<usize> = (0..7).filter(|&i| grid.is_leaf(i)).collect();
        assert_eq!(leaves.len(), 4);
        small[leaves[1]] = 0.001;
        small[leaves[3]] = 0.002;
        small[0] = 0.0001; // not a leaf
        let removed = grid.coarsen(&small, 0.01, 10)?;
        assert_eq!(removed, vec![leaves[1], leaves[3]]);
        assert_eq!(grid.size(), 5);
        for (i, p) in (0..5).map(|i| (i, grid.point(i).clone())) {
            assert_eq!(grid.index_of(&p), Some(i));
        }
        Ok(())
    }
}
