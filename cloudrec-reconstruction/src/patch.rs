//! Local height-field patches
//!
//! A patch resamples a point's neighborhood as heights over a square grid
//! in the tangent plane of its normal. All lengths inside a patch are
//! divided by the half-width `w`, so patches from clouds of any scale share
//! one dictionary.

use crate::basis::CosineBasis;
use cloudrec_algorithms::CoverTree;
use cloudrec_core::{tangent_frame, Point3f, PointStore, Result, Vector3f};
use nalgebra::DVector;

/// Neighbors farther than this many point spacings do not contribute to a cell
const SUPPORT_SPACINGS: f64 = 1.5;

/// Width of the Gaussian cell weight, in point spacings
const WEIGHT_SPACINGS: f64 = 0.5;

/// A cell with no neighbor this close, in point spacings, is a gap
const GAP_SPACINGS: f64 = 1.0;

/// A cell with no neighbor this close, in point spacings, marks a hole in
/// the sampling rather than the ordinary voids of an irregular cloud
const HOLE_SPACINGS: f64 = 1.5;

/// A neighborhood whose centroid strays this far from the seed, relative to
/// the neighborhood radius, sits on a boundary
pub const BOUNDARY_OFFSET: f32 = 0.2;

/// Height field around one seed point
#[derive(Debug, Clone)]
pub struct Patch {
    /// Index of the seed point
    pub seed: usize,
    pub center: Point3f,
    pub u: Vector3f,
    pub v: Vector3f,
    pub n: Vector3f,
    /// Half-width of the grid in world units
    pub half_width: f32,
    /// Mean distance between neighboring points, in world units
    pub spacing: f32,
    /// Normalized height per cell, zero where unobserved
    pub heights: DVector<f64>,
    pub observed: Vec<bool>,
    pub gaps: Vec<bool>,
    /// Some cell lies farther than the hole distance from every neighbor
    pub has_hole: bool,
}

struct Neighborhood {
    center: Point3f,
    frame: (Vector3f, Vector3f, Vector3f),
    /// Tangent coordinates and height of every neighbor, seed included
    local: Vec<[f32; 3]>,
    radius: f32,
}

fn neighborhood(store: &PointStore, index: &CoverTree, seed: usize, knn: usize) -> Result<Option<Neighborhood>> {
    let (Some(center), Some(normal)) = (store.point(seed), store.normal(seed)) else {
        return Ok(None);
    };
    let frame = tangent_frame(&normal);
    let (u, v, n) = frame;

    let neighbors = index.k_nearest_neighbors(&center, knn)?;
    let local: Vec<[f32; 3]> = neighbors
        .iter()
        .map(|nb| {
            let d = nb.point.position - center;
            [d.dot(&u), d.dot(&v), d.dot(&n)]
        })
        .collect();
    let radius = local
        .iter()
        .map(|[x, y, _]| x.hypot(*y))
        .fold(0.0f32, f32::max);

    let scale = 1.0 + center.coords.abs().max();
    if radius <= f32::EPSILON * scale {
        return Ok(None);
    }

    Ok(Some(Neighborhood {
        center,
        frame,
        local,
        radius,
    }))
}

/// Whether point `seed` lies on the edge of the sampled surface.
///
/// True when the tangent-plane centroid of its `knn` neighbors is offset by
/// more than [`BOUNDARY_OFFSET`] of the neighborhood radius.
pub fn is_boundary(store: &PointStore, index: &CoverTree, seed: usize, knn: usize) -> Result<bool> {
    let Some(hood) = neighborhood(store, index, seed, knn)? else {
        return Ok(false);
    };
    let count = hood.local.len() as f32;
    let (sx, sy) = hood
        .local
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), [x, y, _]| (sx + x, sy + y));
    Ok((sx / count).hypot(sy / count) > BOUNDARY_OFFSET * hood.radius)
}

impl Patch {
    /// Sample the neighborhood of `seed` onto the basis grid.
    ///
    /// Returns `None` when the seed has no extent in its tangent plane
    /// (all neighbors coincide with it along the normal).
    pub fn extract(
        store: &PointStore,
        index: &CoverTree,
        seed: usize,
        knn: usize,
        basis: &CosineBasis,
    ) -> Result<Option<Self>> {
        let Some(hood) = neighborhood(store, index, seed, knn)? else {
            return Ok(None);
        };
        let w = hood.radius / std::f32::consts::SQRT_2;
        let cells = basis.cells();
        // Area of the neighborhood disc shared out among its points
        let spacing = hood.radius * (std::f32::consts::PI / hood.local.len() as f32).sqrt();
        let unit = (spacing / w) as f64;

        let normalized: Vec<[f64; 3]> = hood
            .local
            .iter()
            .map(|[x, y, h]| [(*x / w) as f64, (*y / w) as f64, (*h / w) as f64])
            .collect();

        let mut heights = DVector::zeros(cells);
        let mut observed = vec![false; cells];
        let mut gaps = vec![false; cells];
        let mut has_hole = false;

        for cell in 0..cells {
            let (cs, ct) = basis.cell_center(cell);
            let mut weight_sum = 0.0;
            let mut height_sum = 0.0;
            let mut nearest = f64::INFINITY;
            for [s, t, h] in &normalized {
                let dist = (s - cs).hypot(t - ct) / unit;
                nearest = nearest.min(dist);
                if dist <= SUPPORT_SPACINGS {
                    let weight = (-0.5 * (dist / WEIGHT_SPACINGS).powi(2)).exp();
                    weight_sum += weight;
                    height_sum += weight * h;
                }
            }
            if weight_sum > 0.0 {
                observed[cell] = true;
                heights[cell] = height_sum / weight_sum;
            }
            gaps[cell] = nearest > GAP_SPACINGS;
            has_hole |= nearest > HOLE_SPACINGS;
        }

        let (u, v, n) = hood.frame;
        Ok(Some(Self {
            seed,
            center: hood.center,
            u,
            v,
            n,
            half_width: w,
            spacing,
            heights,
            observed,
            gaps,
            has_hole,
        }))
    }

    /// Every cell has at least one neighbor within reach
    pub fn fully_observed(&self) -> bool {
        self.observed.iter().all(|&o| o)
    }

    pub fn observed_count(&self) -> usize {
        self.observed.iter().filter(|&&o| o).count()
    }

    /// Cells with a sample, in cell order
    pub fn observed_cells(&self) -> Vec<usize> {
        (0..self.observed.len()).filter(|&c| self.observed[c]).collect()
    }

    /// Gap cells, in cell order
    pub fn gap_cells(&self) -> Vec<usize> {
        (0..self.gaps.len()).filter(|&c| self.gaps[c]).collect()
    }

    /// World position of normalized patch coordinates `(s, t, h)`
    pub fn to_world(&self, s: f64, t: f64, h: f64) -> Point3f {
        let w = self.half_width;
        self.center + self.u * (s as f32 * w) + self.v * (t as f32 * w) + self.n * (h as f32 * w)
    }

    /// Surface normal for a normalized height gradient `(∂h/∂s, ∂h/∂t)`.
    ///
    /// Heights and coordinates share the `w` scale, so the gradient carries
    /// over to world units unchanged.
    pub fn surface_normal(&self, gs: f64, gt: f64) -> Option<Vector3f> {
        (self.n - self.u * gs as f32 - self.v * gt as f32).try_normalize(f32::EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cloudrec_core::DEFAULT_NORMAL;

    fn grid_plane(side: usize, spacing: f32, height: impl Fn(f32, f32) -> f32) -> PointStore {
        let mut store = PointStore::new();
        for i in 0..side {
            for j in 0..side {
                let (x, y) = (i as f32 * spacing, j as f32 * spacing);
                store.push(Point3f::new(x, y, height(x, y)), DEFAULT_NORMAL);
            }
        }
        store
    }

    #[test]
    fn test_interior_flat_patch_is_observed_and_flat() {
        let store = grid_plane(21, 0.1, |_, _| 0.0);
        let index = CoverTree::from_points(store.points()).unwrap();
        let basis = CosineBasis::new(2);
        let center = 10 * 21 + 10;

        let patch = Patch::extract(&store, &index, center, 49, &basis).unwrap().unwrap();
        assert!(patch.fully_observed());
        assert!(patch.gap_cells().is_empty());
        assert!(!patch.has_hole);
        assert_relative_eq!(patch.spacing, 0.1, max_relative = 0.05);
        for h in patch.heights.iter() {
            assert_relative_eq!(*h, 0.0, epsilon = 1e-9);
        }
        assert!(!is_boundary(&store, &index, center, 49).unwrap());
    }

    #[test]
    fn test_corner_patch_has_gaps_and_is_boundary() {
        let store = grid_plane(21, 0.1, |_, _| 0.0);
        let index = CoverTree::from_points(store.points()).unwrap();
        let basis = CosineBasis::new(2);

        let patch = Patch::extract(&store, &index, 0, 30, &basis).unwrap().unwrap();
        assert!(!patch.fully_observed());
        assert!(!patch.gap_cells().is_empty());
        assert!(patch.has_hole);
        assert!(patch.observed_count() > 0);
        assert!(is_boundary(&store, &index, 0, 30).unwrap());
    }

    #[test]
    fn test_heights_are_scale_free() {
        let slope = |x: f32, _: f32| 0.5 * x;
        let small = grid_plane(15, 0.1, slope);
        let large = grid_plane(15, 10.0, slope);
        let basis = CosineBasis::new(2);
        let seed = 7 * 15 + 7;

        let a = Patch::extract(&small, &CoverTree::from_points(small.points()).unwrap(), seed, 25, &basis)
            .unwrap()
            .unwrap();
        let b = Patch::extract(&large, &CoverTree::from_points(large.points()).unwrap(), seed, 25, &basis)
            .unwrap()
            .unwrap();
        assert_relative_eq!(a.heights, b.heights, epsilon = 1e-4);
        assert_relative_eq!(b.half_width / a.half_width, 100.0, max_relative = 1e-4);
    }

    #[test]
    fn test_world_mapping_and_normal() {
        let store = grid_plane(11, 1.0, |_, _| 2.0);
        let index = CoverTree::from_points(store.points()).unwrap();
        let basis = CosineBasis::new(1);
        let patch = Patch::extract(&store, &index, 60, 9, &basis).unwrap().unwrap();

        let origin = patch.to_world(0.0, 0.0, 0.0);
        assert_relative_eq!(origin, patch.center);
        let up = patch.to_world(0.0, 0.0, 1.0);
        assert_relative_eq!((up - origin).norm(), patch.half_width, epsilon = 1e-5);

        let flat = patch.surface_normal(0.0, 0.0).unwrap();
        assert_relative_eq!(flat, patch.n, epsilon = 1e-6);
        let tilted = patch.surface_normal(1.0, 0.0).unwrap();
        assert_relative_eq!(tilted.dot(&patch.n), 1.0 / 2.0f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_collapsed_neighborhood_is_skipped() {
        let mut store = PointStore::new();
        for _ in 0..5 {
            store.push(Point3f::new(1.0, 2.0, 3.0), DEFAULT_NORMAL);
        }
        let index = CoverTree::from_points(store.points()).unwrap();
        let basis = CosineBasis::new(2);
        assert!(Patch::extract(&store, &index, 0, 5, &basis).unwrap().is_none());
        assert!(!is_boundary(&store, &index, 0, 5).unwrap());
    }
}
