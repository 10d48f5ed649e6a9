//! Hole punching for reconstruction experiments

use crate::cover_tree::CoverTree;
use cloudrec_core::{PointStore, Result};
use rand::seq::index::sample;
use rand::Rng;
use tracing::debug;

/// Pick the points to remove when punching `n_holes` holes of `knn` points.
///
/// Seeds are `n_holes` distinct random indices (all of them when the store is
/// smaller); every seed takes its `knn` nearest neighbors with it. The result
/// is sorted and free of repeats, ready for [`PointStore::remove_indices`].
pub fn select_hole_indices<R: Rng + ?Sized>(
    store: &PointStore,
    index: &CoverTree,
    n_holes: usize,
    knn: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let len = store.len();
    if len == 0 || n_holes == 0 || knn == 0 {
        return Ok(Vec::new());
    }

    let seeds = sample(rng, len, n_holes.min(len));
    let mut doomed = Vec::with_capacity(seeds.len() * knn);
    for seed in seeds.iter() {
        let neighbors = index.k_nearest_neighbors(&store.points()[seed], knn)?;
        doomed.extend(neighbors.iter().map(|n| n.index()));
    }

    doomed.sort_unstable();
    doomed.dedup();
    debug!("Selected {} points around {} hole seeds", doomed.len(), n_holes.min(len));
    Ok(doomed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudrec_core::{Point3f, DEFAULT_NORMAL};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grid_store(side: usize) -> PointStore {
        let mut store = PointStore::new();
        for i in 0..side {
            for j in 0..side {
                store.push(Point3f::new(i as f32, j as f32, 0.0), DEFAULT_NORMAL);
            }
        }
        store
    }

    #[test]
    fn test_hole_indices_sorted_and_unique() {
        let store = grid_store(20);
        let index = CoverTree::from_points(store.points()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let doomed = select_hole_indices(&store, &index, 3, 10, &mut rng).unwrap();
        assert!(!doomed.is_empty());
        assert!(doomed.len() <= 30);
        assert!(doomed.len() >= 10);
        assert!(doomed.windows(2).all(|w| w[0] < w[1]));
        assert!(doomed.iter().all(|&i| i < store.len()));
    }

    #[test]
    fn test_holes_remove_neighborhoods() {
        let mut store = grid_store(20);
        let index = CoverTree::from_points(store.points()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let doomed = select_hole_indices(&store, &index, 2, 25, &mut rng).unwrap();
        let removed = store.remove_indices(&doomed).unwrap();
        assert_eq!(removed, doomed.len());
        assert_eq!(store.len(), 400 - removed);
        assert_eq!(store.points().len(), store.normals().len());
    }

    #[test]
    fn test_more_holes_than_points() {
        let store = grid_store(2);
        let index = CoverTree::from_points(store.points()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let doomed = select_hole_indices(&store, &index, 10, 1, &mut rng).unwrap();
        assert_eq!(doomed, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_store_selects_nothing() {
        let store = PointStore::new();
        let index = CoverTree::new();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_hole_indices(&store, &index, 5, 10, &mut rng).unwrap().is_empty());
    }
}
