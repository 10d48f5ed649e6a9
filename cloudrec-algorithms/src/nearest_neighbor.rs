//! Nearest neighbor search implementations

use cloudrec_core::{
    neighbor_order, point_distance, Error, IndexedPoint, NearestNeighborSearch, Neighbor, Point3f, Result,
};

/// Simple brute force nearest neighbor search for small datasets.
///
/// Linear in the number of points per query; used as the reference the
/// cover tree is checked against.
pub struct BruteForceSearch {
    points: Vec<Point3f>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3f]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Result<Vec<Neighbor>> {
        if self.points.is_empty() {
            return Err(Error::IndexNotBuilt);
        }

        let mut distances: Vec<Neighbor> = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, point)| Neighbor {
                point: IndexedPoint::new(*point, idx),
                distance: point_distance(point, query),
            })
            .collect();

        distances.sort_by(neighbor_order);
        distances.truncate(k);
        Ok(distances)
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}
