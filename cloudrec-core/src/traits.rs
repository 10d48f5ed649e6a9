//! Core traits for cloudrec

use crate::error::Result;
use crate::point::{Neighbor, Point3f};

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point.
    ///
    /// Results are ordered by ascending distance, ties by ascending point
    /// index. Fewer than `k` are returned only when the structure holds
    /// fewer points. Querying a structure with nothing in it is an error.
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Result<Vec<Neighbor>>;

    /// Number of indexed points
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Total order used for neighbor results: distance, then index
pub fn neighbor_order(a: &Neighbor, b: &Neighbor) -> std::cmp::Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.point.index.cmp(&b.point.index))
}
