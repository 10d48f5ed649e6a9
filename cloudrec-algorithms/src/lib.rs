//! # cloudrec algorithms
//!
//! Spatial indexing and per-point geometry for point clouds.
//!
//! This crate provides the cover tree used for exact k-nearest-neighbor
//! queries, a brute force reference search, iteratively reweighted normal
//! estimation and hole selection for decimation.

pub mod cover_tree;
pub mod decimate;
pub mod nearest_neighbor;
pub mod normals;

// Re-export commonly used items
pub use cover_tree::*;
pub use decimate::*;
pub use nearest_neighbor::*;
pub use normals::*;
