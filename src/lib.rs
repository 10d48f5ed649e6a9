//! # cloudrec
//!
//! Point cloud gap filling for Rust.
//!
//! This is the umbrella crate: it re-exports the member crates and adds
//! [`Cloud`], a lock-protected point cloud that ties the spatial index,
//! normal estimation, decimation and reconstruction together. Use the
//! member crates directly for finer control over what is pulled in.
//!
//! ## Crates
//!
//! - **Core**: points, the point store, configuration, errors and progress reporting
//! - **Algorithms**: cover tree k-NN, normal estimation, hole selection
//! - **Reconstruction**: cosine patches, sparse coding, K-SVD and gap filling
//!
//! ## Quick Start
//!
//! ```rust
//! use cloudrec::prelude::*;
//! use rand::SeedableRng;
//!
//! let cloud = Cloud::new();
//! let mut guard = cloud.lock();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! guard.fill_random_plane(Vector3f::z(), 500, None, &mut rng).unwrap();
//! guard.build_spatial_index().unwrap();
//!
//! let neighbors = guard.point_knn(&Point3f::origin(), 8).unwrap();
//! assert_eq!(neighbors.len(), 8);
//! ```

pub mod cloud;

pub use cloud::{Cloud, CloudGuard};

// Re-export core functionality
pub use cloudrec_core::*;

// Re-export sub-crates
pub use cloudrec_algorithms as algorithms;
pub use cloudrec_reconstruction as reconstruction;

/// Convenient imports for common use cases
pub mod prelude {
    pub use crate::cloud::{Cloud, CloudGuard};
    pub use cloudrec_algorithms::*;
    pub use cloudrec_core::*;
    pub use cloudrec_reconstruction::*;
}
