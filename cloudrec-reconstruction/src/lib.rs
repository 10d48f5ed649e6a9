//! # cloudrec reconstruction
//!
//! Gap filling for point clouds with a sparse patch dictionary.
//!
//! Neighborhoods are resampled as height fields over a cosine basis, a
//! dictionary is learned from the complete ones with K-SVD, and incomplete
//! neighborhoods on the cloud's boundary are extended by sparse coding.

pub mod basis;
pub mod dictionary;
pub mod patch;
pub mod reconstruct;
pub mod sparse;

// Re-export commonly used items
pub use basis::*;
pub use dictionary::*;
pub use patch::*;
pub use reconstruct::*;
pub use sparse::*;
