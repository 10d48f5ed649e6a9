//! Core data structures and traits for cloudrec
//!
//! This crate provides the fundamental types shared by the spatial index,
//! normal estimation and reconstruction crates: points, the point store,
//! configuration records, errors and the progress-observer interface.

pub mod bounding_box;
pub mod config;
pub mod error;
pub mod point;
pub mod point_store;
pub mod progress;
pub mod traits;

pub use bounding_box::*;
pub use config::*;
pub use error::*;
pub use point::*;
pub use point_store::*;
pub use progress::*;
pub use traits::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Point3, Vector3};
