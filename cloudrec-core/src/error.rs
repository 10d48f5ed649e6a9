//! Error types for cloudrec

use std::collections::TryReserveError;
use thiserror::Error;

/// Main error type for cloudrec operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    /// The spatial index was queried before it was built, or after a
    /// mutation invalidated it.
    #[error("Spatial index has not been built for the current cloud")]
    IndexNotBuilt,

    #[error("Point index {index} out of bounds for cloud of {len} points")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Invalid reconstruction configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Result type alias for cloudrec operations
pub type Result<T> = std::result::Result<T, Error>;

/// A rejected reconstruction parameter.
///
/// Every variant maps to the negative field code reported by [`ConfigError::code`],
/// in the order the fields are validated.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("number of dictionary learning iterations must be positive")]
    KsvdIters,

    #[error("patch size (kNN) must be positive")]
    PatchSize,

    #[error("maximum patch frequency must be positive")]
    Frequency,

    #[error("number of dictionary atoms must be positive")]
    AtomCount,

    #[error("atom sparsity {latm} exceeds dictionary size {natm}")]
    Sparsity { latm: usize, natm: usize },

    #[error("maximum number of new points is invalid")]
    MaxNewPoints,

    #[error("bounding box minimum exceeds maximum")]
    BoundingBox,
}

impl ConfigError {
    /// Field-specific negative code, `-1` for the first validated field.
    pub fn code(&self) -> i32 {
        match self {
            ConfigError::KsvdIters => -1,
            ConfigError::PatchSize => -2,
            ConfigError::Frequency => -3,
            ConfigError::AtomCount => -4,
            ConfigError::Sparsity { .. } => -5,
            ConfigError::MaxNewPoints => -6,
            ConfigError::BoundingBox => -7,
        }
    }
}
