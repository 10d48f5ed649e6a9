//! Configuration records for the long-running cloud operations

use crate::bounding_box::BoundingBox;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Sparse approximation method used to code patches against the dictionary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SparseApprox {
    /// Greedy pursuit; each step only updates the newly picked coefficient
    MatchingPursuit,
    /// Greedy pursuit that re-solves least squares over the whole support
    #[default]
    OrthogonalPursuit,
}

/// Configuration for patch-dictionary gap filling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructConfig {
    /// Dictionary learning (K-SVD) iterations
    pub ksvd_iters: usize,
    /// Maximum number of points in a patch
    pub knn: usize,
    /// Maximum frequency of a dictionary atom along each tangent axis
    pub nfreq: usize,
    /// Number of dictionary atoms
    pub natm: usize,
    /// Maximum atoms used to code a single patch
    pub latm: usize,
    /// Upper bound on points added by one reconstruction
    pub max_new_points: usize,
    /// Optional region outside of which no point is placed
    pub bounding_box: Option<BoundingBox>,
    /// Sparse approximation method
    pub method: SparseApprox,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            ksvd_iters: 20,
            knn: 50,
            nfreq: 4,
            natm: 10,
            latm: 4,
            max_new_points: 25000,
            bounding_box: None,
            method: SparseApprox::OrthogonalPursuit,
        }
    }
}

impl ReconstructConfig {
    pub fn with_ksvd_iters(mut self, ksvd_iters: usize) -> Self {
        self.ksvd_iters = ksvd_iters;
        self
    }

    pub fn with_knn(mut self, knn: usize) -> Self {
        self.knn = knn;
        self
    }

    pub fn with_nfreq(mut self, nfreq: usize) -> Self {
        self.nfreq = nfreq;
        self
    }

    /// Set dictionary size and sparsity together
    pub fn with_atoms(mut self, natm: usize, latm: usize) -> Self {
        self.natm = natm;
        self.latm = latm;
        self
    }

    pub fn with_max_new_points(mut self, max_new_points: usize) -> Self {
        self.max_new_points = max_new_points;
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }

    pub fn with_method(mut self, method: SparseApprox) -> Self {
        self.method = method;
        self
    }

    /// Check every field in declaration order, reporting the first offender.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ksvd_iters == 0 {
            return Err(ConfigError::KsvdIters);
        }
        if self.knn == 0 {
            return Err(ConfigError::PatchSize);
        }
        if self.nfreq == 0 {
            return Err(ConfigError::Frequency);
        }
        if self.natm == 0 {
            return Err(ConfigError::AtomCount);
        }
        if self.latm > self.natm {
            return Err(ConfigError::Sparsity {
                latm: self.latm,
                natm: self.natm,
            });
        }
        if let Some(bb) = &self.bounding_box {
            if !bb.is_valid() {
                return Err(ConfigError::BoundingBox);
            }
        }
        Ok(())
    }
}

/// Parameters for whole-cloud normal estimation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalConfig {
    /// Reweighting passes of the plane fit
    pub iters: usize,
    /// Neighborhood size
    pub knn: usize,
}

impl Default for NormalConfig {
    fn default() -> Self {
        Self { iters: 25, knn: 25 }
    }
}

/// Parameters for hole punching
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecimateConfig {
    pub n_holes: usize,
    pub knn: usize,
}

impl Default for DecimateConfig {
    fn default() -> Self {
        Self { n_holes: 5, knn: 100 }
    }
}
