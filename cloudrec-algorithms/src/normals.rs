//! Normal estimation algorithms
//!
//! Normals are fitted per point from its k nearest neighbors with an
//! iteratively reweighted plane fit. The sign of an estimated normal is
//! whatever the eigen decomposition produces: orientation is not made
//! consistent across the cloud, and callers that need outward-facing
//! normals must run their own orientation pass.

use crate::cover_tree::CoverTree;
use cloudrec_core::{
    NormalConfig, Point3f, PointStore, ProgressObserver, ProgressTracker, Result, Vector3f, DEFAULT_NORMAL,
};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

/// Relative eigenvalue gap below which a neighborhood counts as degenerate
const DEGENERATE_RATIO: f64 = 1e-8;

/// Convergence threshold on `1 - |n_old · n_new|`
const CONVERGED: f64 = 1e-9;

/// Batches between progress reports in whole-cloud estimation
const PROGRESS_CHUNKS: usize = 100;

/// Cauchy weight tuning constant, in units of the robust residual scale
const CAUCHY_C: f64 = 2.385;

/// Fit a plane normal to `neighbors` with up to `iters` reweighting passes.
///
/// Returns `None` when the neighborhood is degenerate: fewer than three
/// finite points, all points coincident, or all points collinear. `zero_tol`
/// raises the degeneracy threshold on the middle eigenvalue relative to the
/// largest one.
pub fn fit_normal(neighbors: &[Point3f], iters: usize, zero_tol: f64) -> Option<Vector3f> {
    let pts: Vec<Vector3<f64>> = neighbors
        .iter()
        .filter(|p| p.coords.iter().all(|c| c.is_finite()))
        .map(|p| p.coords.cast::<f64>())
        .collect();
    if pts.len() < 3 {
        return None;
    }

    let tol = DEGENERATE_RATIO.max(zero_tol);
    let mut weights = vec![1.0f64; pts.len()];
    let mut normal: Option<Vector3<f64>> = None;

    for pass in 0..iters.max(1) {
        let total: f64 = weights.iter().sum();
        if total <= f64::EPSILON {
            break;
        }
        let centroid = pts
            .iter()
            .zip(&weights)
            .fold(Vector3::zeros(), |acc, (q, w)| acc + q * *w)
            / total;

        let mut cov = Matrix3::<f64>::zeros();
        for (q, w) in pts.iter().zip(&weights) {
            let d = q - centroid;
            cov += d * d.transpose() * *w;
        }

        let eigen = SymmetricEigen::new(cov);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        let (small, mid, large) = (order[0], order[1], order[2]);
        let lambda_mid = eigen.eigenvalues[mid];
        let lambda_large = eigen.eigenvalues[large];

        if lambda_large <= f64::EPSILON || lambda_mid <= tol * lambda_large {
            // Only the unweighted pass decides degeneracy; afterwards keep
            // the last good estimate.
            if pass == 0 {
                return None;
            }
            break;
        }

        let n: Vector3<f64> = eigen.eigenvectors.column(small).into_owned();
        let n = n.try_normalize(f64::EPSILON)?;

        if let Some(prev) = normal {
            if 1.0 - n.dot(&prev).abs() < CONVERGED {
                normal = Some(n);
                break;
            }
        }
        normal = Some(n);

        let residuals: Vec<f64> = pts.iter().map(|q| (q - centroid).dot(&n).abs()).collect();
        let mut sorted = residuals.clone();
        sorted.sort_by(f64::total_cmp);
        let scale = 1.4826 * sorted[sorted.len() / 2];
        if scale <= f64::EPSILON {
            break;
        }
        let c = CAUCHY_C * scale;
        for (w, r) in weights.iter_mut().zip(&residuals) {
            *w = 1.0 / (1.0 + (r / c).powi(2));
        }
    }

    normal.map(|n| n.cast::<f32>())
}

/// Normal at `p0` from its neighborhood, [`DEFAULT_NORMAL`] when degenerate
pub fn cloud_normal(p0: &Point3f, neighbors: &[Point3f], iters: usize, zero_tol: f64) -> Vector3f {
    fit_normal(neighbors, iters, zero_tol).unwrap_or_else(|| {
        debug!("Degenerate neighborhood at {:?}, using default normal", p0);
        DEFAULT_NORMAL
    })
}

/// Estimate the normal at an arbitrary position from its `k` indexed neighbors
pub fn approx_norm(index: &CoverTree, p: &Point3f, iters: usize, k: usize) -> Result<Vector3f> {
    let neighbors = index.k_nearest_neighbors(p, k)?;
    let positions: Vec<Point3f> = neighbors.iter().map(|n| n.point.position).collect();
    Ok(cloud_normal(p, &positions, iters, 0.0))
}

/// Recompute every normal in `store` in place.
///
/// Positions are untouched. Degenerate neighborhoods receive
/// [`DEFAULT_NORMAL`] and the pass carries on; their count is returned.
pub fn estimate_cloud_normals(
    store: &mut PointStore,
    index: &CoverTree,
    config: &NormalConfig,
    progress: Option<&dyn ProgressObserver>,
    frequency: u32,
) -> Result<usize> {
    let npoints = store.len();
    let mut tracker = ProgressTracker::new(progress, "Building cloud normals", npoints, frequency);
    let chunk = (npoints / PROGRESS_CHUNKS).max(1);
    let mut degenerate = 0;

    for start in (0..npoints).step_by(chunk) {
        tracker.tick(start);
        let end = (start + chunk).min(npoints);

        let fitted = store.points()[start..end]
            .par_iter()
            .map(|p| {
                let neighbors = index.k_nearest_neighbors(p, config.knn)?;
                let positions: Vec<Point3f> = neighbors.iter().map(|n| n.point.position).collect();
                Ok(fit_normal(&positions, config.iters, 0.0))
            })
            .collect::<Result<Vec<Option<Vector3f>>>>()?;

        for (slot, normal) in store.normals_mut()[start..end].iter_mut().zip(fitted) {
            *slot = normal.unwrap_or_else(|| {
                degenerate += 1;
                DEFAULT_NORMAL
            });
        }
    }

    info!(
        "Estimated {} normals ({} degenerate neighborhoods)",
        npoints, degenerate
    );
    Ok(degenerate)
}
