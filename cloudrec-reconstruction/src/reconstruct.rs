//! Gap filling with a learned patch dictionary
//!
//! The reconstructor learns a sparse dictionary from complete patches of the
//! cloud, then revisits the cloud's boundary: each boundary patch is coded
//! over the cells it observes and the fitted height field is sampled in the
//! cells it is missing. Accepted samples join the cloud and the index at
//! once, and seed the next pass.

use crate::basis::CosineBasis;
use crate::dictionary::{Dictionary, TrainingSummary};
use crate::patch::{is_boundary, Patch};
use crate::sparse::sparse_approx;
use cloudrec_algorithms::CoverTree;
use cloudrec_core::{
    Error, IndexedPoint, Point3f, PointStore, ProgressObserver, ProgressTracker, ReconstructConfig, Result, Vector3f,
};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Upper bound on training patches
pub const MAX_TRAINING_PATCHES: usize = 1000;

/// Upper bound on filling passes
pub const MAX_PASSES: usize = 16;

/// Patches fitted worse than this RMS height error (in half-widths) are rejected
pub const MAX_PATCH_RESIDUAL: f64 = 0.2;

/// New points keep at least this many point spacings from every existing point
pub const MIN_SPACING: f32 = 0.8;

/// Summary of one reconstruction run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructReport {
    /// Fully observed patches the dictionary was trained on
    pub training_patches: usize,
    /// Boundary patches whose fit was good enough to sample
    pub filled_patches: usize,
    /// Boundary patches rejected for a poor fit or too few samples
    pub rejected_patches: usize,
    pub points_added: usize,
    /// Passes that were run, including a final one adding nothing
    pub passes: usize,
    /// Largest number of atoms used by any code
    pub max_code_support: usize,
    /// Training residual after the last dictionary update
    pub final_residual: f64,
    /// `(seed position, new point)` for every point added
    pub segments: Vec<(Point3f, Point3f)>,
}

/// A boundary patch with its sparse fit
struct FittedPatch {
    patch: Patch,
    /// Atom weights of the fit
    code: DVector<f64>,
    support: usize,
    rms: f64,
}

enum Fit {
    Fitted(FittedPatch),
    Rejected { support: usize },
    Skipped,
}

/// Learns a patch dictionary from a cloud and fills its gaps
pub struct PatchReconstructor<'a> {
    config: &'a ReconstructConfig,
    basis: CosineBasis,
    progress: Option<&'a dyn ProgressObserver>,
    frequency: u32,
}

impl<'a> PatchReconstructor<'a> {
    /// Validate `config` and prepare the patch basis
    pub fn new(
        config: &'a ReconstructConfig,
        progress: Option<&'a dyn ProgressObserver>,
        frequency: u32,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            basis: CosineBasis::new(config.nfreq),
            progress,
            frequency,
        })
    }

    pub fn basis(&self) -> &CosineBasis {
        &self.basis
    }

    /// Indices of up to [`MAX_TRAINING_PATCHES`] seeds spread evenly over the cloud
    pub fn training_seeds(len: usize) -> Vec<usize> {
        let stride = len.div_ceil(MAX_TRAINING_PATCHES).max(1);
        (0..len).step_by(stride).take(MAX_TRAINING_PATCHES).collect()
    }

    /// Train a dictionary on the fully observed patches of the cloud
    pub fn train(&self, store: &PointStore, index: &CoverTree) -> Result<(Dictionary, TrainingSummary, usize)> {
        let seeds = Self::training_seeds(store.len());
        let patches = seeds
            .par_iter()
            .map(|&seed| Patch::extract(store, index, seed, self.config.knn, &self.basis))
            .collect::<Result<Vec<_>>>()?;

        let signals: Vec<DVector<f64>> = patches
            .into_iter()
            .flatten()
            .filter(Patch::fully_observed)
            .map(|p| self.basis.analyze(&p.heights))
            .collect();

        let mut dictionary = Dictionary::new(&self.basis, self.config.natm);
        if signals.is_empty() {
            warn!("No fully observed patches to train on; using the initial cosine dictionary");
            return Ok((dictionary, TrainingSummary::default(), 0));
        }

        let summary = dictionary.train(
            &signals,
            self.config.latm,
            self.config.ksvd_iters,
            self.config.method,
            self.progress,
            self.frequency,
        )?;
        Ok((dictionary, summary, signals.len()))
    }

    fn fit(&self, store: &PointStore, index: &CoverTree, seed: usize, grid_atoms: &DMatrix<f64>) -> Result<Fit> {
        let Some(patch) = Patch::extract(store, index, seed, self.config.knn, &self.basis)? else {
            return Ok(Fit::Skipped);
        };
        if !patch.has_hole {
            return Ok(Fit::Skipped);
        }

        let rows = patch.observed_cells();
        if rows.len() < 3 {
            return Ok(Fit::Rejected { support: 0 });
        }
        let restricted = grid_atoms.select_rows(rows.iter());
        let signal = DVector::from_iterator(rows.len(), rows.iter().map(|&c| patch.heights[c]));

        let code = sparse_approx(self.config.method, &restricted, &signal, self.config.latm)?;
        let support = code.nonzeros();
        let rms = code.residual_norm / (rows.len() as f64).sqrt();
        if rms.is_nan() || rms > MAX_PATCH_RESIDUAL {
            return Ok(Fit::Rejected { support });
        }
        Ok(Fit::Fitted(FittedPatch {
            patch,
            code: code.coefficients,
            support,
            rms,
        }))
    }

    /// Fill the gaps of the cloud, growing `store` and `index` together.
    ///
    /// `index` must cover exactly the points of `store`. Nothing is modified
    /// when the configuration is rejected or the index is missing.
    pub fn reconstruct(&self, store: &mut PointStore, index: &mut CoverTree) -> Result<ReconstructReport> {
        if index.is_empty() || index.len() != store.len() {
            return Err(Error::IndexNotBuilt);
        }

        let mut report = ReconstructReport::default();
        let (dictionary, training, training_patches) = self.train(store, index)?;
        report.training_patches = training_patches;
        report.final_residual = training.residual;
        report.max_code_support = training.max_support;
        let coefficient_atoms = dictionary.atoms();
        let grid_atoms = dictionary.grid_atoms(&self.basis);

        let knn = self.config.knn;
        let mut seeds: Vec<usize> = {
            let frozen: &PointStore = store;
            let frozen_index: &CoverTree = index;
            let flags = (0..frozen.len())
                .into_par_iter()
                .map(|i| is_boundary(frozen, frozen_index, i, knn))
                .collect::<Result<Vec<bool>>>()?;
            flags.iter().enumerate().filter_map(|(i, &b)| b.then_some(i)).collect()
        };
        info!("Reconstruction starts from {} boundary points", seeds.len());

        let mut budget_left = self.config.max_new_points;
        for pass in 0..MAX_PASSES {
            if seeds.is_empty() || budget_left == 0 {
                break;
            }
            report.passes = pass + 1;

            let fits = {
                let frozen: &PointStore = store;
                let frozen_index: &CoverTree = index;
                seeds
                    .par_iter()
                    .map(|&seed| self.fit(frozen, frozen_index, seed, &grid_atoms))
                    .collect::<Result<Vec<Fit>>>()?
            };

            let label = format!("Filling gaps (pass {})", pass + 1);
            let mut tracker = ProgressTracker::new(self.progress, &label, fits.len(), self.frequency);
            let mut new_seeds = Vec::new();

            'patches: for (i, fit) in fits.into_iter().enumerate() {
                tracker.tick(i);
                let fitted = match fit {
                    Fit::Fitted(fitted) => fitted,
                    Fit::Rejected { support } => {
                        report.rejected_patches += 1;
                        report.max_code_support = report.max_code_support.max(support);
                        continue;
                    }
                    Fit::Skipped => continue,
                };
                report.filled_patches += 1;
                report.max_code_support = report.max_code_support.max(fitted.support);

                let surface = coefficient_atoms * &fitted.code;
                for cell in fitted.patch.gap_cells() {
                    if budget_left == 0 {
                        break 'patches;
                    }
                    let Some((point, normal)) = self.candidate(&fitted.patch, &surface, cell) else {
                        continue;
                    };
                    if let Some(bb) = &self.config.bounding_box {
                        if !bb.contains(&point) {
                            continue;
                        }
                    }
                    let spacing = f64::from(MIN_SPACING * fitted.patch.spacing);
                    if let Some(nearest) = index.nearest(&point)? {
                        if nearest.distance < spacing {
                            continue;
                        }
                    }

                    let id = add_indexed_point(store, index, point, normal)?;
                    report.segments.push((fitted.patch.center, point));
                    new_seeds.push(id);
                    budget_left -= 1;
                    report.points_added += 1;
                }
                debug!(
                    "Patch at seed {} filled with residual {:.4}",
                    fitted.patch.seed, fitted.rms
                );
            }

            tracker.message(&format!("Pass {} added {} points", pass + 1, new_seeds.len()));
            info!(
                "Pass {}: {} new points, {} filled / {} rejected patches so far",
                pass + 1,
                new_seeds.len(),
                report.filled_patches,
                report.rejected_patches
            );
            seeds = new_seeds;
        }

        if budget_left == 0 {
            warn!("Reconstruction stopped at the budget of {} new points", self.config.max_new_points);
        }
        info!(
            "Reconstruction added {} points in {} passes",
            report.points_added, report.passes
        );
        Ok(report)
    }

    /// Point and normal sampled from the fitted surface at a gap cell
    fn candidate(&self, patch: &Patch, coefficients: &DVector<f64>, cell: usize) -> Option<(Point3f, Vector3f)> {
        let (s, t) = self.basis.cell_center(cell);
        let h = self.basis.eval(coefficients, s, t);
        let (gs, gt) = self.basis.gradient(coefficients, s, t);
        let point = patch.to_world(s, t, h);
        if !point.coords.iter().all(|c| c.is_finite()) {
            return None;
        }
        Some((point, patch.surface_normal(gs, gt)?))
    }
}

/// Append a point and index it under its new position in `store`
pub fn add_indexed_point(
    store: &mut PointStore,
    index: &mut CoverTree,
    point: Point3f,
    normal: Vector3f,
) -> Result<usize> {
    let id = store.len();
    index.insert(IndexedPoint::new(point, id))?;
    store.push(point, normal);
    Ok(id)
}

/// Fill the gaps of `store` with a dictionary learned from the store itself.
///
/// The configuration is validated before anything else; a rejected
/// configuration leaves both `store` and `index` untouched.
pub fn reconstruct(
    store: &mut PointStore,
    index: &mut CoverTree,
    config: &ReconstructConfig,
    progress: Option<&dyn ProgressObserver>,
    frequency: u32,
) -> Result<ReconstructReport> {
    PatchReconstructor::new(config, progress, frequency)?.reconstruct(store, index)
}
