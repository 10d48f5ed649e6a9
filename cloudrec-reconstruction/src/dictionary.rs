//! Patch dictionary and its K-SVD training
//!
//! Atoms live in cosine-coefficient space, one unit column per atom. The
//! sampled basis is orthonormal on the patch grid, so norms and residuals
//! measured here equal their grid-space counterparts.

use crate::basis::CosineBasis;
use crate::sparse::{sparse_approx, SparseCode};
use cloudrec_core::{ProgressObserver, ProgressTracker, Result, SparseApprox};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

/// Seed for the atoms that do not fit in the initial cosine set
const DICTIONARY_SEED: u64 = 0x5eed_d1c7;

/// Outcome of a training run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrainingSummary {
    pub iterations: usize,
    /// Root mean square of the per-signal residual norms after the last round
    pub residual: f64,
    /// Largest support of any code in the last round
    pub max_support: usize,
}

/// A set of unit atoms in basis-coefficient space
#[derive(Debug, Clone)]
pub struct Dictionary {
    atoms: DMatrix<f64>,
}

impl Dictionary {
    /// Start from the `natm` smoothest basis functions.
    ///
    /// Atoms beyond the number of basis functions are random unit vectors
    /// drawn from a fixed seed, so the starting dictionary is reproducible.
    pub fn new(basis: &CosineBasis, natm: usize) -> Self {
        let dim = basis.len();
        let order = basis.frequency_order();
        let mut rng = StdRng::seed_from_u64(DICTIONARY_SEED);
        let mut atoms = DMatrix::zeros(dim, natm);

        for k in 0..natm {
            match order.get(k) {
                Some(&f) => atoms[(f, k)] = 1.0,
                None => {
                    let random = DVector::from_fn(dim, |_, _| rng.gen_range(-1.0..1.0));
                    let unit = random.try_normalize(f64::EPSILON).unwrap_or_else(|| {
                        let mut e = DVector::zeros(dim);
                        e[k % dim] = 1.0;
                        e
                    });
                    atoms.set_column(k, &unit);
                }
            }
        }

        Self { atoms }
    }

    /// Wrap an existing atom matrix, one atom per column
    pub fn from_atoms(atoms: DMatrix<f64>) -> Self {
        Self { atoms }
    }

    pub fn atoms(&self) -> &DMatrix<f64> {
        &self.atoms
    }

    pub fn natm(&self) -> usize {
        self.atoms.ncols()
    }

    /// Atoms sampled on the patch grid, `cells × natm`
    pub fn grid_atoms(&self, basis: &CosineBasis) -> DMatrix<f64> {
        basis.samples() * &self.atoms
    }

    /// Code every signal against the current atoms, in signal order
    pub fn code_all(&self, signals: &[DVector<f64>], latm: usize, method: SparseApprox) -> Result<Vec<SparseCode>> {
        signals
            .par_iter()
            .map(|y| sparse_approx(method, &self.atoms, y, latm))
            .collect()
    }

    /// Run `iters` rounds of K-SVD over coefficient-space `signals`.
    ///
    /// Each round codes all signals, then revisits atoms in index order. An
    /// atom used by some signals becomes the leading eigenvector of its
    /// restricted residual covariance and those signals' coefficients are
    /// refitted; an unused atom is replaced by the worst coded signal.
    pub fn train(
        &mut self,
        signals: &[DVector<f64>],
        latm: usize,
        iters: usize,
        method: SparseApprox,
        progress: Option<&dyn ProgressObserver>,
        frequency: u32,
    ) -> Result<TrainingSummary> {
        let mut summary = TrainingSummary::default();
        if signals.is_empty() || self.natm() == 0 {
            return Ok(summary);
        }

        let mut tracker = ProgressTracker::new(progress, "Training patch dictionary", iters, frequency);
        for iter in 0..iters {
            tracker.tick(iter);

            let codes = self.code_all(signals, latm, method)?;
            let mut coefficients: Vec<DVector<f64>> = codes.into_iter().map(|c| c.coefficients).collect();

            for k in 0..self.natm() {
                self.update_atom(k, signals, &mut coefficients);
            }

            summary.iterations = iter + 1;
            summary.residual = self.rms_residual(signals, &coefficients);
            debug!("K-SVD round {}: residual {:.6}", iter + 1, summary.residual);
        }

        let codes = self.code_all(signals, latm, method)?;
        summary.max_support = codes.iter().map(SparseCode::nonzeros).max().unwrap_or(0);
        info!(
            "Trained {} atoms on {} patches: residual {:.6}, max support {}",
            self.natm(),
            signals.len(),
            summary.residual,
            summary.max_support
        );
        Ok(summary)
    }

    fn update_atom(&mut self, k: usize, signals: &[DVector<f64>], coefficients: &mut [DVector<f64>]) {
        let users: Vec<usize> = (0..signals.len()).filter(|&j| coefficients[j][k] != 0.0).collect();

        if users.is_empty() {
            let worst = (0..signals.len())
                .map(|j| (j, (&signals[j] - &self.atoms * &coefficients[j]).norm()))
                .fold(None, |best: Option<(usize, f64)>, (j, r)| match best {
                    Some((_, br)) if br >= r => best,
                    _ => Some((j, r)),
                });
            if let Some(unit) = worst.and_then(|(j, _)| signals[j].try_normalize(f64::EPSILON)) {
                self.atoms.set_column(k, &canonical_sign(unit));
            }
            return;
        }

        let dim = self.atoms.nrows();
        let mut residual = DMatrix::zeros(dim, users.len());
        for (col, &j) in users.iter().enumerate() {
            let r = &signals[j] - &self.atoms * &coefficients[j] + self.atoms.column(k) * coefficients[j][k];
            residual.set_column(col, &r);
        }

        let eigen = SymmetricEigen::new(&residual * residual.transpose());
        let lead = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .fold(0, |best, (i, &value)| if value > eigen.eigenvalues[best] { i } else { best });
        if eigen.eigenvalues[lead] <= f64::EPSILON {
            return;
        }

        let Some(atom) = eigen.eigenvectors.column(lead).into_owned().try_normalize(f64::EPSILON) else {
            return;
        };
        let atom = canonical_sign(atom);
        let refit = residual.tr_mul(&atom);
        for (col, &j) in users.iter().enumerate() {
            coefficients[j][k] = refit[col];
        }
        self.atoms.set_column(k, &atom);
    }

    fn rms_residual(&self, signals: &[DVector<f64>], coefficients: &[DVector<f64>]) -> f64 {
        let total: f64 = signals
            .iter()
            .zip(coefficients)
            .map(|(y, x)| (y - &self.atoms * x).norm_squared())
            .sum();
        (total / signals.len() as f64).sqrt()
    }
}

/// Flip `v` so its largest-magnitude component (first on ties) is positive
fn canonical_sign(v: DVector<f64>) -> DVector<f64> {
    let pivot = v
        .iter()
        .enumerate()
        .fold(0, |best, (i, c)| if c.abs() > v[best].abs() { i } else { best });
    if v[pivot] < 0.0 {
        -v
    } else {
        v
    }
}
