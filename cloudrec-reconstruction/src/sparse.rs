//! Greedy sparse approximation against an atom matrix
//!
//! Both pursuits pick at most `latm` atoms. Atoms need not be unit length:
//! selection uses correlations normalized by column norm, and zero columns
//! are never picked. Equal correlations resolve to the lowest atom index.

use cloudrec_core::{Error, Result, SparseApprox};
use nalgebra::{DMatrix, DVector};

/// Relative correlation below which pursuit stops early
const CORRELATION_EPS: f64 = 1e-10;

/// A sparse code of one signal
#[derive(Debug, Clone, PartialEq)]
pub struct SparseCode {
    /// One coefficient per atom, zero outside the support
    pub coefficients: DVector<f64>,
    /// Atoms in the order they were selected
    pub support: Vec<usize>,
    /// Norm of `signal - atoms * coefficients`
    pub residual_norm: f64,
}

impl SparseCode {
    fn empty(natm: usize, signal: &DVector<f64>) -> Self {
        Self {
            coefficients: DVector::zeros(natm),
            support: Vec::new(),
            residual_norm: signal.norm(),
        }
    }

    /// Number of nonzero coefficients
    pub fn nonzeros(&self) -> usize {
        self.coefficients.iter().filter(|c| **c != 0.0).count()
    }
}

fn column_norms(atoms: &DMatrix<f64>) -> Vec<f64> {
    atoms.column_iter().map(|c| c.norm()).collect()
}

/// Atom with the largest normalized correlation, `None` once nothing correlates
fn best_atom(
    atoms: &DMatrix<f64>,
    norms: &[f64],
    residual: &DVector<f64>,
    skip: &[usize],
    floor: f64,
) -> Option<(usize, f64)> {
    let correlations = atoms.tr_mul(residual);
    let mut best: Option<(usize, f64)> = None;
    for (k, &norm) in norms.iter().enumerate() {
        if norm <= f64::EPSILON || skip.contains(&k) {
            continue;
        }
        let score = correlations[k].abs() / norm;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((k, score));
        }
    }
    best.filter(|&(_, score)| score > floor)
        .map(|(k, _)| (k, correlations[k]))
}

/// Matching pursuit: each step adds the best atom's projection of the residual.
///
/// An atom may be picked more than once; the support still never exceeds
/// `latm` distinct atoms since every step adds at most one.
pub fn matching_pursuit(atoms: &DMatrix<f64>, signal: &DVector<f64>, latm: usize) -> SparseCode {
    let mut code = SparseCode::empty(atoms.ncols(), signal);
    let norms = column_norms(atoms);
    let floor = CORRELATION_EPS * (1.0 + signal.norm());
    let mut residual = signal.clone();

    for _ in 0..latm {
        let Some((k, correlation)) = best_atom(atoms, &norms, &residual, &[], floor) else {
            break;
        };
        let step = correlation / (norms[k] * norms[k]);
        code.coefficients[k] += step;
        residual.axpy(-step, &atoms.column(k), 1.0);
        if !code.support.contains(&k) {
            code.support.push(k);
        }
    }

    code.residual_norm = residual.norm();
    code
}

/// Orthogonal matching pursuit: the support grows greedily and the
/// coefficients are re-fitted by least squares after every step.
pub fn orthogonal_pursuit(atoms: &DMatrix<f64>, signal: &DVector<f64>, latm: usize) -> Result<SparseCode> {
    let mut code = SparseCode::empty(atoms.ncols(), signal);
    let norms = column_norms(atoms);
    let floor = CORRELATION_EPS * (1.0 + signal.norm());
    let mut residual = signal.clone();

    for _ in 0..latm.min(atoms.ncols()) {
        let Some((k, _)) = best_atom(atoms, &norms, &residual, &code.support, floor) else {
            break;
        };
        code.support.push(k);

        let selected = atoms.select_columns(code.support.iter());
        let solution = selected
            .clone()
            .svd(true, true)
            .solve(signal, 1e-12)
            .map_err(|e| Error::Algorithm(format!("least squares over sparse support failed: {}", e)))?;

        code.coefficients.fill(0.0);
        for (&atom, &c) in code.support.iter().zip(solution.iter()) {
            code.coefficients[atom] = c;
        }
        residual = signal - &selected * &solution;
    }

    code.residual_norm = residual.norm();
    Ok(code)
}

/// Code `signal` with the configured pursuit
pub fn sparse_approx(
    method: SparseApprox,
    atoms: &DMatrix<f64>,
    signal: &DVector<f64>,
    latm: usize,
) -> Result<SparseCode> {
    match method {
        SparseApprox::MatchingPursuit => Ok(matching_pursuit(atoms, signal, latm)),
        SparseApprox::OrthogonalPursuit => orthogonal_pursuit(atoms, signal, latm),
    }
}
