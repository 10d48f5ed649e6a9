//! Separable cosine basis over a square patch
//!
//! Patches live in normalized tangent coordinates `(s, t) ∈ [-1, 1]²`,
//! sampled on an `m × m` grid of cell centers. Basis function `k` is the
//! product of 1D DCT-II functions with frequencies `(k / nfreq, k % nfreq)`
//! along `s` and `t`; sampled on the grid the functions are orthonormal.

use itertools::iproduct;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Orthonormal 2D cosine basis sampled on a square grid
#[derive(Debug, Clone)]
pub struct CosineBasis {
    nfreq: usize,
    grid: usize,
    /// `grid² × nfreq²`, one sampled function per column
    samples: DMatrix<f64>,
}

impl CosineBasis {
    /// Basis with `nfreq` frequencies per axis on a `max(2·nfreq, 2)` grid
    pub fn new(nfreq: usize) -> Self {
        let nfreq = nfreq.max(1);
        let grid = (2 * nfreq).max(2);
        let cells = grid * grid;
        let mut samples = DMatrix::zeros(cells, nfreq * nfreq);

        for (k, (fu, fv)) in iproduct!(0..nfreq, 0..nfreq).enumerate() {
            for (cell, (iy, ix)) in iproduct!(0..grid, 0..grid).enumerate() {
                samples[(cell, k)] = dct(fu, ix, grid) * dct(fv, iy, grid);
            }
        }

        Self { nfreq, grid, samples }
    }

    pub fn nfreq(&self) -> usize {
        self.nfreq
    }

    /// Cells along one side of the patch
    pub fn grid_size(&self) -> usize {
        self.grid
    }

    /// Total number of grid cells
    pub fn cells(&self) -> usize {
        self.grid * self.grid
    }

    /// Number of basis functions
    pub fn len(&self) -> usize {
        self.nfreq * self.nfreq
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of a cell in normalized coordinates
    pub fn cell_width(&self) -> f64 {
        2.0 / self.grid as f64
    }

    /// Sampled functions, one column per function, one row per cell
    pub fn samples(&self) -> &DMatrix<f64> {
        &self.samples
    }

    /// Frequency pair `(fu, fv)` of function `k`
    pub fn frequencies(&self, k: usize) -> (usize, usize) {
        (k / self.nfreq, k % self.nfreq)
    }

    /// Function indices from smoothest to roughest, ties by index
    pub fn frequency_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&k| {
            let (fu, fv) = self.frequencies(k);
            (fu + fv, k)
        });
        order
    }

    /// Normalized center `(s, t)` of a cell; cells run along `s` first
    pub fn cell_center(&self, cell: usize) -> (f64, f64) {
        let (ix, iy) = (cell % self.grid, cell / self.grid);
        let w = self.cell_width();
        (-1.0 + (ix as f64 + 0.5) * w, -1.0 + (iy as f64 + 0.5) * w)
    }

    /// Project grid values onto the basis
    pub fn analyze(&self, values: &DVector<f64>) -> DVector<f64> {
        self.samples.tr_mul(values)
    }

    /// Value at `(s, t)` of the function with the given coefficients
    pub fn eval(&self, coefficients: &DVector<f64>, s: f64, t: f64) -> f64 {
        iproduct!(0..self.nfreq, 0..self.nfreq)
            .zip(coefficients.iter())
            .map(|((fu, fv), c)| c * self.continuous(fu, s) * self.continuous(fv, t))
            .sum()
    }

    /// Partial derivatives `(∂/∂s, ∂/∂t)` at `(s, t)`
    pub fn gradient(&self, coefficients: &DVector<f64>, s: f64, t: f64) -> (f64, f64) {
        iproduct!(0..self.nfreq, 0..self.nfreq)
            .zip(coefficients.iter())
            .fold((0.0, 0.0), |(gs, gt), ((fu, fv), c)| {
                (
                    gs + c * self.derivative(fu, s) * self.continuous(fv, t),
                    gt + c * self.continuous(fu, s) * self.derivative(fv, t),
                )
            })
    }

    fn continuous(&self, f: usize, s: f64) -> f64 {
        scale(f, self.grid) * (PI * f as f64 * (s + 1.0) / 2.0).cos()
    }

    fn derivative(&self, f: usize, s: f64) -> f64 {
        let freq = PI * f as f64;
        -scale(f, self.grid) * (freq * (s + 1.0) / 2.0).sin() * freq / 2.0
    }
}

fn scale(f: usize, m: usize) -> f64 {
    if f == 0 {
        (1.0 / m as f64).sqrt()
    } else {
        (2.0 / m as f64).sqrt()
    }
}

/// Orthonormal DCT-II function `f` at grid sample `j`
fn dct(f: usize, j: usize, m: usize) -> f64 {
    scale(f, m) * (PI * f as f64 * (j as f64 + 0.5) / m as f64).cos()
}
