//! Three-dimensional FFT over column-major tensors.
//!
//! Each axis is transformed with a planned 1D FFT. Lines along an axis are
//! independent and are processed in parallel; every line is written back to
//! its own slots, so the result does not depend on the thread schedule.

use std::sync::Arc;

use num_complex::Complex64 as C64;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

/// Planned forward and inverse transforms for one tensor shape.
pub struct Fft3 {
    dims: [usize; 3],
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
}

impl std::fmt::Debug for Fft3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft3").field("dims", &self.dims).finish()
    }
}

impl Fft3 {
    /// Plan transforms for a tensor of shape `dims`.
    pub fn new(dims: [usize; 3]) -> Self {
        let mut planner = FftPlanner::new();
        let forward = dims.map(|n| planner.plan_fft_forward(n));
        let inverse = dims.map(|n| planner.plan_fft_inverse(n));
        Self {
            dims,
            forward,
            inverse,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of tensor entries.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// In-place forward transform (unnormalized).
    pub fn forward(&self, data: &mut [C64]) {
        self.transform(data, &self.forward);
    }

    /// In-place inverse transform, normalized by `1/N`.
    pub fn inverse(&self, data: &mut [C64]) {
        self.transform(data, &self.inverse);
        let scale = 1.0 / self.len() as f64;
        data.par_iter_mut().for_each(|v| *v *= scale);
    }

    fn transform(&self, data: &mut [C64], plans: &[Arc<dyn Fft<f64>>; 3]) {
        assert_eq!(data.len(), self.len(), "tensor length does not match FFT plan");
        let [n0, n1, n2] = self.dims;
        let plane = n0 * n1;

        // Axis 0: lines are contiguous.
        if n0 > 1 {
            let plan = &plans[0];
            data.par_chunks_mut(n0).for_each(|line| plan.process(line));
        }

        // Axis 1: lines have stride n0 inside each xy-plane.
        if n1 > 1 {
            let plan = &plans[1];
            data.par_chunks_mut(plane).for_each(|slab| {
                let mut line = vec![C64::new(0.0, 0.0); n1];
                for i0 in 0..n0 {
                    for (i1, v) in line.iter_mut().enumerate() {
                        *v = slab[i0 + n0 * i1];
                    }
                    plan.process(&mut line);
                    for (i1, v) in line.iter().enumerate() {
                        slab[i0 + n0 * i1] = *v;
                    }
                }
            });
        }

        // Axis 2: lines have stride n0·n1 across planes.
        if n2 > 1 {
            let plan = &plans[2];
            let view: &[C64] = data;
            let lines: Vec<Vec<C64>> = (0..plane)
                .into_par_iter()
                .map(|p| {
                    let mut line: Vec<C64> = (0..n2).map(|i2| view[p + plane * i2]).collect();
                    plan.process(&mut line);
                    line
                })
                .collect();
            for (p, line) in lines.into_iter().enumerate() {
                for (i2, v) in line.into_iter().enumerate() {
                    data[p + plane * i2] = v;
                }
            }
        }
    }
}
