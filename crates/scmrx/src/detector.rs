//! Preamble detection by circular cross-correlation
//!
//! The preamble is located by correlating the magnitude buffer against a
//! fixed reference rendering of the preamble, computed in the frequency
//! domain: forward half-complex DFT of the input, pointwise multiply by
//! the conjugated reference spectrum, inverse DFT, argmax. The peak index
//! is the most likely preamble start. No normalization is needed since
//! the decision is relative within a single block.

use std::sync::Arc;

use num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::waveform::{preamble_reference, PREAMBLE_DFT_SIZE};

/// Locates the SCM preamble within a magnitude buffer
///
/// Owns the forward and inverse DFT plans and their scratch; the
/// conjugated preamble template is immutable after construction. The
/// detector is stateless between calls.
pub struct PreambleDetector {
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    template: Vec<Complex<f64>>,
    signal: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    scratch_forward: Vec<Complex<f64>>,
    scratch_inverse: Vec<Complex<f64>>,
}

impl PreambleDetector {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(PREAMBLE_DFT_SIZE);
        let inverse = planner.plan_fft_inverse(PREAMBLE_DFT_SIZE);

        let mut signal = forward.make_input_vec();
        let mut spectrum = forward.make_output_vec();
        let mut scratch_forward = forward.make_scratch_vec();
        let scratch_inverse = inverse.make_scratch_vec();

        // transform the reference once and keep its conjugate
        preamble_reference(&mut signal);
        forward
            .process_with_scratch(&mut signal, &mut spectrum, &mut scratch_forward)
            .expect("preamble reference transform");
        let template = spectrum.iter().map(Complex::conj).collect();

        Self {
            forward,
            inverse,
            template,
            signal,
            spectrum,
            scratch_forward,
            scratch_inverse,
        }
    }

    /// Most likely preamble start within `input`
    ///
    /// Consults at most the first [`PREAMBLE_DFT_SIZE`] samples; shorter
    /// input is zero-padded. Returns an index in `[0, PREAMBLE_DFT_SIZE)`.
    /// The caller decides whether the index leaves room for a whole
    /// packet body.
    pub fn detect(&mut self, input: &[f64]) -> usize {
        let n = input.len().min(PREAMBLE_DFT_SIZE);
        self.signal[..n].copy_from_slice(&input[..n]);
        self.signal[n..].fill(0.0);

        self.forward
            .process_with_scratch(&mut self.signal, &mut self.spectrum, &mut self.scratch_forward)
            .expect("forward transform");

        for (bin, reference) in self.spectrum.iter_mut().zip(&self.template) {
            *bin *= reference;
        }
        // the DC and Nyquist bins of a real signal's product spectrum are
        // real; clear rounding residue so the c2r transform accepts them
        self.spectrum[0].im = 0.0;
        if let Some(last) = self.spectrum.last_mut() {
            last.im = 0.0;
        }

        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.signal, &mut self.scratch_inverse)
            .expect("inverse transform");

        argmax(&self.signal)
    }
}

// Index of the largest element.
fn argmax(values: &[f64]) -> usize {
    let mut max = 0.0;
    let mut idx = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > max {
            max = v;
            idx = i;
        }
    }
    idx
}
