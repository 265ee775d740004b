//! Complex forward FFT engine
//!
//! Plans the transform once and reuses fixed-size buffers every cycle

use rustfft::{Fft, FftPlanner};
use num_complex::Complex;
use std::sync::Arc;

/// Forward FFT over complex I/Q buffers of a fixed size
pub struct SpectralTransformer {
    /// FFT size (number of complex samples)
    fft_size: usize,

    /// Forward FFT plan
    fft: Arc<dyn Fft<f64>>,

    /// Reusable input buffer (windowed samples)
    input_buffer: Vec<Complex<f64>>,

    /// Reusable output buffer (spectrum)
    output_buffer: Vec<Complex<f64>>,

    /// Scratch space required by the plan
    scratch: Vec<Complex<f64>>,
}

impl SpectralTransformer {
    /// Create new transformer
    ///
    /// # Arguments
    /// * `fft_size` - FFT size (number of complex samples)
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);

        let zero = Complex::new(0.0, 0.0);
        let scratch = vec![zero; fft.get_outofplace_scratch_len()];

        Self {
            fft_size,
            fft,
            input_buffer: vec![zero; fft_size],
            output_buffer: vec![zero; fft_size],
            scratch,
        }
    }

    /// Mutable access to the input buffer, filled by the conditioner
    pub fn input_mut(&mut self) -> &mut [Complex<f64>] {
        &mut self.input_buffer
    }

    /// Execute the forward transform on the input buffer
    ///
    /// The input buffer is used as workspace and must be refilled
    /// before the next call.
    ///
    /// # Returns
    /// Unnormalized spectrum X[k] for k = 0..N-1 (DC first)
    pub fn transform(&mut self) -> &[Complex<f64>] {
        self.fft.process_outofplace_with_scratch(
            &mut self.input_buffer,
            &mut self.output_buffer,
            &mut self.scratch,
        );
        &self.output_buffer
    }

    /// Most recent transform output
    pub fn output(&self) -> &[Complex<f64>] {
        &self.output_buffer
    }

    /// Get FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_fft_dc_signal() {
        let mut fft = SpectralTransformer::new(256);
        fft.input_mut().fill(Complex::new(1.0, 0.0));

        let spectrum = fft.transform();

        assert!((spectrum[0].re - 256.0).abs() < 1e-9);
        assert!(spectrum[1..].iter().all(|c| c.norm() < 1e-9));
    }

    #[test]
    fn test_fft_complex_tone() {
        let n = 1024;
        let bin = 100;
        let mut fft = SpectralTransformer::new(n);

        // e^{-jωn} lands on a negative-frequency bin
        for (i, s) in fft.input_mut().iter_mut().enumerate() {
            let phase = -2.0 * PI * bin as f64 * i as f64 / n as f64;
            *s = Complex::new(phase.cos(), phase.sin());
        }

        let spectrum = fft.transform();
        let (peak_bin, _) = spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.norm().partial_cmp(&b.norm()).unwrap())
            .unwrap();

        assert_eq!(peak_bin, n - bin);
        assert!((spectrum[n - bin].norm() - n as f64).abs() < 1e-6);
    }

    #[test]
    fn test_fft_reference_block() {
        let mut fft = SpectralTransformer::new(4);
        fft.input_mut().copy_from_slice(&[
            Complex::new(-0.5, -0.5),
            Complex::new(127.5, -0.5),
            Complex::new(-127.5, -0.5),
            Complex::new(-0.5, -127.5),
        ]);

        let spectrum = fft.transform().to_vec();

        // Direct DFT: X[k] = Σ x[n] e^{-j2πkn/4}
        let expected = [
            Complex::new(-1.0, -129.0),
            Complex::new(254.0, -128.0),
            Complex::new(-255.0, 127.0),
            Complex::new(0.0, 128.0),
        ];
        for (got, want) in spectrum.iter().zip(expected.iter()) {
            assert!((got - want).norm() < 1e-9, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_fft_deterministic() {
        let mut fft = SpectralTransformer::new(64);
        let fill = |buf: &mut [Complex<f64>]| {
            for (i, s) in buf.iter_mut().enumerate() {
                *s = Complex::new(i as f64, -(i as f64) * 0.5);
            }
        };

        fill(fft.input_mut());
        let first = fft.transform().to_vec();
        fill(fft.input_mut());
        let second = fft.transform().to_vec();

        assert_eq!(first, second);
        assert_eq!(fft.output(), &second[..]);
    }
}
