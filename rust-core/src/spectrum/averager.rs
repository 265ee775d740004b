//! Power spectrum averaging
//!
//! Converts FFT output to power, reorders it so negative frequencies come
//! first, smooths it with a single-pole average and gates publication.

use num_complex::Complex;
use crate::device::TuningState;

/// Averaged spectrum ready for broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    /// Frequency of the first bin in Hz
    pub xstart: f64,

    /// Bin spacing in Hz
    pub xdelta: f64,

    /// Frequency-ordered power values
    pub magnitudes: Vec<f32>,
}

/// Swap the two halves of an even-length spectrum in place
///
/// Applying it twice restores the original order.
pub fn fft_shift<T>(bins: &mut [T]) {
    let half = bins.len() / 2;
    bins.rotate_left(half);
}

/// Running power accumulator with a publish cadence
pub struct PowerAverager {
    /// Per-cycle power |X[k]|² in transform order
    power: Vec<f64>,

    /// Decaying average in frequency order
    accumulator: Vec<f32>,

    /// Cycles accumulated since the last publish
    blocks_since_publish: usize,

    /// Cycles between publishes (>= 1)
    publish_every: usize,
}

impl PowerAverager {
    /// Create new averager
    ///
    /// # Arguments
    /// * `fft_size` - Number of bins (must be even)
    /// * `publish_every` - Cycles between emitted frames (clamped to >= 1)
    pub fn new(fft_size: usize, publish_every: usize) -> Self {
        Self {
            power: vec![0.0; fft_size],
            accumulator: vec![0.0; fft_size],
            blocks_since_publish: 0,
            publish_every: publish_every.max(1),
        }
    }

    /// Fold one transform output into the average
    ///
    /// # Arguments
    /// * `spectrum` - FFT output, DC first
    /// * `tuning` - Tuning in effect, used to label a published frame
    ///
    /// # Returns
    /// A frame every `publish_every` calls, `None` otherwise
    pub fn accumulate(
        &mut self,
        spectrum: &[Complex<f64>],
        tuning: TuningState,
    ) -> Option<SpectrumFrame> {
        for (p, c) in self.power.iter_mut().zip(spectrum.iter()) {
            *p = c.re * c.re + c.im * c.im;
        }

        // negative frequencies first, then positive
        fft_shift(&mut self.power);
        for (acc, &p) in self.accumulator.iter_mut().zip(self.power.iter()) {
            *acc = ((*acc as f64 + p) / 2.0) as f32;
        }

        self.blocks_since_publish += 1;
        if self.blocks_since_publish < self.publish_every {
            return None;
        }

        let frame = SpectrumFrame {
            xstart: tuning.xstart(),
            xdelta: tuning.xdelta(self.accumulator.len()),
            magnitudes: self.accumulator.clone(),
        };

        self.accumulator.fill(0.0);
        self.blocks_since_publish = 0;

        Some(frame)
    }

    /// Current accumulator contents (frequency order)
    pub fn accumulator(&self) -> &[f32] {
        &self.accumulator
    }

    /// Cycles accumulated since the last publish
    pub fn blocks_since_publish(&self) -> usize {
        self.blocks_since_publish
    }

    /// Publish cadence
    pub fn publish_every(&self) -> usize {
        self.publish_every
    }

    /// Number of bins
    pub fn fft_size(&self) -> usize {
        self.accumulator.len()
    }
}
