//! Spectral analysis with FFT

pub mod fft;
pub mod windows;
pub mod windowing;
pub mod averager;

use thiserror::Error;

pub use fft::SpectralTransformer;
pub use windows::{WindowError, WindowType, generate_named_window, generate_window};
pub use windowing::condition;
pub use averager::{PowerAverager, SpectrumFrame, fft_shift};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpectrumError {
    #[error("Buffer length mismatch: raw {raw} bytes, window {window}, output {output}")]
    LengthMismatch {
        raw: usize,
        window: usize,
        output: usize,
    },
}
