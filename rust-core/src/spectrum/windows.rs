//! Window functions for spectral analysis
//!
//! Every supported window is a member of the raised-cosine family
//! w[n] = d0 + d1*cos(c) + d2*cos(2c) + d3*cos(3c), c = 2πn/N

use std::f64::consts::PI;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Unsupported window kind: {0}")]
    UnsupportedWindowKind(String),
}

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Hann window: w[n] = 0.5 - 0.5*cos(2πn/N)
    /// Periodic form, zero at n = 0, unity at n = N/2
    Hann,

    /// Rectangular window (no windowing)
    Rectangular,
}

impl WindowType {
    /// Resolve a window by name (case-insensitive)
    ///
    /// Accepts "hann", "hanning" and "rectangular"
    pub fn from_name(name: &str) -> Result<Self, WindowError> {
        match name.to_ascii_lowercase().as_str() {
            "hann" | "hanning" => Ok(WindowType::Hann),
            "rectangular" | "rect" => Ok(WindowType::Rectangular),
            _ => Err(WindowError::UnsupportedWindowKind(name.to_string())),
        }
    }

    /// Cosine-sum coefficients (d0, d1, d2, d3)
    pub fn coefficients(&self) -> [f64; 4] {
        match self {
            WindowType::Hann => [0.5, -0.5, 0.0, 0.0],
            WindowType::Rectangular => [1.0, 0.0, 0.0, 0.0],
        }
    }
}

impl std::str::FromStr for WindowType {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Evaluate the closed-form window value at index `n`
fn cosine_sum(d: &[f64; 4], n: usize, length: usize) -> f64 {
    let c = 2.0 * PI * n as f64 / length as f64;
    d[3] * (3.0 * c).cos() + d[2] * (2.0 * c).cos() + d[1] * c.cos() + d[0]
}

/// Generate window coefficients
///
/// # Arguments
/// * `window_type` - Type of window function
/// * `length` - Number of samples (N)
///
/// # Returns
/// Vector of window coefficients w[n] for n = 0..N-1
///
/// For even N only the first N/2 + 1 values are evaluated; the remainder
/// is mirrored with w[n] = w[N - n], which is exact for the periodic form.
pub fn generate_window(window_type: WindowType, length: usize) -> Vec<f64> {
    let d = window_type.coefficients();
    let mut window = vec![0.0; length];

    let direct = if length % 2 == 0 {
        length / 2 + 1
    } else {
        length
    };
    let direct = direct.min(length);

    for n in 0..direct {
        window[n] = cosine_sum(&d, n, length);
    }
    for n in direct..length {
        window[n] = window[length - n];
    }

    window
}

/// Generate a window by name
///
/// Fails with `UnsupportedWindowKind` for unknown names
pub fn generate_named_window(name: &str, length: usize) -> Result<Vec<f64>, WindowError> {
    Ok(generate_window(WindowType::from_name(name)?, length))
}
