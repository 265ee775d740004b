//! Sample conditioning for spectral analysis
//!
//! Converts raw interleaved unsigned 8-bit I/Q samples into a centered,
//! windowed complex buffer ready for the FFT

use num_complex::Complex;
use super::SpectrumError;

/// DC offset of unsigned 8-bit samples
pub const U8_SAMPLE_OFFSET: f64 = 127.5;

/// Condition a raw I/Q block into `output`
///
/// # Arguments
/// * `raw` - Interleaved I/Q bytes (2N values)
/// * `window` - Window coefficients (N values)
/// * `output` - Complex buffer to overwrite (N values)
///
/// For each i: re = (raw[2i] - 127.5) * w[i], im = (raw[2i+1] - 127.5) * w[i]
pub fn condition(
    raw: &[u8],
    window: &[f64],
    output: &mut [Complex<f64>],
) -> Result<(), SpectrumError> {
    if raw.len() != window.len() * 2 || output.len() != window.len() {
        return Err(SpectrumError::LengthMismatch {
            raw: raw.len(),
            window: window.len(),
            output: output.len(),
        });
    }

    for ((out, iq), &w) in output.iter_mut().zip(raw.chunks_exact(2)).zip(window.iter()) {
        out.re = (iq[0] as f64 - U8_SAMPLE_OFFSET) * w;
        out.im = (iq[1] as f64 - U8_SAMPLE_OFFSET) * w;
    }

    Ok(())
}

/// Condition a raw block into a freshly allocated buffer
pub fn condition_to_vec(raw: &[u8], window: &[f64]) -> Result<Vec<Complex<f64>>, SpectrumError> {
    let mut output = vec![Complex::new(0.0, 0.0); window.len()];
    condition(raw, window, &mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_length() {
        let raw = vec![200u8; 64];
        let window = vec![1.0; 32];
        let out = condition_to_vec(&raw, &window).unwrap();

        assert_eq!(out.len(), 32);
        assert!(out.iter().all(|c| c.re == 72.5 && c.im == 72.5));
    }

    #[test]
    fn test_condition_centering() {
        // 127 and 128 straddle the 127.5 midpoint
        let raw = vec![127u8, 128, 128, 127];
        let window = vec![1.0, 1.0];
        let out = condition_to_vec(&raw, &window).unwrap();

        assert_eq!(out[0], Complex::new(-0.5, 0.5));
        assert_eq!(out[1], Complex::new(0.5, -0.5));

        // Window of zeros cancels everything
        let out = condition_to_vec(&raw, &[0.0, 0.0]).unwrap();
        assert!(out.iter().all(|c| c.re == 0.0 && c.im == 0.0));
    }

    #[test]
    fn test_condition_reference_block() {
        let raw = [127u8, 127, 255, 127, 0, 127, 127, 0];
        let window = [1.0; 4];
        let out = condition_to_vec(&raw, &window).unwrap();

        assert_eq!(
            out,
            vec![
                Complex::new(-0.5, -0.5),
                Complex::new(127.5, -0.5),
                Complex::new(-127.5, -0.5),
                Complex::new(-0.5, -127.5),
            ]
        );
    }

    #[test]
    fn test_condition_applies_window() {
        let raw = [255u8, 0, 255, 0];
        let window = [0.5, 2.0];
        let out = condition_to_vec(&raw, &window).unwrap();

        assert_eq!(out[0], Complex::new(63.75, -63.75));
        assert_eq!(out[1], Complex::new(255.0, -255.0));
    }

    #[test]
    fn test_condition_length_mismatch() {
        let mut out = vec![Complex::new(0.0, 0.0); 4];
        let result = condition(&[0u8; 6], &[1.0; 4], &mut out);
        assert!(matches!(result, Err(SpectrumError::LengthMismatch { .. })));
    }
}
