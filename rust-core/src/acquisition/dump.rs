//! Debug capture of intermediate pipeline data
//!
//! | File     | Contents                              | Format            |
//! |----------|---------------------------------------|-------------------|
//! | `win.sd` | window coefficients                   | LE f64            |
//! | `raw.cd` | conditioned input, every cycle        | LE f64 (re, im)   |
//! | `fft.cd` | transform output, every cycle         | LE f64 (re, im)   |
//! | `psd.cd` | averaged power, first published frame | LE f32            |

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use num_complex::Complex;

/// Writers for the debug capture files
pub struct DebugDump {
    raw: BufWriter<File>,
    fft: BufWriter<File>,
    psd: BufWriter<File>,
}

impl DebugDump {
    /// Create the capture files in `dir` and write the window
    pub fn create(dir: &Path, window: &[f64]) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let mut win = BufWriter::new(File::create(dir.join("win.sd"))?);
        for &w in window {
            win.write_all(&w.to_le_bytes())?;
        }
        win.flush()?;

        Ok(Self {
            raw: BufWriter::new(File::create(dir.join("raw.cd"))?),
            fft: BufWriter::new(File::create(dir.join("fft.cd"))?),
            psd: BufWriter::new(File::create(dir.join("psd.cd"))?),
        })
    }

    pub fn write_raw(&mut self, samples: &[Complex<f64>]) -> io::Result<()> {
        write_complex(&mut self.raw, samples)
    }

    pub fn write_fft(&mut self, spectrum: &[Complex<f64>]) -> io::Result<()> {
        write_complex(&mut self.fft, spectrum)
    }

    /// Append the averaged power and flush every file
    pub fn write_psd(&mut self, magnitudes: &[f32]) -> io::Result<()> {
        for &m in magnitudes {
            self.psd.write_all(&m.to_le_bytes())?;
        }
        self.raw.flush()?;
        self.fft.flush()?;
        self.psd.flush()
    }
}

fn write_complex<W: Write>(writer: &mut W, values: &[Complex<f64>]) -> io::Result<()> {
    for c in values {
        writer.write_all(&c.re.to_le_bytes())?;
        writer.write_all(&c.im.to_le_bytes())?;
    }
    Ok(())
}
