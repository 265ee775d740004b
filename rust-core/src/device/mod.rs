//! Radio receiver access
//!
//! A `Device` delivers raw interleaved unsigned 8-bit I/Q blocks and accepts
//! tuning commands. Two drivers are provided: an rtl_tcp network client and
//! a plain byte-stream reader (file or stdin).

pub mod reader;
pub mod rtl_tcp;

use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub use reader::IqReaderDevice;
pub use rtl_tcp::RtlTcpDevice;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No supported devices found")]
    NoDevice,

    #[error("Device index {index} out of range ({count} device(s) found)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Invalid device source: {0}")]
    InvalidSource(String),

    #[error("Failed to open device {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Not an rtl_tcp server (magic {0:?})")]
    BadMagic([u8; 4]),

    #[error("Short read, samples lost: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Sync read failed: {0}")]
    Read(#[source] io::Error),

    #[error("Command {command:#04x} failed: {source}")]
    Command {
        command: u8,
        #[source]
        source: io::Error,
    },
}

/// Frequency settings currently in effect on the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TuningState {
    pub center_frequency_hz: u32,
    pub sample_rate_hz: u32,
}

impl TuningState {
    /// Frequency of the lowest displayed bin (Hz)
    pub fn xstart(&self) -> f64 {
        self.center_frequency_hz as f64 - self.sample_rate_hz as f64 / 2.0
    }

    /// Bin spacing for an `fft_size`-point transform (Hz)
    pub fn xdelta(&self, fft_size: usize) -> f64 {
        self.sample_rate_hz as f64 / fft_size as f64
    }
}

/// Tuner gain control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    /// Automatic gain control
    Auto,

    /// Fixed gain in tenths of a dB
    Manual { tenths_db: i32 },
}

impl GainMode {
    /// Gain from a dB value; 0 selects automatic gain
    pub fn from_db(db: f64) -> Self {
        let tenths_db = (db * 10.0) as i32;
        if tenths_db == 0 {
            GainMode::Auto
        } else {
            GainMode::Manual { tenths_db }
        }
    }
}

/// Aborts an in-flight `read_block` from another thread
#[derive(Clone, Default)]
pub struct Canceller {
    hook: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Canceller {
    pub fn new(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Arc::new(hook)),
        }
    }

    /// Canceller for devices whose reads always complete
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if let Some(hook) = &self.hook {
            hook();
        }
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("active", &self.hook.is_some())
            .finish()
    }
}

/// Receiver delivering raw I/Q blocks
pub trait Device: Send {
    /// Human-readable device name
    fn name(&self) -> String;

    /// Fill `buf` completely with interleaved I/Q bytes
    ///
    /// Blocks until the buffer is full. A stream that ends early yields
    /// `DeviceError::ShortRead`.
    fn read_block(&mut self, buf: &mut [u8]) -> Result<(), DeviceError>;

    fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError>;

    fn center_frequency(&self) -> u32;

    fn set_sample_rate(&mut self, hz: u32) -> Result<(), DeviceError>;

    fn sample_rate(&self) -> u32;

    fn set_gain(&mut self, gain: GainMode) -> Result<(), DeviceError>;

    /// Handle that interrupts a blocking read
    fn canceller(&self) -> Canceller;

    fn tuning(&self) -> TuningState {
        TuningState {
            center_frequency_hz: self.center_frequency(),
            sample_rate_hz: self.sample_rate(),
        }
    }
}

/// Read from `reader` until `buf` is full or the stream ends
pub(crate) fn fill_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DeviceError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DeviceError::Read(e)),
        }
    }

    if filled != buf.len() {
        return Err(DeviceError::ShortRead {
            expected: buf.len(),
            actual: filled,
        });
    }
    Ok(())
}

/// Where raw samples come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSource {
    /// rtl_tcp server, `tcp://host:port`
    RtlTcp(String),

    /// Raw I/Q on standard input, `-`
    Stdin,

    /// Raw I/Q file
    File(PathBuf),
}

impl DeviceSource {
    /// Open the source as a device
    pub fn open(&self) -> Result<Box<dyn Device>, DeviceError> {
        match self {
            DeviceSource::RtlTcp(addr) => Ok(Box::new(RtlTcpDevice::connect(addr)?)),
            DeviceSource::Stdin => Ok(Box::new(IqReaderDevice::stdin())),
            DeviceSource::File(path) => Ok(Box::new(IqReaderDevice::open_file(path)?)),
        }
    }
}

impl FromStr for DeviceSource {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DeviceError::InvalidSource(s.to_string()));
        }
        if s == "-" {
            return Ok(DeviceSource::Stdin);
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() || !addr.contains(':') {
                return Err(DeviceError::InvalidSource(s.to_string()));
            }
            return Ok(DeviceSource::RtlTcp(addr.to_string()));
        }
        Ok(DeviceSource::File(PathBuf::from(s)))
    }
}

impl fmt::Display for DeviceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSource::RtlTcp(addr) => write!(f, "tcp://{}", addr),
            DeviceSource::Stdin => write!(f, "-"),
            DeviceSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Pick the source at `index`
pub fn select_source(sources: &[DeviceSource], index: usize) -> Result<&DeviceSource, DeviceError> {
    if sources.is_empty() {
        return Err(DeviceError::NoDevice);
    }
    sources.get(index).ok_or(DeviceError::IndexOutOfRange {
        index,
        count: sources.len(),
    })
}
