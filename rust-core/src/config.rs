//! Server configuration

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

use crate::device::{DeviceSource, GainMode};

pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_FREQUENCY_HZ: u32 = 100_000_000;
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 2_048_000;
pub const DEFAULT_FFT_SIZE: usize = 65536;
pub const DEFAULT_AVERAGES: usize = 10;
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("FFT size must be even and at least 2 (got {0})")]
    InvalidFftSize(usize),

    #[error("Number of averages must be at least 1")]
    InvalidAverages,

    #[error("Session queue depth must be at least 1")]
    InvalidQueueDepth,

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("{what} out of range: {value} Hz")]
    InvalidFrequency { what: &'static str, value: f64 },
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Listen address (IP literal)
    pub listen_addr: String,

    /// Listen port
    pub port: u16,

    /// Center frequency tuned at startup (Hz)
    pub frequency_hz: u32,

    /// Tuner gain
    pub gain: GainMode,

    /// Sample rate (Hz)
    pub sample_rate_hz: u32,

    /// Transform size N (complex samples per block)
    pub fft_size: usize,

    /// Index into `sources`
    pub device_index: usize,

    /// Candidate sample sources
    pub sources: Vec<DeviceSource>,

    /// Blocks averaged per published frame
    pub publish_every: usize,

    /// Outbound messages buffered per session
    pub queue_depth: usize,

    /// Analysis window name
    pub window: String,

    /// Capture debug files here, then stop after the first frame
    pub dump_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            gain: GainMode::Auto,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            fft_size: DEFAULT_FFT_SIZE,
            device_index: 0,
            sources: Vec::new(),
            publish_every: DEFAULT_AVERAGES,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            window: "hann".to_string(),
            dump_dir: None,
        }
    }
}

impl ServerConfig {
    /// Check invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fft_size < 2 || self.fft_size % 2 != 0 {
            return Err(ConfigError::InvalidFftSize(self.fft_size));
        }
        if self.publish_every == 0 {
            return Err(ConfigError::InvalidAverages);
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidQueueDepth);
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.listen_addr.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Convert a frequency given in Hz as a real number (e.g. `100e6`)
pub fn hz_from_f64(what: &'static str, value: f64) -> Result<u32, ConfigError> {
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return Err(ConfigError::InvalidFrequency { what, value });
    }
    Ok(value as u32)
}
