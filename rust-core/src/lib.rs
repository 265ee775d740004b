//! rtl_web - Real-Time I/Q Spectrum Server
//!
//! Pulls raw I/Q blocks from an RTL-SDR receiver, computes averaged power
//! spectra and streams them to WebSocket clients, which can retune the
//! receiver over a control channel.

pub mod acquisition;
pub mod app;
pub mod config;
pub mod device;
pub mod server;
pub mod spectrum;

pub use acquisition::AcquisitionLoop;
pub use config::ServerConfig;
pub use device::{Device, DeviceSource, TuningState};
pub use server::Broadcaster;
pub use spectrum::{PowerAverager, SpectralTransformer, SpectrumFrame, WindowType};
