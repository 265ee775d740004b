//! Server startup and shutdown
//!
//! Opens the device, applies startup tuning, then runs the acquisition loop
//! on a dedicated thread next to the WebSocket server until either ends or
//! the process is interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::acquisition::{AcquisitionError, AcquisitionLoop};
use crate::config::{ConfigError, ServerConfig};
use crate::device::{select_source, Device, DeviceError, GainMode};
use crate::server::{websocket, Broadcaster, ServerError};

/// How long to wait for a blocked read after cancellation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Acquisition thread failed: {0}")]
    Join(String),
}

/// Open the configured device and apply startup settings
///
/// Failed tuning calls are logged and do not abort startup.
pub fn open_device(config: &ServerConfig) -> Result<Box<dyn Device>, DeviceError> {
    info!("Found {} device(s).", config.sources.len());
    let source = select_source(&config.sources, config.device_index)?;

    let mut device = source.open()?;
    info!("Using {}", device.name());

    if let Err(e) = device.set_sample_rate(config.sample_rate_hz) {
        warn!("Failed to set sample rate: {}", e);
    }

    match device.set_center_frequency(config.frequency_hz) {
        Ok(()) => info!("Tuned to {} Hz.", config.frequency_hz),
        Err(e) => warn!("Failed to set center freq: {}", e),
    }

    match (config.gain, device.set_gain(config.gain)) {
        (GainMode::Auto, Ok(())) => info!("Automatic gain enabled"),
        (GainMode::Manual { tenths_db }, Ok(())) => {
            info!("Tuner gain set to {:.1} dB.", tenths_db as f64 / 10.0)
        }
        (_, Err(e)) => warn!("Failed to set tuner gain: {}", e),
    }

    Ok(device)
}

/// Run the server until the device stops or ctrl-c is received
pub async fn run(config: ServerConfig) -> Result<(), AppError> {
    config.validate()?;
    let addr = config.socket_addr()?;

    let device = open_device(&config)?;
    let canceller = device.canceller();

    let (tune_tx, tune_rx) = crossbeam_channel::unbounded();
    let broadcaster = Arc::new(Mutex::new(Broadcaster::new(
        device.tuning(),
        config.fft_size,
        tune_tx,
    )));
    let stop = Arc::new(AtomicBool::new(false));

    let acquisition = AcquisitionLoop::new(
        device,
        &config,
        Arc::clone(&broadcaster),
        tune_rx,
        Arc::clone(&stop),
    )?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let router = websocket::router(Arc::clone(&broadcaster), config.queue_depth);
    let mut server = tokio::spawn(websocket::serve(addr, router, async move {
        let _ = shutdown_rx.await;
    }));

    // Plain thread: a read blocked on stdin must not hold up process exit
    let (done_tx, mut done_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("acquisition".to_string())
        .spawn(move || {
            let _ = done_tx.send(acquisition.run());
        })
        .map_err(|e| AppError::Join(e.to_string()))?;

    let halt = |reason: &str| {
        warn!("{}", reason);
        stop.store(true, Ordering::SeqCst);
        canceller.cancel();
    };

    let finished = tokio::select! {
        finished = &mut done_rx => Some(finished),
        served = &mut server => {
            halt("WebSocket server stopped, exiting!");
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, &mut done_rx).await;
            return match served {
                Ok(result) => result.map_err(AppError::from),
                Err(e) => Err(AppError::Join(e.to_string())),
            };
        }
        _ = tokio::signal::ctrl_c() => {
            halt("Signal caught, exiting!");
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut done_rx).await {
                Ok(finished) => Some(finished),
                Err(_) => {
                    warn!("Device read did not return, abandoning acquisition thread");
                    None
                }
            }
        }
    };

    let _ = shutdown_tx.send(());
    match server.await {
        Ok(result) => result?,
        Err(e) => return Err(AppError::Join(e.to_string())),
    }

    match finished {
        Some(Ok(result)) => result.map_err(AppError::from),
        Some(Err(_)) => Err(AppError::Join("acquisition thread panicked".to_string())),
        None => Ok(()),
    }
}
