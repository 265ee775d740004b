//! Acquisition loop - keeps the hot path on one thread
//!
//! Each cycle: apply queued tune requests → read block → condition →
//! FFT → accumulate → publish (every `publish_every` cycles)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::dump::DebugDump;
use crate::config::ServerConfig;
use crate::device::{Device, DeviceError};
use crate::server::{SharedBroadcaster, TuneRequest};
use crate::spectrum::{
    condition, generate_named_window, PowerAverager, SpectralTransformer, SpectrumError,
    WindowError,
};

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Spectrum(#[from] SpectrumError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("Debug dump failed: {0}")]
    Dump(#[source] std::io::Error),
}

/// Result of a single cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Block folded into the average
    Accumulated,

    /// A frame (or handshake) was fanned out
    Published,

    /// Debug capture finished; the loop should stop
    DumpComplete,
}

/// Drives the device → spectrum → broadcast pipeline
///
/// Owns the device and every per-cycle buffer. The broadcaster is only
/// locked around `publish` and `retuned`.
pub struct AcquisitionLoop {
    /// Receiver, exclusively owned by the loop
    device: Box<dyn Device>,

    /// Window coefficients (computed once)
    window: Vec<f64>,

    /// FFT plan and buffers
    transformer: SpectralTransformer,

    /// Running power average and publish gate
    averager: PowerAverager,

    /// Raw I/Q block (2N bytes)
    raw: Vec<u8>,

    /// Session layer
    broadcaster: SharedBroadcaster,

    /// Tune requests from control sessions
    tune_rx: Receiver<TuneRequest>,

    /// Stop flag, observed at the top of each cycle
    stop: Arc<AtomicBool>,

    /// Optional debug capture
    dump: Option<DebugDump>,
}

impl AcquisitionLoop {
    /// Create new acquisition loop
    ///
    /// Fails with `UnsupportedWindowKind` if `config.window` is unknown.
    pub fn new(
        device: Box<dyn Device>,
        config: &ServerConfig,
        broadcaster: SharedBroadcaster,
        tune_rx: Receiver<TuneRequest>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, AcquisitionError> {
        let n = config.fft_size;
        let window = generate_named_window(&config.window, n)?;

        let dump = match &config.dump_dir {
            Some(dir) => {
                info!("Writing debug captures to {}", dir.display());
                Some(DebugDump::create(dir, &window).map_err(AcquisitionError::Dump)?)
            }
            None => None,
        };

        Ok(Self {
            device,
            window,
            transformer: SpectralTransformer::new(n),
            averager: PowerAverager::new(n, config.publish_every),
            raw: vec![0u8; n * 2],
            broadcaster,
            tune_rx,
            stop,
            dump,
        })
    }

    /// Run until stopped, the capture completes, or the device fails
    ///
    /// A read error after the stop flag is set is treated as the
    /// cancellation it caused, not a failure.
    pub fn run(mut self) -> Result<(), AcquisitionError> {
        info!("Starting serving");

        while !self.stop.load(Ordering::SeqCst) {
            match self.step() {
                Ok(CycleOutcome::DumpComplete) => {
                    info!("Debug capture complete");
                    break;
                }
                Ok(_) => {}
                Err(AcquisitionError::Device(e)) if self.stop.load(Ordering::SeqCst) => {
                    debug!("read interrupted by shutdown: {}", e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!("Acquisition stopped");
        Ok(())
    }

    /// Run one acquisition cycle
    pub fn step(&mut self) -> Result<CycleOutcome, AcquisitionError> {
        self.apply_tune_requests();

        self.device.read_block(&mut self.raw)?;
        condition(&self.raw, &self.window, self.transformer.input_mut())?;

        if let Some(dump) = self.dump.as_mut() {
            dump.write_raw(self.transformer.input_mut())
                .map_err(AcquisitionError::Dump)?;
        }

        let spectrum = self.transformer.transform();

        if let Some(dump) = self.dump.as_mut() {
            dump.write_fft(spectrum).map_err(AcquisitionError::Dump)?;
        }

        let tuning = self.device.tuning();
        let Some(frame) = self.averager.accumulate(spectrum, tuning) else {
            trace!(
                "accumulated block {}/{}",
                self.averager.blocks_since_publish(),
                self.averager.publish_every()
            );
            return Ok(CycleOutcome::Accumulated);
        };

        if let Ok(mut broadcaster) = self.broadcaster.lock() {
            broadcaster.publish(&frame);
        }

        if let Some(dump) = self.dump.as_mut() {
            dump.write_psd(&frame.magnitudes)
                .map_err(AcquisitionError::Dump)?;
            return Ok(CycleOutcome::DumpComplete);
        }

        Ok(CycleOutcome::Published)
    }

    /// Apply every tune request queued since the last cycle
    fn apply_tune_requests(&mut self) {
        while let Ok(request) = self.tune_rx.try_recv() {
            match self.device.set_center_frequency(request.frequency_hz) {
                Ok(()) => {
                    info!("Tuned to {} Hz.", request.frequency_hz);
                    let tuning = self.device.tuning();
                    if let Ok(mut broadcaster) = self.broadcaster.lock() {
                        broadcaster.retuned(tuning);
                    }
                }
                Err(e) => warn!("Failed to set center freq to {} Hz: {}", request.frequency_hz, e),
            }
        }
    }

    /// Window coefficients in use
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Running average (frequency order)
    pub fn accumulator(&self) -> &[f32] {
        self.averager.accumulator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Canceller, GainMode, IqReaderDevice, TuningState};
    use crate::server::{Broadcaster, ChannelKind, Outbound, SessionEvent};
    use bytes::Bytes;
    use crossbeam_channel::{unbounded, Sender};
    use std::io::Cursor;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Device whose retunes can be made to fail
    struct FlakyTuner {
        inner: IqReaderDevice<Cursor<Vec<u8>>>,
        refuse_tuning: bool,
    }

    impl Device for FlakyTuner {
        fn name(&self) -> String {
            "flaky".to_string()
        }
        fn read_block(&mut self, buf: &mut [u8]) -> Result<(), DeviceError> {
            self.inner.read_block(buf)
        }
        fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError> {
            if self.refuse_tuning {
                return Err(DeviceError::Command {
                    command: 0x01,
                    source: std::io::Error::new(std::io::ErrorKind::Other, "PLL not locked"),
                });
            }
            self.inner.set_center_frequency(hz)
        }
        fn center_frequency(&self) -> u32 {
            self.inner.center_frequency()
        }
        fn set_sample_rate(&mut self, hz: u32) -> Result<(), DeviceError> {
            self.inner.set_sample_rate(hz)
        }
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }
        fn set_gain(&mut self, gain: GainMode) -> Result<(), DeviceError> {
            self.inner.set_gain(gain)
        }
        fn canceller(&self) -> Canceller {
            Canceller::noop()
        }
    }

    struct Harness {
        acquisition: AcquisitionLoop,
        broadcaster: SharedBroadcaster,
        tune_tx: Sender<TuneRequest>,
        stop: Arc<AtomicBool>,
    }

    fn harness(blocks: usize, config: ServerConfig, refuse_tuning: bool) -> Harness {
        let n = config.fft_size;
        let mut inner = IqReaderDevice::new("memory", Cursor::new(vec![200u8; blocks * n * 2]));
        inner.set_sample_rate(2_048_000).unwrap();
        inner.set_center_frequency(100_000_000).unwrap();
        let device = FlakyTuner { inner, refuse_tuning };

        let (tune_tx, tune_rx) = unbounded();
        let broadcaster = Arc::new(Mutex::new(Broadcaster::new(device.tuning(), n, tune_tx.clone())));
        let stop = Arc::new(AtomicBool::new(false));

        let acquisition = AcquisitionLoop::new(
            Box::new(device),
            &config,
            Arc::clone(&broadcaster),
            tune_rx,
            Arc::clone(&stop),
        )
        .unwrap();

        Harness { acquisition, broadcaster, tune_tx, stop }
    }

    fn small_config(publish_every: usize) -> ServerConfig {
        ServerConfig {
            fft_size: 8,
            publish_every,
            ..Default::default()
        }
    }

    fn feed(broadcaster: &SharedBroadcaster) -> mpsc::Receiver<Outbound> {
        let (tx, mut rx) = mpsc::channel(64);
        let mut b = broadcaster.lock().unwrap();
        let id = b.register(ChannelKind::SpectrumFeed, tx);
        b.handle_event(id, SessionEvent::Established);
        drop(b);
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Handshake(_)));
        rx
    }

    #[test]
    fn test_publish_cadence() {
        let mut h = harness(9, small_config(3), false);
        let outcomes: Vec<_> = (0..9).map(|_| h.acquisition.step().unwrap()).collect();

        let published = outcomes
            .iter()
            .filter(|&&o| o == CycleOutcome::Published)
            .count();
        assert_eq!(published, 3);
        assert_eq!(outcomes[2], CycleOutcome::Published);
        assert!(h.acquisition.accumulator().iter().all(|&a| a == 0.0));
    }

    #[test]
    fn test_short_read_is_fatal() {
        let h = harness(2, small_config(10), false);
        let result = h.acquisition.run();
        assert!(matches!(
            result,
            Err(AcquisitionError::Device(DeviceError::ShortRead { .. }))
        ));
    }

    #[test]
    fn test_stop_flag_exits_cleanly() {
        let h = harness(2, small_config(1), false);
        h.stop.store(true, Ordering::SeqCst);
        assert!(h.acquisition.run().is_ok());
    }

    /// Device whose read is aborted by shutdown while in flight
    struct CancelledRead {
        stop: Arc<AtomicBool>,
    }

    impl Device for CancelledRead {
        fn name(&self) -> String {
            "cancelled".to_string()
        }
        fn read_block(&mut self, _buf: &mut [u8]) -> Result<(), DeviceError> {
            self.stop.store(true, Ordering::SeqCst);
            Err(DeviceError::ShortRead { expected: 16, actual: 0 })
        }
        fn set_center_frequency(&mut self, _hz: u32) -> Result<(), DeviceError> {
            Ok(())
        }
        fn center_frequency(&self) -> u32 {
            100_000_000
        }
        fn set_sample_rate(&mut self, _hz: u32) -> Result<(), DeviceError> {
            Ok(())
        }
        fn sample_rate(&self) -> u32 {
            2_048_000
        }
        fn set_gain(&mut self, _gain: GainMode) -> Result<(), DeviceError> {
            Ok(())
        }
        fn canceller(&self) -> Canceller {
            Canceller::noop()
        }
    }

    #[test]
    fn test_read_error_after_stop_exits_cleanly() {
        let stop = Arc::new(AtomicBool::new(false));
        let device = CancelledRead { stop: Arc::clone(&stop) };
        let (tx, rx) = unbounded();
        let broadcaster = Arc::new(Mutex::new(Broadcaster::new(device.tuning(), 8, tx)));

        let acquisition = AcquisitionLoop::new(
            Box::new(device),
            &small_config(1),
            broadcaster,
            rx,
            Arc::clone(&stop),
        )
        .unwrap();

        assert!(acquisition.run().is_ok());
        assert!(stop.load(Ordering::SeqCst));
    }

    #[test]
    fn test_retune_announced_before_next_frame() {
        let mut h = harness(3, small_config(1), false);
        let mut rx = feed(&h.broadcaster);

        h.acquisition.step().unwrap();
        assert!(matches!(rx.try_recv().unwrap(), Outbound::DataFrame(_)));

        h.tune_tx.send(TuneRequest { frequency_hz: 100_500_000 }).unwrap();
        h.acquisition.step().unwrap();

        let expected = TuningState {
            center_frequency_hz: 100_500_000,
            sample_rate_hz: 2_048_000,
        };
        match rx.try_recv().unwrap() {
            Outbound::Handshake(handshake) => {
                assert_eq!(handshake.xstart, expected.xstart());
                assert_eq!(handshake.xdelta, expected.xdelta(8));
            }
            other => panic!("expected handshake, got {:?}", other),
        }
        assert_eq!(h.broadcaster.lock().unwrap().tuning(), expected);

        h.acquisition.step().unwrap();
        assert!(matches!(rx.try_recv().unwrap(), Outbound::DataFrame(_)));
    }

    #[test]
    fn test_failed_retune_leaves_tuning() {
        let mut h = harness(2, small_config(1), true);
        let mut rx = feed(&h.broadcaster);

        h.tune_tx.send(TuneRequest { frequency_hz: 433_920_000 }).unwrap();
        h.acquisition.step().unwrap();

        assert_eq!(h.broadcaster.lock().unwrap().tuning().center_frequency_hz, 100_000_000);
        assert!(matches!(rx.try_recv().unwrap(), Outbound::DataFrame(_)));
    }

    #[test]
    fn test_unknown_window_rejected() {
        let (tx, rx) = unbounded();
        let broadcaster = Arc::new(Mutex::new(Broadcaster::new(TuningState::default(), 8, tx)));
        let config = ServerConfig {
            fft_size: 8,
            window: "kaiser".to_string(),
            ..Default::default()
        };
        let device = IqReaderDevice::new("memory", Cursor::new(Vec::new()));

        let result = AcquisitionLoop::new(
            Box::new(device),
            &config,
            broadcaster,
            rx,
            Arc::new(AtomicBool::new(false)),
        );
        assert!(matches!(
            result,
            Err(AcquisitionError::Window(WindowError::UnsupportedWindowKind(_)))
        ));
    }

    #[test]
    fn test_control_message_to_retune() {
        let mut h = harness(2, small_config(1), false);
        let mut rx = feed(&h.broadcaster);

        let (tx, _control_rx) = mpsc::channel(4);
        {
            let mut b = h.broadcaster.lock().unwrap();
            let id = b.register(ChannelKind::Control, tx);
            b.handle_event(id, SessionEvent::Established);
            b.handle_event(
                id,
                SessionEvent::Message(Bytes::from_static(br#"{"frequency_hz": 100500000}"#)),
            );
        }

        assert_eq!(h.acquisition.step().unwrap(), CycleOutcome::Published);
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Handshake(_)));
    }
}
