//! Raw I/Q byte-stream device
//!
//! Reads interleaved unsigned 8-bit I/Q from a file or standard input, e.g.
//! `rtl_sdr -f 100e6 -s 2.048e6 - | rtl_web --source -`. The stream cannot
//! be retuned, so tuning calls only relabel it.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

use super::{fill_block, Canceller, Device, DeviceError, GainMode, TuningState};

/// Device backed by any byte reader
pub struct IqReaderDevice<R: Read + Send> {
    name: String,
    reader: BufReader<R>,
    tuning: TuningState,
}

impl<R: Read + Send> IqReaderDevice<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader: BufReader::new(reader),
            tuning: TuningState::default(),
        }
    }
}

impl IqReaderDevice<File> {
    /// Open a raw capture file
    pub fn open_file(path: &Path) -> Result<Self, DeviceError> {
        let file = File::open(path).map_err(|source| DeviceError::Open {
            name: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(path.display().to_string(), file))
    }
}

impl IqReaderDevice<io::Stdin> {
    pub fn stdin() -> Self {
        Self::new("stdin", io::stdin())
    }
}

impl<R: Read + Send> Device for IqReaderDevice<R> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn read_block(&mut self, buf: &mut [u8]) -> Result<(), DeviceError> {
        fill_block(&mut self.reader, buf)
    }

    fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError> {
        debug!("{}: labelling stream as centered on {} Hz", self.name, hz);
        self.tuning.center_frequency_hz = hz;
        Ok(())
    }

    fn center_frequency(&self) -> u32 {
        self.tuning.center_frequency_hz
    }

    fn set_sample_rate(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.tuning.sample_rate_hz = hz;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.tuning.sample_rate_hz
    }

    fn set_gain(&mut self, _gain: GainMode) -> Result<(), DeviceError> {
        Ok(())
    }

    fn canceller(&self) -> Canceller {
        // Reads end at EOF; the stop flag is checked after each block
        Canceller::noop()
    }
}
