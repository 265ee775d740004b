//! rtl_tcp network client
//!
//! Talks to an `rtl_tcp` server, which owns the RTL2832 dongle and streams
//! its raw unsigned 8-bit I/Q samples over TCP. Commands are 5 bytes:
//! a command id followed by a big-endian u32 parameter.

use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use tracing::debug;

use super::{fill_block, Canceller, Device, DeviceError, GainMode, TuningState};

const MAGIC: &[u8; 4] = b"RTL0";

const CMD_SET_FREQUENCY: u8 = 0x01;
const CMD_SET_SAMPLE_RATE: u8 = 0x02;
const CMD_SET_GAIN_MODE: u8 = 0x03;
const CMD_SET_GAIN: u8 = 0x04;

/// Dongle details announced in the rtl_tcp greeting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtlTcpInfo {
    pub tuner_type: u32,
    pub gain_count: u32,
}

impl RtlTcpInfo {
    pub fn tuner_name(&self) -> &'static str {
        match self.tuner_type {
            1 => "E4000",
            2 => "FC0012",
            3 => "FC0013",
            4 => "FC2580",
            5 => "R820T",
            6 => "R828D",
            _ => "unknown tuner",
        }
    }
}

/// Receiver reached through an rtl_tcp server
pub struct RtlTcpDevice {
    addr: String,
    /// Write half, used for commands
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    info: RtlTcpInfo,
    tuning: TuningState,
}

impl RtlTcpDevice {
    /// Connect and read the server greeting
    ///
    /// # Arguments
    /// * `addr` - Server address, e.g. "127.0.0.1:1235"
    pub fn connect(addr: &str) -> Result<Self, DeviceError> {
        let open_err = |source| DeviceError::Open {
            name: format!("tcp://{}", addr),
            source,
        };

        let stream = TcpStream::connect(addr).map_err(open_err)?;
        stream.set_nodelay(true).map_err(open_err)?;
        let mut reader = BufReader::new(stream.try_clone().map_err(open_err)?);

        let mut header = [0u8; 12];
        reader.read_exact(&mut header).map_err(open_err)?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[..4]);
        if &magic != MAGIC {
            return Err(DeviceError::BadMagic(magic));
        }

        let info = RtlTcpInfo {
            tuner_type: u32::from_be_bytes([header[4], header[5], header[6], header[7]]),
            gain_count: u32::from_be_bytes([header[8], header[9], header[10], header[11]]),
        };
        debug!(
            "rtl_tcp {}: {} with {} gain steps",
            addr,
            info.tuner_name(),
            info.gain_count
        );

        Ok(Self {
            addr: addr.to_string(),
            stream,
            reader,
            info,
            tuning: TuningState::default(),
        })
    }

    pub fn info(&self) -> RtlTcpInfo {
        self.info
    }

    fn send_command(&mut self, command: u8, param: u32) -> Result<(), DeviceError> {
        let mut packet = [0u8; 5];
        packet[0] = command;
        packet[1..].copy_from_slice(&param.to_be_bytes());

        self.stream
            .write_all(&packet)
            .map_err(|source| DeviceError::Command { command, source })
    }
}

impl Device for RtlTcpDevice {
    fn name(&self) -> String {
        format!("rtl_tcp://{} ({})", self.addr, self.info.tuner_name())
    }

    fn read_block(&mut self, buf: &mut [u8]) -> Result<(), DeviceError> {
        fill_block(&mut self.reader, buf)
    }

    fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.send_command(CMD_SET_FREQUENCY, hz)?;
        self.tuning.center_frequency_hz = hz;
        Ok(())
    }

    fn center_frequency(&self) -> u32 {
        self.tuning.center_frequency_hz
    }

    fn set_sample_rate(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.send_command(CMD_SET_SAMPLE_RATE, hz)?;
        self.tuning.sample_rate_hz = hz;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.tuning.sample_rate_hz
    }

    fn set_gain(&mut self, gain: GainMode) -> Result<(), DeviceError> {
        match gain {
            GainMode::Auto => self.send_command(CMD_SET_GAIN_MODE, 0),
            GainMode::Manual { tenths_db } => {
                self.send_command(CMD_SET_GAIN_MODE, 1)?;
                self.send_command(CMD_SET_GAIN, tenths_db as u32)
            }
        }
    }

    fn canceller(&self) -> Canceller {
        match self.stream.try_clone() {
            Ok(stream) => Canceller::new(move || {
                // Unblocks the reader with EOF
                let _ = stream.shutdown(Shutdown::Both);
            }),
            Err(_) => Canceller::noop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Fake rtl_tcp server: greets, streams `samples`, then returns the
    /// command bytes it received once the client hangs up.
    fn fake_server(samples: Vec<u8>, magic: [u8; 4]) -> (String, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut greeting = Vec::new();
            greeting.extend_from_slice(&magic);
            greeting.extend_from_slice(&5u32.to_be_bytes());
            greeting.extend_from_slice(&29u32.to_be_bytes());
            conn.write_all(&greeting).unwrap();
            conn.write_all(&samples).unwrap();

            let mut commands = Vec::new();
            let _ = conn.read_to_end(&mut commands);
            commands
        });

        (addr, handle)
    }

    #[test]
    fn test_greeting_and_samples() {
        let (addr, server) = fake_server((0..16).collect(), *MAGIC);
        let mut device = RtlTcpDevice::connect(&addr).unwrap();

        assert_eq!(device.info().tuner_name(), "R820T");
        assert_eq!(device.info().gain_count, 29);
        assert!(device.name().contains("R820T"));

        let mut block = [0u8; 8];
        device.read_block(&mut block).unwrap();
        assert_eq!(block, [0, 1, 2, 3, 4, 5, 6, 7]);
        device.read_block(&mut block).unwrap();
        assert_eq!(block, [8, 9, 10, 11, 12, 13, 14, 15]);

        drop(device);
        server.join().unwrap();
    }

    #[test]
    fn test_commands_encoding() {
        let (addr, server) = fake_server(Vec::new(), *MAGIC);
        let mut device = RtlTcpDevice::connect(&addr).unwrap();

        device.set_sample_rate(2_048_000).unwrap();
        device.set_center_frequency(100_500_000).unwrap();
        device.set_gain(GainMode::Manual { tenths_db: 496 }).unwrap();
        device.set_gain(GainMode::Auto).unwrap();

        assert_eq!(
            device.tuning(),
            TuningState {
                center_frequency_hz: 100_500_000,
                sample_rate_hz: 2_048_000,
            }
        );

        drop(device);
        let commands = server.join().unwrap();

        let mut expected = Vec::new();
        for (cmd, param) in [
            (CMD_SET_SAMPLE_RATE, 2_048_000u32),
            (CMD_SET_FREQUENCY, 100_500_000),
            (CMD_SET_GAIN_MODE, 1),
            (CMD_SET_GAIN, 496),
            (CMD_SET_GAIN_MODE, 0),
        ] {
            expected.push(cmd);
            expected.extend_from_slice(&param.to_be_bytes());
        }
        assert_eq!(commands, expected);
    }

    #[test]
    fn test_short_read_after_stream_ends() {
        let (addr, server) = fake_server(vec![1, 2, 3], *MAGIC);
        let mut device = RtlTcpDevice::connect(&addr).unwrap();

        // Server holds the socket open until we hang up, so cancel first
        let mut block = [0u8; 3];
        device.read_block(&mut block).unwrap();
        device.canceller().cancel();

        let result = device.read_block(&mut block);
        assert!(matches!(result, Err(DeviceError::ShortRead { actual: 0, .. })));

        drop(device);
        server.join().unwrap();
    }

    #[test]
    fn test_bad_magic() {
        let (addr, server) = fake_server(Vec::new(), *b"HTTP");
        let result = RtlTcpDevice::connect(&addr);
        assert!(matches!(result, Err(DeviceError::BadMagic(m)) if &m == b"HTTP"));
        server.join().unwrap();
    }
}
