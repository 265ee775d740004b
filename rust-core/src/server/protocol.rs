//! Wire messages for the two WebSocket channels
//!
//! | Channel       | Subprotocol | Direction | Payload                            |
//! |---------------|-------------|-----------|------------------------------------|
//! | SpectrumFeed  | `plot-data` | out       | `{"xstart", "xdelta"}` text        |
//! | SpectrumFeed  | `plot-data` | out       | N little-endian `f32`, binary      |
//! | Control       | `rtl`       | in        | `{"frequency_hz": n}` text/binary  |

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::TuningState;

/// Logical channel carried by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Inbound tuning commands
    Control,

    /// Outbound handshakes and spectrum frames
    SpectrumFeed,
}

impl ChannelKind {
    /// WebSocket subprotocol names, in negotiation order
    pub const PROTOCOLS: [&'static str; 2] = ["plot-data", "rtl"];

    pub fn protocol_name(&self) -> &'static str {
        match self {
            ChannelKind::SpectrumFeed => "plot-data",
            ChannelKind::Control => "rtl",
        }
    }

    pub fn from_protocol(name: &str) -> Option<Self> {
        match name.trim() {
            "plot-data" => Some(ChannelKind::SpectrumFeed),
            "rtl" => Some(ChannelKind::Control),
            _ => None,
        }
    }
}

/// Frequency axis description sent to feed clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub xstart: f64,
    pub xdelta: f64,
}

impl Handshake {
    pub fn from_tuning(tuning: TuningState, fft_size: usize) -> Self {
        Self {
            xstart: tuning.xstart(),
            xdelta: tuning.xdelta(fft_size),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Message queued for one session
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Handshake(Handshake),
    DataFrame(Bytes),
}

/// Lifecycle and traffic events for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
    Message(Bytes),
    Closed,
}

/// Retune command parsed from a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneRequest {
    pub frequency_hz: u32,
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("invalid rx: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid message: not a JSON object")]
    NotAnObject,

    #[error("frequency_hz out of range: {0}")]
    FrequencyOutOfRange(f64),
}

/// Parse a control message
///
/// # Returns
/// `Some(TuneRequest)` when the object carries a numeric `frequency_hz`,
/// `None` for objects without one. Unknown fields are ignored.
pub fn parse_control_message(payload: &[u8]) -> Result<Option<TuneRequest>, ControlError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    let object = value.as_object().ok_or(ControlError::NotAnObject)?;

    let frequency = match object.get("frequency_hz").and_then(|f| f.as_f64()) {
        Some(f) => f,
        None => return Ok(None),
    };

    if !frequency.is_finite() || frequency < 1.0 || frequency > u32::MAX as f64 {
        return Err(ControlError::FrequencyOutOfRange(frequency));
    }

    Ok(Some(TuneRequest {
        frequency_hz: frequency as u32,
    }))
}

/// Encode magnitudes as a little-endian `f32` array
pub fn encode_frame(magnitudes: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(magnitudes.len() * 4);
    for &m in magnitudes {
        buf.put_f32_le(m);
    }
    buf.freeze()
}
