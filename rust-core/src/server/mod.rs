//! Multi-channel WebSocket session layer
//!
//! - [`protocol`]: wire messages, control parsing, frame encoding
//! - [`broadcaster`]: session table, lifecycle and fan-out
//! - [`websocket`]: axum routes feeding the broadcaster

pub mod broadcaster;
pub mod protocol;
pub mod websocket;

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use broadcaster::{Broadcaster, SessionId, SessionState};
pub use protocol::{ChannelKind, Handshake, Outbound, SessionEvent, TuneRequest};

/// Broadcaster shared between transport tasks and the acquisition loop
pub type SharedBroadcaster = Arc<Mutex<Broadcaster>>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Server terminated unexpectedly: {0}")]
    Serve(#[source] io::Error),
}
