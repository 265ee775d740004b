//! Session table and message fan-out
//!
//! Each client session moves through `Connecting -> Established -> Closed`.
//! Transport tasks report `SessionEvent`s; the acquisition loop calls
//! `publish` and `retuned`. The device is never touched from here: tune
//! requests are queued for the acquisition loop, which owns it.

use std::collections::HashMap;
use std::fmt;

use crossbeam_channel::Sender;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::protocol::{
    encode_frame, parse_control_message, ChannelKind, Handshake, Outbound, SessionEvent,
    TuneRequest,
};
use crate::device::TuningState;
use crate::spectrum::SpectrumFrame;

/// Opaque session identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Established,
    Closed,
}

struct Session {
    kind: ChannelKind,
    state: SessionState,
    queue: mpsc::Sender<Outbound>,

    /// A handshake was dropped on a full queue; data frames are withheld
    /// until one is queued
    needs_handshake: bool,
}

/// Owns every client session and routes traffic between them, the
/// acquisition loop and the tune queue
pub struct Broadcaster {
    sessions: HashMap<SessionId, Session>,
    next_id: u64,

    /// Snapshot of the device tuning, refreshed by the acquisition loop
    tuning: TuningState,
    fft_size: usize,

    /// Axis last announced to every feed session
    last_handshake: Handshake,

    /// Set by a retune, cleared when the fresh handshake goes out
    tuning_dirty: bool,

    tune_tx: Sender<TuneRequest>,

    /// Messages dropped because a session queue was full
    dropped: u64,
}

impl Broadcaster {
    /// Create new broadcaster
    ///
    /// # Arguments
    /// * `tuning` - Tuning in effect at startup
    /// * `fft_size` - Bins per frame, used for `xdelta`
    /// * `tune_tx` - Queue drained by the acquisition loop
    pub fn new(tuning: TuningState, fft_size: usize, tune_tx: Sender<TuneRequest>) -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: 0,
            tuning,
            fft_size,
            last_handshake: Handshake::from_tuning(tuning, fft_size),
            tuning_dirty: false,
            tune_tx,
            dropped: 0,
        }
    }

    /// Add a session in the `Connecting` state
    pub fn register(&mut self, kind: ChannelKind, queue: mpsc::Sender<Outbound>) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;

        self.sessions.insert(
            id,
            Session {
                kind,
                state: SessionState::Connecting,
                queue,
                needs_handshake: false,
            },
        );
        id
    }

    /// Advance a session's state machine
    pub fn handle_event(&mut self, id: SessionId, event: SessionEvent) {
        let (kind, state) = match self.sessions.get(&id) {
            Some(session) => (session.kind, session.state),
            None => {
                debug!("event for unknown session {}: {:?}", id, event);
                return;
            }
        };

        match (event, state) {
            (SessionEvent::Established, SessionState::Connecting) => {
                self.set_state(id, SessionState::Established);
                if kind == ChannelKind::SpectrumFeed {
                    let handshake = Handshake::from_tuning(self.tuning, self.fft_size);
                    self.send(id, Outbound::Handshake(handshake));
                }
            }
            (SessionEvent::Message(payload), SessionState::Established) => match kind {
                ChannelKind::Control => self.handle_control(id, &payload),
                ChannelKind::SpectrumFeed => {
                    debug!("ignoring {} byte message on feed session {}", payload.len(), id);
                }
            },
            (SessionEvent::Closed, _) => self.remove(id),
            (event, state) => {
                debug!("session {} in state {:?} ignored {:?}", id, state, event);
            }
        }
    }

    fn handle_control(&mut self, id: SessionId, payload: &[u8]) {
        match parse_control_message(payload) {
            Ok(Some(request)) => {
                debug!("session {} requested {} Hz", id, request.frequency_hz);
                if self.tune_tx.send(request).is_err() {
                    warn!("acquisition loop gone, dropping tune request");
                }
            }
            Ok(None) => debug!("control message from {} without frequency_hz", id),
            Err(e) => warn!(
                "{} from session {}: {}",
                e,
                id,
                String::from_utf8_lossy(payload)
            ),
        }
    }

    /// Fan a spectrum frame out to every established feed session
    ///
    /// If the tuning changed since the last announced axis, a fresh
    /// handshake is sent in place of the data frame for this cycle. A
    /// session that missed a handshake on a full queue keeps receiving the
    /// current axis instead of data until one is queued.
    ///
    /// # Returns
    /// The message that was fanned out
    pub fn publish(&mut self, frame: &SpectrumFrame) -> Outbound {
        let handshake = Handshake {
            xstart: frame.xstart,
            xdelta: frame.xdelta,
        };

        let outbound = if self.tuning_dirty || handshake != self.last_handshake {
            self.tuning_dirty = false;
            self.last_handshake = handshake;
            info!(
                "Announcing new axis: xstart {} Hz, xdelta {} Hz",
                handshake.xstart, handshake.xdelta
            );
            Outbound::Handshake(handshake)
        } else {
            Outbound::DataFrame(encode_frame(&frame.magnitudes))
        };

        let targets: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| {
                s.kind == ChannelKind::SpectrumFeed && s.state == SessionState::Established
            })
            .map(|(&id, _)| id)
            .collect();

        for id in targets {
            let pending = self
                .sessions
                .get(&id)
                .map_or(false, |s| s.needs_handshake);
            let message = match &outbound {
                Outbound::DataFrame(_) if pending => Outbound::Handshake(self.last_handshake),
                other => other.clone(),
            };
            self.send(id, message);
        }

        outbound
    }

    /// Record a successful retune; the next publish re-announces the axis
    pub fn retuned(&mut self, tuning: TuningState) {
        self.tuning = tuning;
        self.tuning_dirty = true;
    }

    fn send(&mut self, id: SessionId, outbound: Outbound) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };

        let is_handshake = matches!(outbound, Outbound::Handshake(_));
        match session.queue.try_send(outbound) {
            Ok(()) => {
                if is_handshake {
                    session.needs_handshake = false;
                }
            }
            Err(TrySendError::Full(_)) => {
                if is_handshake {
                    session.needs_handshake = true;
                }
                self.dropped += 1;
                debug!("session {} is slow, dropping message", id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("session {} queue closed", id);
                self.remove(id);
            }
        }
    }

    fn set_state(&mut self, id: SessionId, state: SessionState) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = state;
        }
    }

    fn remove(&mut self, id: SessionId) {
        if let Some(mut session) = self.sessions.remove(&id) {
            session.state = SessionState::Closed;
            debug!("session {} ({:?}) closed", id, session.kind);
        }
    }

    /// State of a session; sessions no longer in the table are `Closed`
    pub fn session_state(&self, id: SessionId) -> SessionState {
        self.sessions
            .get(&id)
            .map(|s| s.state)
            .unwrap_or(SessionState::Closed)
    }

    /// Number of live sessions of a kind
    pub fn session_count(&self, kind: ChannelKind) -> usize {
        self.sessions.values().filter(|s| s.kind == kind).count()
    }

    pub fn tuning(&self) -> TuningState {
        self.tuning
    }

    pub fn dropped_messages(&self) -> u64 {
        self.dropped
    }
}
