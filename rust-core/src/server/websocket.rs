//! WebSocket transport
//!
//! Binds the broadcaster to axum WebSocket routes:
//!
//! | Path         | Channel                                            |
//! |--------------|----------------------------------------------------|
//! | `/`          | chosen by subprotocol (`plot-data` or `rtl`)       |
//! | `/plot-data` | SpectrumFeed                                       |
//! | `/rtl`       | Control                                            |

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::protocol::{ChannelKind, Outbound, SessionEvent};
use super::{ServerError, SharedBroadcaster};

/// Shared state passed to all request handlers
#[derive(Clone)]
struct AppState {
    broadcaster: SharedBroadcaster,
    /// Outbound messages buffered per session before frames are dropped
    queue_depth: usize,
}

/// Build the router with all channel endpoints
pub fn router(broadcaster: SharedBroadcaster, queue_depth: usize) -> Router {
    let state = AppState {
        broadcaster,
        queue_depth: queue_depth.max(1),
    };

    Router::new()
        .route("/", get(handle_negotiated))
        .route("/plot-data", get(handle_feed))
        .route("/rtl", get(handle_control))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve_on(listener, router, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_on(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on ws://{}", addr);
    }

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(ServerError::Serve)
}

/// First known channel offered in a `Sec-WebSocket-Protocol` header
fn offered_channel(headers: &HeaderMap) -> Option<ChannelKind> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(ChannelKind::from_protocol)
}

/// Channel selected by the `Sec-WebSocket-Protocol` header
///
/// Requests offering no known subprotocol are refused before the upgrade.
async fn handle_negotiated(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let Some(kind) = offered_channel(&headers) else {
        warn!("{} connected without a known subprotocol, refusing", peer);
        return (
            StatusCode::BAD_REQUEST,
            format!("expected subprotocol {}", ChannelKind::PROTOCOLS.join(" or ")),
        )
            .into_response();
    };

    ws.protocols([kind.protocol_name()])
        .on_upgrade(move |socket| run_session(socket, kind, peer, state))
}

async fn handle_feed(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, ChannelKind::SpectrumFeed, peer, state))
}

async fn handle_control(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, ChannelKind::Control, peer, state))
}

/// Forward a lifecycle event to the broadcaster
fn dispatch(broadcaster: &SharedBroadcaster, id: super::SessionId, event: SessionEvent) {
    if let Ok(mut broadcaster) = broadcaster.lock() {
        broadcaster.handle_event(id, event);
    }
}

/// Drive one connection until either side hangs up
async fn run_session(mut socket: WebSocket, kind: ChannelKind, peer: SocketAddr, state: AppState) {
    let (tx, mut rx) = mpsc::channel(state.queue_depth);

    let id = match state.broadcaster.lock() {
        Ok(mut broadcaster) => broadcaster.register(kind, tx),
        Err(_) => return,
    };
    info!(
        "Received network connect from {} on {} (session {})",
        peer,
        kind.protocol_name(),
        id
    );

    dispatch(&state.broadcaster, id, SessionEvent::Established);

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                // Broadcaster dropped the session
                let Some(outbound) = outbound else { break };

                let message = match outbound {
                    Outbound::Handshake(handshake) => match handshake.to_json() {
                        Ok(json) => Message::Text(json),
                        Err(e) => {
                            warn!("failed to encode handshake for session {}: {}", id, e);
                            continue;
                        }
                    },
                    // axum 0.7 takes an owned Vec; the last holder of the
                    // shared frame reuses its allocation, the others copy
                    Outbound::DataFrame(frame) => Message::Binary(Vec::from(frame)),
                };
                if let Err(e) = socket.send(message).await {
                    debug!("ERROR writing to session {}: {}", id, e);
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&state.broadcaster, id, SessionEvent::Message(Bytes::from(text)));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        dispatch(&state.broadcaster, id, SessionEvent::Message(Bytes::from(data)));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong handled by axum
                    Some(Err(e)) => {
                        debug!("session {} transport error: {}", id, e);
                        break;
                    }
                }
            }
        }
    }

    dispatch(&state.broadcaster, id, SessionEvent::Closed);
    info!("Session {} from {} closed", id, peer);
}
