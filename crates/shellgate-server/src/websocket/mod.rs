//! WebSocket link handling.
//!
//! One task pair per client link: the inbound loop reads and dispatches
//! client frames, the outbound writer drains the link's frame channel
//! and drives the keepalive heartbeat. Sessions opened over a link are
//! torn down with it.

pub mod connect;
pub mod handler;
pub mod heartbeat;
pub mod link;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use shellgate_core::LinkId;
use shellgate_core::protocol::ServerFrame;
use shellgate_transport::Dialer;

use crate::auth::Identity;
use crate::config::ServerConfig;
use crate::server::AppState;
use heartbeat::{Heartbeat, HeartbeatTick};
use link::ClientLink;
use registry::{Session, SessionRegistry};

/// Outbound frames buffered per link before sends start dropping.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Shared handles every link task needs.
#[derive(Clone)]
pub struct LinkContext {
    /// Broker configuration.
    pub config: Arc<ServerConfig>,
    /// The live-session map.
    pub registry: Arc<SessionRegistry>,
    /// Opens SSH transports.
    pub dialer: Arc<dyn Dialer>,
    /// Gauge of currently open links.
    pub links: Arc<AtomicUsize>,
    /// Cancelled when the server begins shutdown.
    pub shutdown: CancellationToken,
}

/// Why a session is being torn down. Decides which farewell frame, if
/// any, the client receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownReason {
    /// The client asked via DISCONNECT.
    ClientRequest,
    /// The remote shell or connection closed on its own.
    RemoteClosed,
    /// The client link went away; there is nobody to notify.
    LinkClosed,
}

/// Tear down one session exactly once.
///
/// Every teardown trigger funnels through here; only the caller that
/// wins the `Active → Closing` transition proceeds, so racing triggers
/// (DISCONNECT vs remote close vs link close) cannot double-close or
/// double-notify. Returns whether this call performed the teardown.
pub fn teardown_session(
    ctx: &LinkContext,
    link: &Arc<ClientLink>,
    session: &Arc<Session>,
    reason: &TeardownReason,
) -> bool {
    if !session.begin_close() {
        return false;
    }
    info!(session_id = %session.id, ?reason, "tearing down session");

    // Stop output delivery first so nothing lands after the farewell.
    session.cancel_token().cancel();
    session.close_shell();
    let _ = ctx.registry.remove(&session.id);
    link.release_session(&session.id);
    session.finish_close();

    match reason {
        TeardownReason::ClientRequest | TeardownReason::RemoteClosed => {
            let _ = link.send_frame(&ServerFrame::Disconnected {
                session_id: session.id.clone(),
                message: "SSH connection closed".into(),
            });
        }
        TeardownReason::LinkClosed => {}
    }
    true
}

/// Bearer token from the `Authorization` header or, for browser
/// `WebSocket` clients that cannot set headers, the `token` query
/// parameter.
fn extract_token<'a>(headers: &'a HeaderMap, params: &'a HashMap<String, String>) -> Option<&'a str> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().ok()?;
        return value.strip_prefix("Bearer ").map(str::trim);
    }
    params.get("token").map(String::as_str)
}

/// HTTP handler for `GET /ws`.
///
/// Origin and token are checked before the upgrade; a rejected client
/// gets a plain HTTP error and never opens a socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !state.origins.allows(origin) {
        warn!(?origin, "websocket upgrade refused: origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(token) = extract_token(&headers, &params) else {
        warn!("websocket upgrade refused: no token");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let identity = match state.identity.validate(token).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "websocket upgrade refused");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let max_frame = state.ctx.config.max_frame_bytes;
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| run_link(state.ctx, socket, identity))
}

/// Drive one client link from upgrade to teardown.
#[instrument(skip_all, fields(link_id, subject = %identity.subject))]
async fn run_link(ctx: LinkContext, socket: WebSocket, identity: Identity) {
    let link_id = LinkId::new();
    tracing::Span::current().record("link_id", link_id.as_str());
    info!("link established");

    let (tx, rx) = mpsc::channel::<String>(OUTBOUND_CHANNEL_CAPACITY);
    let link = Arc::new(ClientLink::new(link_id, identity, tx));
    let _ = ctx.links.fetch_add(1, Ordering::Relaxed);

    // Cancelled when either half of the link finishes, so the other half
    // stops too instead of lingering on a dead socket.
    let local = ctx.shutdown.child_token();

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(
        ws_tx,
        rx,
        link.clone(),
        local.clone(),
        ctx.config.clone(),
    ));

    loop {
        tokio::select! {
            () = local.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    link.mark_alive();
                    handler::handle_frame(&ctx, &link, &local, text.as_str());
                }
                Some(Ok(Message::Pong(_))) => link.mark_alive(),
                Some(Ok(Message::Ping(_))) => {
                    // Pings are answered by the socket layer.
                    link.mark_alive();
                }
                Some(Ok(Message::Binary(_))) => {
                    // The protocol is JSON text frames only.
                    link.mark_alive();
                    let _ = link.send_frame(&ServerFrame::link_error(
                        "binary frames are not supported",
                    ));
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("socket closed by client");
                    break;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "socket read error");
                    break;
                }
            }
        }
    }

    local.cancel();
    let _ = writer.await;

    // Sessions do not outlive their link.
    for session in ctx.registry.sessions_for_link(&link.id) {
        let _ = teardown_session(&ctx, &link, &session, &TeardownReason::LinkClosed);
    }

    let _ = ctx.links.fetch_sub(1, Ordering::Relaxed);
    info!(
        dropped_frames = link.dropped_frames(),
        "link closed"
    );
}

/// Outbound half of a link: drains the frame channel and runs the
/// keepalive heartbeat.
async fn write_loop(
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    link: Arc<ClientLink>,
    local: CancellationToken,
    config: Arc<ServerConfig>,
) {
    let mut heartbeat = Heartbeat::new(config.keepalive_interval(), config.keepalive_timeout());
    let mut ticker = tokio::time::interval(config.keepalive_interval());
    // The first tick fires immediately; skip it so the client gets a full
    // interval before the first ping.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = local.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(text) => {
                    if ws_tx.send(Message::Text(Utf8Bytes::from(text))).await.is_err() {
                        debug!(link_id = %link.id, "socket write failed");
                        break;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                match heartbeat.tick(link.check_alive()) {
                    HeartbeatTick::Alive => {}
                    HeartbeatTick::Missed(n) => {
                        debug!(link_id = %link.id, missed = n, "keepalive miss");
                    }
                    HeartbeatTick::Expired => {
                        warn!(
                            link_id = %link.id,
                            since_pong = ?link.last_pong_elapsed(),
                            "keepalive expired, closing link"
                        );
                        break;
                    }
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Wake the inbound loop so the link tears down promptly.
    local.cancel();
    let _ = ws_tx.close().await;
}
