//! Inbound frame dispatch for one client link.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shellgate_core::protocol::{ClientFrame, ServerFrame};
use shellgate_core::{ConnectTarget, SessionId};

use super::connect::run_connect;
use super::link::ClientLink;
use super::{LinkContext, TeardownReason, teardown_session};

/// Handle one inbound text frame from the client.
///
/// Parsing happens here; every outcome is either a spawned connect
/// attempt, a forwarded write, a teardown, or a single ERROR frame.
/// Nothing in this path blocks the link's read loop. `link_gone` is the
/// link's own teardown token; spawned connect attempts race it so a
/// session is never activated for a link that already died.
pub fn handle_frame(
    ctx: &LinkContext,
    link: &Arc<ClientLink>,
    link_gone: &CancellationToken,
    raw: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(link_id = %link.id, error = %e, "malformed client frame");
            let _ = link.send_frame(&ServerFrame::link_error(format!("malformed frame: {e}")));
            return;
        }
    };

    match frame {
        ClientFrame::Connect {
            host,
            username,
            secret,
            port,
        } => {
            let target = ConnectTarget::new(host, Some(port), username);
            let _ = tokio::spawn(run_connect(
                ctx.clone(),
                link.clone(),
                link_gone.clone(),
                target,
                secret,
            ));
        }
        ClientFrame::Command {
            session_id,
            command,
        } => {
            // The client sends the command without its terminator.
            forward(ctx, link, &session_id, format!("{command}\n").into_bytes());
        }
        ClientFrame::Data { session_id, data } => {
            // Raw keystrokes, control bytes included. No terminator.
            forward(ctx, link, &session_id, data.into_bytes());
        }
        ClientFrame::Disconnect { session_id } => {
            // Idempotent: a second DISCONNECT finds no owned session and
            // does nothing.
            if !link.owns(&session_id) {
                debug!(link_id = %link.id, %session_id, "disconnect for unowned session ignored");
                return;
            }
            let Some(session) = ctx.registry.get(&session_id) else {
                return;
            };
            teardown_session(ctx, link, &session, &TeardownReason::ClientRequest);
        }
    }
}

/// Forward input bytes to a session this link owns.
fn forward(
    ctx: &LinkContext,
    link: &Arc<ClientLink>,
    session_id: &SessionId,
    bytes: Vec<u8>,
) {
    if !link.owns(session_id) {
        let _ = link.send_frame(&ServerFrame::session_error(
            session_id.clone(),
            "no active connection",
        ));
        return;
    }
    let Some(session) = ctx.registry.get(session_id) else {
        let _ = link.send_frame(&ServerFrame::session_error(
            session_id.clone(),
            "no active connection",
        ));
        return;
    };

    if session.write(bytes) {
        return;
    }
    if session.shell_closed() {
        // The shell died under us; report it and tear the session down.
        warn!(link_id = %link.id, %session_id, "write to closed shell");
        let _ = link.send_frame(&ServerFrame::session_error(
            session_id.clone(),
            "session is closed",
        ));
        teardown_session(ctx, link, &session, &TeardownReason::RemoteClosed);
    } else {
        // Input channel full: the remote is not draining fast enough.
        // Dropping the write is the contract; the shell's counter records
        // it.
        debug!(link_id = %link.id, %session_id, "input channel full, write dropped");
    }
}
