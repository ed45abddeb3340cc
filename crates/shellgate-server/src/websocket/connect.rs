//! Connect sequencer: turns a CONNECT request into either a CONNECTED
//! notification with a coalesced banner or a single ERROR frame.
//!
//! The whole attempt — dial, credential exchange, shell open, banner
//! coalescing — runs under one overall ceiling. Interactive shells tend
//! to emit a multi-line MOTD as several discrete chunks right after
//! opening; each chunk restarts the debounce window, and the buffered
//! bytes flush as one banner when the window finally lapses. After that
//! every chunk streams individually as an OUTPUT frame.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use shellgate_core::protocol::ServerFrame;
use shellgate_core::{ConnectTarget, SessionId};
use shellgate_transport::{ShellEvent, ShellHandle, TERM_TYPE};

use super::link::ClientLink;
use super::registry::Session;
use super::{LinkContext, TeardownReason, teardown_session};

/// Where a connect attempt currently is. Failure and timeout are
/// reachable from every phase before `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConnectPhase {
    Dialing,
    Authenticating,
    ShellOpening,
    BannerCoalescing,
}

impl fmt::Display for ConnectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dialing => "dialing",
            Self::Authenticating => "authenticating",
            Self::ShellOpening => "shell-opening",
            Self::BannerCoalescing => "banner-coalescing",
        };
        f.write_str(name)
    }
}

/// Run one connect attempt end to end.
///
/// On success the session is registered, bound to the link, announced
/// with a CONNECTED frame, and its output pump is spawned. On failure or
/// timeout exactly one link-level ERROR frame is emitted and nothing is
/// registered; a partially opened transport is dropped (which closes
/// it). The whole attempt races `link_gone`: once the owning link is
/// torn down there is nobody to deliver to, so the attempt is abandoned
/// and any opened shell closed instead of registered.
#[instrument(skip_all, fields(link_id = %link.id, target = %target))]
pub async fn run_connect(
    ctx: LinkContext,
    link: Arc<ClientLink>,
    link_gone: CancellationToken,
    target: ConnectTarget,
    secret: String,
) {
    let ceiling = ctx.config.connect_timeout();
    let attempt = tokio::time::timeout(ceiling, attempt(&ctx, &target, &secret));
    let outcome = tokio::select! {
        () = link_gone.cancelled() => {
            debug!("link closed mid-connect, abandoning attempt");
            return;
        }
        outcome = attempt => outcome,
    };
    match outcome {
        Err(_) => {
            warn!("connect attempt hit the overall ceiling");
            let _ = link.send_frame(&ServerFrame::link_error(format!(
                "connect to {target} timed out"
            )));
        }
        Ok(Err(failure)) => {
            warn!(phase = %failure.phase, "connect attempt failed: {}", failure.message);
            let _ = link.send_frame(&ServerFrame::link_error(failure.message));
        }
        Ok(Ok((shell, events, banner))) => {
            activate(ctx, link, &link_gone, target, shell, events, banner);
        }
    }
}

struct ConnectFailure {
    phase: ConnectPhase,
    message: String,
}

/// Dial, authenticate, open the shell, and coalesce the banner.
async fn attempt(
    ctx: &LinkContext,
    target: &ConnectTarget,
    secret: &str,
) -> Result<(ShellHandle, mpsc::Receiver<ShellEvent>, Option<String>), ConnectFailure> {
    let mut phase = ConnectPhase::Dialing;
    debug!(%phase, "connect phase");
    let mut transport = ctx
        .dialer
        .dial(&target.host, target.port, ctx.config.connect_timeout())
        .await
        .map_err(|e| ConnectFailure {
            phase,
            message: e.to_string(),
        })?;

    phase = ConnectPhase::Authenticating;
    debug!(%phase, "connect phase");
    transport
        .authenticate(&target.username, secret)
        .await
        .map_err(|e| ConnectFailure {
            phase,
            message: e.to_string(),
        })?;

    phase = ConnectPhase::ShellOpening;
    debug!(%phase, "connect phase");
    let (shell, mut events) =
        transport
            .open_shell(TERM_TYPE)
            .await
            .map_err(|e| ConnectFailure {
                phase,
                message: e.to_string(),
            })?;

    phase = ConnectPhase::BannerCoalescing;
    debug!(%phase, "connect phase");
    let mut banner = Vec::new();
    loop {
        match tokio::time::timeout(ctx.config.banner_debounce(), events.recv()).await {
            // The window lapsed with no new chunk: banner is complete.
            Err(_) => break,
            Ok(Some(ShellEvent::Output(chunk))) => banner.extend_from_slice(&chunk),
            Ok(Some(ShellEvent::Closed)) | Ok(None) => {
                shell.close();
                return Err(ConnectFailure {
                    phase,
                    message: "connection closed before the shell became ready".into(),
                });
            }
        }
    }
    let banner = if banner.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&banner).into_owned())
    };

    Ok((shell, events, banner))
}

/// Register the session, announce it, and start streaming output.
fn activate(
    ctx: LinkContext,
    link: Arc<ClientLink>,
    link_gone: &CancellationToken,
    target: ConnectTarget,
    shell: ShellHandle,
    events: mpsc::Receiver<ShellEvent>,
    banner: Option<String>,
) {
    if link_gone.is_cancelled() {
        debug!("link closed before activation, closing shell");
        shell.close();
        return;
    }

    let session_id = SessionId::new();
    let session = Arc::new(Session::new(
        session_id.clone(),
        link.id.clone(),
        target.clone(),
        shell,
    ));

    if let Err(e) = ctx.registry.insert(session.clone()) {
        // Server-generated ids make this unreachable; if it ever fires,
        // refuse the new session rather than clobber the registered one.
        error!(%session_id, error = %e, "registry insert collision");
        session.close_shell();
        let _ = link.send_frame(&ServerFrame::link_error("internal error: session id collision"));
        return;
    }
    link.own_session(session_id.clone());

    // The link may have finished its teardown sweep between the check
    // above and the insert; the sweep runs after the token fires, so a
    // second look catches a session the sweep could not see.
    if link_gone.is_cancelled() {
        let _ = teardown_session(&ctx, &link, &session, &TeardownReason::LinkClosed);
        return;
    }

    info!(%session_id, "session active");
    let _ = link.send_frame(&ServerFrame::Connected {
        session_id,
        message: format!("Connected to {} as {}", target.host, target.username),
        banner,
    });

    let _ = tokio::spawn(output_pump(ctx, link, session, events));
}

/// Stream shell output to the owning link until the remote closes or
/// teardown cancels the session.
async fn output_pump(
    ctx: LinkContext,
    link: Arc<ClientLink>,
    session: Arc<Session>,
    mut events: mpsc::Receiver<ShellEvent>,
) {
    let cancel = session.cancel_token();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            ev = events.recv() => match ev {
                Some(ShellEvent::Output(chunk)) => {
                    // A DISCONNECT may have won the race while this
                    // chunk was in flight; deliver nothing after cancel.
                    if cancel.is_cancelled() {
                        break;
                    }
                    let _ = link.send_frame(&ServerFrame::Output {
                        session_id: session.id.clone(),
                        output: String::from_utf8_lossy(&chunk).into_owned(),
                    });
                }
                Some(ShellEvent::Closed) | None => {
                    let _ = teardown_session(&ctx, &link, &session, &TeardownReason::RemoteClosed);
                    break;
                }
            }
        }
    }
    debug!(session_id = %session.id, "output pump finished");
}
