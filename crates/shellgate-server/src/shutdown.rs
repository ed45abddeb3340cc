//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Cancelling the root token fans out through the child tokens held by
//! every link task. Each link tears down its own sessions on the way
//! out, so the drain here is observational: wait for the registry to
//! empty, then force-close whatever is left.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::registry::SessionRegistry;

/// How long to wait for links to drain their sessions before
/// force-closing the remainder.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval at which the drain re-checks the registry.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Coordinates graceful shutdown across all broker tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The root cancellation token; link tasks hold children of it.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the root token and wait up to `timeout` for every link to
    /// tear down its sessions. Sessions still registered when the clock
    /// runs out get their shells force-closed so the remote side is not
    /// left with half-open channels.
    pub async fn graceful_shutdown(&self, registry: &SessionRegistry, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);

        self.shutdown();
        info!(
            open_sessions = registry.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to drain"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        while !registry.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                let stuck = registry.drain();
                warn!(
                    remaining = stuck.len(),
                    "drain timed out, force-closing remaining sessions"
                );
                for session in stuck {
                    session.cancel_token().cancel();
                    session.close_shell();
                }
                return;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        info!("all sessions drained");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::registry::Session;
    use shellgate_core::{ConnectTarget, LinkId, SessionId};
    use shellgate_transport::ShellHandle;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn stuck_session() -> Arc<Session> {
        let (tx, _rx) = mpsc::channel(8);
        let shell = ShellHandle::new(tx, CancellationToken::new());
        Arc::new(Session::new(
            SessionId::new(),
            LinkId::new(),
            ConnectTarget::new("h", None, "u"),
            shell,
        ))
    }

    #[test]
    fn starts_not_shutting_down() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());
    }

    #[test]
    fn shutdown_cancels_children() {
        let coordinator = ShutdownCoordinator::new();
        let child = coordinator.token().child_token();
        coordinator.shutdown();
        assert!(coordinator.is_shutting_down());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn empty_registry_drains_immediately() {
        let coordinator = ShutdownCoordinator::new();
        let registry = SessionRegistry::new();
        coordinator
            .graceful_shutdown(&registry, Some(Duration::from_secs(5)))
            .await;
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_waits_for_sessions_to_leave() {
        let coordinator = ShutdownCoordinator::new();
        let registry = Arc::new(SessionRegistry::new());
        let session = stuck_session();
        registry.insert(session.clone()).unwrap();

        let emptier = registry.clone();
        let id = session.id.clone();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = emptier.remove(&id);
        });

        coordinator
            .graceful_shutdown(&registry, Some(Duration::from_secs(5)))
            .await;
        assert!(registry.is_empty());
        // The session left via its own teardown, not force-close.
        assert!(!session.shell_closed());
    }

    #[tokio::test]
    async fn stuck_sessions_are_force_closed_at_timeout() {
        let coordinator = ShutdownCoordinator::new();
        let registry = SessionRegistry::new();
        let session = stuck_session();
        registry.insert(session.clone()).unwrap();

        coordinator
            .graceful_shutdown(&registry, Some(Duration::from_millis(100)))
            .await;
        assert!(registry.is_empty());
        assert!(session.shell_closed());
        assert!(session.cancel_token().is_cancelled());
    }
}
