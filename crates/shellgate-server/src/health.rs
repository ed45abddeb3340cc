//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::websocket::registry::SessionRegistry;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the broker is running.
    pub status: String,
    /// Seconds since the broker started.
    pub uptime_secs: u64,
    /// Currently open client links.
    pub links: usize,
    /// Live SSH sessions across all links.
    pub active_sessions: usize,
    /// Age in seconds of the longest-lived session, when any exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_session_secs: Option<u64>,
}

/// Build a health response from the link gauge and the live registry.
#[must_use]
pub fn health_check(started_at: Instant, links: usize, registry: &SessionRegistry) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: started_at.elapsed().as_secs(),
        links,
        active_sessions: registry.len(),
        oldest_session_secs: registry.oldest_session_age().map(|age| age.as_secs()),
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
    use tokio_util::sync::CancellationToken;

    fn registry_with_sessions(n: usize) -> SessionRegistry {
        let registry = SessionRegistry::new();
        for _ in 0..n {
            let (tx, _rx) = mpsc::channel(8);
            let shell = ShellHandle::new(tx, CancellationToken::new());
            registry
                .insert(Arc::new(Session::new(
                    SessionId::new(),
                    LinkId::new(),
                    ConnectTarget::new("h", None, "u"),
                    shell,
                )))
                .unwrap();
        }
        registry
    }

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, &SessionRegistry::new());
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn uptime_increases() {
        let started = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(started, 0, &SessionRegistry::new());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn session_counts_come_from_the_registry() {
        let registry = registry_with_sessions(3);
        let resp = health_check(Instant::now(), 5, &registry);
        assert_eq!(resp.links, 5);
        assert_eq!(resp.active_sessions, 3);
        assert!(resp.oldest_session_secs.is_some());
    }

    #[test]
    fn no_sessions_means_no_oldest_age() {
        let resp = health_check(Instant::now(), 1, &SessionRegistry::new());
        assert_eq!(resp.active_sessions, 0);
        assert!(resp.oldest_session_secs.is_none());
    }

    #[test]
    fn serialization_omits_absent_oldest_age() {
        let resp = health_check(Instant::now(), 2, &SessionRegistry::new());
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&resp).unwrap()).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["links"], 2);
        assert_eq!(parsed["active_sessions"], 0);
        assert!(parsed.get("oldest_session_secs").is_none());
    }
}
