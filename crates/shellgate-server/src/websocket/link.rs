//! Per-client link state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use shellgate_core::protocol::ServerFrame;
use shellgate_core::{LinkId, SessionId};

use crate::auth::Identity;

/// One authenticated client WebSocket link.
///
/// Owns the identity established at the upgrade handshake and the set of
/// session ids opened over this link. Outbound frames go through a
/// bounded channel to the link's writer task; sends never block.
pub struct ClientLink {
    /// Process-unique link id.
    pub id: LinkId,
    /// Identity established before the socket opened.
    pub identity: Identity,
    /// When this link was accepted.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    pub is_alive: AtomicBool,
    tx: mpsc::Sender<String>,
    owned: Mutex<HashSet<SessionId>>,
    last_pong: Mutex<Instant>,
    dropped_frames: AtomicU64,
}

impl ClientLink {
    /// Create a link around the writer task's send channel.
    #[must_use]
    pub fn new(id: LinkId, identity: Identity, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            tx,
            owned: Mutex::new(HashSet::new()),
            last_pong: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Send a serialized frame to the client.
    ///
    /// Returns `false` if the channel is full or closed; the frame is
    /// dropped and counted.
    pub fn send_raw(&self, text: String) -> bool {
        if self.tx.try_send(text).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and send a [`ServerFrame`].
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send_raw(json),
            Err(e) => {
                warn!(link_id = %self.id, error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Record a session as owned by this link.
    pub fn own_session(&self, session_id: SessionId) {
        let _ = self.owned.lock().insert(session_id);
    }

    /// Remove a session from the owned set.
    pub fn release_session(&self, session_id: &SessionId) {
        let _ = self.owned.lock().remove(session_id);
    }

    /// Whether this link owns the session.
    #[must_use]
    pub fn owns(&self, session_id: &SessionId) -> bool {
        self.owned.lock().contains(session_id)
    }

    /// Snapshot of the owned session ids.
    #[must_use]
    pub fn owned_sessions(&self) -> Vec<SessionId> {
        self.owned.lock().iter().cloned().collect()
    }

    /// Mark the link alive (pong or any client activity).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag; returns whether the client
    /// responded since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong (or link establishment).
    #[must_use]
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Frames dropped because the outbound channel was full or closed.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_link() -> (ClientLink, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(32);
        let link = ClientLink::new(
            LinkId::from("l1"),
            Identity {
                subject: "alice".into(),
            },
            tx,
        );
        (link, rx)
    }

    #[tokio::test]
    async fn send_frame_serializes_to_channel() {
        let (link, mut rx) = make_link();
        assert!(link.send_frame(&ServerFrame::link_error("oops")));
        let raw = rx.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["type"], "ERROR");
        assert_eq!(v["error"], "oops");
    }

    #[test]
    fn send_to_full_channel_drops_and_counts() {
        let (tx, _rx) = mpsc::channel(1);
        let link = ClientLink::new(
            LinkId::from("l1"),
            Identity {
                subject: "a".into(),
            },
            tx,
        );
        assert!(link.send_raw("one".into()));
        assert!(!link.send_raw("two".into()));
        assert_eq!(link.dropped_frames(), 1);
    }

    #[test]
    fn send_to_closed_channel_fails() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let link = ClientLink::new(
            LinkId::from("l1"),
            Identity {
                subject: "a".into(),
            },
            tx,
        );
        assert!(!link.send_raw("hello".into()));
    }

    #[test]
    fn owned_session_tracking() {
        let (link, _rx) = make_link();
        let s1 = SessionId::from("s1");
        let s2 = SessionId::from("s2");
        assert!(!link.owns(&s1));

        link.own_session(s1.clone());
        link.own_session(s2.clone());
        assert!(link.owns(&s1));
        assert!(link.owns(&s2));
        assert_eq!(link.owned_sessions().len(), 2);

        link.release_session(&s1);
        assert!(!link.owns(&s1));
        assert!(link.owns(&s2));
    }

    #[test]
    fn release_unknown_session_is_a_no_op() {
        let (link, _rx) = make_link();
        link.release_session(&SessionId::from("ghost"));
        assert!(link.owned_sessions().is_empty());
    }

    #[test]
    fn alive_flag_check_and_reset() {
        let (link, _rx) = make_link();
        assert!(link.check_alive());
        assert!(!link.check_alive());
        link.mark_alive();
        assert!(link.check_alive());
    }

    #[test]
    fn identity_is_kept() {
        let (link, _rx) = make_link();
        assert_eq!(link.identity.subject, "alice");
    }
}
