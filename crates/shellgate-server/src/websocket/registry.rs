//! Session registry: the one structure mutated by more than one flow of
//! execution.
//!
//! A session id is registered at most once; removal happens exactly once
//! no matter how many teardown triggers race (client DISCONNECT, remote
//! close, link teardown). The `Active → Closing` transition is the
//! arbiter: only the caller that wins [`Session::begin_close`] performs
//! teardown, everyone else observes `Closing`/`Closed` and backs off.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use shellgate_core::{ConnectTarget, LinkId, SessionId};
use shellgate_transport::ShellHandle;

/// Registry failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two live sessions tried to share an id. Server-generated ids make
    /// this practically impossible; it is treated as a fatal internal
    /// error rather than silently overwriting the existing session.
    #[error("session id collision: {0}")]
    DuplicateSession(SessionId),
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Shell open, output streaming.
    Active,
    /// Teardown in progress.
    Closing,
    /// Terminal. The registry entry is gone.
    Closed,
}

/// One active remote shell, owned by the registry.
pub struct Session {
    /// Server-generated session id.
    pub id: SessionId,
    /// The link that opened this session.
    pub link_id: LinkId,
    /// Where the session is connected.
    pub target: ConnectTarget,
    /// When the session became active.
    pub created_at: Instant,
    shell: ShellHandle,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
}

impl Session {
    /// Create an `Active` session around an open shell.
    #[must_use]
    pub fn new(id: SessionId, link_id: LinkId, target: ConnectTarget, shell: ShellHandle) -> Self {
        Self {
            id,
            link_id,
            target,
            created_at: Instant::now(),
            shell,
            state: Mutex::new(SessionState::Active),
            cancel: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Attempt the `Active → Closing` transition.
    ///
    /// Returns `true` only for the first caller; concurrent teardown
    /// triggers get `false` and must not touch the session further.
    pub fn begin_close(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Active {
            *state = SessionState::Closing;
            true
        } else {
            false
        }
    }

    /// Complete teardown: `Closing → Closed`.
    pub fn finish_close(&self) {
        *self.state.lock() = SessionState::Closed;
    }

    /// Enqueue input bytes for the remote shell (fire-and-forget).
    pub fn write(&self, bytes: Vec<u8>) -> bool {
        self.shell.write(bytes)
    }

    /// Whether the underlying shell channel is gone.
    #[must_use]
    pub fn shell_closed(&self) -> bool {
        self.shell.is_closed()
    }

    /// Ask the transport to close the shell (idempotent).
    pub fn close_shell(&self) {
        self.shell.close();
    }

    /// Token cancelled at teardown; the output pump stops delivering the
    /// instant this fires, even if the transport still has chunks
    /// buffered.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Concurrency-safe map from session id to live session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new session. Fails on id collision instead of
    /// overwriting.
    pub fn insert(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(RegistryError::DuplicateSession(session.id.clone()));
        }
        let _ = sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Look up a live session.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session, returning it if it was present.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Age of the longest-lived session still registered.
    #[must_use]
    pub fn oldest_session_age(&self) -> Option<std::time::Duration> {
        self.sessions
            .read()
            .values()
            .map(|s| s.created_at)
            .min()
            .map(|t| t.elapsed())
    }

    /// Remove and return every live session. Used when shutdown gives up
    /// waiting on links to finish their own teardown.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.write().drain().map(|(_, s)| s).collect()
    }

    /// All live sessions owned by one link.
    #[must_use]
    pub fn sessions_for_link(&self, link_id: &LinkId) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .filter(|s| &s.link_id == link_id)
            .cloned()
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
