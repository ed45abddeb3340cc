//! JSON wire protocol spoken over each client WebSocket.
//!
//! One frame per WebSocket text message, tagged by an uppercase `type`
//! field. Field names are camelCase on the wire. The schema is the single
//! source of truth for both directions; there is no versioning.

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::target::DEFAULT_SSH_PORT;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Frames sent by the client to the broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientFrame {
    /// Open a new shell session on a remote host.
    #[serde(rename_all = "camelCase")]
    Connect {
        /// Remote host name or address.
        host: String,
        /// Remote SSH port, defaulting to 22.
        #[serde(default = "default_port")]
        port: u16,
        /// Remote username.
        username: String,
        /// Password or equivalent secret, used once and never persisted.
        secret: String,
    },
    /// Run a command line on an existing session; the broker appends
    /// exactly one newline.
    #[serde(rename_all = "camelCase")]
    Command {
        /// Target session.
        session_id: SessionId,
        /// Command text, without trailing newline.
        command: String,
    },
    /// Raw keystroke bytes for an existing session, forwarded
    /// byte-for-byte (control sequences included).
    #[serde(rename_all = "camelCase")]
    Data {
        /// Target session.
        session_id: SessionId,
        /// Raw input, no newline appended.
        data: String,
    },
    /// Tear down a session. Idempotent: disconnecting a session that is
    /// already gone is a no-op.
    #[serde(rename_all = "camelCase")]
    Disconnect {
        /// Target session.
        session_id: SessionId,
    },
}

/// Frames sent by the broker to the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerFrame {
    /// A CONNECT request succeeded; the session is now active.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// The new server-generated session id.
        session_id: SessionId,
        /// Human-readable confirmation.
        message: String,
        /// Coalesced initial output (MOTD/banner), omitted when the
        /// remote sent nothing before the debounce window closed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        banner: Option<String>,
    },
    /// One chunk of shell output, in transport order.
    #[serde(rename_all = "camelCase")]
    Output {
        /// Originating session.
        session_id: SessionId,
        /// Raw output bytes, lossily decoded as UTF-8.
        output: String,
    },
    /// A session was torn down.
    #[serde(rename_all = "camelCase")]
    Disconnected {
        /// The session that ended.
        session_id: SessionId,
        /// Human-readable reason.
        message: String,
    },
    /// Something failed. `session_id` is omitted for link-level errors
    /// (malformed frames, failed connect attempts).
    #[serde(rename_all = "camelCase")]
    Error {
        /// The session the error concerns, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        /// Human-readable error message.
        error: String,
    },
}

impl ServerFrame {
    /// A link-level error frame with no session id.
    #[must_use]
    pub fn link_error(error: impl Into<String>) -> Self {
        Self::Error {
            session_id: None,
            error: error.into(),
        }
    }

    /// An error frame tied to a session.
    #[must_use]
    pub fn session_error(session_id: SessionId, error: impl Into<String>) -> Self {
        Self::Error {
            session_id: Some(session_id),
            error: error.into(),
        }
    }
}
