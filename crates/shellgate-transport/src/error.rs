//! Transport error surface.

use thiserror::Error;

/// Failures at the SSH transport boundary.
///
/// Every variant renders to a human-readable message; the broker
/// forwards these messages verbatim in `ERROR` frames and never matches
/// on backend-specific error types.
#[derive(Debug, Error)]
pub enum TransportError {
    /// TCP/SSH-level connect failed.
    #[error("connect to {host}:{port} failed: {message}")]
    Dial {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Backend error message.
        message: String,
    },

    /// The connect attempt exceeded its timeout.
    #[error("connect to {host}:{port} timed out")]
    DialTimeout {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
    },

    /// The remote rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The shell channel could not be opened on an authenticated
    /// transport.
    #[error("failed to open shell: {0}")]
    Shell(String),

    /// The channel is gone (remote closed, or the pump task exited).
    #[error("shell channel closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_message_names_target() {
        let e = TransportError::Dial {
            host: "h1".into(),
            port: 22,
            message: "connection refused".into(),
        };
        assert_eq!(e.to_string(), "connect to h1:22 failed: connection refused");
    }

    #[test]
    fn timeout_message() {
        let e = TransportError::DialTimeout {
            host: "h1".into(),
            port: 2222,
        };
        assert_eq!(e.to_string(), "connect to h1:2222 timed out");
    }

    #[test]
    fn auth_message_carries_remote_reason() {
        let e = TransportError::Auth("permission denied".into());
        assert_eq!(e.to_string(), "authentication failed: permission denied");
    }
}
