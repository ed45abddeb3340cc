//! Connect target model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default SSH port when the client omits one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Where a session connects: host, port, and remote username.
///
/// The secret is deliberately not part of this struct — it is consumed
/// once during the connect attempt and never stored or logged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectTarget {
    /// Remote host name or address.
    pub host: String,
    /// Remote SSH port.
    pub port: u16,
    /// Remote username.
    pub username: String,
}

impl ConnectTarget {
    /// Create a target, applying the default port when `port` is `None`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: Option<u16>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.unwrap_or(DEFAULT_SSH_PORT),
            username: username.into(),
        }
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_applied() {
        let t = ConnectTarget::new("example.com", None, "alice");
        assert_eq!(t.port, 22);
    }

    #[test]
    fn explicit_port_kept() {
        let t = ConnectTarget::new("example.com", Some(2222), "alice");
        assert_eq!(t.port, 2222);
    }

    #[test]
    fn display_format() {
        let t = ConnectTarget::new("host1", Some(22), "bob");
        assert_eq!(t.to_string(), "bob@host1:22");
    }

    #[test]
    fn debug_has_no_secret_field() {
        let t = ConnectTarget::new("h", None, "u");
        let dbg = format!("{t:?}");
        assert!(!dbg.contains("secret"));
        assert!(!dbg.contains("password"));
    }
}
