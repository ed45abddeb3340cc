//! Server configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the shellgate broker.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Origins accepted at WebSocket upgrade. Empty means any origin is
    /// allowed (development default).
    pub allowed_origins: Vec<String>,
    /// Ceiling for a whole connect attempt, dial included, in seconds.
    pub connect_timeout_secs: u64,
    /// Banner debounce window in milliseconds: output silence this long
    /// after shell open flushes the coalesced banner.
    pub banner_debounce_ms: u64,
    /// Interval between server-initiated Ping frames, in seconds.
    pub keepalive_interval_secs: u64,
    /// Close the link after this long without a Pong, in seconds.
    pub keepalive_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            allowed_origins: Vec::new(),
            connect_timeout_secs: 30,
            banner_debounce_ms: 500,
            keepalive_interval_secs: 30,
            keepalive_timeout_secs: 90,
            max_frame_bytes: 1024 * 1024, // 1 MB
        }
    }
}

impl ServerConfig {
    /// Connect-phase ceiling as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Banner debounce window as a [`Duration`].
    #[must_use]
    pub fn banner_debounce(&self) -> Duration {
        Duration::from_millis(self.banner_debounce_ms)
    }

    /// Keepalive ping interval as a [`Duration`].
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Keepalive timeout as a [`Duration`].
    #[must_use]
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_auto_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_timeouts_match_contract() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.banner_debounce(), Duration::from_millis(500));
        assert_eq!(cfg.keepalive_interval(), Duration::from_secs(30));
    }

    #[test]
    fn default_allows_any_origin() {
        let cfg = ServerConfig::default();
        assert!(cfg.allowed_origins.is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.connect_timeout_secs, cfg.connect_timeout_secs);
        assert_eq!(back.banner_debounce_ms, cfg.banner_debounce_ms);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ServerConfig =
            serde_json::from_str(r#"{"port":8022,"allowed_origins":["https://app.example"]}"#)
                .unwrap();
        assert_eq!(cfg.port, 8022);
        assert_eq!(cfg.allowed_origins, vec!["https://app.example"]);
        assert_eq!(cfg.connect_timeout_secs, 30);
    }
}
