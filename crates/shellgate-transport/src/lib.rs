//! # shellgate-transport
//!
//! The SSH transport layer, kept behind object-safe traits so the broker
//! never depends on a concrete SSH library:
//!
//! - [`Dialer`]: opens a TCP-level SSH transport to a host
//! - [`Transport`]: authenticates and opens an interactive shell
//! - [`shell::ShellHandle`] + [`shell::ShellEvent`]: the typed write path
//!   and output stream for one open shell
//!
//! The shipped implementation ([`russh_client::RusshDialer`]) is backed by
//! `russh`. Tests substitute scripted implementations of the same traits.

#![deny(unsafe_code)]

pub mod error;
pub mod russh_client;
pub mod shell;

use async_trait::async_trait;
use std::time::Duration;

pub use error::TransportError;
pub use shell::{ShellEvent, ShellHandle};

/// Terminal type requested for the interactive shell PTY.
pub const TERM_TYPE: &str = "xterm-256color";

/// An authenticated-or-not SSH transport to one remote host.
///
/// Returned by [`Dialer::dial`]; consumed stepwise by the connect
/// sequencer. Errors carry human-readable messages only — callers must
/// not depend on library-specific error types.
#[async_trait]
pub trait Transport: Send {
    /// Authenticate with a username and secret (password or equivalent).
    async fn authenticate(&mut self, username: &str, secret: &str) -> Result<(), TransportError>;

    /// Open an interactive shell channel on the authenticated transport.
    ///
    /// Returns the exclusive write handle and the ordered output stream.
    /// Consumes the transport: the shell owns the connection from here on.
    async fn open_shell(
        self: Box<Self>,
        term: &str,
    ) -> Result<(ShellHandle, tokio::sync::mpsc::Receiver<ShellEvent>), TransportError>;
}

/// Opens SSH transports. One implementation per SSH backend.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dial `host:port`, failing after `timeout` if no transport-level
    /// connection could be established.
    async fn dial(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
