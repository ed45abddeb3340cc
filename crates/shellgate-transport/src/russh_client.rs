//! `russh`-backed implementation of the transport traits.
//!
//! One open shell runs two tasks: a read pump that turns channel data
//! into [`ShellEvent`]s (order-preserving, single producer) and a write
//! pump that owns the channel's write half plus the SSH session handle.
//! The write pump performs the courtesy `exit` on close and disconnects
//! the session when it winds down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Msg};
use russh::{ChannelStream, Disconnect};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;
use crate::shell::{INPUT_CHANNEL_CAPACITY, OUTPUT_CHANNEL_CAPACITY, ShellEvent, ShellHandle};
use crate::{Dialer, Transport};

/// PTY geometry requested for interactive shells.
const PTY_COLS: u32 = 80;
const PTY_ROWS: u32 = 30;

/// Transport-level keepalive sent by russh, independent of the broker's
/// WebSocket heartbeat.
const SSH_KEEPALIVE: Duration = Duration::from_secs(10);

/// Read buffer size for the output pump.
const READ_BUF_SIZE: usize = 8192;

/// Accepts any server host key. The broker is the trusting client here;
/// known-hosts pinning is a config concern outside the transport.
struct AcceptingHost;

#[async_trait]
impl client::Handler for AcceptingHost {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// [`Dialer`] backed by `russh`.
pub struct RusshDialer {
    config: Arc<client::Config>,
}

impl RusshDialer {
    /// Create a dialer with transport keepalive enabled.
    #[must_use]
    pub fn new() -> Self {
        let config = client::Config {
            keepalive_interval: Some(SSH_KEEPALIVE),
            ..client::Config::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for RusshDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialer for RusshDialer {
    async fn dial(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let connect = client::connect(
            self.config.clone(),
            (host.to_owned(), port),
            AcceptingHost,
        );
        match tokio::time::timeout(timeout, connect).await {
            Err(_) => Err(TransportError::DialTimeout {
                host: host.to_owned(),
                port,
            }),
            Ok(Err(e)) => Err(TransportError::Dial {
                host: host.to_owned(),
                port,
                message: e.to_string(),
            }),
            Ok(Ok(handle)) => Ok(Box::new(RusshTransport { handle })),
        }
    }
}

/// One dialed (not yet authenticated) SSH connection.
struct RusshTransport {
    handle: client::Handle<AcceptingHost>,
}

#[async_trait]
impl Transport for RusshTransport {
    async fn authenticate(&mut self, username: &str, secret: &str) -> Result<(), TransportError> {
        match self.handle.authenticate_password(username, secret).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::Auth(
                "the remote rejected the credentials".into(),
            )),
            Err(e) => Err(TransportError::Auth(e.to_string())),
        }
    }

    async fn open_shell(
        self: Box<Self>,
        term: &str,
    ) -> Result<(ShellHandle, mpsc::Receiver<ShellEvent>), TransportError> {
        let handle = self.handle;
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::Shell(e.to_string()))?;
        channel
            .request_pty(false, term, PTY_COLS, PTY_ROWS, 0, 0, &[])
            .await
            .map_err(|e| TransportError::Shell(e.to_string()))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| TransportError::Shell(e.to_string()))?;

        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let close = CancellationToken::new();
        let shell = ShellHandle::new(input_tx, close.clone());

        let (read_half, write_half) = tokio::io::split(channel.into_stream());
        let _ = tokio::spawn(read_pump(read_half, event_tx, close.clone()));
        let _ = tokio::spawn(write_pump(write_half, input_rx, close, handle));

        Ok((shell, event_rx))
    }
}

/// Forward channel output as ordered [`ShellEvent`]s until the remote
/// closes or the broker cancels.
async fn read_pump(
    mut reader: ReadHalf<ChannelStream<Msg>>,
    events: mpsc::Sender<ShellEvent>,
    close: CancellationToken,
) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        tokio::select! {
            () = close.cancelled() => break,
            res = reader.read(&mut buf) => match res {
                Ok(0) | Err(_) => {
                    // Remote closed its side
                    let _ = events.send(ShellEvent::Closed).await;
                    close.cancel();
                    break;
                }
                Ok(n) => {
                    if events.send(ShellEvent::Output(buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("shell read pump finished");
}

/// Forward enqueued input to the channel; on close, send the courtesy
/// `exit` and disconnect the SSH session.
async fn write_pump(
    mut writer: WriteHalf<ChannelStream<Msg>>,
    mut input: mpsc::Receiver<Vec<u8>>,
    close: CancellationToken,
    handle: client::Handle<AcceptingHost>,
) {
    loop {
        tokio::select! {
            () = close.cancelled() => {
                let _ = writer.write_all(b"exit\n").await;
                let _ = writer.shutdown().await;
                break;
            }
            msg = input.recv() => match msg {
                Some(bytes) => {
                    if writer.write_all(&bytes).await.is_err() {
                        close.cancel();
                        break;
                    }
                }
                None => break,
            }
        }
    }
    let _ = handle
        .disconnect(Disconnect::ByApplication, "session closed", "en")
        .await;
    debug!("shell write pump finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dial_refused_port_reports_dial_error() {
        // Bind then drop a listener so the port is closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dialer = RusshDialer::new();
        let err = dialer
            .dial("127.0.0.1", port, Duration::from_secs(5))
            .await
            .err()
            .expect("dial must fail");
        assert!(matches!(err, TransportError::Dial { .. }), "{err}");
    }

    #[tokio::test]
    async fn dial_silent_listener_times_out() {
        // A TCP listener that accepts but never speaks SSH.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _keep = tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let dialer = RusshDialer::new();
        let err = dialer
            .dial("127.0.0.1", port, Duration::from_millis(200))
            .await
            .err()
            .expect("dial must time out");
        assert!(matches!(err, TransportError::DialTimeout { .. }), "{err}");
    }
}
