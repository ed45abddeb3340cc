//! Typed shell channel abstraction.
//!
//! Replaces callback-style `on_data`/`on_close` wiring with an explicit
//! pair: a write handle and an ordered event stream with a completion
//! signal. Exactly one flow writes ([`ShellHandle`]) and exactly one flow
//! reads (the `mpsc::Receiver<ShellEvent>` returned alongside it).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default capacity of the input (keystroke) channel.
pub const INPUT_CHANNEL_CAPACITY: usize = 256;

/// Default capacity of the output (shell data) channel.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// One event on a shell's output stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellEvent {
    /// A chunk of output bytes, in the order the transport produced
    /// them. Stdout and stderr are merged into this one stream.
    Output(Vec<u8>),
    /// The remote side closed the channel. Terminal: no further events
    /// follow.
    Closed,
}

/// Exclusive write path to one open shell.
///
/// `write` is fire-and-forget: bytes are enqueued into a bounded channel
/// and the call never blocks. `close` is idempotent — the first call
/// asks the backend to send a courtesy `exit` and terminate the
/// transport; later calls are no-ops.
#[derive(Clone, Debug)]
pub struct ShellHandle {
    input: mpsc::Sender<Vec<u8>>,
    close: CancellationToken,
    dropped_writes: Arc<AtomicU64>,
}

impl ShellHandle {
    /// Build a handle from the backend's input sender and close token.
    #[must_use]
    pub fn new(input: mpsc::Sender<Vec<u8>>, close: CancellationToken) -> Self {
        Self {
            input,
            close,
            dropped_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue bytes for the remote shell's input.
    ///
    /// Returns `false` if the channel is full or the shell is gone; the
    /// bytes are dropped and counted in that case. Delivery to the
    /// remote is not acknowledged either way.
    pub fn write(&self, bytes: Vec<u8>) -> bool {
        if self.is_closed() {
            let _ = self.dropped_writes.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.input.try_send(bytes).is_ok() {
            true
        } else {
            let _ = self.dropped_writes.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Ask the backend to close the shell. Idempotent.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether `close` has been requested (by either side).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Total writes dropped because the channel was full or closed.
    #[must_use]
    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes.load(Ordering::Relaxed)
    }
}
