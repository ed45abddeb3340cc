//! # shellgate-server
//!
//! The session broker: an axum HTTP + `WebSocket` gateway that
//! authenticates browser clients at upgrade time, multiplexes their SSH
//! shell sessions, and forwards keystrokes and output in both directions.
//!
//! - Upgrade-time auth: bearer token + origin allow-list, enforced before
//!   the socket opens
//! - One link task per client, one output pump per session
//! - Session registry: the only cross-flow shared structure
//! - Connect sequencing with dial timeout, banner coalescing, and an
//!   overall ceiling
//! - Keepalive heartbeat per link; graceful shutdown via
//!   `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;
