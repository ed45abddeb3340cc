//! # shellgate-core
//!
//! Foundation types shared by the shellgate broker crates:
//!
//! - Branded ID newtypes ([`SessionId`], [`LinkId`])
//! - The JSON wire protocol spoken over each client WebSocket
//!   ([`protocol::ClientFrame`], [`protocol::ServerFrame`])
//! - The connect target model ([`ConnectTarget`])

#![deny(unsafe_code)]

pub mod ids;
pub mod protocol;
pub mod target;

pub use ids::{LinkId, SessionId};
pub use target::ConnectTarget;
