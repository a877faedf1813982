//! Live log stream client for logscope
//!
//! This crate owns the streaming connection to the server's log endpoint:
//! reconnect with exponential backoff, fallback to periodic snapshot polling,
//! and the buffer the log view reads from.

mod client;
mod config;
mod core;
mod error;
mod policy;
mod transport;

pub use client::LogStreamClient;
pub use config::StreamConfig;
pub use core::{Effect, Input, Phase, SessionId, StreamCore};
pub use error::StreamError;
pub use policy::ReconnectPolicy;
pub use transport::{Connector, HttpSnapshotSource, SessionEvents, SnapshotSource, WsConnector};

// Re-export types used in our public API
pub use logscope_logs::LogBuffer;
pub use logscope_types::{ConnectionStatus, LogsSnapshot, Mode, StreamMessage, StreamState};
