//! Transport abstraction for Veil.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` opens the single realtime connection for a user
//! - `send()` transmits one encoded event frame
//! - `recv()` receives one encoded event frame
//! - `close()` terminates; calling it twice is harmless
//!
//! Only [`crate::ConnectionManager`] holds a transport handle.

mod mock;
mod ws;

pub use mock::MockTransport;
pub use ws::WsTransport;

use async_trait::async_trait;
use thiserror::Error;
use veil_chat_types::UserId;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Transport trait for exchanging realtime event frames.
///
/// Implementations handle the underlying connection mechanism.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection keyed by the given user.
    async fn connect(&self, identity: &UserId) -> Result<(), TransportError>;

    /// Send one frame over the connection.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive one frame.
    ///
    /// Blocks until a frame is available or the connection closes.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;
}
