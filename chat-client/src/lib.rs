//! # chat-client
//!
//! Realtime sync engine for the Veil encrypted messaging client.
//!
//! This is the library applications embed to keep a local mirror of the
//! signed-in user's chats consistent with the backend.
//!
//! ## Features
//!
//! - **Session-bound connection**: the socket is open only while a user is signed in
//! - **Reconnect with backoff**: exponential, capped, jittered retries
//! - **Optimistic sends**: reconciled with the server echo by client id
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//! - **Pure State Machines**: Uses chat-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use veil_chat_client::{ChatClient, ClientConfig, WsTransport};
//!
//! let config = ClientConfig::load(path)?;
//! let client = ChatClient::new(config.clone(), WsTransport::new(&config.server.url));
//!
//! // Signing in opens the connection
//! client.login_succeeded(user_id).await?;
//!
//! // Route inbound events until sign-out
//! client.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod connection;
pub mod transport;

pub use client::{ChatClient, ClientError};
pub use config::{
    ClientConfig, ConfigError, OutboxConfig, ReconnectConfig, ServerConfig, SessionConfig,
};
pub use connection::ConnectionManager;
pub use transport::{MockTransport, Transport, TransportError, WsTransport};
