//! WebSocket transport.
//!
//! One text frame carries one JSON event. The connection is keyed by the
//! user id, passed as a query parameter on the upgrade request.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use veil_chat_types::UserId;

use super::{Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport over a WebSocket connection.
pub struct WsTransport {
    server_url: String,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
    connected: AtomicBool,
    // Set by close() so a pending recv() returns instead of waiting on a dead peer.
    shutdown: watch::Sender<bool>,
}

impl WsTransport {
    /// Create a transport for the backend at `server_url` (`ws://` or `wss://`).
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            connected: AtomicBool::new(false),
            shutdown: watch::channel(false).0,
        }
    }

    /// Upgrade URL for a user.
    pub fn endpoint(&self, identity: &UserId) -> String {
        let separator = if self.server_url.contains('?') { '&' } else { '?' };
        format!("{}{}userId={}", self.server_url, separator, identity)
    }

    /// Backend URL this transport connects to.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("server_url", &self.server_url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, identity: &UserId) -> Result<(), TransportError> {
        let url = self.endpoint(identity);
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (writer, reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        self.shutdown.send_replace(false);
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("WebSocket open to {}", self.server_url);
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut shutdown = self.shutdown.subscribe();
        let mut reader = self.reader.lock().await;
        let stream = reader.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown.wait_for(|closed| *closed) => {
                    return Err(TransportError::ConnectionClosed);
                }
            };
            match next {
                Some(Ok(Message::Text(text))) => return Ok(text.as_bytes().to_vec()),
                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                Some(Ok(Message::Close(_))) | None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ConnectionClosed);
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Some(mut sink) = self.writer.lock().await.take() {
            // The peer may already be gone; closing is best effort.
            if let Err(e) = sink.close().await {
                tracing::debug!("WebSocket close: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_user_id() {
        let transport = WsTransport::new("ws://localhost:4000/");
        assert_eq!(
            transport.endpoint(&UserId::from("u1")),
            "ws://localhost:4000?userId=u1"
        );
    }

    #[test]
    fn endpoint_appends_to_existing_query() {
        let transport = WsTransport::new("wss://chat.example/socket?EIO=4");
        assert_eq!(
            transport.endpoint(&UserId::from("u1")),
            "wss://chat.example/socket?EIO=4&userId=u1"
        );
    }

    #[tokio::test]
    async fn unconnected_transport_rejects_io() {
        let transport = WsTransport::new("ws://localhost:4000");

        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send(b"{}").await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::NotConnected)
        ));
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let transport = WsTransport::new("ws://127.0.0.1:1");
        let result = transport.connect(&UserId::from("u1")).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(!transport.is_connected());
    }
}
