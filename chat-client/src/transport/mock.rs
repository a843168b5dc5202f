//! Mock transport for testing.
//!
//! Allows queueing inbound frames and capturing sent frames for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use veil_chat_types::UserId;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the engine
/// owns another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_identity: Option<UserId>,
    connect_count: usize,
    close_count: usize,
    sent_frames: Vec<Vec<u8>>,
    receive_queue: VecDeque<Vec<u8>>,
    fail_connects: VecDeque<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a frame to be returned by a later `recv()` call.
    pub fn queue_frame(&self, data: Vec<u8>) {
        self.lock().receive_queue.push_back(data);
    }

    /// All frames that were sent, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.lock().sent_frames.clone()
    }

    /// The last frame that was sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.lock().sent_frames.last().cloned()
    }

    /// Identity of the most recent successful connect.
    pub fn connected_identity(&self) -> Option<UserId> {
        self.lock().connected_identity.clone()
    }

    /// Number of connect attempts, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    /// Number of `close()` calls.
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// Cause the next connect() to fail with the given error.
    ///
    /// Calls stack: each one fails one more connect attempt.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_connects.push_back(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.lock().fail_next_recv = Some(error.to_string());
    }

    /// Drop the connection as if the server went away.
    pub fn drop_connection(&self) {
        self.lock().connected = false;
    }

    /// Clear all state (frames, queue, connection).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, identity: &UserId) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connect_count += 1;

        // Check for forced failure
        if let Some(error) = inner.fail_connects.pop_front() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_identity = Some(identity.clone());
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_frames.push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = inner.fail_next_recv.take() {
            return Err(TransportError::ReceiveFailed(error));
        }

        inner
            .receive_queue
            .pop_front()
            .ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.close_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::from("u1")
    }

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_connects() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect(&user()).await.unwrap();

        assert!(transport.is_connected());
        assert_eq!(transport.connected_identity(), Some(user()));
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn mock_transport_sends_frames() {
        let transport = MockTransport::new();
        transport.connect(&user()).await.unwrap();

        transport.send(b"frame 1").await.unwrap();
        transport.send(b"frame 2").await.unwrap();

        let sent = transport.sent_frames();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], b"frame 1");
        assert_eq!(transport.last_sent(), Some(b"frame 2".to_vec()));
    }

    #[tokio::test]
    async fn mock_transport_receives_queued_frames_then_closes() {
        let transport = MockTransport::new();
        transport.connect(&user()).await.unwrap();
        transport.queue_frame(b"frame".to_vec());

        assert_eq!(transport.recv().await.unwrap(), b"frame");
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn mock_transport_closes() {
        let transport = MockTransport::new();
        transport.connect(&user()).await.unwrap();

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(!transport.is_connected());
        assert_eq!(transport.close_count(), 2);
    }

    // ===========================================
    // Error Condition Tests
    // ===========================================

    #[tokio::test]
    async fn send_and_recv_without_connect_fail() {
        let transport = MockTransport::new();

        assert!(matches!(
            transport.send(b"data").await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn forced_connect_failures_stack() {
        let transport = MockTransport::new();
        transport.fail_next_connect("refused");
        transport.fail_next_connect("refused again");

        assert!(transport.connect(&user()).await.is_err());
        assert!(transport.connect(&user()).await.is_err());
        transport.connect(&user()).await.unwrap();

        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn forced_send_failure_is_one_shot() {
        let transport = MockTransport::new();
        transport.connect(&user()).await.unwrap();
        transport.fail_next_send("buffer full");

        let result = transport.send(b"data").await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));

        transport.send(b"data").await.unwrap();
    }

    #[tokio::test]
    async fn forced_recv_failure_keeps_queue() {
        let transport = MockTransport::new();
        transport.connect(&user()).await.unwrap();
        transport.queue_frame(b"data".to_vec());
        transport.fail_next_recv("timeout");

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::ReceiveFailed(_))));
        assert_eq!(transport.recv().await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn dropped_connection_rejects_sends() {
        let transport = MockTransport::new();
        transport.connect(&user()).await.unwrap();

        transport.drop_connection();

        assert!(!transport.is_connected());
        assert!(transport.send(b"x").await.is_err());
    }

    // ===========================================
    // Clone and Shared State Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_clone_shares_state() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1.connect(&user()).await.unwrap();
        assert!(transport2.is_connected());

        transport2.send(b"from t2").await.unwrap();
        assert_eq!(transport1.sent_frames().len(), 1);

        transport1.reset();
        assert!(!transport2.is_connected());
        assert!(transport2.connected_identity().is_none());
    }
}
