//! ConnectionManager - owner of the realtime connection.
//!
//! Interprets the actions of the pure [`ConnectionState`] machine from
//! chat-core against a [`Transport`]. Nothing else in the crate touches
//! the transport, so there is at most one live connection and it is
//! always keyed by the identity the state machine holds.
//!
//! Retries are not timers running on their own: after a failure the
//! machine records a delay, and [`ConnectionManager::reconnect`] sleeps
//! it out. [`ConnectionManager::disconnect`] wakes any sleeping retry
//! through a watch channel and it gives up.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use veil_chat_core::{
    ConnectionAction, ConnectionEvent, ConnectionNotice, ConnectionState, ConnectionStatus,
    ReconnectPolicy,
};
use veil_chat_types::UserId;

use crate::client::ClientError;
use crate::transport::Transport;

/// Drives one connection through its lifecycle.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    policy: ReconnectPolicy,
    state: Mutex<ConnectionState>,
    // Serializes lifecycle operations; never held while sleeping.
    lifecycle: Mutex<()>,
    retry_delay: Mutex<Option<Duration>>,
    cancel: watch::Sender<u64>,
    notices: Mutex<Vec<ConnectionNotice>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager around a transport.
    pub fn new(transport: T, policy: ReconnectPolicy) -> Self {
        Self {
            transport,
            policy,
            state: Mutex::new(ConnectionState::new()),
            lifecycle: Mutex::new(()),
            retry_delay: Mutex::new(None),
            cancel: watch::channel(0).0,
            notices: Mutex::new(Vec::new()),
        }
    }

    /// Open the connection for `identity`.
    ///
    /// A no-op when already connected (or connecting) as that identity; a
    /// different identity replaces the current connection. On failure the
    /// error is returned and a retry is scheduled for [`Self::reconnect`].
    pub async fn connect(&self, identity: UserId) -> Result<(), ClientError> {
        let _guard = self.lifecycle.lock().await;
        self.drive(ConnectionEvent::ConnectRequested { identity })
            .await
    }

    /// Tear the connection down and cancel pending retries.
    ///
    /// Safe to call in any state, any number of times.
    pub async fn disconnect(&self) {
        self.cancel.send_modify(|generation| *generation = generation.wrapping_add(1));
        let _guard = self.lifecycle.lock().await;
        // Disconnect never opens a transport, so it cannot fail.
        let _ = self.drive(ConnectionEvent::DisconnectRequested).await;
        *self.retry_delay.lock().await = None;
    }

    /// Report that the live transport went away; schedules a retry.
    ///
    /// Fails with `ReconnectExhausted` when the policy allows no retries.
    pub async fn handle_transport_lost(&self, reason: &str) -> Result<(), ClientError> {
        let _guard = self.lifecycle.lock().await;
        self.drive(ConnectionEvent::TransportLost {
            reason: reason.to_string(),
        })
        .await
    }

    /// Run scheduled retries until connected, cancelled or out of attempts.
    ///
    /// Returns `Ok(())` when connected, when cancelled by
    /// [`Self::disconnect`], or when no retry was scheduled.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let mut cancel = self.cancel.subscribe();
        loop {
            let Some(delay) = self.retry_delay.lock().await.take() else {
                return Ok(());
            };

            tracing::debug!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.changed() => {
                    tracing::debug!("Reconnect cancelled");
                    return Ok(());
                }
            }

            let _guard = self.lifecycle.lock().await;
            if cancel.has_changed().unwrap_or(true) {
                return Ok(());
            }
            match self.drive(ConnectionEvent::ReconnectTimer).await {
                Ok(()) => return Ok(()),
                Err(err @ ClientError::ReconnectExhausted { .. }) => return Err(err),
                Err(err) => tracing::debug!("Reconnect attempt failed: {}", err),
            }
        }
    }

    /// Send one frame. Only while connected; the frame is dropped otherwise.
    pub async fn send(&self, frame: &[u8]) -> Result<(), ClientError> {
        if !self.is_connected().await {
            return Err(ClientError::NotConnected);
        }
        self.transport.send(frame).await?;
        Ok(())
    }

    /// Receive one frame.
    pub async fn recv(&self) -> Result<Vec<u8>, ClientError> {
        if !self.is_connected().await {
            return Err(ClientError::NotConnected);
        }
        Ok(self.transport.recv().await?)
    }

    /// Coarse status.
    pub async fn status(&self) -> ConnectionStatus {
        self.state.lock().await.status()
    }

    /// Whether the connection is live.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_connected()
    }

    /// Whether a retry is scheduled.
    pub async fn is_reconnecting(&self) -> bool {
        self.state.lock().await.is_reconnecting()
    }

    /// Identity the connection is (or will be) keyed by.
    pub async fn identity(&self) -> Option<UserId> {
        self.state.lock().await.identity().cloned()
    }

    /// Drain the notices reported since the last call.
    pub async fn take_notices(&self) -> Vec<ConnectionNotice> {
        std::mem::take(&mut *self.notices.lock().await)
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn transition(&self, event: ConnectionEvent) -> Vec<ConnectionAction> {
        let mut state = self.state.lock().await;
        let (next, actions) = state.clone().on_event(event, &self.policy);
        *state = next;
        actions
    }

    /// Feed one event and execute the resulting actions, including the
    /// follow-up events that connecting produces.
    async fn drive(&self, event: ConnectionEvent) -> Result<(), ClientError> {
        let mut queue: VecDeque<ConnectionAction> = self.transition(event).await.into();
        let mut failure = None;

        while let Some(action) = queue.pop_front() {
            match action {
                ConnectionAction::Connect { identity } => {
                    match self.transport.connect(&identity).await {
                        Ok(()) => {
                            queue.extend(self.transition(ConnectionEvent::ConnectSucceeded).await)
                        }
                        Err(e) => {
                            let error = e.to_string();
                            failure = Some(ClientError::ConnectionFailed(error.clone()));
                            queue.extend(
                                self.transition(ConnectionEvent::ConnectFailed { error })
                                    .await,
                            );
                        }
                    }
                }
                ConnectionAction::Teardown => {
                    if let Err(e) = self.transport.close().await {
                        tracing::debug!("Transport close failed: {}", e);
                    }
                }
                ConnectionAction::StartReconnectTimer { delay } => {
                    *self.retry_delay.lock().await = Some(delay);
                }
                ConnectionAction::CancelReconnect => {
                    *self.retry_delay.lock().await = None;
                }
                ConnectionAction::Emit(notice) => {
                    if let ConnectionNotice::ReconnectExhausted { attempts } = notice {
                        failure = Some(ClientError::ReconnectExhausted { attempts });
                    }
                    self.report(notice).await;
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn report(&self, notice: ConnectionNotice) {
        match &notice {
            ConnectionNotice::Connected { identity } => {
                tracing::info!("Connected as {}", identity);
            }
            ConnectionNotice::ConnectionFailed { attempt, error } => {
                tracing::warn!("Connect attempt {} failed: {}", attempt, error);
            }
            ConnectionNotice::Disconnected { reason } => {
                tracing::info!("Disconnected: {}", reason);
            }
            ConnectionNotice::ReconnectExhausted { attempts } => {
                tracing::error!("Giving up after {} reconnect attempts", attempts);
            }
        }
        self.notices.lock().await.push(notice);
    }
}
