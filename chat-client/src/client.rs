//! ChatClient - the main interface of the Veil sync engine.
//!
//! This module provides [`ChatClient`], which keeps a local mirror of the
//! signed-in user's chats consistent with the server over one realtime
//! connection.
//!
//! # Architecture
//!
//! ChatClient owns the pure pieces from chat-core (session machine, local
//! mirror, router) and interprets what they produce: session effects
//! become connection changes, intents become frames on the transport.
//!
//! ```text
//! UI ──intents──> ChatClient ──frames──> ConnectionManager ──> Transport
//!  ^                  │  ^                                        │
//!  └──snapshots── LocalMirror <──route── frames ──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use veil_chat_client::{ChatClient, ClientConfig, WsTransport};
//!
//! let config = ClientConfig::default();
//! let client = ChatClient::new(config.clone(), WsTransport::new(&config.server.url));
//!
//! client.login_succeeded(user_id).await?;
//! client.set_chats(chats_from_rest).await?;
//! client.send_message(&chat_id, ciphertext, true, vec![]).await?;
//! client.run().await?;
//! ```

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::Mutex;
use veil_chat_core::{
    prepare, route, AuthState, ConnectionStatus, Intent, LocalMirror, MirrorSnapshot, Outbox,
    RouteError, RouteOutcome, Session, SessionEffect, SessionError, VerifyFailure,
};
use veil_chat_types::{
    Chat, ChatId, ClientEvent, ClientMessageId, MessageId, Presence, ServerEvent, UserId,
    WireError,
};

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::transport::{Transport, TransportError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Intent could not be turned into an event.
    #[error("route error: {0}")]
    Route(#[from] RouteError),

    /// Session rejected the operation.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// No live connection; the intent was dropped.
    #[error("not connected")]
    NotConnected,

    /// Nobody is signed in.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Retries used up.
    #[error("reconnect gave up after {attempts} attempts")]
    ReconnectExhausted {
        /// Retries that were made.
        attempts: u32,
    },
}

/// The sync engine.
///
/// Every mutation goes through one of the async mutexes below, and
/// inbound frames are routed one at a time in transport order.
pub struct ChatClient<T: Transport> {
    config: ClientConfig,
    connection: ConnectionManager<T>,
    session: Mutex<Session>,
    mirror: Mutex<Option<LocalMirror>>,
}

impl<T: Transport> ChatClient<T> {
    /// Create a client. Nothing connects until a session authenticates.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let connection = ConnectionManager::new(transport, config.reconnect.policy());
        let session = Session::with_cooldown(config.resend_cooldown());
        Self {
            config,
            connection,
            session: Mutex::new(session),
            mirror: Mutex::new(None),
        }
    }

    // ===========================================
    // Session outcomes
    // ===========================================

    /// Read the session under its lock.
    pub async fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        let session = self.session.lock().await;
        f(&session)
    }

    /// Run a session operation that cannot change authentication.
    async fn update_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.lock().await;
        f(&mut session)
    }

    /// Registration accepted; OTP pending for `email`.
    pub async fn register_succeeded(&self, email: &str) {
        self.update_session(|s| s.register_succeeded(email, Instant::now()))
            .await
    }

    /// Registration refused.
    pub async fn register_failed(&self, message: &str) {
        self.update_session(|s| s.register_failed(message)).await
    }

    /// Registration code accepted and the account created.
    pub async fn otp_verified(&self, email: &str, user: UserId) -> Result<(), ClientError> {
        self.session_transition(|s| s.otp_verified(email, user))
            .await
    }

    /// A verify call failed.
    pub async fn otp_rejected(&self, failure: VerifyFailure) {
        self.update_session(|s| s.otp_rejected(failure)).await
    }

    /// Drop the pending OTP flow.
    pub async fn cancel_pending(&self) {
        self.update_session(|s| s.cancel_pending()).await
    }

    /// Ask for another code.
    pub async fn request_resend(&self) -> Result<(), ClientError> {
        self.update_session(|s| s.request_resend(Instant::now()))
            .await
            .map_err(ClientError::from)
    }

    /// Time left before another code may be requested.
    pub async fn resend_remaining(&self) -> Option<Duration> {
        self.with_session(|s| s.resend_remaining(Instant::now()))
            .await
    }

    /// Forgot-password accepted; reset OTP pending for `email`.
    pub async fn forgot_password_succeeded(&self, email: &str) {
        self.update_session(|s| s.forgot_password_succeeded(email, Instant::now()))
            .await
    }

    /// Forgot-password refused.
    pub async fn forgot_password_failed(&self, message: &str) {
        self.update_session(|s| s.forgot_password_failed(message))
            .await
    }

    /// Reset code accepted.
    pub async fn reset_otp_verified(&self, email: &str) {
        self.update_session(|s| s.reset_otp_verified(email)).await
    }

    /// The reset call failed.
    pub async fn password_reset_failed(&self, failure: VerifyFailure) {
        self.update_session(|s| s.password_reset_failed(failure))
            .await
    }

    /// Password replaced; ends any signed-in session.
    pub async fn password_reset_succeeded(&self) -> Result<(), ClientError> {
        self.session_transition(|s| s.password_reset_succeeded())
            .await
    }

    /// Credentials accepted.
    pub async fn login_succeeded(&self, user: UserId) -> Result<(), ClientError> {
        self.session_transition(|s| s.login_succeeded(user)).await
    }

    /// Credentials refused.
    pub async fn login_failed(&self, message: &str) {
        self.update_session(|s| s.login_failed(message)).await
    }

    /// Dismiss the last user-facing error.
    pub async fn clear_error(&self) {
        self.update_session(|s| s.clear_error()).await
    }

    /// Stored session resolved at startup.
    pub async fn session_restored(&self, user: UserId) -> Result<(), ClientError> {
        self.session_transition(|s| s.session_restored(user)).await
    }

    /// Session refresh failed.
    pub async fn session_restore_failed(&self) -> Result<(), ClientError> {
        self.session_transition(|s| s.session_restore_failed())
            .await
    }

    /// Logout finished (successfully or not).
    pub async fn logged_out(&self) -> Result<(), ClientError> {
        self.session_transition(|s| s.logged_out()).await
    }

    async fn session_transition(
        &self,
        f: impl FnOnce(&mut Session) -> Vec<SessionEffect>,
    ) -> Result<(), ClientError> {
        let effects = self.update_session(f).await;
        let mut result = Ok(());
        for effect in effects {
            if let Err(e) = self.apply_effect(effect).await {
                result = Err(e);
            }
        }
        result
    }

    async fn apply_effect(&self, effect: SessionEffect) -> Result<(), ClientError> {
        match effect {
            SessionEffect::Connect(user) => {
                {
                    let mut mirror = self.mirror.lock().await;
                    if mirror.as_ref().map(LocalMirror::user) != Some(&user) {
                        if let Some(previous) = mirror.as_mut() {
                            previous.fail_pending();
                        }
                        *mirror = Some(LocalMirror::new(
                            user.clone(),
                            Outbox::new(self.config.outbox.capacity),
                        ));
                    }
                }
                self.connection.connect(user).await
            }
            SessionEffect::Disconnect => {
                self.connection.disconnect().await;
                if let Some(mut mirror) = self.mirror.lock().await.take() {
                    let failed = mirror.fail_pending();
                    if failed > 0 {
                        tracing::info!("Discarded {} unconfirmed sends at sign-out", failed);
                    }
                }
                Ok(())
            }
        }
    }

    // ===========================================
    // Inbound
    // ===========================================

    /// Decode one frame and apply it to the mirror.
    pub async fn handle_frame(&self, frame: &[u8]) -> Result<RouteOutcome, ClientError> {
        let event = match ServerEvent::from_json(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame ({} bytes): {}", frame.len(), e);
                return Err(e.into());
            }
        };

        let mut mirror = self.mirror.lock().await;
        let Some(mirror) = mirror.as_mut() else {
            tracing::debug!("Ignoring {} event: no session", event.kind());
            return Ok(RouteOutcome::Ignored);
        };

        let kind = event.kind();
        let outcome = route(mirror, event);
        match &outcome {
            RouteOutcome::Ignored => tracing::debug!("Ignored {} event", kind),
            RouteOutcome::Duplicate => tracing::debug!("Duplicate {} event", kind),
            _ => tracing::trace!("Applied {} event", kind),
        }
        Ok(outcome)
    }

    /// Receive and apply one frame.
    pub async fn poll_once(&self) -> Result<RouteOutcome, ClientError> {
        let frame = self.connection.recv().await?;
        self.handle_frame(&frame).await
    }

    /// Process frames until the session ends or retries run out.
    ///
    /// A lost connection fails the unconfirmed sends, then the retry loop
    /// runs. Returns `Ok(())` once disconnected on purpose.
    pub async fn run(&self) -> Result<(), ClientError> {
        loop {
            if self.connection.is_connected().await {
                match self.connection.recv().await {
                    Ok(frame) => {
                        // Bad frames are logged by handle_frame and skipped.
                        let _ = self.handle_frame(&frame).await;
                        continue;
                    }
                    Err(e) => {
                        if !self.connection.is_connected().await {
                            continue;
                        }
                        tracing::warn!("Connection lost: {}", e);
                        self.fail_pending_sends().await;
                        self.connection
                            .handle_transport_lost(&e.to_string())
                            .await?;
                    }
                }
            }

            if self.connection.is_reconnecting().await {
                self.connection.reconnect().await?;
                continue;
            }
            if !self.connection.is_connected().await {
                return Ok(());
            }
        }
    }

    async fn fail_pending_sends(&self) {
        if let Some(mirror) = self.mirror.lock().await.as_mut() {
            let failed = mirror.fail_pending();
            if failed > 0 {
                tracing::info!("Marked {} unconfirmed sends failed", failed);
            }
        }
    }

    // ===========================================
    // Intents
    // ===========================================

    /// Send a message. Returns the id that will reconcile the echo.
    pub async fn send_message(
        &self,
        chat_id: &ChatId,
        content: String,
        is_encrypted: bool,
        attachments: Vec<String>,
    ) -> Result<ClientMessageId, ClientError> {
        let event = self
            .emit(Intent::SendMessage {
                chat_id: chat_id.clone(),
                content,
                is_encrypted,
                attachments,
            })
            .await?;
        match event {
            ClientEvent::SendMessage { message, .. } => Ok(message.client_id),
            other => Err(ClientError::Route(RouteError::UnknownChat(
                other.chat_id().clone(),
            ))),
        }
    }

    /// Tell the peer we are typing.
    pub async fn start_typing(&self, chat_id: &ChatId) -> Result<(), ClientError> {
        self.emit(Intent::StartTyping {
            chat_id: chat_id.clone(),
        })
        .await
        .map(drop)
    }

    /// Tell the peer we stopped typing.
    pub async fn stop_typing(&self, chat_id: &ChatId) -> Result<(), ClientError> {
        self.emit(Intent::StopTyping {
            chat_id: chat_id.clone(),
        })
        .await
        .map(drop)
    }

    /// Subscribe to a chat room.
    pub async fn join_chat(&self, chat_id: &ChatId) -> Result<(), ClientError> {
        self.emit(Intent::JoinChat {
            chat_id: chat_id.clone(),
        })
        .await
        .map(drop)
    }

    /// Unsubscribe from a chat room.
    pub async fn leave_chat(&self, chat_id: &ChatId) -> Result<(), ClientError> {
        self.emit(Intent::LeaveChat {
            chat_id: chat_id.clone(),
        })
        .await
        .map(drop)
    }

    /// Tell the peer we are looking at the chat.
    pub async fn mark_viewing(&self, chat_id: &ChatId) -> Result<(), ClientError> {
        self.emit(Intent::MarkViewing {
            chat_id: chat_id.clone(),
        })
        .await
        .map(drop)
    }

    /// Tell the peer we left the chat.
    pub async fn mark_not_viewing(&self, chat_id: &ChatId) -> Result<(), ClientError> {
        self.emit(Intent::MarkNotViewing {
            chat_id: chat_id.clone(),
        })
        .await
        .map(drop)
    }

    /// Prepare and send one intent. The mirror lock is held until the
    /// frame is handed to the transport, so frames leave in call order.
    async fn emit(&self, intent: Intent) -> Result<ClientEvent, ClientError> {
        if !self.connection.is_connected().await {
            tracing::debug!("Dropping intent for {}: not connected", intent.chat_id());
            return Err(ClientError::NotConnected);
        }

        let mut guard = self.mirror.lock().await;
        let mirror = guard.as_mut().ok_or(ClientError::NotAuthenticated)?;

        let event = prepare(mirror, intent, now_ms())?;
        let sent = match event.to_json() {
            Ok(frame) => self.connection.send(&frame).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = sent {
            if let ClientEvent::SendMessage { chat_id, message } = &event {
                mirror.fail_send(chat_id, &message.client_id);
            }
            tracing::warn!("Failed to emit {}: {}", event.kind(), e);
            return Err(e);
        }
        Ok(event)
    }

    // ===========================================
    // Local store operations
    // ===========================================

    async fn with_mirror<R>(
        &self,
        f: impl FnOnce(&mut LocalMirror) -> R,
    ) -> Result<R, ClientError> {
        let mut mirror = self.mirror.lock().await;
        mirror.as_mut().map(f).ok_or(ClientError::NotAuthenticated)
    }

    /// Replace the chat list (from the REST collaborator).
    pub async fn set_chats(&self, chats: Vec<Chat>) -> Result<(), ClientError> {
        self.with_mirror(|m| m.set_chats(chats)).await
    }

    /// Change the chat being viewed.
    pub async fn set_active_chat(&self, chat: Option<Chat>) -> Result<(), ClientError> {
        self.with_mirror(|m| m.set_active_chat(chat)).await
    }

    /// Mark a chat read.
    pub async fn mark_messages_read(&self, chat_id: &ChatId) -> Result<(), ClientError> {
        self.with_mirror(|m| m.mark_messages_read(chat_id)).await
    }

    /// Reveal one message.
    pub async fn unlock_message(&self, id: MessageId) -> Result<(), ClientError> {
        self.with_mirror(|m| m.unlock_message(id)).await
    }

    /// Hide the revealed message.
    pub async fn lock_message(&self) -> Result<(), ClientError> {
        self.with_mirror(|m| m.lock_message()).await
    }

    /// Record a presence change reported outside the realtime channel.
    pub async fn set_online(&self, user: UserId, online: bool) -> Result<Presence, ClientError> {
        self.with_mirror(|m| m.set_online(user, online, None)).await
    }

    /// Record a viewing change reported outside the realtime channel.
    pub async fn set_viewing(&self, user: UserId, viewing: bool) -> Result<Presence, ClientError> {
        self.with_mirror(|m| m.set_viewing(user, viewing)).await
    }

    // ===========================================
    // Snapshots
    // ===========================================

    /// Chats in load order (empty when signed out).
    pub async fn chats(&self) -> Vec<Chat> {
        self.with_mirror(|m| m.store().chats().to_vec())
            .await
            .unwrap_or_default()
    }

    /// The chat being viewed.
    pub async fn active_chat(&self) -> Option<Chat> {
        self.with_mirror(|m| m.store().active_chat().cloned())
            .await
            .ok()
            .flatten()
    }

    /// Presence of a user.
    pub async fn presence(&self, user: &UserId) -> Presence {
        self.with_mirror(|m| m.presence().get(user))
            .await
            .unwrap_or_default()
    }

    /// The revealed message.
    pub async fn unlocked_message_id(&self) -> Option<MessageId> {
        self.with_mirror(|m| m.store().unlocked_message_id().cloned())
            .await
            .ok()
            .flatten()
    }

    /// Whether the peer of the active chat is typing.
    pub async fn peer_typing(&self) -> bool {
        self.with_mirror(|m| m.peer_typing()).await.unwrap_or(false)
    }

    /// Full mirror snapshot, when signed in.
    pub async fn snapshot(&self) -> Option<MirrorSnapshot> {
        self.with_mirror(|m| m.snapshot()).await.ok()
    }

    /// Coarse connection status.
    pub async fn status(&self) -> ConnectionStatus {
        self.connection.status().await
    }

    /// Copy of the session state.
    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Current authentication state.
    pub async fn auth_state(&self) -> AuthState {
        self.session.lock().await.state()
    }

    /// The connection manager (for lifecycle control and testing).
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
