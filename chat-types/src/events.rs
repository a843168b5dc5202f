//! Named realtime events exchanged with the messaging backend.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}`.
//! [`ServerEvent`] covers what the backend pushes, [`ClientEvent`] covers
//! the fire-and-forget intents this client emits.

use serde::{Deserialize, Serialize};

use crate::{ChatId, Message, OutgoingMessage, UserId, WireError};

/// Events pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A message for one of the local user's chats
    #[serde(rename = "message:receive")]
    MessageReceived(MessageEnvelope),
    /// Peer started typing
    #[serde(rename = "typing:start")]
    TypingStarted(TypingNotice),
    /// Peer stopped typing
    #[serde(rename = "typing:stop")]
    TypingStopped(TypingNotice),
    /// A user came online
    #[serde(rename = "user:online")]
    UserOnline(PresenceNotice),
    /// A user went offline
    #[serde(rename = "user:offline")]
    UserOffline(PresenceNotice),
    /// A user is looking at their conversation with us
    #[serde(rename = "user:viewing")]
    UserViewing(PresenceNotice),
    /// A user left their conversation with us
    #[serde(rename = "user:not-viewing")]
    UserNotViewing(PresenceNotice),
}

impl ServerEvent {
    /// Wire names of every inbound event.
    pub const NAMES: [&'static str; 7] = [
        "message:receive",
        "typing:start",
        "typing:stop",
        "user:online",
        "user:offline",
        "user:viewing",
        "user:not-viewing",
    ];

    /// Wire name of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageReceived(_) => "message:receive",
            Self::TypingStarted(_) => "typing:start",
            Self::TypingStopped(_) => "typing:stop",
            Self::UserOnline(_) => "user:online",
            Self::UserOffline(_) => "user:offline",
            Self::UserViewing(_) => "user:viewing",
            Self::UserNotViewing(_) => "user:not-viewing",
        }
    }

    /// Decode a frame received from the transport.
    ///
    /// A frame without `data` is accepted for events whose payload is
    /// entirely optional (typing notices).
    pub fn from_json(bytes: &[u8]) -> Result<Self, WireError> {
        let mut frame: serde_json::Value =
            serde_json::from_slice(bytes).map_err(WireError::Decode)?;

        let name = frame
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if !Self::NAMES.contains(&name.as_str()) {
            return Err(WireError::UnknownEvent(name));
        }

        if let Some(obj) = frame.as_object_mut() {
            obj.entry("data")
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
        }
        serde_json::from_value(frame).map_err(WireError::Decode)
    }

    /// Encode as a frame (used by tooling and tests to fake the backend).
    pub fn to_json(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }
}

/// Intents emitted by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Send a message to a chat
    #[serde(rename = "message:send")]
    SendMessage {
        /// Target chat
        #[serde(rename = "chatId")]
        chat_id: ChatId,
        /// Message body
        message: OutgoingMessage,
    },
    /// Local user started typing
    #[serde(rename = "typing:start")]
    TypingStart(ChatRef),
    /// Local user stopped typing
    #[serde(rename = "typing:stop")]
    TypingStop(ChatRef),
    /// Subscribe to a chat room
    #[serde(rename = "chat:join")]
    JoinChat(ChatRef),
    /// Unsubscribe from a chat room
    #[serde(rename = "chat:leave")]
    LeaveChat(ChatRef),
    /// Local user is looking at a chat
    #[serde(rename = "chat:viewing")]
    Viewing(ChatRef),
    /// Local user stopped looking at a chat
    #[serde(rename = "chat:not-viewing")]
    NotViewing(ChatRef),
}

impl ClientEvent {
    /// Wire name of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "message:send",
            Self::TypingStart(_) => "typing:start",
            Self::TypingStop(_) => "typing:stop",
            Self::JoinChat(_) => "chat:join",
            Self::LeaveChat(_) => "chat:leave",
            Self::Viewing(_) => "chat:viewing",
            Self::NotViewing(_) => "chat:not-viewing",
        }
    }

    /// Chat this intent targets.
    pub fn chat_id(&self) -> &ChatId {
        match self {
            Self::SendMessage { chat_id, .. } => chat_id,
            Self::TypingStart(r)
            | Self::TypingStop(r)
            | Self::JoinChat(r)
            | Self::LeaveChat(r)
            | Self::Viewing(r)
            | Self::NotViewing(r) => &r.chat_id,
        }
    }

    /// Encode as a frame for the transport.
    pub fn to_json(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Decode a frame (used by tooling and tests to inspect sent frames).
    pub fn from_json(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Decode)
    }
}

/// Payload of `message:receive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Chat the message belongs to
    pub chat_id: ChatId,
    /// The message itself
    pub message: Message,
}

/// Payload of the typing notices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    /// Chat the peer is typing in, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
}

/// Payload of the presence notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    /// The user whose presence changed
    pub user_id: UserId,
    /// Unix milliseconds, sent with `user:offline`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<u64>,
}

impl PresenceNotice {
    /// Notice for a user without a last-seen stamp.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            last_seen: None,
        }
    }
}

/// Payload of the chat-scoped intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    /// Target chat
    pub chat_id: ChatId,
}

impl ChatRef {
    /// Reference a chat.
    pub fn new(chat_id: impl Into<ChatId>) -> Self {
        Self {
            chat_id: chat_id.into(),
        }
    }
}
