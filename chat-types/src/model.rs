//! The data model mirrored locally by the sync engine.
//!
//! Field names follow the backend's camelCase JSON so chat lists returned
//! by the REST collaborator deserialize directly into these types.

use chrono::DateTime;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{ChatId, ClientMessageId, MessageId, UserId};

/// Local delivery state of a message. Never sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Inserted optimistically, waiting for the server echo.
    Pending,
    /// Confirmed by the server (or received from it).
    #[default]
    Sent,
    /// The connection went away before the echo arrived.
    Failed,
}

/// A single chat message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier
    pub id: MessageId,
    /// Author of the message
    pub sender_id: UserId,
    /// Recipient of the message
    pub receiver_id: UserId,
    /// Opaque body, ciphertext when `is_encrypted`
    pub content: String,
    /// Unix milliseconds; ISO 8601 strings are accepted on input
    #[serde(deserialize_with = "unix_millis")]
    pub timestamp: u64,
    /// Whether `content` is ciphertext
    #[serde(default)]
    pub is_encrypted: bool,
    /// Read flag; once true it stays true
    #[serde(default)]
    pub is_read: bool,
    /// Attachment references, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Reconciliation key for messages this client sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientMessageId>,
    /// Local delivery state
    #[serde(skip)]
    pub delivery: Delivery,
}

/// Accept a timestamp as Unix milliseconds, a numeric string, or an
/// RFC 3339 date such as `2024-01-11T19:06:40.000Z`.
fn unix_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(ms),
        Raw::Text(text) => {
            let text = text.trim();
            if let Ok(ms) = text.parse::<u64>() {
                return Ok(ms);
            }
            let parsed = DateTime::parse_from_rfc3339(text).map_err(|e| {
                D::Error::custom(format!("invalid timestamp {:?}: {}", text, e))
            })?;
            u64::try_from(parsed.timestamp_millis()).map_err(|_| {
                D::Error::custom(format!("timestamp {:?} is before the Unix epoch", text))
            })
        }
    }
}

impl Message {
    /// Whether the message still waits for its server echo.
    pub fn is_pending(&self) -> bool {
        self.delivery == Delivery::Pending
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("sender_id", &self.sender_id)
            .field("receiver_id", &self.receiver_id)
            .field("content", &format!("[{} bytes REDACTED]", self.content.len()))
            .field("timestamp", &self.timestamp)
            .field("is_encrypted", &self.is_encrypted)
            .field("is_read", &self.is_read)
            .field("attachments", &self.attachments.len())
            .field("client_id", &self.client_id)
            .field("delivery", &self.delivery)
            .finish()
    }
}

/// Body of a send intent. The server assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Local user
    pub sender_id: UserId,
    /// Chat counterpart
    pub receiver_id: UserId,
    /// Opaque body
    pub content: String,
    /// Whether `content` is ciphertext
    pub is_encrypted: bool,
    /// Attachment references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Echoed back by the server on `message:receive`
    pub client_id: ClientMessageId,
}

/// A one-to-one conversation and its message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Chat identifier
    pub id: ChatId,
    /// The other user in the conversation
    pub participant_id: UserId,
    /// Display name of the participant
    pub participant_name: String,
    /// Handle of the participant
    pub participant_username: String,
    /// Avatar URL of the participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_avatar: Option<String>,
    /// Most recently appended message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    /// Messages received while the chat was not active
    #[serde(default)]
    pub unread_count: u32,
    /// Messages in arrival order
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Mirrored from presence
    #[serde(default)]
    pub is_online: bool,
    /// Mirrored from presence
    #[serde(default)]
    pub is_viewing: bool,
}

impl Chat {
    /// Create an empty chat with the given participant.
    pub fn new(
        id: impl Into<ChatId>,
        participant_id: impl Into<UserId>,
        participant_name: &str,
        participant_username: &str,
    ) -> Self {
        Self {
            id: id.into(),
            participant_id: participant_id.into(),
            participant_name: participant_name.to_string(),
            participant_username: participant_username.to_string(),
            participant_avatar: None,
            last_message: None,
            unread_count: 0,
            messages: Vec::new(),
            is_online: false,
            is_viewing: false,
        }
    }

    /// Set the participant avatar.
    pub fn with_avatar(mut self, url: &str) -> Self {
        self.participant_avatar = Some(url.to_string());
        self
    }

    /// Find a message by id.
    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }
}

/// Presence of a remote user.
///
/// Both flags are independent; no correlation is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    /// Connected to the backend
    pub is_online: bool,
    /// Looking at a conversation with the local user
    pub is_viewing: bool,
    /// Unix milliseconds of the last offline transition, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<u64>,
}
