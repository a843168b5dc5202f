//! Identity types for Veil.
//!
//! User, chat and message ids are assigned by the backend and treated as
//! opaque strings. [`ClientMessageId`] is the only id minted locally; it
//! tags optimistic sends so the server echo can be matched back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the tentative id given to an optimistic local message.
const PENDING_PREFIX: &str = "local-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw id.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

string_id!(
    /// Backend identifier of a user account.
    ///
    /// Also the key the realtime connection is opened with.
    UserId
);

string_id!(
    /// Backend identifier of a one-to-one conversation.
    ChatId
);

string_id!(
    /// Identifier of a message.
    ///
    /// Server-assigned once delivered; optimistic local inserts carry a
    /// tentative id built by [`MessageId::pending`].
    MessageId
);

impl MessageId {
    /// Tentative id for an optimistic insert, derived from the client id.
    pub fn pending(client_id: &ClientMessageId) -> Self {
        Self(format!("{PENDING_PREFIX}{client_id}"))
    }

    /// Whether this id was minted locally for a message not yet echoed.
    pub fn is_pending(&self) -> bool {
        self.0.starts_with(PENDING_PREFIX)
    }
}

/// Locally generated id that reconciles an optimistic send with its echo.
///
/// UUID v4 format, serialized as a hyphenated string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientMessageId(uuid::Uuid);

impl ClientMessageId {
    /// Create a new random ClientMessageId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ClientMessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ClientMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientMessageId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_compare_by_value() {
        assert_eq!(UserId::from("u1"), UserId::new("u1".to_string()));
        assert_ne!(ChatId::from("c1"), ChatId::from("c2"));
    }

    #[test]
    fn string_id_serializes_transparently() {
        let json = serde_json::to_string(&ChatId::from("c1")).unwrap();
        assert_eq!(json, "\"c1\"");

        let restored: UserId = serde_json::from_str("\"u-42\"").unwrap();
        assert_eq!(restored.as_str(), "u-42");
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", MessageId::from("m1")), "MessageId(m1)");
    }

    #[test]
    fn client_message_id_is_uuid_v4() {
        let id = ClientMessageId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
        assert_ne!(id, ClientMessageId::new());
    }

    #[test]
    fn pending_message_id_is_recognised() {
        let client_id = ClientMessageId::new();
        let pending = MessageId::pending(&client_id);

        assert!(pending.is_pending());
        assert!(pending.as_str().ends_with(&client_id.to_string()));
        assert!(!MessageId::from("665f1c2e9b").is_pending());
    }
}
