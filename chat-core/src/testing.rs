//! Fixtures shared by the unit tests of this crate.

use veil_chat_types::{Chat, Delivery, Message, MessageId};

pub(crate) const ME: &str = "me";

pub(crate) fn chat(id: &str, participant: &str) -> Chat {
    Chat::new(id, participant, participant, participant)
}

pub(crate) fn message(id: &str, from: &str, to: &str, timestamp: u64) -> Message {
    Message {
        id: MessageId::from(id),
        sender_id: from.into(),
        receiver_id: to.into(),
        content: format!("body of {}", id),
        timestamp,
        is_encrypted: false,
        is_read: false,
        attachments: vec![],
        client_id: None,
        delivery: Delivery::Sent,
    }
}

pub(crate) fn inbound(id: &str, from: &str) -> Message {
    message(id, from, ME, 1_705_000_000_000)
}
