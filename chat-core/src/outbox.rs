//! Outbox of optimistic sends.
//!
//! Every `message:send` the client emits is tracked here until the server
//! echoes it back. Entries are never re-sent: when the connection goes
//! away the engine drains the outbox and flags the messages failed.

use std::collections::VecDeque;

use thiserror::Error;
use veil_chat_types::{ChatId, ClientMessageId};

/// Default number of sends that may await their echo.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Error type for outbox operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboxError {
    /// Outbox is at capacity.
    #[error("outbox full (capacity: {capacity})")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },
}

/// Bounded set of sends awaiting their echo, in send order.
#[derive(Debug, Clone)]
pub struct Outbox {
    capacity: usize,
    pending: VecDeque<(ClientMessageId, ChatId)>,
}

impl Outbox {
    /// Create an outbox holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pending: VecDeque::new(),
        }
    }

    /// Track a send.
    pub fn track(&mut self, client_id: ClientMessageId, chat_id: ChatId) -> Result<(), OutboxError> {
        if self.pending.len() >= self.capacity {
            return Err(OutboxError::Full {
                capacity: self.capacity,
            });
        }
        self.pending.push_back((client_id, chat_id));
        Ok(())
    }

    /// Stop tracking a send; returns its chat when it was tracked.
    pub fn confirm(&mut self, client_id: &ClientMessageId) -> Option<ChatId> {
        let index = self.pending.iter().position(|(id, _)| id == client_id)?;
        self.pending.remove(index).map(|(_, chat)| chat)
    }

    /// Whether a send still awaits its echo.
    pub fn is_pending(&self, client_id: &ClientMessageId) -> bool {
        self.pending.iter().any(|(id, _)| id == client_id)
    }

    /// Remove and return every tracked send, oldest first.
    pub fn drain(&mut self) -> Vec<(ClientMessageId, ChatId)> {
        self.pending.drain(..).collect()
    }

    /// Number of tracked sends.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat() -> ChatId {
        ChatId::from("c1")
    }

    #[test]
    fn tracks_until_confirmed() {
        let mut outbox = Outbox::default();
        let id = ClientMessageId::new();

        outbox.track(id, chat()).unwrap();
        assert!(outbox.is_pending(&id));

        assert_eq!(outbox.confirm(&id), Some(chat()));
        assert!(!outbox.is_pending(&id));
        assert!(outbox.is_empty());
    }

    #[test]
    fn confirm_unknown_returns_none() {
        let mut outbox = Outbox::default();
        assert_eq!(outbox.confirm(&ClientMessageId::new()), None);
    }

    #[test]
    fn respects_capacity() {
        let mut outbox = Outbox::new(2);
        outbox.track(ClientMessageId::new(), chat()).unwrap();
        outbox.track(ClientMessageId::new(), chat()).unwrap();

        let result = outbox.track(ClientMessageId::new(), chat());

        assert_eq!(result, Err(OutboxError::Full { capacity: 2 }));
        assert_eq!(outbox.len(), 2);
    }

    #[test]
    fn confirm_frees_space() {
        let mut outbox = Outbox::new(1);
        let id = ClientMessageId::new();
        outbox.track(id, chat()).unwrap();
        outbox.confirm(&id);

        assert!(outbox.track(ClientMessageId::new(), chat()).is_ok());
    }

    #[test]
    fn drain_returns_send_order_and_empties() {
        let mut outbox = Outbox::default();
        let first = ClientMessageId::new();
        let second = ClientMessageId::new();
        outbox.track(first, chat()).unwrap();
        outbox.track(second, ChatId::from("c2")).unwrap();

        let drained = outbox.drain();

        assert_eq!(drained, vec![(first, chat()), (second, ChatId::from("c2"))]);
        assert!(outbox.is_empty());
        assert_eq!(outbox.capacity(), DEFAULT_OUTBOX_CAPACITY);
    }
}
