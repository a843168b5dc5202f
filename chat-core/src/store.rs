//! Local chat store.
//!
//! Holds the chat list in load order and the chat the user is looking at.
//! The active chat is normally a reference into the list. When the UI
//! opens a chat the list does not know yet (a search result, a freshly
//! created conversation) it is kept as a detached copy, and
//! [`ChatStore::set_chats`] attaches it again once the list contains it.
//! Either way there is one copy per chat id, so the list and the active
//! chat cannot disagree.

use veil_chat_types::{
    Chat, ChatId, ClientMessageId, Delivery, Message, MessageId, Presence, UserId,
};

#[derive(Debug, Clone, Default)]
enum Active {
    #[default]
    None,
    Listed(ChatId),
    Detached(Box<Chat>),
}

/// Chats, the active chat and the unlocked message.
#[derive(Debug, Clone, Default)]
pub struct ChatStore {
    chats: Vec<Chat>,
    active: Active,
    unlocked: Option<MessageId>,
}

impl ChatStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the chat list. No merge with the previous list.
    pub fn set_chats(&mut self, chats: Vec<Chat>) {
        let previous = std::mem::take(&mut self.active);
        self.chats = chats;
        self.active = match previous {
            Active::None => Active::None,
            Active::Listed(id) if self.position(&id).is_some() => Active::Listed(id),
            Active::Listed(_) => Active::None,
            Active::Detached(chat) if self.position(&chat.id).is_some() => {
                Active::Listed(chat.id)
            }
            Active::Detached(chat) => Active::Detached(chat),
        };
    }

    /// Designate (or clear) the chat being viewed. Unread counts are untouched.
    pub fn set_active_chat(&mut self, chat: Option<Chat>) {
        self.active = match chat {
            None => Active::None,
            Some(chat) if self.position(&chat.id).is_some() => Active::Listed(chat.id),
            Some(chat) => Active::Detached(Box::new(chat)),
        };
    }

    /// Append a message to a chat and update its last message.
    ///
    /// Returns `false` and drops the message when the chat is unknown.
    pub fn add_message(&mut self, chat_id: &ChatId, message: Message) -> bool {
        let mut applied = false;
        for chat in self.copies_mut(chat_id) {
            chat.last_message = Some(message.clone());
            chat.messages.push(message.clone());
            applied = true;
        }
        applied
    }

    /// Mark every message of a chat read and zero its unread count.
    pub fn mark_messages_read(&mut self, chat_id: &ChatId) {
        for chat in self.copies_mut(chat_id) {
            chat.unread_count = 0;
            for message in chat.messages.iter_mut() {
                message.is_read = true;
            }
            if let Some(last) = chat.last_message.as_mut() {
                last.is_read = true;
            }
        }
    }

    /// Count one more unread message on a chat.
    pub fn increment_unread(&mut self, chat_id: &ChatId) {
        for chat in self.copies_mut(chat_id) {
            chat.unread_count = chat.unread_count.saturating_add(1);
        }
    }

    /// Whether a chat already holds a message with this id.
    pub fn contains_message(&self, chat_id: &ChatId, message_id: &MessageId) -> bool {
        self.chat(chat_id)
            .is_some_and(|chat| chat.message(message_id).is_some())
    }

    /// Replace the optimistic entry sent as `client_id` with the server's copy.
    ///
    /// Matches entries still pending or already failed. The entry keeps its
    /// position in the list, and a read flag set locally stays set. Returns
    /// `false` when no such entry exists.
    pub fn confirm_pending(
        &mut self,
        chat_id: &ChatId,
        client_id: &ClientMessageId,
        mut confirmed: Message,
    ) -> bool {
        confirmed.client_id = Some(*client_id);
        confirmed.delivery = Delivery::Sent;

        let mut applied = false;
        for chat in self.copies_mut(chat_id) {
            let Some(slot) = chat
                .messages
                .iter_mut()
                .find(|m| {
                    m.client_id.as_ref() == Some(client_id) && m.delivery != Delivery::Sent
                })
            else {
                continue;
            };
            let mut copy = confirmed.clone();
            copy.is_read |= slot.is_read;
            *slot = copy;
            if let Some(last) = chat
                .last_message
                .as_mut()
                .filter(|last| last.client_id.as_ref() == Some(client_id))
            {
                let mut copy = confirmed.clone();
                copy.is_read |= last.is_read;
                *last = copy;
            }
            applied = true;
        }
        applied
    }

    /// Flag an optimistic entry as failed.
    pub fn mark_failed(&mut self, chat_id: &ChatId, client_id: &ClientMessageId) {
        for chat in self.copies_mut(chat_id) {
            let failed = chat
                .messages
                .iter_mut()
                .chain(chat.last_message.as_mut())
                .filter(|m| m.client_id.as_ref() == Some(client_id) && m.is_pending());
            for message in failed {
                message.delivery = Delivery::Failed;
            }
        }
    }

    /// Mirror a user's presence into every chat with them.
    pub fn apply_presence(&mut self, user: &UserId, presence: &Presence) {
        let detached = match &mut self.active {
            Active::Detached(chat) => Some(chat.as_mut()),
            _ => None,
        };
        for chat in self
            .chats
            .iter_mut()
            .chain(detached)
            .filter(|c| &c.participant_id == user)
        {
            chat.is_online = presence.is_online;
            chat.is_viewing = presence.is_viewing;
        }
    }

    // ===========================================
    // Unlocked message
    // ===========================================

    /// Reveal one message. Any previously unlocked message is locked.
    pub fn unlock_message(&mut self, id: MessageId) {
        self.unlocked = Some(id);
    }

    /// Lock the unlocked message, if any.
    pub fn lock_message(&mut self) {
        self.unlocked = None;
    }

    /// The single unlocked message.
    pub fn unlocked_message_id(&self) -> Option<&MessageId> {
        self.unlocked.as_ref()
    }

    /// Whether `id` is the unlocked message.
    pub fn is_unlocked(&self, id: &MessageId) -> bool {
        self.unlocked.as_ref() == Some(id)
    }

    // ===========================================
    // Accessors
    // ===========================================

    /// Chats in load order.
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// Look up a chat in the list or the detached active chat.
    pub fn chat(&self, id: &ChatId) -> Option<&Chat> {
        match &self.active {
            Active::Detached(chat) if &chat.id == id => Some(&**chat),
            _ => self.position(id).map(|i| &self.chats[i]),
        }
    }

    /// The chat being viewed.
    pub fn active_chat(&self) -> Option<&Chat> {
        match &self.active {
            Active::None => None,
            Active::Listed(id) => self.position(id).map(|i| &self.chats[i]),
            Active::Detached(chat) => Some(&**chat),
        }
    }

    /// Id of the chat being viewed.
    pub fn active_chat_id(&self) -> Option<&ChatId> {
        match &self.active {
            Active::None => None,
            Active::Listed(id) => Some(id),
            Active::Detached(chat) => Some(&chat.id),
        }
    }

    /// Whether `id` is the chat being viewed.
    pub fn is_active(&self, id: &ChatId) -> bool {
        self.active_chat_id() == Some(id)
    }

    /// Sum of unread counts over the list.
    pub fn total_unread(&self) -> u32 {
        self.chats
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(c.unread_count))
    }

    fn position(&self, id: &ChatId) -> Option<usize> {
        self.chats.iter().position(|c| &c.id == id)
    }

    fn copies_mut<'a>(&'a mut self, id: &'a ChatId) -> impl Iterator<Item = &'a mut Chat> + 'a {
        let detached = match &mut self.active {
            Active::Detached(chat) if &chat.id == id => Some(chat.as_mut()),
            _ => None,
        };
        self.chats
            .iter_mut()
            .filter(move |c| &c.id == id)
            .chain(detached)
    }
}
