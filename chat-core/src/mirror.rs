//! The local mirror of server state for one signed-in user.
//!
//! Owns the chat store, presence tracker and outbox, plus the peer typing
//! flag. A mirror is created when a session authenticates and dropped at
//! logout; nothing in it outlives the identity it was built for.

use std::collections::BTreeMap;

use serde::Serialize;
use veil_chat_types::{Chat, ChatId, ClientMessageId, MessageId, Presence, UserId};

use crate::outbox::Outbox;
use crate::presence::PresenceTracker;
use crate::store::ChatStore;

/// Everything the engine mirrors locally.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    pub(crate) user: UserId,
    pub(crate) store: ChatStore,
    pub(crate) presence: PresenceTracker,
    pub(crate) outbox: Outbox,
    pub(crate) peer_typing: bool,
}

impl LocalMirror {
    /// Create an empty mirror for `user`.
    pub fn new(user: UserId, outbox: Outbox) -> Self {
        Self {
            user,
            store: ChatStore::new(),
            presence: PresenceTracker::new(),
            outbox,
            peer_typing: false,
        }
    }

    /// The signed-in user this mirror belongs to.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Read access to chats.
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// Read access to presence.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Read access to the outbox.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Whether the peer of the active chat is typing.
    pub fn peer_typing(&self) -> bool {
        self.peer_typing
    }

    // ===========================================
    // Store operations
    // ===========================================

    /// Replace the chat list.
    pub fn set_chats(&mut self, chats: Vec<Chat>) {
        let before = self.store.active_chat_id().cloned();
        self.store.set_chats(chats);
        self.clear_typing_if_moved(before);
    }

    /// Change the chat being viewed. Clears the typing flag when it changes.
    pub fn set_active_chat(&mut self, chat: Option<Chat>) {
        let before = self.store.active_chat_id().cloned();
        self.store.set_active_chat(chat);
        self.clear_typing_if_moved(before);
    }

    /// Mark a chat read.
    pub fn mark_messages_read(&mut self, chat_id: &ChatId) {
        self.store.mark_messages_read(chat_id);
    }

    /// Reveal one message.
    pub fn unlock_message(&mut self, id: MessageId) {
        self.store.unlock_message(id);
    }

    /// Hide the revealed message.
    pub fn lock_message(&mut self) {
        self.store.lock_message();
    }

    // ===========================================
    // Presence
    // ===========================================

    /// Record an online/offline transition and mirror it into the chats.
    pub fn set_online(&mut self, user: UserId, online: bool, last_seen: Option<u64>) -> Presence {
        let presence = self.presence.set_online(user.clone(), online, last_seen);
        self.store.apply_presence(&user, &presence);
        presence
    }

    /// Record a viewing transition and mirror it into the chats.
    pub fn set_viewing(&mut self, user: UserId, viewing: bool) -> Presence {
        let presence = self.presence.set_viewing(user.clone(), viewing);
        self.store.apply_presence(&user, &presence);
        presence
    }

    // ===========================================
    // Outbox
    // ===========================================

    /// Give up on one send: untrack it and flag the message failed.
    pub fn fail_send(&mut self, chat_id: &ChatId, client_id: &ClientMessageId) {
        self.outbox.confirm(client_id);
        self.store.mark_failed(chat_id, client_id);
    }

    /// Give up on every tracked send. Returns how many were failed.
    pub fn fail_pending(&mut self) -> usize {
        let drained = self.outbox.drain();
        for (client_id, chat_id) in &drained {
            self.store.mark_failed(chat_id, client_id);
        }
        drained.len()
    }

    /// Serializable view of the mirror.
    pub fn snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot {
            user: self.user.clone(),
            chats: self.store.chats().to_vec(),
            active_chat: self.store.active_chat().cloned(),
            presence: self
                .presence
                .iter()
                .map(|(u, p)| (u.clone(), *p))
                .collect(),
            peer_typing: self.peer_typing,
            unlocked_message_id: self.store.unlocked_message_id().cloned(),
            pending_sends: self.outbox.len(),
        }
    }

    fn clear_typing_if_moved(&mut self, before: Option<ChatId>) {
        if self.store.active_chat_id() != before.as_ref() {
            self.peer_typing = false;
        }
    }
}

/// Point-in-time copy of a [`LocalMirror`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSnapshot {
    /// Signed-in user
    pub user: UserId,
    /// Chats in load order
    pub chats: Vec<Chat>,
    /// Chat being viewed
    pub active_chat: Option<Chat>,
    /// Known presence by user
    pub presence: BTreeMap<UserId, Presence>,
    /// Peer typing in the active chat
    pub peer_typing: bool,
    /// The revealed message
    pub unlocked_message_id: Option<MessageId>,
    /// Sends awaiting their echo
    pub pending_sends: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chat, ME};

    fn mirror() -> LocalMirror {
        let mut mirror = LocalMirror::new(UserId::from(ME), Outbox::default());
        mirror.set_chats(vec![chat("c1", "u1"), chat("c2", "u2")]);
        mirror
    }

    #[test]
    fn presence_is_mirrored_into_chats() {
        let mut mirror = mirror();

        mirror.set_online(UserId::from("u1"), true, None);
        mirror.set_viewing(UserId::from("u1"), true);

        let c1 = mirror.store().chat(&ChatId::from("c1")).unwrap();
        assert!(c1.is_online);
        assert!(c1.is_viewing);
        assert!(mirror.presence().is_online(&UserId::from("u1")));
    }

    #[test]
    fn changing_active_chat_clears_typing() {
        let mut mirror = mirror();
        mirror.set_active_chat(Some(chat("c1", "u1")));
        mirror.peer_typing = true;

        mirror.set_active_chat(Some(chat("c1", "u1")));
        assert!(mirror.peer_typing());

        mirror.set_active_chat(Some(chat("c2", "u2")));
        assert!(!mirror.peer_typing());
    }

    #[test]
    fn losing_active_chat_on_reload_clears_typing() {
        let mut mirror = mirror();
        mirror.set_active_chat(Some(chat("c1", "u1")));
        mirror.peer_typing = true;

        mirror.set_chats(vec![chat("c2", "u2")]);

        assert!(!mirror.peer_typing());
    }

    #[test]
    fn fail_pending_drains_outbox() {
        let mut mirror = mirror();
        let cid = ClientMessageId::new();
        mirror.outbox.track(cid, ChatId::from("c1")).unwrap();

        assert_eq!(mirror.fail_pending(), 1);
        assert!(mirror.outbox().is_empty());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let mut mirror = mirror();
        mirror.set_online(UserId::from("u2"), true, None);
        mirror.unlock_message(MessageId::from("m1"));

        let value = serde_json::to_value(mirror.snapshot()).unwrap();

        assert_eq!(value["user"], ME);
        assert_eq!(value["chats"].as_array().map(|c| c.len()), Some(2));
        assert_eq!(value["presence"]["u2"]["isOnline"], true);
        assert_eq!(value["unlockedMessageId"], "m1");
        assert_eq!(value["pendingSends"], 0);
    }
}
