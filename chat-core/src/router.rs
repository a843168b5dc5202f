//! Event routing between the wire and the local mirror.
//!
//! [`route`] applies one inbound [`ServerEvent`] to a [`LocalMirror`] and
//! reports what happened. [`prepare`] turns a local [`Intent`] into the
//! [`ClientEvent`] to emit, inserting the optimistic message for sends.
//!
//! Inbound delivery is at-least-once: an event for a message the mirror
//! already holds is reported as [`RouteOutcome::Duplicate`] and changes
//! nothing. Events that do not fit the mirror (unknown chat, typing for
//! another chat) come back as [`RouteOutcome::Ignored`].

use thiserror::Error;
use veil_chat_types::{
    ChatId, ChatRef, ClientEvent, ClientMessageId, Delivery, Message, MessageEnvelope, MessageId,
    OutgoingMessage, ServerEvent, TypingNotice, UserId,
};

use crate::mirror::LocalMirror;
use crate::outbox::OutboxError;

/// What applying an inbound event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A new message was appended.
    Appended,
    /// An optimistic send was replaced by its echo.
    Confirmed,
    /// The message was already present.
    Duplicate,
    /// The event did not apply to the mirror.
    Ignored,
    /// The peer typing flag was set.
    Typing(bool),
    /// A user's presence changed.
    Presence(UserId),
}

/// Errors raised while preparing an outbound event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The target chat is not in the mirror.
    #[error("unknown chat: {0}")]
    UnknownChat(ChatId),

    /// Too many sends await their echo.
    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

/// Something the local user wants the backend to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Send a message to the participant of a chat.
    SendMessage {
        /// Target chat
        chat_id: ChatId,
        /// Opaque body
        content: String,
        /// Whether `content` is ciphertext
        is_encrypted: bool,
        /// Attachment references
        attachments: Vec<String>,
    },
    /// Local user started typing.
    StartTyping {
        /// Target chat
        chat_id: ChatId,
    },
    /// Local user stopped typing.
    StopTyping {
        /// Target chat
        chat_id: ChatId,
    },
    /// Subscribe to a chat room.
    JoinChat {
        /// Target chat
        chat_id: ChatId,
    },
    /// Unsubscribe from a chat room.
    LeaveChat {
        /// Target chat
        chat_id: ChatId,
    },
    /// Local user opened a chat.
    MarkViewing {
        /// Target chat
        chat_id: ChatId,
    },
    /// Local user left a chat.
    MarkNotViewing {
        /// Target chat
        chat_id: ChatId,
    },
}

impl Intent {
    /// Chat this intent targets.
    pub fn chat_id(&self) -> &ChatId {
        match self {
            Self::SendMessage { chat_id, .. }
            | Self::StartTyping { chat_id }
            | Self::StopTyping { chat_id }
            | Self::JoinChat { chat_id }
            | Self::LeaveChat { chat_id }
            | Self::MarkViewing { chat_id }
            | Self::MarkNotViewing { chat_id } => chat_id,
        }
    }
}

/// Apply one inbound event to the mirror.
pub fn route(mirror: &mut LocalMirror, event: ServerEvent) -> RouteOutcome {
    match event {
        ServerEvent::MessageReceived(envelope) => receive_message(mirror, envelope),
        ServerEvent::TypingStarted(notice) => typing(mirror, notice, true),
        ServerEvent::TypingStopped(notice) => typing(mirror, notice, false),
        ServerEvent::UserOnline(notice) => {
            mirror.set_online(notice.user_id.clone(), true, notice.last_seen);
            RouteOutcome::Presence(notice.user_id)
        }
        ServerEvent::UserOffline(notice) => {
            mirror.set_online(notice.user_id.clone(), false, notice.last_seen);
            RouteOutcome::Presence(notice.user_id)
        }
        ServerEvent::UserViewing(notice) => {
            mirror.set_viewing(notice.user_id.clone(), true);
            RouteOutcome::Presence(notice.user_id)
        }
        ServerEvent::UserNotViewing(notice) => {
            mirror.set_viewing(notice.user_id.clone(), false);
            RouteOutcome::Presence(notice.user_id)
        }
    }
}

fn receive_message(mirror: &mut LocalMirror, envelope: MessageEnvelope) -> RouteOutcome {
    let MessageEnvelope { chat_id, mut message } = envelope;
    message.delivery = Delivery::Sent;

    // A late echo also confirms a send already failed by teardown.
    if let Some(client_id) = message.client_id {
        mirror.outbox.confirm(&client_id);
        if mirror.store.confirm_pending(&chat_id, &client_id, message.clone()) {
            return RouteOutcome::Confirmed;
        }
    }

    if mirror.store.chat(&chat_id).is_none() {
        return RouteOutcome::Ignored;
    }
    if mirror.store.contains_message(&chat_id, &message.id) {
        return RouteOutcome::Duplicate;
    }

    let from_peer = message.sender_id != mirror.user;
    mirror.store.add_message(&chat_id, message);
    if from_peer && !mirror.store.is_active(&chat_id) {
        mirror.store.increment_unread(&chat_id);
    }
    RouteOutcome::Appended
}

fn typing(mirror: &mut LocalMirror, notice: TypingNotice, typing: bool) -> RouteOutcome {
    let applies = match (&notice.chat_id, mirror.store.active_chat_id()) {
        (Some(target), Some(active)) => target == active,
        (None, Some(_)) => true,
        (_, None) => false,
    };
    if !applies {
        return RouteOutcome::Ignored;
    }
    mirror.peer_typing = typing;
    RouteOutcome::Typing(typing)
}

/// Turn an intent into the event to emit.
///
/// Sends insert a pending message into the chat and track it in the
/// outbox before the event is returned. If emitting the event then fails
/// the caller must hand the client id to [`LocalMirror::fail_send`].
pub fn prepare(
    mirror: &mut LocalMirror,
    intent: Intent,
    now_ms: u64,
) -> Result<ClientEvent, RouteError> {
    let event = match intent {
        Intent::SendMessage {
            chat_id,
            content,
            is_encrypted,
            attachments,
        } => {
            let receiver_id = mirror
                .store
                .chat(&chat_id)
                .map(|chat| chat.participant_id.clone())
                .ok_or_else(|| RouteError::UnknownChat(chat_id.clone()))?;

            let client_id = ClientMessageId::new();
            mirror.outbox.track(client_id, chat_id.clone())?;

            let outgoing = OutgoingMessage {
                sender_id: mirror.user.clone(),
                receiver_id,
                content,
                is_encrypted,
                attachments,
                client_id,
            };
            mirror
                .store
                .add_message(&chat_id, optimistic(&outgoing, now_ms));

            ClientEvent::SendMessage {
                chat_id,
                message: outgoing,
            }
        }
        Intent::StartTyping { chat_id } => ClientEvent::TypingStart(ChatRef { chat_id }),
        Intent::StopTyping { chat_id } => ClientEvent::TypingStop(ChatRef { chat_id }),
        Intent::JoinChat { chat_id } => ClientEvent::JoinChat(ChatRef { chat_id }),
        Intent::LeaveChat { chat_id } => ClientEvent::LeaveChat(ChatRef { chat_id }),
        Intent::MarkViewing { chat_id } => ClientEvent::Viewing(ChatRef { chat_id }),
        Intent::MarkNotViewing { chat_id } => ClientEvent::NotViewing(ChatRef { chat_id }),
    };
    Ok(event)
}

fn optimistic(outgoing: &OutgoingMessage, now_ms: u64) -> Message {
    Message {
        id: MessageId::pending(&outgoing.client_id),
        sender_id: outgoing.sender_id.clone(),
        receiver_id: outgoing.receiver_id.clone(),
        content: outgoing.content.clone(),
        timestamp: now_ms,
        is_encrypted: outgoing.is_encrypted,
        is_read: false,
        attachments: outgoing.attachments.clone(),
        client_id: Some(outgoing.client_id),
        delivery: Delivery::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::Outbox;
    use crate::testing::{chat, inbound, message, ME};
    use veil_chat_types::PresenceNotice;

    fn mirror() -> LocalMirror {
        let mut mirror = LocalMirror::new(UserId::from(ME), Outbox::new(4));
        mirror.set_chats(vec![chat("c1", "u1"), chat("c2", "u2")]);
        mirror
    }

    fn receive(chat_id: &str, message: Message) -> ServerEvent {
        ServerEvent::MessageReceived(MessageEnvelope {
            chat_id: ChatId::from(chat_id),
            message,
        })
    }

    fn c(id: &str) -> ChatId {
        ChatId::from(id)
    }

    fn send(chat_id: &str, content: &str) -> Intent {
        Intent::SendMessage {
            chat_id: c(chat_id),
            content: content.into(),
            is_encrypted: true,
            attachments: vec![],
        }
    }

    // ===========================================
    // Inbound messages
    // ===========================================

    #[test]
    fn message_for_inactive_chat_counts_unread() {
        let mut mirror = mirror();

        let outcome = route(&mut mirror, receive("c1", inbound("m1", "u1")));

        assert_eq!(outcome, RouteOutcome::Appended);
        let c1 = mirror.store().chat(&c("c1")).unwrap();
        assert_eq!(c1.messages.len(), 1);
        assert_eq!(c1.unread_count, 1);
    }

    #[test]
    fn message_for_active_chat_is_not_unread() {
        let mut mirror = mirror();
        mirror.set_active_chat(Some(chat("c1", "u1")));

        route(&mut mirror, receive("c1", inbound("m1", "u1")));

        assert_eq!(mirror.store().active_chat().map(|c| c.unread_count), Some(0));
        assert_eq!(mirror.store().active_chat().map(|c| c.messages.len()), Some(1));
    }

    #[test]
    fn own_message_from_another_device_is_not_unread() {
        let mut mirror = mirror();

        route(&mut mirror, receive("c1", message("m1", ME, "u1", 1)));

        assert_eq!(mirror.store().chat(&c("c1")).unwrap().unread_count, 0);
    }

    #[test]
    fn redelivered_message_is_applied_once() {
        let mut mirror = mirror();
        route(&mut mirror, receive("c1", inbound("m1", "u1")));

        let outcome = route(&mut mirror, receive("c1", inbound("m1", "u1")));

        assert_eq!(outcome, RouteOutcome::Duplicate);
        let c1 = mirror.store().chat(&c("c1")).unwrap();
        assert_eq!(c1.messages.len(), 1);
        assert_eq!(c1.unread_count, 1);
    }

    #[test]
    fn message_for_unknown_chat_is_ignored() {
        let mut mirror = mirror();
        let before = mirror.snapshot();

        let outcome = route(&mut mirror, receive("c404", inbound("m1", "u1")));

        assert_eq!(outcome, RouteOutcome::Ignored);
        assert_eq!(mirror.snapshot(), before);
    }

    // ===========================================
    // Optimistic sends
    // ===========================================

    #[test]
    fn send_inserts_pending_message_and_emits_event() {
        let mut mirror = mirror();

        let event = prepare(&mut mirror, send("c1", "ciphertext"), 42).unwrap();

        let ClientEvent::SendMessage { chat_id, message } = event else {
            panic!("expected SendMessage");
        };
        assert_eq!(chat_id, c("c1"));
        assert_eq!(message.sender_id, UserId::from(ME));
        assert_eq!(message.receiver_id, UserId::from("u1"));
        assert!(mirror.outbox().is_pending(&message.client_id));

        let stored = &mirror.store().chat(&c("c1")).unwrap().messages[0];
        assert!(stored.is_pending());
        assert!(stored.id.is_pending());
        assert_eq!(stored.timestamp, 42);
    }

    #[test]
    fn echo_replaces_pending_entry_in_place() {
        let mut mirror = mirror();
        let event = prepare(&mut mirror, send("c1", "first"), 1).unwrap();
        route(&mut mirror, receive("c1", inbound("m2", "u1")));
        let ClientEvent::SendMessage { message: sent, .. } = event else {
            panic!("expected SendMessage");
        };

        let echo = Message {
            client_id: Some(sent.client_id),
            ..message("srv-1", ME, "u1", 5)
        };
        let outcome = route(&mut mirror, receive("c1", echo.clone()));

        assert_eq!(outcome, RouteOutcome::Confirmed);
        let c1 = mirror.store().chat(&c("c1")).unwrap();
        let ids: Vec<_> = c1.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["srv-1", "m2"]);
        assert!(mirror.outbox().is_empty());

        assert_eq!(
            route(&mut mirror, receive("c1", echo)),
            RouteOutcome::Duplicate
        );
    }

    #[test]
    fn echo_keeps_local_read_flag() {
        let mut mirror = mirror();
        let event = prepare(&mut mirror, send("c1", "first"), 1).unwrap();
        let ClientEvent::SendMessage { message: sent, .. } = event else {
            panic!("expected SendMessage");
        };
        mirror.mark_messages_read(&c("c1"));

        let echo = Message {
            client_id: Some(sent.client_id),
            is_read: false,
            ..message("srv-1", ME, "u1", 5)
        };
        let outcome = route(&mut mirror, receive("c1", echo));

        assert_eq!(outcome, RouteOutcome::Confirmed);
        let c1 = mirror.store().chat(&c("c1")).unwrap();
        assert!(c1.messages[0].is_read);
        assert!(c1.last_message.as_ref().unwrap().is_read);
        assert_eq!(c1.last_message.as_ref().unwrap().id, MessageId::from("srv-1"));
    }

    #[test]
    fn late_echo_confirms_failed_send() {
        let mut mirror = mirror();
        let event = prepare(&mut mirror, send("c1", "first"), 1).unwrap();
        let ClientEvent::SendMessage { message: sent, .. } = event else {
            panic!("expected SendMessage");
        };
        assert_eq!(mirror.fail_pending(), 1);

        let echo = Message {
            client_id: Some(sent.client_id),
            ..message("srv-1", ME, "u1", 5)
        };
        let outcome = route(&mut mirror, receive("c1", echo));

        assert_eq!(outcome, RouteOutcome::Confirmed);
        let c1 = mirror.store().chat(&c("c1")).unwrap();
        assert_eq!(c1.messages.len(), 1);
        assert_eq!(c1.messages[0].id, MessageId::from("srv-1"));
        assert_eq!(c1.messages[0].delivery, Delivery::Sent);
    }

    #[test]
    fn send_to_unknown_chat_fails_without_side_effects() {
        let mut mirror = mirror();

        let result = prepare(&mut mirror, send("c404", "x"), 1);

        assert_eq!(result, Err(RouteError::UnknownChat(c("c404"))));
        assert!(mirror.outbox().is_empty());
    }

    #[test]
    fn full_outbox_rejects_send() {
        let mut mirror = LocalMirror::new(UserId::from(ME), Outbox::new(1));
        mirror.set_chats(vec![chat("c1", "u1")]);
        prepare(&mut mirror, send("c1", "a"), 1).unwrap();

        let result = prepare(&mut mirror, send("c1", "b"), 2);

        assert!(matches!(result, Err(RouteError::Outbox(OutboxError::Full { .. }))));
        assert_eq!(mirror.store().chat(&c("c1")).unwrap().messages.len(), 1);
    }

    #[test]
    fn failed_send_is_flagged() {
        let mut mirror = mirror();
        let event = prepare(&mut mirror, send("c1", "a"), 1).unwrap();
        let ClientEvent::SendMessage { chat_id, message } = event else {
            panic!("expected SendMessage");
        };

        mirror.fail_send(&chat_id, &message.client_id);

        let stored = &mirror.store().chat(&chat_id).unwrap().messages[0];
        assert_eq!(stored.delivery, Delivery::Failed);
        assert!(mirror.outbox().is_empty());
    }

    #[test]
    fn chat_scoped_intents_map_one_to_one() {
        let mut mirror = mirror();
        let cases = [
            (Intent::StartTyping { chat_id: c("c1") }, "typing:start"),
            (Intent::StopTyping { chat_id: c("c1") }, "typing:stop"),
            (Intent::JoinChat { chat_id: c("c1") }, "chat:join"),
            (Intent::LeaveChat { chat_id: c("c1") }, "chat:leave"),
            (Intent::MarkViewing { chat_id: c("c1") }, "chat:viewing"),
            (Intent::MarkNotViewing { chat_id: c("c1") }, "chat:not-viewing"),
        ];

        for (intent, kind) in cases {
            let event = prepare(&mut mirror, intent, 0).unwrap();
            assert_eq!(event.kind(), kind);
            assert_eq!(event.chat_id(), &c("c1"));
        }
    }

    // ===========================================
    // Typing
    // ===========================================

    #[test]
    fn typing_applies_only_to_active_chat() {
        let mut mirror = mirror();
        let start = |chat: Option<&str>| {
            ServerEvent::TypingStarted(TypingNotice {
                chat_id: chat.map(ChatId::from),
            })
        };

        assert_eq!(route(&mut mirror, start(None)), RouteOutcome::Ignored);

        mirror.set_active_chat(Some(chat("c1", "u1")));
        assert_eq!(route(&mut mirror, start(Some("c2"))), RouteOutcome::Ignored);
        assert!(!mirror.peer_typing());

        assert_eq!(route(&mut mirror, start(Some("c1"))), RouteOutcome::Typing(true));
        assert!(mirror.peer_typing());

        let stop = ServerEvent::TypingStopped(TypingNotice::default());
        assert_eq!(route(&mut mirror, stop), RouteOutcome::Typing(false));
        assert!(!mirror.peer_typing());
    }

    // ===========================================
    // Presence
    // ===========================================

    #[test]
    fn presence_events_update_tracker_and_chats() {
        let mut mirror = mirror();
        let u1 = UserId::from("u1");

        let outcome = route(&mut mirror, ServerEvent::UserOnline(PresenceNotice::new("u1")));
        assert_eq!(outcome, RouteOutcome::Presence(u1.clone()));
        route(&mut mirror, ServerEvent::UserViewing(PresenceNotice::new("u1")));
        assert!(mirror.store().chat(&c("c1")).unwrap().is_viewing);

        route(
            &mut mirror,
            ServerEvent::UserOffline(PresenceNotice {
                user_id: u1.clone(),
                last_seen: Some(7),
            }),
        );
        route(&mut mirror, ServerEvent::UserNotViewing(PresenceNotice::new("u1")));

        let presence = mirror.presence().get(&u1);
        assert!(!presence.is_online);
        assert!(!presence.is_viewing);
        assert_eq!(presence.last_seen, Some(7));
        assert!(!mirror.store().chat(&c("c1")).unwrap().is_online);
    }
}
