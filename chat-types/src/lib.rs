//! # chat-types
//!
//! Wire format and data model for the Veil chat sync engine.
//!
//! This crate provides the foundational types used across all Veil crates:
//! - [`UserId`], [`ChatId`], [`MessageId`], [`ClientMessageId`] - Identity types
//! - [`Chat`], [`Message`], [`Presence`] - The mirrored data model
//! - [`ServerEvent`], [`ClientEvent`] - Named realtime events (in and out)
//! - [`WireError`] - Codec errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod events;
mod ids;
mod model;

pub use error::WireError;
pub use events::{ChatRef, ClientEvent, MessageEnvelope, PresenceNotice, ServerEvent, TypingNotice};
pub use ids::{ChatId, ClientMessageId, MessageId, UserId};
pub use model::{Chat, Delivery, Message, OutgoingMessage, Presence};
