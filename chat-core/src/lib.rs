//! # chat-core
//!
//! Pure logic for the Veil chat sync engine (no I/O, instant tests).
//!
//! This crate implements the state machines and the local mirror without
//! any network access, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure**. They take input and produce
//! output without side effects:
//! - [`ConnectionState`] and [`Session`] return actions/effects instead of
//!   performing them
//! - time is passed in (`Instant`, unix milliseconds) rather than read
//! - [`router::route`] applies wire events to a [`LocalMirror`]
//!
//! The actual I/O (WebSocket, timers) is performed by `chat-client`, which
//! interprets what these machines produce.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod mirror;
pub mod outbox;
pub mod presence;
pub mod resend;
pub mod router;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use connection::{
    ConnectionAction, ConnectionEvent, ConnectionNotice, ConnectionState, ConnectionStatus,
    ReconnectPolicy,
};
pub use mirror::{LocalMirror, MirrorSnapshot};
pub use outbox::{Outbox, OutboxError, DEFAULT_OUTBOX_CAPACITY};
pub use presence::PresenceTracker;
pub use resend::{ResendTimer, RESEND_COOLDOWN};
pub use router::{prepare, route, Intent, RouteError, RouteOutcome};
pub use session::{
    validate_otp_code, AuthState, OtpPurpose, Session, SessionEffect, SessionError, VerifyFailure,
    OTP_LENGTH,
};
pub use store::ChatStore;
