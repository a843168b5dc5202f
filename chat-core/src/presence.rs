//! Presence tracking for remote users.
//!
//! Records whether each user is online and whether they are looking at
//! their conversation with the local user. The two flags are independent:
//! the backend may report a user viewing while offline and the tracker
//! keeps whatever it is told.

use std::collections::BTreeMap;

use veil_chat_types::{Presence, UserId};

/// Map of user id to last known presence.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    users: BTreeMap<UserId, Presence>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an online/offline transition.
    ///
    /// `last_seen` is stored when supplied and kept otherwise.
    pub fn set_online(&mut self, user: UserId, online: bool, last_seen: Option<u64>) -> Presence {
        let entry = self.users.entry(user).or_default();
        entry.is_online = online;
        if last_seen.is_some() {
            entry.last_seen = last_seen;
        }
        *entry
    }

    /// Record a viewing/not-viewing transition.
    pub fn set_viewing(&mut self, user: UserId, viewing: bool) -> Presence {
        let entry = self.users.entry(user).or_default();
        entry.is_viewing = viewing;
        *entry
    }

    /// Presence of a user; offline and not viewing when never reported.
    pub fn get(&self, user: &UserId) -> Presence {
        self.users.get(user).copied().unwrap_or_default()
    }

    /// Whether a user is online.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.get(user).is_online
    }

    /// Whether a user is viewing their chat with us.
    pub fn is_viewing(&self, user: &UserId) -> bool {
        self.get(user).is_viewing
    }

    /// Users currently online, in id order.
    pub fn online_users(&self) -> Vec<&UserId> {
        self.users
            .iter()
            .filter(|(_, p)| p.is_online)
            .map(|(u, _)| u)
            .collect()
    }

    /// Every known record, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &Presence)> {
        self.users.iter()
    }
}
