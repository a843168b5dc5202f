//! Connection state machine for Veil.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of the single realtime connection. The machine takes events
//! as input and produces a new state plus a list of actions to execute.
//!
//! The actual I/O (opening the socket, closing it, sleeping between
//! retries) is performed by chat-client, not by this module.

use std::time::Duration;
use veil_chat_types::UserId;

/// Retry policy applied after transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries allowed before the connection is declared stalled.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound of the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to every delay.
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(1000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// Formula: min(max_delay, base_delay * 2^(attempt-1)) + random(0..=jitter)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);

        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            random_u64() % jitter_ms.saturating_add(1)
        };

        base.saturating_add(Duration::from_millis(jitter))
    }
}

/// Coarse connection status exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No live connection (a retry may be scheduled).
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Live connection.
    Connected,
}

impl ConnectionStatus {
    /// Lowercase label, as shown by the UI and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and nothing scheduled.
    Disconnected,
    /// Transport connect in progress.
    Connecting {
        /// Identity the connection is keyed by.
        identity: UserId,
        /// Retry number of this attempt (0 for the first one).
        attempt: u32,
    },
    /// Live connection.
    Connected {
        /// Identity the connection is keyed by.
        identity: UserId,
    },
    /// Connection lost or failed; waiting for the retry timer.
    Reconnecting {
        /// Identity the connection is keyed by.
        identity: UserId,
        /// Number of the retry that the timer will start.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (chat-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(
        self,
        event: ConnectionEvent,
        policy: &ReconnectPolicy,
    ) -> (Self, Vec<ConnectionAction>) {
        match (self, event) {
            // Connect requests are idempotent per identity
            (Self::Disconnected, ConnectionEvent::ConnectRequested { identity }) => (
                Self::Connecting {
                    identity: identity.clone(),
                    attempt: 0,
                },
                vec![ConnectionAction::Connect { identity }],
            ),
            (state, ConnectionEvent::ConnectRequested { identity }) => {
                if state.identity() == Some(&identity) {
                    return (state, vec![]);
                }
                let mut actions = Vec::new();
                if matches!(state, Self::Reconnecting { .. }) {
                    actions.push(ConnectionAction::CancelReconnect);
                }
                actions.push(ConnectionAction::Teardown);
                actions.push(ConnectionAction::Connect {
                    identity: identity.clone(),
                });
                (
                    Self::Connecting {
                        identity,
                        attempt: 0,
                    },
                    actions,
                )
            }

            // From Connecting
            (Self::Connecting { identity, .. }, ConnectionEvent::ConnectSucceeded) => (
                Self::Connected {
                    identity: identity.clone(),
                },
                vec![ConnectionAction::Emit(ConnectionNotice::Connected { identity })],
            ),
            (Self::Connecting { identity, attempt }, ConnectionEvent::ConnectFailed { error })
            | (Self::Connecting { identity, attempt }, ConnectionEvent::TransportLost { reason: error }) => {
                let notice = ConnectionNotice::ConnectionFailed {
                    attempt,
                    error,
                };
                schedule_retry(identity, attempt.saturating_add(1), notice, policy)
            }

            // From Connected
            (Self::Connected { identity }, ConnectionEvent::TransportLost { reason }) => {
                let notice = ConnectionNotice::Disconnected { reason };
                schedule_retry(identity, 1, notice, policy)
            }

            // From Reconnecting
            (Self::Reconnecting { identity, attempt }, ConnectionEvent::ReconnectTimer) => (
                Self::Connecting {
                    identity: identity.clone(),
                    attempt,
                },
                vec![ConnectionAction::Connect { identity }],
            ),

            // Explicit teardown, from anywhere
            (Self::Disconnected, ConnectionEvent::DisconnectRequested) => {
                (Self::Disconnected, vec![])
            }
            (state, ConnectionEvent::DisconnectRequested) => {
                let mut actions = Vec::new();
                if matches!(state, Self::Reconnecting { .. }) {
                    actions.push(ConnectionAction::CancelReconnect);
                }
                actions.push(ConnectionAction::Teardown);
                actions.push(ConnectionAction::Emit(ConnectionNotice::Disconnected {
                    reason: "requested".into(),
                }));
                (Self::Disconnected, actions)
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Identity the current (or pending) connection is keyed by.
    pub fn identity(&self) -> Option<&UserId> {
        match self {
            Self::Disconnected => None,
            Self::Connecting { identity, .. }
            | Self::Connected { identity }
            | Self::Reconnecting { identity, .. } => Some(identity),
        }
    }

    /// Coarse status. A scheduled retry reports as disconnected.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Self::Disconnected | Self::Reconnecting { .. } => ConnectionStatus::Disconnected,
            Self::Connecting { .. } => ConnectionStatus::Connecting,
            Self::Connected { .. } => ConnectionStatus::Connected,
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if a retry timer is pending.
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }

    /// Whether any connection resource is held or scheduled.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

fn schedule_retry(
    identity: UserId,
    attempt: u32,
    notice: ConnectionNotice,
    policy: &ReconnectPolicy,
) -> (ConnectionState, Vec<ConnectionAction>) {
    if attempt > policy.max_attempts {
        return (
            ConnectionState::Disconnected,
            vec![
                ConnectionAction::Teardown,
                ConnectionAction::Emit(notice),
                ConnectionAction::Emit(ConnectionNotice::ReconnectExhausted {
                    attempts: policy.max_attempts,
                }),
            ],
        );
    }
    (
        ConnectionState::Reconnecting { identity, attempt },
        vec![
            ConnectionAction::Teardown,
            ConnectionAction::Emit(notice),
            ConnectionAction::StartReconnectTimer {
                delay: policy.backoff(attempt),
            },
        ],
    )
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The session authenticated (or switched) identity.
    ConnectRequested {
        /// Identity to key the connection by.
        identity: UserId,
    },
    /// Transport connect succeeded.
    ConnectSucceeded,
    /// Transport connect failed.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The live transport closed unexpectedly.
    TransportLost {
        /// Reason for the loss.
        reason: String,
    },
    /// Logout or authentication loss.
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by chat-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open the transport for this identity.
    Connect {
        /// Identity to key the connection by.
        identity: UserId,
    },
    /// Close whatever transport is open.
    Teardown,
    /// Sleep, then feed [`ConnectionEvent::ReconnectTimer`].
    StartReconnectTimer {
        /// Delay before the retry.
        delay: Duration,
    },
    /// Abort a pending retry timer.
    CancelReconnect,
    /// Report to the session/UI layer.
    Emit(ConnectionNotice),
}

/// Notices reported upward by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotice {
    /// Connection established.
    Connected {
        /// Identity the connection is keyed by.
        identity: UserId,
    },
    /// A connect attempt failed.
    ConnectionFailed {
        /// Retry number of the failed attempt (0 for the first one).
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// The connection went away.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Retries are used up; only an explicit connect recovers.
    ReconnectExhausted {
        /// Number of retries that were made.
        attempts: u32,
    },
}

fn random_u64() -> u64 {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes),
        Err(_) => 0,
    }
}
