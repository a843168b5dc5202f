//! Resend-code cooldown for OTP flows.
//!
//! Time is injected as [`Instant`] so the countdown is deterministic in
//! tests and the session machine stays pure.

use std::time::{Duration, Instant};

/// Cooldown between OTP code (re)sends.
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);

/// Countdown that gates the "resend code" action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendTimer {
    started_at: Instant,
    cooldown: Duration,
}

impl ResendTimer {
    /// Start a countdown at `now`.
    pub fn start(now: Instant, cooldown: Duration) -> Self {
        Self {
            started_at: now,
            cooldown,
        }
    }

    /// Time left before resend becomes available.
    pub fn remaining(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.started_at);
        self.cooldown.saturating_sub(elapsed)
    }

    /// Whether the countdown has run out.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now).is_zero()
    }

    /// Restart the countdown at `now`, keeping the cooldown.
    pub fn restart(&mut self, now: Instant) {
        self.started_at = now;
    }

    /// Configured cooldown.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_zero() {
        let t0 = Instant::now();
        let timer = ResendTimer::start(t0, RESEND_COOLDOWN);

        assert_eq!(timer.remaining(t0), Duration::from_secs(60));
        assert_eq!(timer.remaining(t0 + Duration::from_secs(45)), Duration::from_secs(15));
        assert!(!timer.is_expired(t0 + Duration::from_secs(59)));
        assert!(timer.is_expired(t0 + Duration::from_secs(60)));
        assert!(timer.is_expired(t0 + Duration::from_secs(600)));
    }

    #[test]
    fn restart_resets_the_countdown() {
        let t0 = Instant::now();
        let mut timer = ResendTimer::start(t0, RESEND_COOLDOWN);

        let later = t0 + Duration::from_secs(70);
        timer.restart(later);

        assert_eq!(timer.remaining(later), RESEND_COOLDOWN);
        assert_eq!(timer.cooldown(), RESEND_COOLDOWN);
    }

    #[test]
    fn clock_before_start_does_not_underflow() {
        let t0 = Instant::now() + Duration::from_secs(5);
        let timer = ResendTimer::start(t0, RESEND_COOLDOWN);

        assert_eq!(timer.remaining(Instant::now()), RESEND_COOLDOWN);
    }
}
