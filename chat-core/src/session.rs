//! Session and OTP state machine.
//!
//! Tracks the authenticated identity that gates the realtime connection,
//! plus the short-lived OTP context used by registration and password
//! reset. The REST calls themselves live outside this crate; the machine
//! only consumes their outcomes.
//!
//! Every transition that changes authentication returns
//! [`SessionEffect`]s. The caller must execute them, which is what keeps
//! "no connection while unauthenticated" true.

use std::time::{Duration, Instant};

use thiserror::Error;
use veil_chat_types::UserId;

use crate::resend::{ResendTimer, RESEND_COOLDOWN};

/// Number of digits in an OTP code.
pub const OTP_LENGTH: usize = 6;

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Verification targeted another email than the pending one.
    #[error("verification email {got} does not match pending {expected}")]
    EmailMismatch {
        /// Email of the pending context.
        expected: String,
        /// Email the verification was for.
        got: String,
    },

    /// Resend requested while the countdown runs.
    #[error("resend available in {}s", remaining.as_secs())]
    ResendCooldown {
        /// Time left on the countdown.
        remaining: Duration,
    },

    /// No OTP flow is waiting for a code.
    #[error("no verification pending")]
    NoPendingOtp,

    /// The operation is not valid in the current state.
    #[error("unexpected {operation} in state {state}")]
    InvalidTransition {
        /// Outcome that arrived.
        operation: &'static str,
        /// Label of the current state.
        state: &'static str,
    },

    /// OTP code is not six digits.
    #[error("please enter a valid {OTP_LENGTH}-digit code")]
    MalformedCode,
}

/// Why an OTP flow was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    /// Confirm the email of a new account.
    Register,
    /// Confirm control of the email before a password reset.
    PasswordReset,
}

/// Observable authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Nobody signed in, no flow in progress.
    Anonymous,
    /// Waiting for the user to enter a code sent to `email`.
    OtpPending {
        /// Flow the code belongs to.
        purpose: OtpPurpose,
        /// Address the code was sent to.
        email: String,
    },
    /// Reset code accepted; the final reset call may be made.
    ResetPasswordAllowed {
        /// Address retained for the reset call.
        email: String,
    },
    /// Signed in.
    Authenticated,
}

impl AuthState {
    /// Short label for logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::OtpPending {
                purpose: OtpPurpose::Register,
                ..
            } => "otp_pending",
            Self::OtpPending {
                purpose: OtpPurpose::PasswordReset,
                ..
            } => "reset_otp_pending",
            Self::ResetPasswordAllowed { .. } => "reset_password_allowed",
            Self::Authenticated => "authenticated",
        }
    }
}

/// Outcome of a failed verify or reset call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// Wrong or expired code; the context stays for a retry.
    Rejected(String),
    /// The backend no longer knows the email context; start over.
    InvalidContext(String),
}

/// Side effects the caller must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Authentication gained: open the connection for this identity.
    Connect(UserId),
    /// Authentication lost: tear the connection down.
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Flow {
    None,
    Pending { purpose: OtpPurpose, email: String },
    ResetAllowed { email: String },
}

/// Session state machine - NO I/O.
#[derive(Debug, Clone)]
pub struct Session {
    user: Option<UserId>,
    flow: Flow,
    resend: Option<ResendTimer>,
    cooldown: Duration,
    error: Option<String>,
    initialized: bool,
}

impl Session {
    /// Create an anonymous session with the default resend cooldown.
    pub fn new() -> Self {
        Self::with_cooldown(RESEND_COOLDOWN)
    }

    /// Create an anonymous session with a custom resend cooldown.
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            user: None,
            flow: Flow::None,
            resend: None,
            cooldown,
            error: None,
            initialized: false,
        }
    }

    // ===========================================
    // Registration
    // ===========================================

    /// Registration request accepted; a code was mailed to `email`.
    pub fn register_succeeded(&mut self, email: &str, now: Instant) {
        self.enter_pending(OtpPurpose::Register, email, now);
    }

    /// Registration request rejected.
    pub fn register_failed(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    /// Registration code accepted and the account created.
    pub fn otp_verified(&mut self, email: &str, user: UserId) -> Vec<SessionEffect> {
        let expected = match &self.flow {
            Flow::Pending {
                purpose: OtpPurpose::Register,
                email,
            } => email.clone(),
            _ => {
                self.reject_transition("otp_verified");
                return vec![];
            }
        };
        if !same_email(&expected, email) {
            self.abandon_flow(SessionError::EmailMismatch {
                expected,
                got: email.to_string(),
            });
            return vec![];
        }

        self.clear_flow();
        self.error = None;
        self.authenticate(user)
    }

    // ===========================================
    // Password reset
    // ===========================================

    /// Forgot-password request accepted; a code was mailed to `email`.
    pub fn forgot_password_succeeded(&mut self, email: &str, now: Instant) {
        self.enter_pending(OtpPurpose::PasswordReset, email, now);
    }

    /// Forgot-password request rejected.
    pub fn forgot_password_failed(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    /// Reset code accepted; the password may now be replaced.
    pub fn reset_otp_verified(&mut self, email: &str) {
        let expected = match &self.flow {
            Flow::Pending {
                purpose: OtpPurpose::PasswordReset,
                email,
            } => email.clone(),
            _ => {
                self.reject_transition("reset_otp_verified");
                return;
            }
        };
        if !same_email(&expected, email) {
            self.abandon_flow(SessionError::EmailMismatch {
                expected,
                got: email.to_string(),
            });
            return;
        }

        self.flow = Flow::ResetAllowed { email: expected };
        self.resend = None;
        self.error = None;
    }

    /// Password replaced. Does not sign anyone in; ends any signed-in session.
    pub fn password_reset_succeeded(&mut self) -> Vec<SessionEffect> {
        if !matches!(self.flow, Flow::ResetAllowed { .. }) {
            self.reject_transition("password_reset_succeeded");
            return vec![];
        }
        self.clear_flow();
        self.error = None;
        if self.user.take().is_some() {
            return vec![SessionEffect::Disconnect];
        }
        vec![]
    }

    /// Password reset call failed.
    pub fn password_reset_failed(&mut self, failure: VerifyFailure) {
        self.fail(failure);
    }

    // ===========================================
    // Shared OTP handling
    // ===========================================

    /// A verify call (registration or reset) failed.
    ///
    /// A rejected code leaves state, context and resend timer untouched.
    pub fn otp_rejected(&mut self, failure: VerifyFailure) {
        self.fail(failure);
    }

    /// User backed out of the OTP flow.
    pub fn cancel_pending(&mut self) {
        self.clear_flow();
    }

    /// Ask for another code. Restarts the countdown; state is unchanged.
    pub fn request_resend(&mut self, now: Instant) -> Result<(), SessionError> {
        if !matches!(self.flow, Flow::Pending { .. }) {
            return Err(SessionError::NoPendingOtp);
        }
        match self.resend.as_mut() {
            Some(timer) if !timer.is_expired(now) => Err(SessionError::ResendCooldown {
                remaining: timer.remaining(now),
            }),
            Some(timer) => {
                timer.restart(now);
                Ok(())
            }
            None => {
                self.resend = Some(ResendTimer::start(now, self.cooldown));
                Ok(())
            }
        }
    }

    /// Time left before resend is allowed, if an OTP flow is pending.
    pub fn resend_remaining(&self, now: Instant) -> Option<Duration> {
        self.resend.as_ref().map(|t| t.remaining(now))
    }

    /// Whether the resend action is currently enabled.
    pub fn can_resend(&self, now: Instant) -> bool {
        matches!(self.flow, Flow::Pending { .. })
            && self.resend.as_ref().map_or(true, |t| t.is_expired(now))
    }

    // ===========================================
    // Login / logout / restore
    // ===========================================

    /// Credentials accepted.
    pub fn login_succeeded(&mut self, user: UserId) -> Vec<SessionEffect> {
        self.error = None;
        self.authenticate(user)
    }

    /// Credentials rejected.
    pub fn login_failed(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    /// An existing session cookie resolved to a user at startup.
    pub fn session_restored(&mut self, user: UserId) -> Vec<SessionEffect> {
        self.authenticate(user)
    }

    /// Session refresh failed: authentication is lost.
    pub fn session_restore_failed(&mut self) -> Vec<SessionEffect> {
        self.initialized = true;
        self.user = None;
        vec![SessionEffect::Disconnect]
    }

    /// Logout finished. Success and failure both end the local session.
    pub fn logged_out(&mut self) -> Vec<SessionEffect> {
        self.user = None;
        self.clear_flow();
        self.error = None;
        vec![SessionEffect::Disconnect]
    }

    /// Dismiss the surfaced error.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    // ===========================================
    // Accessors
    // ===========================================

    /// Current observable state.
    pub fn state(&self) -> AuthState {
        match &self.flow {
            Flow::Pending { purpose, email } => AuthState::OtpPending {
                purpose: *purpose,
                email: email.clone(),
            },
            Flow::ResetAllowed { email } => AuthState::ResetPasswordAllowed {
                email: email.clone(),
            },
            Flow::None if self.user.is_some() => AuthState::Authenticated,
            Flow::None => AuthState::Anonymous,
        }
    }

    /// Authenticated identity.
    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    /// Whether a user is signed in (a reset flow may be running on top).
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Email of the pending OTP or reset context.
    pub fn pending_email(&self) -> Option<&str> {
        match &self.flow {
            Flow::Pending { email, .. } | Flow::ResetAllowed { email } => Some(email),
            Flow::None => None,
        }
    }

    /// Error to show the user, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the startup session check has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // ===========================================
    // Internals
    // ===========================================

    fn enter_pending(&mut self, purpose: OtpPurpose, email: &str, now: Instant) {
        self.flow = Flow::Pending {
            purpose,
            email: email.trim().to_string(),
        };
        self.resend = Some(ResendTimer::start(now, self.cooldown));
        self.error = None;
    }

    fn authenticate(&mut self, user: UserId) -> Vec<SessionEffect> {
        self.initialized = true;
        self.user = Some(user.clone());
        vec![SessionEffect::Connect(user)]
    }

    fn fail(&mut self, failure: VerifyFailure) {
        match failure {
            VerifyFailure::Rejected(message) => self.error = Some(message),
            VerifyFailure::InvalidContext(message) => {
                self.clear_flow();
                self.error = Some(message);
            }
        }
    }

    fn abandon_flow(&mut self, err: SessionError) {
        self.clear_flow();
        self.error = Some(err.to_string());
    }

    fn reject_transition(&mut self, operation: &'static str) {
        let err = SessionError::InvalidTransition {
            operation,
            state: self.state().label(),
        };
        self.error = Some(err.to_string());
    }

    fn clear_flow(&mut self) {
        self.flow = Flow::None;
        self.resend = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a code locally before spending a verify call on it.
pub fn validate_otp_code(code: &str) -> Result<(), SessionError> {
    if code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(SessionError::MalformedCode)
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
