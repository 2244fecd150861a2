//! Authentication session record owned by the handshake orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why a login attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum FailureReason {
    /// The platform refused to open the login surface.
    PopupBlocked { detail: String },
    /// The session endpoint answered 401 after the popup finished.
    NotAuthenticated,
    /// The session endpoint could not be classified (network, timeout, odd status).
    VerificationError { cause: String },
}

impl FailureReason {
    /// Stable reason string carried in `AUTH_RESULT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PopupBlocked { .. } => "popup-blocked",
            Self::NotAuthenticated => "not-authenticated",
            Self::VerificationError { .. } => "verification-error",
        }
    }

    /// Rebuild a reason from its `AUTH_RESULT` string.
    pub fn from_code(code: &str, cause: Option<&str>) -> Option<Self> {
        let cause = cause.unwrap_or_default().to_string();
        match code {
            "popup-blocked" => Some(Self::PopupBlocked { detail: cause }),
            "not-authenticated" => Some(Self::NotAuthenticated),
            "verification-error" => Some(Self::VerificationError { cause }),
            _ => None,
        }
    }

    /// Diagnostic detail, when there is one.
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::PopupBlocked { detail } => Some(detail),
            Self::NotAuthenticated => None,
            Self::VerificationError { cause } => Some(cause),
        }
    }

    /// Message suitable for showing to the user on the login screen.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PopupBlocked { .. } => {
                "The login window was blocked. Allow pop-ups for this site and try again."
            }
            Self::NotAuthenticated => {
                "Authentication not complete. Please make sure you finished logging in."
            }
            Self::VerificationError { .. } => {
                "Could not confirm your login with the analytics server. Please try again."
            }
        }
    }
}

/// Authentication state of the single session a host context holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Pending,
    Authenticated,
    Failed { failure: FailureReason },
    TimedOut,
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Authenticated | Self::Failed { .. } | Self::TimedOut
        )
    }
}

/// The explicit session value that replaces ambient "is logged in" flags.
///
/// Only the handshake orchestrator mutates it. Terminal states stay put
/// until [`AuthSession::reset`] is called on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    state: AuthState,
    started_at: Option<DateTime<Utc>>,
    last_checked_at: Option<DateTime<Utc>>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    pub fn new() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            started_at: None,
            last_checked_at: None,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// Mark a login attempt as started. No-op once terminal.
    pub(crate) fn begin(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = AuthState::Pending;
        self.started_at = Some(Utc::now());
        true
    }

    pub(crate) fn record_check(&mut self) {
        self.last_checked_at = Some(Utc::now());
    }

    /// Move into a terminal state. Returns false if already terminal.
    pub(crate) fn finish(&mut self, state: AuthState) -> bool {
        if self.state.is_terminal() {
            tracing::warn!(
                current = ?self.state,
                requested = ?state,
                "Ignoring transition out of terminal auth state"
            );
            return false;
        }
        self.state = state;
        true
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}
