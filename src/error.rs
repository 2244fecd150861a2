//! Error types for embedgate.

use serde::Serialize;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Popup error: {0}")]
    Popup(#[from] PopupError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Widget error: {0}")]
    Widget(#[from] WidgetError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

/// Failure domains surfaced to the host.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    Auth,
    Widget,
    Config,
    Host,
}

/// Structured error payload for host-facing surfaces.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HostErrorPayload {
    pub domain: ErrorDomain,
    pub code: &'static str,
    pub retryable: bool,
    pub message: String,
}

impl HostErrorPayload {
    pub(crate) fn new(
        domain: ErrorDomain,
        code: &'static str,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            code,
            retryable,
            message: message.into(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Login surface errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PopupError {
    /// The platform refused to create the browsing context.
    #[error("Popup for {url} was blocked: {reason}")]
    Blocked { url: String, reason: String },
}

/// Handshake orchestration errors (usage errors, not auth outcomes).
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandshakeError {
    #[error("Handshake already in progress (state {state})")]
    AlreadyRunning { state: String },

    #[error("Handshake already finished in state {state}; reset before starting again")]
    Terminal { state: String },
}

/// Embedded widget errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WidgetError {
    #[error("Widget is not ready (readiness {readiness})")]
    NotReady { readiness: String },

    #[error("Widget {operation} failed: {detail}")]
    OperationFailed { operation: String, detail: String },

    #[error("Widget initialization failed: {detail}")]
    InitFailed { detail: String },

    #[error("Widget supervisor has been destroyed")]
    Destroyed,

    #[error("Cannot {action} a widget in readiness {readiness}")]
    InvalidTransition { action: String, readiness: String },
}

/// Host state errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("Demo mode is disabled (set EMBEDGATE_ALLOW_DEMO_MODE=true to enable)")]
    DemoModeDisabled,
}

impl Error {
    /// Map this error onto a stable host-facing payload.
    pub fn to_error_payload(&self) -> HostErrorPayload {
        match self {
            Self::Config(err) => HostErrorPayload::new(
                ErrorDomain::Config,
                "config.invalid",
                false,
                err.to_string(),
            ),
            Self::Popup(err) => match err {
                PopupError::Blocked { .. } => HostErrorPayload::new(
                    ErrorDomain::Auth,
                    "auth.popup_blocked",
                    false,
                    err.to_string(),
                ),
            },
            Self::Handshake(err) => match err {
                HandshakeError::AlreadyRunning { .. } => HostErrorPayload::new(
                    ErrorDomain::Auth,
                    "auth.handshake_running",
                    false,
                    err.to_string(),
                ),
                HandshakeError::Terminal { .. } => HostErrorPayload::new(
                    ErrorDomain::Auth,
                    "auth.handshake_terminal",
                    false,
                    err.to_string(),
                ),
            },
            Self::Widget(err) => match err {
                WidgetError::NotReady { .. } => HostErrorPayload::new(
                    ErrorDomain::Widget,
                    "widget.not_ready",
                    false,
                    err.to_string(),
                ),
                WidgetError::OperationFailed { .. } => HostErrorPayload::new(
                    ErrorDomain::Widget,
                    "widget.operation_failed",
                    true,
                    err.to_string(),
                ),
                WidgetError::InitFailed { .. } => HostErrorPayload::new(
                    ErrorDomain::Widget,
                    "widget.init_failed",
                    true,
                    err.to_string(),
                ),
                WidgetError::Destroyed => HostErrorPayload::new(
                    ErrorDomain::Widget,
                    "widget.destroyed",
                    false,
                    err.to_string(),
                ),
                WidgetError::InvalidTransition { .. } => HostErrorPayload::new(
                    ErrorDomain::Widget,
                    "widget.invalid_transition",
                    false,
                    err.to_string(),
                ),
            },
            Self::Host(err) => match err {
                HostError::DemoModeDisabled => HostErrorPayload::new(
                    ErrorDomain::Host,
                    "host.demo_mode_disabled",
                    false,
                    err.to_string(),
                ),
            },
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
