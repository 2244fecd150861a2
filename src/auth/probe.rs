//! Session probe: the one authoritative "is the user logged in?" check.
//!
//! Issues a single credentialed `GET` against the library's session
//! endpoint and classifies the answer. 200 means authenticated, 401 means
//! not authenticated, anything else (including transport failures and
//! timeouts) is indeterminate and keeps the cause for diagnostics.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::ProbeConfig;

/// Cookie the analytics library uses for its session token.
pub const AUTH_TOKEN_COOKIE: &str = "X-MSTR-AuthToken";

/// Result of a single session check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Authenticated,
    Unauthenticated,
    Indeterminate { cause: ProbeFailure },
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
            Self::Indeterminate { .. } => "indeterminate",
        }
    }
}

/// Transport/protocol classification for indeterminate probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailureKind {
    InvalidUrl,
    DnsFailure,
    ConnectFailure,
    Timeout,
    UnexpectedStatus,
    /// The probe implementation itself panicked.
    Panicked,
}

impl ProbeFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::DnsFailure => "dns_failure",
            Self::ConnectFailure => "connect_failure",
            Self::Timeout => "timeout",
            Self::UnexpectedStatus => "unexpected_status",
            Self::Panicked => "panicked",
        }
    }
}

/// Raw cause behind an indeterminate probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeFailure {
    pub kind: ProbeFailureKind,
    pub detail: String,
    pub http_status: Option<u16>,
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.detail)
    }
}

/// A pure query against the remote session; never mutates auth state.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    async fn check(&self) -> ProbeOutcome;
}

/// [`SessionProbe`] backed by the library REST session endpoint.
pub struct HttpSessionProbe {
    client: Client,
    sessions_url: String,
    timeout: Duration,
    auth_token: Option<SecretString>,
}

impl HttpSessionProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            sessions_url: config.sessions_url.clone(),
            timeout: config.timeout,
            auth_token: None,
        }
    }

    /// Send an explicit session token as the auth cookie.
    ///
    /// Without one the probe relies on whatever session the endpoint
    /// recognises for this client, same as a browser with no cookie set.
    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = Some(token);
        self
    }

    pub fn sessions_url(&self) -> &str {
        &self.sessions_url
    }
}

#[async_trait]
impl SessionProbe for HttpSessionProbe {
    async fn check(&self) -> ProbeOutcome {
        if reqwest::Url::parse(&self.sessions_url).is_err() {
            return ProbeOutcome::Indeterminate {
                cause: ProbeFailure {
                    kind: ProbeFailureKind::InvalidUrl,
                    detail: format!("URL parse failed: {}", self.sessions_url),
                    http_status: None,
                },
            };
        }

        // The per-request timeout also covers the fallback client.
        let mut request = self
            .client
            .get(&self.sessions_url)
            .timeout(self.timeout)
            .header("Accept", "application/json");
        if let Some(token) = &self.auth_token {
            request = request.header(
                "Cookie",
                format!("{}={}", AUTH_TOKEN_COOKIE, token.expose_secret()),
            );
        }

        let outcome = match request.send().await {
            Ok(response) => classify_status(response.status()),
            Err(error) => ProbeOutcome::Indeterminate {
                cause: ProbeFailure {
                    kind: classify_transport_error(&error),
                    detail: redact_sensitive_detail(&error.to_string()),
                    http_status: None,
                },
            },
        };

        match &outcome {
            ProbeOutcome::Indeterminate { cause } => tracing::warn!(
                url = %self.sessions_url,
                kind = cause.kind.as_str(),
                detail = %cause.detail,
                "Session probe indeterminate"
            ),
            other => tracing::debug!(
                url = %self.sessions_url,
                outcome = other.as_str(),
                "Session probe classified"
            ),
        }
        outcome
    }
}

/// Map an HTTP status onto a probe outcome.
pub fn classify_status(status: StatusCode) -> ProbeOutcome {
    if status == StatusCode::OK {
        ProbeOutcome::Authenticated
    } else if status == StatusCode::UNAUTHORIZED {
        ProbeOutcome::Unauthenticated
    } else {
        ProbeOutcome::Indeterminate {
            cause: ProbeFailure {
                kind: ProbeFailureKind::UnexpectedStatus,
                detail: format!("HTTP {}", status.as_u16()),
                http_status: Some(status.as_u16()),
            },
        }
    }
}

fn classify_transport_error(error: &reqwest::Error) -> ProbeFailureKind {
    if error.is_timeout() {
        return ProbeFailureKind::Timeout;
    }

    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io_error) = err.downcast_ref::<std::io::Error>() {
            return match io_error.kind() {
                std::io::ErrorKind::NotFound => ProbeFailureKind::DnsFailure,
                std::io::ErrorKind::TimedOut => ProbeFailureKind::Timeout,
                _ => ProbeFailureKind::ConnectFailure,
            };
        }
        source = err.source();
    }

    let lowered = error.to_string().to_ascii_lowercase();
    if lowered.contains("dns")
        || lowered.contains("lookup")
        || lowered.contains("name or service not known")
        || lowered.contains("no such host")
    {
        ProbeFailureKind::DnsFailure
    } else {
        ProbeFailureKind::ConnectFailure
    }
}

/// Mask bearer tokens, auth cookies and key-like values in free text.
pub(crate) fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    let patterns = [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (
            r"(?i)\b(x-mstr-authtoken|token|api[_\-]?key|secret|password)\b(\s*[:=]\s*)([^,;\s]+)",
            "$1$2[REDACTED]",
        ),
    ];

    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            value = re.replace_all(&value, replacement).to_string();
        }
    }

    value
}
