//! Host-facing notifications and the sink they are delivered through.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::widget::event::WidgetEventKind;

/// Terminal status carried by `AUTH_RESULT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Succeeded,
    Failed,
    TimedOut,
}

/// A notification for the host application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostSignal {
    AuthResult {
        status: AuthStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
    WidgetReady,
    WidgetError {
        detail: String,
    },
    WidgetEvent {
        kind: WidgetEventKind,
        data: Value,
        timestamp: DateTime<Utc>,
    },
}

impl HostSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthResult { .. } => "AUTH_RESULT",
            Self::WidgetReady => "WIDGET_READY",
            Self::WidgetError { .. } => "WIDGET_ERROR",
            Self::WidgetEvent { .. } => "WIDGET_EVENT",
        }
    }
}

/// Where host signals go. Delivery is fire-and-forget.
pub trait HostSink: Send + Sync {
    fn deliver(&self, signal: HostSignal);
}

impl HostSink for mpsc::UnboundedSender<HostSignal> {
    fn deliver(&self, signal: HostSignal) {
        let name = signal.name();
        if self.send(signal).is_err() {
            tracing::debug!(signal = name, "Host sink closed; dropping signal");
        }
    }
}

/// Sink that only records signals in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl HostSink for TracingSink {
    fn deliver(&self, signal: HostSignal) {
        match serde_json::to_string(&signal) {
            Ok(json) => tracing::info!(signal = signal.name(), payload = %json, "Host signal"),
            Err(e) => tracing::warn!(signal = signal.name(), error = %e, "Unserializable host signal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_result_serializes_with_type_tag() {
        let signal = HostSignal::AuthResult {
            status: AuthStatus::Failed,
            reason: Some("popup-blocked".to_string()),
            cause: None,
        };
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["type"], "AUTH_RESULT");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["reason"], "popup-blocked");
        assert!(value.get("cause").is_none());
    }

    #[test]
    fn widget_event_carries_kind_and_timestamp() {
        let signal = HostSignal::WidgetEvent {
            kind: WidgetEventKind::FilterChanged,
            data: serde_json::json!({"filter": "Region"}),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["type"], "WIDGET_EVENT");
        assert_eq!(value["kind"], "filter_changed");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn channel_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.deliver(HostSignal::WidgetReady);
    }
}
