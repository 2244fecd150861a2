//! Typed vocabulary for embedded widget callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::signal::HostSignal;

/// One lifecycle or interaction event raised by the widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum WidgetEvent {
    Loaded,
    Failed(String),
    PageChanged(Value),
    FilterChanged(Value),
    SelectionChanged(Value),
    DrilledDown(Value),
    DrilledUp(Value),
    DataChanged(Value),
}

/// Discriminant of [`WidgetEvent`], used on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetEventKind {
    Loaded,
    Failed,
    PageChanged,
    FilterChanged,
    SelectionChanged,
    DrilledDown,
    DrilledUp,
    DataChanged,
}

impl WidgetEventKind {
    pub const ALL: [Self; 8] = [
        Self::Loaded,
        Self::Failed,
        Self::PageChanged,
        Self::FilterChanged,
        Self::SelectionChanged,
        Self::DrilledDown,
        Self::DrilledUp,
        Self::DataChanged,
    ];

    /// Name of the factory callback that raises this kind.
    pub fn hook_name(self) -> &'static str {
        match self {
            Self::Loaded => "onLoad",
            Self::Failed => "onError",
            Self::PageChanged => "onPageChange",
            Self::FilterChanged => "onFilterChange",
            Self::SelectionChanged => "onSelectionChange",
            Self::DrilledDown => "onDrillDown",
            Self::DrilledUp => "onDrillUp",
            Self::DataChanged => "onDataChange",
        }
    }

    pub fn from_hook_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.hook_name() == name)
    }
}

impl WidgetEvent {
    pub fn kind(&self) -> WidgetEventKind {
        match self {
            Self::Loaded => WidgetEventKind::Loaded,
            Self::Failed(_) => WidgetEventKind::Failed,
            Self::PageChanged(_) => WidgetEventKind::PageChanged,
            Self::FilterChanged(_) => WidgetEventKind::FilterChanged,
            Self::SelectionChanged(_) => WidgetEventKind::SelectionChanged,
            Self::DrilledDown(_) => WidgetEventKind::DrilledDown,
            Self::DrilledUp(_) => WidgetEventKind::DrilledUp,
            Self::DataChanged(_) => WidgetEventKind::DataChanged,
        }
    }

    /// Payload as forwarded to the host.
    pub fn data(&self) -> Value {
        match self {
            Self::Loaded => Value::Null,
            Self::Failed(detail) => serde_json::json!({ "detail": detail }),
            Self::PageChanged(data)
            | Self::FilterChanged(data)
            | Self::SelectionChanged(data)
            | Self::DrilledDown(data)
            | Self::DrilledUp(data)
            | Self::DataChanged(data) => data.clone(),
        }
    }

    /// Build an event from a raw factory callback.
    ///
    /// Error payloads are reduced to a detail string: a bare string, then a
    /// `message` field, then the JSON text. Unknown hook names yield `None`.
    pub fn from_hook(name: &str, payload: Value) -> Option<Self> {
        let event = match WidgetEventKind::from_hook_name(name)? {
            WidgetEventKind::Loaded => Self::Loaded,
            WidgetEventKind::Failed => Self::Failed(error_detail(&payload)),
            WidgetEventKind::PageChanged => Self::PageChanged(payload),
            WidgetEventKind::FilterChanged => Self::FilterChanged(payload),
            WidgetEventKind::SelectionChanged => Self::SelectionChanged(payload),
            WidgetEventKind::DrilledDown => Self::DrilledDown(payload),
            WidgetEventKind::DrilledUp => Self::DrilledUp(payload),
            WidgetEventKind::DataChanged => Self::DataChanged(payload),
        };
        Some(event)
    }
}

fn error_detail(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Null => "unknown widget error".to_string(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => payload.to_string(),
        },
        other => other.to_string(),
    }
}

/// A widget event stamped by the bridge at emission time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgedEvent {
    pub instance: u64,
    pub seq: u64,
    pub event: WidgetEvent,
    pub timestamp: DateTime<Utc>,
}

impl BridgedEvent {
    pub fn to_host_signal(&self) -> HostSignal {
        HostSignal::WidgetEvent {
            kind: self.event.kind(),
            data: self.event.data(),
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hook_names_map_to_kinds() {
        for kind in WidgetEventKind::ALL {
            assert_eq!(WidgetEventKind::from_hook_name(kind.hook_name()), Some(kind));
        }
        assert_eq!(WidgetEventKind::from_hook_name("onResize"), None);
    }

    #[test]
    fn from_hook_extracts_error_detail() {
        assert_eq!(
            WidgetEvent::from_hook("onError", json!({"message": "session expired", "code": 401})),
            Some(WidgetEvent::Failed("session expired".to_string()))
        );
        assert_eq!(
            WidgetEvent::from_hook("onError", json!("boom")),
            Some(WidgetEvent::Failed("boom".to_string()))
        );
        assert_eq!(
            WidgetEvent::from_hook("onError", Value::Null),
            Some(WidgetEvent::Failed("unknown widget error".to_string()))
        );
    }

    #[test]
    fn from_hook_keeps_interaction_payload() {
        let payload = json!({"page": 3});
        let event = WidgetEvent::from_hook("onPageChange", payload.clone()).unwrap();
        assert_eq!(event.kind(), WidgetEventKind::PageChanged);
        assert_eq!(event.data(), payload);
        assert_eq!(WidgetEvent::from_hook("onResize", payload), None);
    }

    #[test]
    fn serializes_with_kind_and_data() {
        let value = serde_json::to_value(WidgetEvent::DrilledDown(json!({"level": "City"}))).unwrap();
        assert_eq!(value, json!({"kind": "drilled_down", "data": {"level": "City"}}));

        let loaded = serde_json::to_value(WidgetEvent::Loaded).unwrap();
        assert_eq!(loaded, json!({"kind": "loaded"}));
    }

    #[test]
    fn bridged_event_becomes_widget_event_signal() {
        let timestamp = Utc::now();
        let bridged = BridgedEvent {
            instance: 2,
            seq: 9,
            event: WidgetEvent::Failed("late error".to_string()),
            timestamp,
        };
        assert_eq!(
            bridged.to_host_signal(),
            HostSignal::WidgetEvent {
                kind: WidgetEventKind::Failed,
                data: json!({"detail": "late error"}),
                timestamp,
            }
        );
    }
}
