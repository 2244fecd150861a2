//! One-way event channel from the embedded widget to its supervisor.
//!
//! The bridge keeps a single listener slot. Registering a listener for a new
//! widget instance replaces the old one, so hooks captured by a previous
//! instance go quiet instead of leaking events into the new one. Events
//! emitted with no listener, or from a stale instance, are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::widget::event::{BridgedEvent, WidgetEvent};

#[derive(Debug, Default)]
struct ListenerSlot {
    tx: Option<mpsc::UnboundedSender<BridgedEvent>>,
    instance: u64,
    seq: u64,
}

/// Shared listener registry; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct EventBridge {
    slot: Arc<Mutex<ListenerSlot>>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the host listener for `instance`, replacing any previous one.
    pub fn register(&self, instance: u64) -> mpsc::UnboundedReceiver<BridgedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = lock(&self.slot);
        if slot.tx.is_some() {
            tracing::debug!(
                previous = slot.instance,
                instance,
                "Replacing widget event listener"
            );
        }
        *slot = ListenerSlot {
            tx: Some(tx),
            instance,
            seq: 0,
        };
        rx
    }

    pub fn unregister(&self) {
        lock(&self.slot).tx = None;
    }

    pub fn active_instance(&self) -> Option<u64> {
        let slot = lock(&self.slot);
        slot.tx.as_ref().map(|_| slot.instance)
    }

    /// Callback set handed to the widget factory for `instance`.
    pub fn hooks(&self, instance: u64) -> EventHooks {
        EventHooks {
            slot: Arc::clone(&self.slot),
            instance,
        }
    }
}

/// The callbacks a widget instance fires. Fire-and-forget.
#[derive(Debug, Clone)]
pub struct EventHooks {
    slot: Arc<Mutex<ListenerSlot>>,
    instance: u64,
}

impl EventHooks {
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Timestamp and deliver `event`. Returns whether a listener took it.
    pub fn emit(&self, event: WidgetEvent) -> bool {
        let mut slot = lock(&self.slot);
        let kind = event.kind();
        if slot.instance != self.instance {
            tracing::debug!(
                instance = self.instance,
                active = slot.instance,
                ?kind,
                "Dropping event from stale widget instance"
            );
            return false;
        }
        let Some(tx) = slot.tx.clone() else {
            tracing::debug!(instance = self.instance, ?kind, "No widget listener; event dropped");
            return false;
        };

        slot.seq += 1;
        let bridged = BridgedEvent {
            instance: self.instance,
            seq: slot.seq,
            event,
            timestamp: Utc::now(),
        };
        if tx.send(bridged).is_err() {
            tracing::debug!(instance = self.instance, ?kind, "Widget listener gone; event dropped");
            slot.tx = None;
            return false;
        }
        true
    }

    /// Deliver a raw factory callback by name (`onLoad`, `onError`, ...).
    pub fn emit_hook(&self, name: &str, payload: Value) -> bool {
        match WidgetEvent::from_hook(name, payload) {
            Some(event) => self.emit(event),
            None => {
                tracing::warn!(hook = name, "Unknown widget callback ignored");
                false
            }
        }
    }

    pub fn on_load(&self) -> bool {
        self.emit(WidgetEvent::Loaded)
    }

    pub fn on_error(&self, detail: impl Into<String>) -> bool {
        self.emit(WidgetEvent::Failed(detail.into()))
    }
}

fn lock(slot: &Mutex<ListenerSlot>) -> MutexGuard<'_, ListenerSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn preserves_emission_order_and_stamps_events() {
        let bridge = EventBridge::new();
        let mut rx = bridge.register(1);
        let hooks = bridge.hooks(1);

        assert!(hooks.on_load());
        assert!(hooks.emit(WidgetEvent::PageChanged(json!({"page": 2}))));
        assert!(hooks.emit_hook("onFilterChange", json!({"filter": "Year"})));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.event, WidgetEvent::Loaded);
        assert_eq!((first.seq, second.seq, third.seq), (1, 2, 3));
        assert!(first.timestamp <= second.timestamp && second.timestamp <= third.timestamp);
        assert_eq!(third.event, WidgetEvent::FilterChanged(json!({"filter": "Year"})));
    }

    #[test]
    fn drops_events_without_listener() {
        let bridge = EventBridge::new();
        let hooks = bridge.hooks(0);
        assert!(!hooks.on_load());

        let rx = bridge.register(0);
        bridge.unregister();
        assert!(!hooks.on_load());
        assert_eq!(bridge.active_instance(), None);
        drop(rx);
    }

    #[test]
    fn stale_instance_hooks_are_ignored() {
        let bridge = EventBridge::new();
        let _old_rx = bridge.register(1);
        let old_hooks = bridge.hooks(1);

        let mut rx = bridge.register(2);
        let new_hooks = bridge.hooks(2);

        assert!(!old_hooks.on_error("old widget failed"));
        assert!(new_hooks.on_load());
        assert_eq!(rx.try_recv().unwrap().instance, 2);
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.active_instance(), Some(2));
    }

    #[test]
    fn closed_receiver_clears_listener() {
        let bridge = EventBridge::new();
        let rx = bridge.register(3);
        let hooks = bridge.hooks(3);
        drop(rx);

        assert!(!hooks.on_load());
        assert_eq!(bridge.active_instance(), None);
    }

    #[test]
    fn unknown_hook_is_not_delivered() {
        let bridge = EventBridge::new();
        let mut rx = bridge.register(1);
        assert!(!bridge.hooks(1).emit_hook("onResize", Value::Null));
        assert!(rx.try_recv().is_err());
    }
}
