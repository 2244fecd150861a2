//! Embedded analytics widget: event vocabulary, the bridge that carries
//! widget callbacks to the host, and the supervisor that owns its lifecycle.

pub mod bridge;
pub mod event;
pub mod factory;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod fakes;

pub use bridge::{EventBridge, EventHooks};
pub use event::{BridgedEvent, WidgetEvent, WidgetEventKind};
pub use factory::{
    AuthTokenSource, CustomCss, DashboardSummary, EmbedConfig, EmbedSource, ExportedDocument,
    NavigationOptions, WidgetControl, WidgetFactory, WidgetRequest,
};
pub use supervisor::{Readiness, WidgetSupervisor};
