//! Embedded widget lifecycle.
//!
//! ```text
//! Uninitialized -> Initializing -> Ready
//!                       |      \-> Errored --retry--> Initializing
//!                       v
//!   (any state) ---destroy---> Destroyed
//! ```
//!
//! The supervisor owns the factory and the control handle it returns.
//! Readiness only changes from inside this type: synchronous factory
//! failures and the widget's own `Loaded`/`Failed` events, which arrive
//! through the [`EventBridge`] and are applied by [`WidgetSupervisor::pump`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::error::{WidgetError, panic_message};
use crate::host::signal::{HostSignal, HostSink};
use crate::widget::bridge::EventBridge;
use crate::widget::event::{BridgedEvent, WidgetEvent};
use crate::widget::factory::{ExportedDocument, WidgetControl, WidgetFactory, WidgetRequest};

/// Lifecycle state of the supervised widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Initializing,
    Ready,
    Errored(String),
    Destroyed,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Errored(_) => "errored",
            Self::Destroyed => "destroyed",
        }
    }
}

pub struct WidgetSupervisor<F> {
    factory: F,
    bridge: EventBridge,
    sink: Arc<dyn HostSink>,
    request: Option<WidgetRequest>,
    readiness: Readiness,
    control: Option<Box<dyn WidgetControl>>,
    events: Option<mpsc::UnboundedReceiver<BridgedEvent>>,
    instance: u64,
}

impl<F: WidgetFactory> WidgetSupervisor<F> {
    pub fn new(factory: F, sink: Arc<dyn HostSink>) -> Self {
        Self {
            factory,
            bridge: EventBridge::new(),
            sink,
            request: None,
            readiness: Readiness::Uninitialized,
            control: None,
            events: None,
            instance: 0,
        }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    /// Number of the current widget instance; bumps on every launch.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn bridge(&self) -> &EventBridge {
        &self.bridge
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Create the widget. Only valid once, from `Uninitialized`.
    pub fn initialize(&mut self, request: WidgetRequest) -> Result<(), WidgetError> {
        match &self.readiness {
            Readiness::Uninitialized => {}
            Readiness::Destroyed => return Err(WidgetError::Destroyed),
            other => {
                return Err(WidgetError::InvalidTransition {
                    action: "initialize".to_string(),
                    readiness: other.as_str().to_string(),
                });
            }
        }
        tracing::info!(
            object_id = %request.embed.src.object_id,
            project_id = %request.embed.src.project_id,
            "Initializing embedded widget"
        );
        self.request = Some(request);
        self.launch()
    }

    /// Recreate the widget with the same request. Only valid from `Errored`.
    pub fn retry(&mut self) -> Result<(), WidgetError> {
        match &self.readiness {
            Readiness::Errored(_) => {}
            Readiness::Destroyed => return Err(WidgetError::Destroyed),
            other => {
                return Err(WidgetError::InvalidTransition {
                    action: "retry".to_string(),
                    readiness: other.as_str().to_string(),
                });
            }
        }
        tracing::info!(previous = self.instance, "Retrying embedded widget");
        self.launch()
    }

    fn launch(&mut self) -> Result<(), WidgetError> {
        self.release_control();
        self.instance += 1;
        self.events = Some(self.bridge.register(self.instance));
        self.set_readiness(Readiness::Initializing);

        let Some(request) = self.request.as_ref() else {
            return self.fail_init("no widget request recorded".to_string());
        };
        let hooks = self.bridge.hooks(self.instance);
        let factory = &mut self.factory;
        let created =
            std::panic::catch_unwind(AssertUnwindSafe(|| factory.create(request, hooks)));

        match created {
            Ok(Ok(control)) => {
                self.control = Some(control);
                tracing::debug!(instance = self.instance, "Widget factory returned a handle");
                Ok(())
            }
            Ok(Err(detail)) => self.fail_init(detail),
            Err(panic) => self.fail_init(format!(
                "widget factory panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }

    fn fail_init(&mut self, detail: String) -> Result<(), WidgetError> {
        self.enter_errored(detail.clone());
        Err(WidgetError::InitFailed { detail })
    }

    fn enter_errored(&mut self, detail: String) {
        tracing::warn!(instance = self.instance, detail = %detail, "Embedded widget failed to load");
        self.release_control();
        self.bridge.unregister();
        self.events = None;
        self.set_readiness(Readiness::Errored(detail.clone()));
        self.sink.deliver(HostSignal::WidgetError { detail });
    }

    /// Apply every event already delivered by the widget. Returns how many.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let next = match self.events.as_mut() {
                Some(rx) => rx.try_recv().ok(),
                None => None,
            };
            let Some(event) = next else {
                break;
            };
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next widget event and apply it. `false` once the
    /// listener is gone.
    pub async fn process_next(&mut self) -> bool {
        let Some(rx) = self.events.as_mut() else {
            return false;
        };
        match rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Process events until the widget leaves `Initializing` or `timeout`
    /// elapses, whichever comes first.
    pub async fn wait_settled(&mut self, timeout: Duration) -> &Readiness {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.readiness == Readiness::Initializing {
            match tokio::time::timeout_at(deadline, self.process_next()).await {
                Ok(true) => {}
                Ok(false) | Err(_) => break,
            }
        }
        &self.readiness
    }

    fn handle_event(&mut self, bridged: BridgedEvent) {
        if bridged.instance != self.instance {
            return;
        }
        match (&self.readiness, &bridged.event) {
            (Readiness::Initializing, WidgetEvent::Loaded) => {
                self.set_readiness(Readiness::Ready);
                self.sink.deliver(HostSignal::WidgetReady);
            }
            (Readiness::Initializing, WidgetEvent::Failed(detail)) => {
                self.enter_errored(detail.clone());
            }
            (Readiness::Initializing | Readiness::Ready, event) => {
                if let WidgetEvent::Failed(detail) = event {
                    tracing::warn!(
                        instance = self.instance,
                        detail = %detail,
                        "Widget reported an error after loading"
                    );
                }
                self.sink.deliver(bridged.to_host_signal());
            }
            (readiness, event) => {
                tracing::debug!(
                    instance = self.instance,
                    readiness = readiness.as_str(),
                    kind = ?event.kind(),
                    "Ignoring widget event"
                );
            }
        }
    }

    /// Ask the widget to reload its data. Only valid while `Ready`.
    pub async fn refresh(&mut self) -> Result<(), WidgetError> {
        self.pump();
        let control = self.ready_control()?;
        let outcome = AssertUnwindSafe(control.refresh()).catch_unwind().await;
        self.operation_result("refresh", outcome)
    }

    /// Export the current document as PDF. Only valid while `Ready`.
    pub async fn export_document(&mut self) -> Result<ExportedDocument, WidgetError> {
        self.pump();
        let control = self.ready_control()?;
        let outcome = AssertUnwindSafe(control.export_to_pdf())
            .catch_unwind()
            .await;
        self.operation_result("export", outcome)
    }

    fn ready_control(&mut self) -> Result<&mut Box<dyn WidgetControl>, WidgetError> {
        match &self.readiness {
            Readiness::Ready => {}
            Readiness::Destroyed => return Err(WidgetError::Destroyed),
            other => {
                return Err(WidgetError::NotReady {
                    readiness: other.as_str().to_string(),
                });
            }
        }
        self.control.as_mut().ok_or_else(|| WidgetError::NotReady {
            readiness: "ready without handle".to_string(),
        })
    }

    fn operation_result<T>(
        &self,
        operation: &str,
        outcome: Result<Result<T, String>, Box<dyn Any + Send>>,
    ) -> Result<T, WidgetError> {
        let detail = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(detail)) => detail,
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        tracing::warn!(
            instance = self.instance,
            operation,
            detail = %detail,
            "Widget operation failed"
        );
        Err(WidgetError::OperationFailed {
            operation: operation.to_string(),
            detail,
        })
    }

    /// Release the widget and stop listening. Valid from any state.
    pub fn destroy(&mut self) {
        if self.readiness == Readiness::Destroyed {
            return;
        }
        self.release_control();
        self.bridge.unregister();
        self.events = None;
        self.set_readiness(Readiness::Destroyed);
    }

    /// Destroy the widget and hand the factory back for a fresh supervisor.
    pub fn into_factory(mut self) -> F {
        self.destroy();
        self.factory
    }

    fn release_control(&mut self) {
        if let Some(mut control) = self.control.take()
            && let Err(panic) =
                std::panic::catch_unwind(AssertUnwindSafe(|| control.release()))
        {
            tracing::warn!(
                instance = self.instance,
                detail = %panic_message(panic.as_ref()),
                "Widget release panicked"
            );
        }
    }

    fn set_readiness(&mut self, next: Readiness) {
        tracing::debug!(
            instance = self.instance,
            from = self.readiness.as_str(),
            to = next.as_str(),
            "Widget readiness transition"
        );
        self.readiness = next;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::widget::event::WidgetEventKind;
    use crate::widget::factory::EmbedConfig;
    use crate::widget::fakes::{Behavior, FakeFactory};

    fn request() -> WidgetRequest {
        WidgetRequest::new(EmbedConfig::from_config(&Config::for_tests()))
    }

    fn supervisor(
        factory: FakeFactory,
    ) -> (
        WidgetSupervisor<FakeFactory>,
        mpsc::UnboundedReceiver<HostSignal>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WidgetSupervisor::new(factory, Arc::new(tx)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<HostSignal>) -> Vec<HostSignal> {
        let mut signals = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            signals.push(signal);
        }
        signals
    }

    #[tokio::test]
    async fn loaded_makes_ready_and_later_error_is_only_an_event() {
        let (mut sup, mut rx) = supervisor(FakeFactory::succeeding());
        sup.initialize(request()).unwrap();
        assert_eq!(sup.readiness(), &Readiness::Initializing);

        let hooks = sup.factory().calls.latest_hooks();
        hooks.on_load();
        assert_eq!(sup.pump(), 1);
        assert_eq!(sup.readiness(), &Readiness::Ready);

        hooks.on_error("tile failed to render");
        hooks.emit(WidgetEvent::SelectionChanged(json!({"row": 4})));
        assert_eq!(sup.pump(), 2);
        assert_eq!(sup.readiness(), &Readiness::Ready);

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0], HostSignal::WidgetReady);
        match &signals[1] {
            HostSignal::WidgetEvent { kind, data, .. } => {
                assert_eq!(*kind, WidgetEventKind::Failed);
                assert_eq!(data["detail"], "tile failed to render");
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert!(matches!(
            signals[2],
            HostSignal::WidgetEvent {
                kind: WidgetEventKind::SelectionChanged,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn async_failure_while_initializing_errors() {
        let (mut sup, mut rx) = supervisor(FakeFactory::succeeding());
        sup.initialize(request()).unwrap();
        sup.factory().calls.latest_hooks().on_error("401 from library");
        sup.pump();

        assert_eq!(
            sup.readiness(),
            &Readiness::Errored("401 from library".to_string())
        );
        assert_eq!(sup.factory().calls.release_count(), 1);
        assert_eq!(
            drain(&mut rx),
            vec![HostSignal::WidgetError {
                detail: "401 from library".to_string()
            }]
        );
    }

    #[test]
    fn synchronous_failure_and_retry_reuse_request() {
        let factory = FakeFactory::scripted([Behavior::Fail("embeddinglib.js missing".to_string())]);
        let (mut sup, mut rx) = supervisor(factory);

        let err = sup.initialize(request()).unwrap_err();
        assert_eq!(
            err,
            WidgetError::InitFailed {
                detail: "embeddinglib.js missing".to_string()
            }
        );
        assert!(matches!(sup.readiness(), Readiness::Errored(_)));
        assert_eq!(sup.bridge().active_instance(), None);
        assert_eq!(drain(&mut rx).len(), 1);

        sup.retry().unwrap();
        assert_eq!(sup.readiness(), &Readiness::Initializing);
        assert_eq!(sup.instance(), 2);
        assert_eq!(sup.bridge().active_instance(), Some(2));

        let calls = &sup.factory().calls;
        let creates = calls.creates.lock().unwrap();
        assert_eq!(creates.len(), 2);
        assert_eq!(creates[0], creates[1]);
    }

    #[test]
    fn factory_panic_degrades_to_errored() {
        let (mut sup, _rx) = supervisor(FakeFactory::scripted([Behavior::Panic]));
        let err = sup.initialize(request()).unwrap_err();
        match err {
            WidgetError::InitFailed { detail } => {
                assert!(detail.contains("embedding library not loaded"), "{detail}")
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(sup.readiness(), Readiness::Errored(_)));
    }

    #[test]
    fn retry_only_from_errored_and_initialize_only_once() {
        let (mut sup, _rx) = supervisor(FakeFactory::succeeding());
        assert!(matches!(
            sup.retry(),
            Err(WidgetError::InvalidTransition { .. })
        ));
        sup.initialize(request()).unwrap();
        assert!(matches!(
            sup.initialize(request()),
            Err(WidgetError::InvalidTransition { .. })
        ));
        assert!(matches!(
            sup.retry(),
            Err(WidgetError::InvalidTransition { .. })
        ));
        assert_eq!(sup.factory().calls.create_count(), 1);
    }

    #[tokio::test]
    async fn stale_hooks_after_retry_do_not_touch_new_instance() {
        let factory = FakeFactory::scripted([Behavior::Succeed, Behavior::Succeed]);
        let (mut sup, _rx) = supervisor(factory);
        sup.initialize(request()).unwrap();
        let first = sup.factory().calls.latest_hooks();
        first.on_error("network");
        sup.pump();
        sup.retry().unwrap();

        assert!(!first.on_load());
        assert_eq!(sup.pump(), 0);
        assert_eq!(sup.readiness(), &Readiness::Initializing);

        sup.factory().calls.latest_hooks().on_load();
        sup.pump();
        assert!(sup.is_ready());
    }

    #[tokio::test]
    async fn operations_never_reach_handle_unless_ready() {
        let (mut sup, _rx) = supervisor(FakeFactory::succeeding());
        assert!(matches!(
            sup.refresh().await,
            Err(WidgetError::NotReady { .. })
        ));

        sup.initialize(request()).unwrap();
        assert_eq!(
            sup.export_document().await.unwrap_err(),
            WidgetError::NotReady {
                readiness: "initializing".to_string()
            }
        );
        assert_eq!(sup.factory().calls.refresh_count(), 0);
        assert_eq!(sup.factory().calls.export_count(), 0);

        sup.factory().calls.latest_hooks().on_load();
        sup.refresh().await.unwrap();
        let document = sup.export_document().await.unwrap();
        assert_eq!(document.content_type, "application/pdf");
        assert_eq!(sup.factory().calls.refresh_count(), 1);
        assert_eq!(sup.factory().calls.export_count(), 1);
    }

    #[tokio::test]
    async fn operation_failures_keep_readiness() {
        for behavior in [Behavior::Fail("HTTP 500".to_string()), Behavior::Panic] {
            let factory = FakeFactory::succeeding().with_operations(behavior);
            let (mut sup, _rx) = supervisor(factory);
            sup.initialize(request()).unwrap();
            sup.factory().calls.latest_hooks().on_load();
            sup.pump();

            let err = sup.refresh().await.unwrap_err();
            assert!(matches!(
                err,
                WidgetError::OperationFailed { ref operation, .. } if operation == "refresh"
            ));
            assert!(sup.is_ready());
        }
    }

    #[tokio::test]
    async fn destroy_releases_once_and_is_terminal() {
        let (mut sup, mut rx) = supervisor(FakeFactory::succeeding());
        sup.initialize(request()).unwrap();
        let hooks = sup.factory().calls.latest_hooks();
        hooks.on_load();
        sup.pump();
        drain(&mut rx);

        sup.destroy();
        sup.destroy();
        assert_eq!(sup.readiness(), &Readiness::Destroyed);
        assert_eq!(sup.factory().calls.release_count(), 1);

        assert!(!hooks.emit(WidgetEvent::DataChanged(json!({}))));
        assert_eq!(sup.refresh().await.unwrap_err(), WidgetError::Destroyed);
        assert_eq!(sup.retry().unwrap_err(), WidgetError::Destroyed);
        assert_eq!(sup.initialize(request()).unwrap_err(), WidgetError::Destroyed);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn destroy_from_uninitialized_is_allowed() {
        let (mut sup, _rx) = supervisor(FakeFactory::succeeding());
        sup.destroy();
        assert_eq!(sup.readiness(), &Readiness::Destroyed);
        assert_eq!(sup.factory().calls.create_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_settled_follows_async_load() {
        let (mut sup, _rx) = supervisor(FakeFactory::succeeding());
        sup.initialize(request()).unwrap();
        let hooks = sup.factory().calls.latest_hooks();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            hooks.emit(WidgetEvent::PageChanged(json!({"page": 1})));
            hooks.on_load();
        });

        assert_eq!(sup.wait_settled(Duration::from_secs(5)).await, &Readiness::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_settled_gives_up_after_timeout() {
        let (mut sup, _rx) = supervisor(FakeFactory::succeeding());
        sup.initialize(request()).unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(
            sup.wait_settled(Duration::from_secs(2)).await,
            &Readiness::Initializing
        );
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
