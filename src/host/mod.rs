//! Host side: signals, the view state they drive, and [`DashboardHost`],
//! which wires the handshake and the widget supervisor together.
//!
//! Both components report through one internal channel. [`DashboardHost::drain`]
//! folds each signal into [`HostAuthState`] and then forwards it to the
//! outward sink, so the host never sees a signal before its state reflects it.

pub mod signal;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::auth::handshake::{HandshakeOrchestrator, HandshakeState, LoginRequest};
use crate::auth::popup::{PopupController, Viewport};
use crate::auth::probe::{ProbeOutcome, SessionProbe};
use crate::config::{Config, LibraryConfig};
use crate::error::{Result, WidgetError};
use crate::widget::factory::{EmbedConfig, ExportedDocument, WidgetFactory, WidgetRequest};
use crate::widget::supervisor::{Readiness, WidgetSupervisor};

pub use signal::{AuthStatus, HostSignal, HostSink, TracingSink};
pub use state::{HostAuthState, HostView, WidgetView};

pub struct DashboardHost<P, S, F> {
    orchestrator: HandshakeOrchestrator<P, S>,
    supervisor: Option<WidgetSupervisor<F>>,
    state: HostAuthState,
    signals_tx: mpsc::UnboundedSender<HostSignal>,
    signals: mpsc::UnboundedReceiver<HostSignal>,
    outbound: Arc<dyn HostSink>,
    library: LibraryConfig,
    embed: EmbedConfig,
    allow_demo_mode: bool,
}

impl<P, S, F> DashboardHost<P, S, F>
where
    P: PopupController,
    S: SessionProbe,
    F: WidgetFactory,
{
    pub fn new(popup: P, probe: S, factory: F, config: &Config, outbound: Arc<dyn HostSink>) -> Self {
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let orchestrator = HandshakeOrchestrator::new(
            popup,
            probe,
            config.handshake.clone(),
            Arc::new(signals_tx.clone()),
        );
        let supervisor = WidgetSupervisor::new(factory, Arc::new(signals_tx.clone()));
        Self {
            orchestrator,
            supervisor: Some(supervisor),
            state: HostAuthState::new(),
            signals_tx,
            signals,
            outbound,
            library: config.library.clone(),
            embed: EmbedConfig::from_config(config),
            allow_demo_mode: config.host.allow_demo_mode,
        }
    }

    pub fn state(&self) -> &HostAuthState {
        &self.state
    }

    pub fn view(&self) -> HostView {
        self.state.view()
    }

    pub fn orchestrator(&self) -> &HandshakeOrchestrator<P, S> {
        &self.orchestrator
    }

    pub fn readiness(&self) -> Readiness {
        self.supervisor
            .as_ref()
            .map(|s| s.readiness().clone())
            .unwrap_or(Readiness::Destroyed)
    }

    pub fn supervisor(&self) -> Option<&WidgetSupervisor<F>> {
        self.supervisor.as_ref()
    }

    /// Run the popup handshake and, on success, start the widget.
    ///
    /// A previous failed or timed-out attempt is cleared first; a
    /// succeeded one still requires [`Self::logout`].
    pub async fn login(&mut self, viewport: Viewport) -> Result<HandshakeState> {
        self.clear_failed_attempt();
        let request = LoginRequest::for_library(&self.library, viewport);
        let outcome = self.orchestrator.run(request).await?;
        self.drain();
        self.start_widget_if_authenticated();
        Ok(outcome)
    }

    /// Probe for a session established elsewhere (e.g. another tab).
    pub async fn check_existing_session(&mut self) -> Result<ProbeOutcome> {
        self.clear_failed_attempt();
        let outcome = self.orchestrator.check_existing_session().await?;
        self.drain();
        self.start_widget_if_authenticated();
        Ok(outcome)
    }

    fn clear_failed_attempt(&mut self) {
        if matches!(
            self.orchestrator.state(),
            HandshakeState::Failed(_) | HandshakeState::TimedOut
        ) {
            tracing::debug!(
                state = self.orchestrator.state().as_str(),
                "Clearing finished login attempt"
            );
            self.orchestrator.reset();
        }
    }

    pub fn enter_demo_mode(&mut self) -> Result<()> {
        self.state.enter_demo_mode(self.allow_demo_mode)?;
        self.start_widget();
        Ok(())
    }

    fn start_widget_if_authenticated(&mut self) {
        if self.state.is_authenticated() {
            self.start_widget();
        }
    }

    fn start_widget(&mut self) {
        let Some(supervisor) = self.supervisor.as_mut() else {
            return;
        };
        if let Err(e) = supervisor.initialize(WidgetRequest::new(self.embed.clone())) {
            // The supervisor already reported WIDGET_ERROR for init failures.
            tracing::debug!(error = %e, "Widget did not start");
        }
        self.drain();
    }

    /// Apply pending widget events and forward every queued signal.
    pub fn pump(&mut self) -> usize {
        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.pump();
        }
        self.drain()
    }

    pub async fn wait_for_widget(&mut self, timeout: Duration) -> Readiness {
        let readiness = match self.supervisor.as_mut() {
            Some(supervisor) => supervisor.wait_settled(timeout).await.clone(),
            None => Readiness::Destroyed,
        };
        self.drain();
        readiness
    }

    pub fn retry_widget(&mut self) -> Result<()> {
        let result = self.supervisor_mut()?.retry();
        if result.is_ok() {
            self.state.mark_widget_loading();
        }
        self.drain();
        Ok(result?)
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let result = self.supervisor_mut()?.refresh().await;
        self.drain();
        Ok(result?)
    }

    pub async fn export_document(&mut self) -> Result<ExportedDocument> {
        let result = self.supervisor_mut()?.export_document().await;
        self.drain();
        Ok(result?)
    }

    /// Tear down the widget, reset the handshake and return to the login view.
    pub fn logout(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            let factory = supervisor.into_factory();
            self.supervisor = Some(WidgetSupervisor::new(
                factory,
                Arc::new(self.signals_tx.clone()),
            ));
        }
        self.orchestrator.reset();
        self.drain();
        self.state.logout();
        tracing::info!("Logged out");
    }

    /// Fold queued signals into the state, then forward them outward.
    pub fn drain(&mut self) -> usize {
        let mut forwarded = 0;
        while let Ok(signal) = self.signals.try_recv() {
            self.state.apply_signal(&signal);
            self.outbound.deliver(signal);
            forwarded += 1;
        }
        forwarded
    }

    fn supervisor_mut(&mut self) -> std::result::Result<&mut WidgetSupervisor<F>, WidgetError> {
        self.supervisor.as_mut().ok_or(WidgetError::Destroyed)
    }
}
