//! Login handshake state machine.
//!
//! ```text
//! Idle -> AwaitingPopup -> Polling -> Verifying -> Succeeded
//!   |                         |                 -> Failed
//!   +-> Failed (blocked)      +-> TimedOut
//! ```
//!
//! The orchestrator opens the login popup, polls it on a fixed interval,
//! and once the popup is done (closed, or visibly back on the library root)
//! asks the [`SessionProbe`] whether the user is really logged in. The
//! probe is the only source of truth; popup observations just decide when
//! to ask. Every terminal state emits exactly one `AUTH_RESULT`.
//!
//! Calls into the popup and the probe run under `catch_unwind`. A panic
//! while opening counts as a blocked popup, a panicking `is_closed` reads
//! as closed, a panicking `peek_location` as `None`, and a panicking probe
//! as an indeterminate check.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::auth::popup::{PopupController, PopupHandle, Viewport};
use crate::auth::probe::{ProbeFailure, ProbeFailureKind, ProbeOutcome, SessionProbe};
use crate::auth::session::{AuthSession, AuthState, FailureReason};
use crate::config::{HandshakeConfig, LibraryConfig};
use crate::error::{HandshakeError, panic_message};
use crate::host::signal::{AuthStatus, HostSignal, HostSink};

/// Where the orchestrator is in a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingPopup,
    Polling { tick: u32 },
    Verifying,
    Succeeded,
    Failed(FailureReason),
    TimedOut,
}

impl HandshakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingPopup => "awaiting_popup",
            Self::Polling { .. } => "polling",
            Self::Verifying => "verifying",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::TimedOut)
    }
}

/// What to open and what "back home" looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub login_url: String,
    pub library_root: String,
    pub viewport: Viewport,
}

impl LoginRequest {
    pub fn for_library(library: &LibraryConfig, viewport: Viewport) -> Self {
        Self {
            login_url: library.login_url(),
            library_root: library.library_url.clone(),
            viewport,
        }
    }
}

/// Heuristic: the popup navigated back to the library root and is no
/// longer on a login or auth page.
///
/// Only a hint that it is worth asking the session probe early.
pub fn is_return_location(location: &str, library_root: &str) -> bool {
    let root = library_root.trim_end_matches('/');
    let Some(rest) = location.strip_prefix(root) else {
        return false;
    };
    if !(rest.is_empty() || rest.starts_with(['/', '#', '?'])) {
        return false;
    }
    let rest = rest.to_ascii_lowercase();
    !rest.contains("login") && !rest.contains("auth")
}

enum PollExit {
    Verify,
    TimedOut,
}

/// Drives one login attempt at a time against a popup and a session probe.
pub struct HandshakeOrchestrator<P, S> {
    popup: P,
    probe: S,
    config: HandshakeConfig,
    sink: Arc<dyn HostSink>,
    state: HandshakeState,
    session: AuthSession,
    history: Vec<HandshakeState>,
    handle: Option<PopupHandle>,
    ticks: u32,
    attempt_id: Uuid,
}

impl<P, S> HandshakeOrchestrator<P, S>
where
    P: PopupController,
    S: SessionProbe,
{
    pub fn new(popup: P, probe: S, config: HandshakeConfig, sink: Arc<dyn HostSink>) -> Self {
        Self {
            popup,
            probe,
            config,
            sink,
            state: HandshakeState::Idle,
            session: AuthSession::new(),
            history: vec![HandshakeState::Idle],
            handle: None,
            ticks: 0,
            attempt_id: Uuid::new_v4(),
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Every state entered since the last reset, starting with `Idle`.
    pub fn history(&self) -> &[HandshakeState] {
        &self.history
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn popup(&self) -> &P {
        &self.popup
    }

    pub fn probe(&self) -> &S {
        &self.probe
    }

    /// Run a full login attempt and return the terminal state.
    ///
    /// Only valid from `Idle`. Dropping the returned future mid-attempt
    /// leaves the orchestrator non-idle; call [`Self::reset`] before the
    /// next attempt.
    pub async fn run(&mut self, request: LoginRequest) -> Result<HandshakeState, HandshakeError> {
        self.ensure_idle()?;
        self.attempt_id = Uuid::new_v4();
        self.ticks = 0;
        self.session.begin();
        tracing::info!(
            attempt_id = %self.attempt_id,
            login_url = %request.login_url,
            "Starting login handshake"
        );

        let handle = match self.open_popup(&request) {
            Ok(handle) => handle,
            Err(detail) => {
                tracing::warn!(attempt_id = %self.attempt_id, error = %detail, "Login popup blocked");
                self.finish(HandshakeState::Failed(FailureReason::PopupBlocked { detail }));
                return Ok(self.state.clone());
            }
        };
        self.handle = Some(handle);
        self.transition(HandshakeState::AwaitingPopup);
        self.transition(HandshakeState::Polling { tick: 0 });

        let exit = {
            let mut poll = tokio::time::interval(self.config.poll_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            poll.tick().await;
            loop {
                poll.tick().await;
                if let Some(exit) = self.tick(&request.library_root) {
                    break exit;
                }
            }
        };

        match exit {
            PollExit::Verify => self.verify().await,
            PollExit::TimedOut => {
                tracing::warn!(
                    attempt_id = %self.attempt_id,
                    ticks = self.ticks,
                    "Login popup did not finish in time"
                );
                self.finish(HandshakeState::TimedOut);
            }
        }
        Ok(self.state.clone())
    }

    /// Ask the probe directly, for a user who logged in some other way.
    ///
    /// From `Idle` only. An authenticated session completes the handshake
    /// as `Succeeded`; any other outcome leaves it `Idle`.
    pub async fn check_existing_session(&mut self) -> Result<ProbeOutcome, HandshakeError> {
        self.ensure_idle()?;
        let outcome = self.check_session().await;
        self.session.record_check();
        tracing::info!(outcome = outcome.as_str(), "Manual session check");

        if outcome == ProbeOutcome::Authenticated {
            self.session.begin();
            self.finish(HandshakeState::Succeeded);
        }
        Ok(outcome)
    }

    /// Return to `Idle` with a fresh session, closing any popup still held.
    pub fn reset(&mut self) {
        self.close_popup();
        self.state = HandshakeState::Idle;
        self.history = vec![HandshakeState::Idle];
        self.session.reset();
        self.ticks = 0;
        tracing::debug!(attempt_id = %self.attempt_id, "Handshake reset");
    }

    fn ensure_idle(&self) -> Result<(), HandshakeError> {
        match &self.state {
            HandshakeState::Idle => Ok(()),
            state if state.is_terminal() => Err(HandshakeError::Terminal {
                state: state.as_str().to_string(),
            }),
            state => Err(HandshakeError::AlreadyRunning {
                state: state.as_str().to_string(),
            }),
        }
    }

    fn open_popup(&mut self, request: &LoginRequest) -> Result<PopupHandle, String> {
        let popup = &mut self.popup;
        let size = self.config.popup_size;
        match std::panic::catch_unwind(AssertUnwindSafe(|| {
            popup.open(&request.login_url, request.viewport, size)
        })) {
            Ok(opened) => opened.map_err(|e| e.to_string()),
            Err(panic) => Err(format!(
                "login popup panicked while opening: {}",
                panic_message(panic.as_ref())
            )),
        }
    }

    fn popup_closed(&self, handle: &PopupHandle) -> bool {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.popup.is_closed(handle)))
            .unwrap_or_else(|panic| {
                tracing::warn!(
                    attempt_id = %self.attempt_id,
                    detail = %panic_message(panic.as_ref()),
                    "Popup close check panicked; treating popup as closed"
                );
                true
            })
    }

    fn popup_location(&self, handle: &PopupHandle) -> Option<String> {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.popup.peek_location(handle)))
            .unwrap_or_else(|panic| {
                tracing::debug!(
                    attempt_id = %self.attempt_id,
                    detail = %panic_message(panic.as_ref()),
                    "Popup location read panicked"
                );
                None
            })
    }

    async fn check_session(&self) -> ProbeOutcome {
        match AssertUnwindSafe(self.probe.check()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::warn!(attempt_id = %self.attempt_id, detail = %detail, "Session probe panicked");
                ProbeOutcome::Indeterminate {
                    cause: ProbeFailure {
                        kind: ProbeFailureKind::Panicked,
                        detail,
                        http_status: None,
                    },
                }
            }
        }
    }

    fn tick(&mut self, library_root: &str) -> Option<PollExit> {
        self.ticks += 1;
        let Some(handle) = self.handle.as_ref() else {
            return Some(PollExit::Verify);
        };

        if self.popup_closed(handle) {
            tracing::debug!(attempt_id = %self.attempt_id, tick = self.ticks, "Login popup closed");
            return Some(PollExit::Verify);
        }

        if let Some(location) = self.popup_location(handle)
            && is_return_location(&location, library_root)
        {
            tracing::debug!(
                attempt_id = %self.attempt_id,
                tick = self.ticks,
                location = %location,
                "Login popup returned to library root"
            );
            self.close_popup();
            return Some(PollExit::Verify);
        }

        if self.ticks >= self.config.max_ticks {
            self.close_popup();
            return Some(PollExit::TimedOut);
        }

        self.transition(HandshakeState::Polling { tick: self.ticks });
        None
    }

    async fn verify(&mut self) {
        self.transition(HandshakeState::Verifying);
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let outcome = self.check_session().await;
        self.session.record_check();
        let terminal = match outcome {
            ProbeOutcome::Authenticated => HandshakeState::Succeeded,
            ProbeOutcome::Unauthenticated => {
                HandshakeState::Failed(FailureReason::NotAuthenticated)
            }
            ProbeOutcome::Indeterminate { cause } => {
                HandshakeState::Failed(FailureReason::VerificationError {
                    cause: cause.to_string(),
                })
            }
        };
        self.finish(terminal);
    }

    fn finish(&mut self, terminal: HandshakeState) {
        self.close_popup();

        let (auth_state, status) = match &terminal {
            HandshakeState::Succeeded => (AuthState::Authenticated, AuthStatus::Succeeded),
            HandshakeState::Failed(reason) => (
                AuthState::Failed {
                    failure: reason.clone(),
                },
                AuthStatus::Failed,
            ),
            HandshakeState::TimedOut => (AuthState::TimedOut, AuthStatus::TimedOut),
            other => {
                tracing::warn!(state = other.as_str(), "Refusing to finish in a non-terminal state");
                return;
            }
        };
        if !self.session.finish(auth_state) {
            return;
        }

        let (reason, cause) = match &terminal {
            HandshakeState::Failed(reason) => (
                Some(reason.as_str().to_string()),
                reason.cause().map(str::to_string),
            ),
            _ => (None, None),
        };
        tracing::info!(
            attempt_id = %self.attempt_id,
            state = terminal.as_str(),
            reason = reason.as_deref().unwrap_or(""),
            ticks = self.ticks,
            "Login handshake finished"
        );
        self.transition(terminal);
        self.sink.deliver(HostSignal::AuthResult {
            status,
            reason,
            cause,
        });
    }

    fn transition(&mut self, next: HandshakeState) {
        tracing::debug!(
            attempt_id = %self.attempt_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "Handshake transition"
        );
        self.state = next.clone();
        self.history.push(next);
    }

    fn close_popup(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.popup.close(&handle);
        }
    }
}
