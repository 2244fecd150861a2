//! Process-local view state driven by host signals.

use chrono::{DateTime, Utc};

use crate::auth::session::FailureReason;
use crate::error::HostError;
use crate::host::signal::{AuthStatus, HostSignal};
use crate::widget::event::WidgetEventKind;

const TIMED_OUT_NOTICE: &str =
    "The login window was open too long. Please try logging in again.";

/// What the embedded dashboard area should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetView {
    Loading,
    Live,
    Unavailable { detail: String },
}

/// What the host should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostView {
    Login { notice: Option<String> },
    Dashboard { widget: WidgetView, demo: bool },
}

/// Authenticated / dashboard-visible flags plus what the widget last said.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAuthState {
    authenticated: bool,
    demo: bool,
    widget: Option<WidgetView>,
    notice: Option<String>,
    events_seen: u64,
    last_event: Option<(WidgetEventKind, DateTime<Utc>)>,
}

impl HostAuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_dashboard_visible(&self) -> bool {
        self.authenticated && self.widget.is_some()
    }

    pub fn is_demo(&self) -> bool {
        self.demo
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    pub fn last_event(&self) -> Option<(WidgetEventKind, DateTime<Utc>)> {
        self.last_event
    }

    /// Fold one signal into the state.
    pub fn apply_signal(&mut self, signal: &HostSignal) {
        match signal {
            HostSignal::AuthResult {
                status: AuthStatus::Succeeded,
                ..
            } => {
                self.authenticated = true;
                self.notice = None;
                self.widget = Some(WidgetView::Loading);
            }
            HostSignal::AuthResult {
                status: AuthStatus::Failed,
                reason,
                cause,
            } => {
                self.authenticated = false;
                self.widget = None;
                self.notice = Some(
                    reason
                        .as_deref()
                        .and_then(|code| FailureReason::from_code(code, cause.as_deref()))
                        .map(|failure| failure.user_message().to_string())
                        .unwrap_or_else(|| "Login failed. Please try again.".to_string()),
                );
            }
            HostSignal::AuthResult {
                status: AuthStatus::TimedOut,
                ..
            } => {
                self.authenticated = false;
                self.widget = None;
                self.notice = Some(TIMED_OUT_NOTICE.to_string());
            }
            HostSignal::WidgetReady => {
                if self.authenticated {
                    self.widget = Some(WidgetView::Live);
                }
            }
            HostSignal::WidgetError { detail } => {
                if self.authenticated {
                    self.widget = Some(WidgetView::Unavailable {
                        detail: detail.clone(),
                    });
                }
            }
            HostSignal::WidgetEvent {
                kind, timestamp, ..
            } => {
                self.events_seen += 1;
                self.last_event = Some((*kind, *timestamp));
            }
        }
    }

    /// Skip authentication entirely. Refused unless demo mode is allowed.
    pub fn enter_demo_mode(&mut self, allowed: bool) -> Result<(), HostError> {
        if !allowed {
            return Err(HostError::DemoModeDisabled);
        }
        tracing::warn!("Entering demo mode without authentication");
        self.authenticated = true;
        self.demo = true;
        self.notice = None;
        self.widget = Some(WidgetView::Loading);
        Ok(())
    }

    /// The widget is being recreated; show it as loading again.
    pub fn mark_widget_loading(&mut self) {
        if self.authenticated {
            self.widget = Some(WidgetView::Loading);
        }
    }

    pub fn logout(&mut self) {
        *self = Self::default();
    }

    pub fn view(&self) -> HostView {
        match (&self.widget, self.authenticated) {
            (Some(widget), true) => HostView::Dashboard {
                widget: widget.clone(),
                demo: self.demo,
            },
            _ => HostView::Login {
                notice: self.notice.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn auth(status: AuthStatus, reason: Option<&str>) -> HostSignal {
        HostSignal::AuthResult {
            status,
            reason: reason.map(str::to_string),
            cause: None,
        }
    }

    #[test]
    fn success_then_widget_ready_shows_live_dashboard() {
        let mut state = HostAuthState::new();
        assert_eq!(state.view(), HostView::Login { notice: None });

        state.apply_signal(&auth(AuthStatus::Succeeded, None));
        assert_eq!(
            state.view(),
            HostView::Dashboard {
                widget: WidgetView::Loading,
                demo: false
            }
        );

        state.apply_signal(&HostSignal::WidgetReady);
        assert!(state.is_dashboard_visible());
        assert_eq!(
            state.view(),
            HostView::Dashboard {
                widget: WidgetView::Live,
                demo: false
            }
        );
    }

    #[test]
    fn failures_stay_on_login_with_notice() {
        let mut state = HostAuthState::new();
        state.apply_signal(&auth(AuthStatus::Failed, Some("not-authenticated")));
        assert_eq!(
            state.view(),
            HostView::Login {
                notice: Some(FailureReason::NotAuthenticated.user_message().to_string())
            }
        );

        state.apply_signal(&auth(AuthStatus::TimedOut, None));
        assert_eq!(
            state.view(),
            HostView::Login {
                notice: Some(TIMED_OUT_NOTICE.to_string())
            }
        );
        state.apply_signal(&HostSignal::WidgetReady);
        assert!(!state.is_dashboard_visible());
    }

    #[test]
    fn widget_error_marks_dashboard_unavailable() {
        let mut state = HostAuthState::new();
        state.apply_signal(&auth(AuthStatus::Succeeded, None));
        state.apply_signal(&HostSignal::WidgetError {
            detail: "embeddinglib.js missing".to_string(),
        });
        assert_eq!(
            state.view(),
            HostView::Dashboard {
                widget: WidgetView::Unavailable {
                    detail: "embeddinglib.js missing".to_string()
                },
                demo: false
            }
        );
    }

    #[test]
    fn mark_widget_loading_only_applies_when_authenticated() {
        let mut state = HostAuthState::new();
        state.mark_widget_loading();
        assert_eq!(state.view(), HostView::Login { notice: None });

        state.apply_signal(&auth(AuthStatus::Succeeded, None));
        state.apply_signal(&HostSignal::WidgetError {
            detail: "timeout".to_string(),
        });
        state.mark_widget_loading();
        assert_eq!(
            state.view(),
            HostView::Dashboard {
                widget: WidgetView::Loading,
                demo: false
            }
        );
    }

    #[test]
    fn widget_events_are_counted() {
        let mut state = HostAuthState::new();
        let timestamp = Utc::now();
        state.apply_signal(&HostSignal::WidgetEvent {
            kind: WidgetEventKind::DrilledUp,
            data: serde_json::Value::Null,
            timestamp,
        });
        assert_eq!(state.events_seen(), 1);
        assert_eq!(state.last_event(), Some((WidgetEventKind::DrilledUp, timestamp)));
    }

    #[test]
    fn demo_mode_requires_permission_and_logout_resets() {
        let mut state = HostAuthState::new();
        assert!(matches!(
            state.enter_demo_mode(false),
            Err(HostError::DemoModeDisabled)
        ));
        assert!(!state.is_authenticated());

        state.enter_demo_mode(true).unwrap();
        assert!(state.is_demo());
        assert!(state.is_dashboard_visible());

        state.logout();
        assert_eq!(state, HostAuthState::default());
        assert_eq!(state.view(), HostView::Login { notice: None });
    }
}
