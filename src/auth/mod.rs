//! Single-sign-on handshake: login popup, session probe and the state
//! machine tying them together.

pub mod handshake;
pub mod popup;
pub mod probe;
pub mod session;

pub use handshake::{HandshakeOrchestrator, HandshakeState, LoginRequest, is_return_location};
pub use popup::{
    BrowserTabPopup, LoginConfirmation, PopupController, PopupGeometry, PopupHandle, PopupSize,
    Viewport,
};
pub use probe::{
    AUTH_TOKEN_COOKIE, HttpSessionProbe, ProbeFailure, ProbeFailureKind, ProbeOutcome,
    SessionProbe,
};
pub use session::{AuthSession, AuthState, FailureReason};
