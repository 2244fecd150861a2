//! Login surface control.
//!
//! A [`PopupController`] opens the identity provider's login page in a
//! separate browsing context and answers two questions about it while the
//! handshake polls: is it closed, and (if the platform lets us see it) where
//! is it now. Neither question may fail; an unreadable location is `None`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PopupError;

/// Requested popup dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupSize {
    pub width: u32,
    pub height: u32,
}

/// The caller's window, used to centre the popup over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            left: 0,
            top: 0,
        }
    }
}

/// Absolute placement of a popup on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupGeometry {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl PopupGeometry {
    /// Centre `size` over `viewport`. A popup larger than the viewport is
    /// pinned to the viewport's top-left corner rather than pushed off it.
    pub fn centered(viewport: Viewport, size: PopupSize) -> Self {
        let offset = |outer: u32, inner: u32| -> i32 {
            i32::try_from(outer.saturating_sub(inner) / 2).unwrap_or(i32::MAX)
        };
        Self {
            width: size.width,
            height: size.height,
            left: viewport.left.saturating_add(offset(viewport.width, size.width)),
            top: viewport.top.saturating_add(offset(viewport.height, size.height)),
        }
    }

    /// Window feature string in the form browsers accept for `window.open`.
    pub fn features(&self) -> String {
        format!(
            "width={},height={},left={},top={}",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Opaque reference to one opened browsing context.
///
/// Not `Clone`: only the holder closes the popup.
#[derive(Debug, PartialEq, Eq)]
pub struct PopupHandle(u64);

impl PopupHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Platform seam for the external login surface.
pub trait PopupController: Send {
    /// Ask the platform for a new browsing context at `geometry`.
    fn request_context(
        &mut self,
        url: &str,
        geometry: PopupGeometry,
    ) -> Result<PopupHandle, PopupError>;

    /// Open `url` in a popup of `size` centred over `viewport`.
    fn open(
        &mut self,
        url: &str,
        viewport: Viewport,
        size: PopupSize,
    ) -> Result<PopupHandle, PopupError> {
        let geometry = PopupGeometry::centered(viewport, size);
        tracing::debug!(url, features = %geometry.features(), "Opening login popup");
        self.request_context(url, geometry)
    }

    fn is_closed(&self, handle: &PopupHandle) -> bool;

    /// Current location if readable. Cross-origin pages read as `None`.
    fn peek_location(&self, handle: &PopupHandle) -> Option<String>;

    /// Close the popup. Closing twice is a no-op.
    fn close(&mut self, handle: &PopupHandle);
}

type Opener = Box<dyn Fn(&str) -> std::io::Result<()> + Send>;

/// Login surface backed by the system browser.
///
/// A browser tab cannot be watched from outside, so "closed" means the user
/// confirmed they finished logging in (see [`BrowserTabPopup::confirmation`]).
/// The location is never readable.
pub struct BrowserTabPopup {
    opener: Opener,
    confirmed: Arc<AtomicBool>,
    next_id: u64,
    open_id: Option<u64>,
}

impl Default for BrowserTabPopup {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserTabPopup {
    pub fn new() -> Self {
        Self::with_opener(|url| open::that(url))
    }

    pub fn with_opener<F>(opener: F) -> Self
    where
        F: Fn(&str) -> std::io::Result<()> + Send + 'static,
    {
        Self {
            opener: Box::new(opener),
            confirmed: Arc::new(AtomicBool::new(false)),
            next_id: 1,
            open_id: None,
        }
    }

    /// Flag the caller sets once the user says the login is done.
    pub fn confirmation(&self) -> LoginConfirmation {
        LoginConfirmation(Arc::clone(&self.confirmed))
    }
}

/// Shared "user finished logging in" switch for [`BrowserTabPopup`].
#[derive(Debug, Clone)]
pub struct LoginConfirmation(Arc<AtomicBool>);

impl LoginConfirmation {
    pub fn confirm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_confirmed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl PopupController for BrowserTabPopup {
    fn request_context(
        &mut self,
        url: &str,
        _geometry: PopupGeometry,
    ) -> Result<PopupHandle, PopupError> {
        (self.opener)(url).map_err(|e| PopupError::Blocked {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        self.confirmed.store(false, Ordering::SeqCst);
        let id = self.next_id;
        self.next_id += 1;
        self.open_id = Some(id);
        tracing::info!(url, handle = id, "Opened login page in the system browser");
        Ok(PopupHandle::new(id))
    }

    fn is_closed(&self, handle: &PopupHandle) -> bool {
        self.open_id != Some(handle.raw()) || self.confirmed.load(Ordering::SeqCst)
    }

    fn peek_location(&self, _handle: &PopupHandle) -> Option<String> {
        None
    }

    fn close(&mut self, handle: &PopupHandle) {
        if self.open_id == Some(handle.raw()) {
            self.open_id = None;
            tracing::debug!(handle = handle.raw(), "Released browser login tab");
        }
    }
}
