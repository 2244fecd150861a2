//! embedgate: single-sign-on handshake orchestration and an embedded
//! analytics widget lifecycle bridge.
//!
//! The [`auth`] module opens the identity provider's login page, watches it
//! and confirms the result against the library's session endpoint. The
//! [`widget`] module supervises the embedded dashboard once the user is in,
//! and [`host`] folds both streams of signals into what the host renders.

pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod settings;
pub mod widget;

pub use config::Config;
pub use error::{Error, Result};
