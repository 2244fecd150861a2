//! Configuration for embedgate.
//!
//! Settings are loaded with priority: env var > TOML config file > default.
//! `./.env` and `~/.embedgate/.env` are loaded via dotenvy before resolving.

pub(crate) mod helpers;

use std::path::Path;
use std::time::Duration;

use crate::auth::popup::PopupSize;
use crate::error::ConfigError;
use crate::settings::Settings;
use crate::widget::factory::NavigationOptions;

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub library: LibraryConfig,
    pub handshake: HandshakeConfig,
    pub probe: ProbeConfig,
    pub widget: WidgetConfig,
    pub host: HostConfig,
}

/// Kind of library object the widget renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryType {
    Document,
    Dossier,
}

impl LibraryType {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(Self::Document),
            "dossier" => Ok(Self::Dossier),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'document' or 'dossier', got '{value}'"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Dossier => "dossier",
        }
    }
}

/// Remote analytics library coordinates.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub base_url: String,
    pub library_url: String,
    pub project_id: String,
    pub object_id: String,
    pub library_type: LibraryType,
}

impl LibraryConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let base_url = helpers::optional_env("EMBEDGATE_BASE_URL")?
            .unwrap_or_else(|| settings.library.base_url.clone());
        validate_url("EMBEDGATE_BASE_URL", &base_url)?;

        let library_url = helpers::optional_env("EMBEDGATE_LIBRARY_URL")?
            .unwrap_or_else(|| settings.library.library_url.clone());
        validate_url("EMBEDGATE_LIBRARY_URL", &library_url)?;

        let project_id = helpers::optional_env("EMBEDGATE_PROJECT_ID")?
            .unwrap_or_else(|| settings.library.project_id.clone());
        let object_id = helpers::optional_env("EMBEDGATE_OBJECT_ID")?
            .unwrap_or_else(|| settings.library.object_id.clone());
        for (key, value) in [
            ("EMBEDGATE_PROJECT_ID", &project_id),
            ("EMBEDGATE_OBJECT_ID", &object_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: key.to_string(),
                    hint: "Set it in the environment or in config.toml under [library]."
                        .to_string(),
                });
            }
        }

        let library_type = LibraryType::parse(
            &helpers::optional_env("EMBEDGATE_LIBRARY_TYPE")?
                .unwrap_or_else(|| settings.library.library_type.clone()),
            "EMBEDGATE_LIBRARY_TYPE",
        )?;

        Ok(Self {
            base_url: trim_trailing_slash(&base_url),
            library_url: trim_trailing_slash(&library_url),
            project_id,
            object_id,
            library_type,
        })
    }

    /// URL of the interactive login page opened in the popup.
    pub fn login_url(&self) -> String {
        format!("{}/#/login", self.library_url)
    }
}

/// Popup polling and verification timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub poll_interval: Duration,
    pub max_ticks: u32,
    pub settle_delay: Duration,
    pub popup_size: PopupSize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_ticks: 300,
            settle_delay: Duration::from_secs(1),
            popup_size: PopupSize {
                width: 600,
                height: 700,
            },
        }
    }
}

impl HandshakeConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let poll_interval_ms = helpers::parse_optional_env::<u64>(
            "EMBEDGATE_POLL_INTERVAL_MS",
            "a positive integer",
        )?
        .unwrap_or(settings.handshake.poll_interval_ms);
        helpers::require_positive("EMBEDGATE_POLL_INTERVAL_MS", poll_interval_ms)?;

        let max_ticks =
            helpers::parse_optional_env::<u32>("EMBEDGATE_MAX_TICKS", "a positive integer")?
                .unwrap_or(settings.handshake.max_ticks);
        helpers::require_positive("EMBEDGATE_MAX_TICKS", u64::from(max_ticks))?;

        // Zero is allowed: it disables the settle wait.
        let settle_delay_ms = helpers::parse_optional_env::<u64>(
            "EMBEDGATE_SETTLE_DELAY_MS",
            "a non-negative integer",
        )?
        .unwrap_or(settings.handshake.settle_delay_ms);

        if settings.handshake.popup_width == 0 || settings.handshake.popup_height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "handshake.popup_width/popup_height".to_string(),
                message: "popup dimensions must be > 0".to_string(),
            });
        }

        Ok(Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_ticks,
            settle_delay: Duration::from_millis(settle_delay_ms),
            popup_size: PopupSize {
                width: settings.handshake.popup_width,
                height: settings.handshake.popup_height,
            },
        })
    }
}

/// Session probe endpoint and timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub sessions_url: String,
    pub timeout: Duration,
}

impl ProbeConfig {
    /// Probe config pointing at `<library_url>/api/sessions`.
    pub fn for_library(library_url: &str) -> Self {
        Self {
            sessions_url: format!("{}/api/sessions", trim_trailing_slash(library_url)),
            timeout: Duration::from_secs(10),
        }
    }

    pub(crate) fn resolve(settings: &Settings, library: &LibraryConfig) -> Result<Self, ConfigError> {
        let timeout_ms = helpers::parse_optional_env::<u64>(
            "EMBEDGATE_PROBE_TIMEOUT_MS",
            "a positive integer",
        )?
        .unwrap_or(settings.probe.timeout_ms);
        helpers::require_positive("EMBEDGATE_PROBE_TIMEOUT_MS", timeout_ms)?;

        let path = settings.probe.sessions_path.trim();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Ok(Self {
            sessions_url: format!("{}{}", library.library_url, path),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Widget presentation options.
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub enable_responsive: bool,
    pub navigation: NavigationOptions,
    pub font_family: String,
    pub placeholder: String,
}

impl WidgetConfig {
    pub(crate) fn resolve(settings: &Settings) -> Self {
        Self {
            enable_responsive: settings.widget.enable_responsive,
            navigation: NavigationOptions {
                enabled: settings.widget.navigation_bar,
                goto_library: settings.widget.goto_library,
                title: settings.widget.show_title,
            },
            font_family: settings.widget.font_family.clone(),
            placeholder: settings.widget.placeholder.clone(),
        }
    }
}

/// Host application behaviour.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub allow_demo_mode: bool,
}

impl HostConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            allow_demo_mode: helpers::parse_bool_env("EMBEDGATE_ALLOW_DEMO_MODE")?
                .unwrap_or(settings.host.allow_demo_mode),
        })
    }
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("not a valid URL: {e}"),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an http(s) URL, got scheme '{}'", parsed.scheme()),
        });
    }
    Ok(())
}

fn trim_trailing_slash(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

impl Config {
    /// Load configuration from env vars with an optional TOML overlay.
    ///
    /// If `toml_path` is `Some`, that file must exist and parse. Otherwise
    /// `~/.embedgate/config.toml` is tried and a missing file is ignored.
    pub fn load(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        crate::bootstrap::load_embedgate_env();
        let settings = Self::load_settings(toml_path)?;
        Self::from_settings(&settings)
    }

    /// Resolve settings into config, applying env var overrides.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let library = LibraryConfig::resolve(settings)?;
        let probe = ProbeConfig::resolve(settings, &library)?;
        Ok(Self {
            handshake: HandshakeConfig::resolve(settings)?,
            probe,
            widget: WidgetConfig::resolve(settings),
            host: HostConfig::resolve(settings)?,
            library,
        })
    }

    /// Env-independent config with the documented defaults, for tests.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let library = LibraryConfig {
            base_url: "https://tutorial.microstrategy.com".to_string(),
            library_url: "https://tutorial.microstrategy.com/MicroStrategyLibrary".to_string(),
            project_id: "B7CA92F04B9FAE8D941C3E9B7E0CD754".to_string(),
            object_id: "152C22B1284EF1253585CA9B0FEE89E9".to_string(),
            library_type: LibraryType::Document,
        };
        Self {
            handshake: HandshakeConfig::default(),
            probe: ProbeConfig::for_library(&library.library_url),
            widget: WidgetConfig::resolve(&Settings::default()),
            host: HostConfig::default(),
            library,
        }
    }

    fn load_settings(explicit_path: Option<&Path>) -> Result<Settings, ConfigError> {
        let path = explicit_path
            .map(std::path::PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(settings)) => {
                tracing::debug!("Loaded TOML config from {}", path.display());
                Ok(settings)
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Ok(Settings::default())
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
                Ok(Settings::default())
            }
        }
    }
}
