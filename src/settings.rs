//! User settings persistence.
//!
//! Stores user preferences in ~/.embedgate/config.toml.
//! Settings are loaded with env var > config.toml > default priority.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings persisted to disk, grouped by concern.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub library: LibrarySettings,

    #[serde(default)]
    pub handshake: HandshakeSettings,

    #[serde(default)]
    pub probe: ProbeSettings,

    #[serde(default)]
    pub widget: WidgetSettings,

    #[serde(default)]
    pub host: HostSettings,
}

/// Remote analytics library location and the dashboard to embed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibrarySettings {
    /// Server root handed to the widget factory as `serverUrl`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Library root; login and session endpoints hang off this URL.
    #[serde(default = "default_library_url")]
    pub library_url: String,

    #[serde(default = "default_project_id")]
    pub project_id: String,

    #[serde(default = "default_object_id")]
    pub object_id: String,

    /// Kind of library object: "document" or "dossier".
    #[serde(default = "default_library_type")]
    pub library_type: String,
}

fn default_base_url() -> String {
    "https://tutorial.microstrategy.com".to_string()
}

fn default_library_url() -> String {
    "https://tutorial.microstrategy.com/MicroStrategyLibrary".to_string()
}

fn default_project_id() -> String {
    "B7CA92F04B9FAE8D941C3E9B7E0CD754".to_string()
}

fn default_object_id() -> String {
    "152C22B1284EF1253585CA9B0FEE89E9".to_string()
}

fn default_library_type() -> String {
    "document".to_string()
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            library_url: default_library_url(),
            project_id: default_project_id(),
            object_id: default_object_id(),
            library_type: default_library_type(),
        }
    }
}

/// Popup polling behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandshakeSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tick budget before the attempt times out (300 x 1s = ~5 minutes).
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,

    /// Wait before verifying so IdP-issued cookies can land.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_popup_width")]
    pub popup_width: u32,

    #[serde(default = "default_popup_height")]
    pub popup_height: u32,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_max_ticks() -> u32 {
    300
}

fn default_settle_delay_ms() -> u64 {
    1_000
}

fn default_popup_width() -> u32 {
    600
}

fn default_popup_height() -> u32 {
    700
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_ticks: default_max_ticks(),
            settle_delay_ms: default_settle_delay_ms(),
            popup_width: default_popup_width(),
            popup_height: default_popup_height(),
        }
    }
}

/// Session probe settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSettings {
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,

    /// Path appended to the library URL.
    #[serde(default = "default_sessions_path")]
    pub sessions_path: String,
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_sessions_path() -> String {
    "/api/sessions".to_string()
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
            sessions_path: default_sessions_path(),
        }
    }
}

/// Embedded widget presentation options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WidgetSettings {
    #[serde(default = "default_true")]
    pub enable_responsive: bool,

    #[serde(default = "default_true")]
    pub navigation_bar: bool,

    #[serde(default = "default_true")]
    pub goto_library: bool,

    #[serde(default = "default_true")]
    pub show_title: bool,

    #[serde(default = "default_font_family")]
    pub font_family: String,

    /// Element id of the placeholder the widget renders into.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

fn default_true() -> bool {
    true
}

fn default_font_family() -> String {
    "Arial, sans-serif".to_string()
}

fn default_placeholder() -> String {
    "mstrDashboard".to_string()
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            enable_responsive: true,
            navigation_bar: true,
            goto_library: true,
            show_title: true,
            font_family: default_font_family(),
            placeholder: default_placeholder(),
        }
    }
}

/// Host application behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HostSettings {
    /// Allow skipping authentication entirely. Testing only.
    #[serde(default)]
    pub allow_demo_mode: bool,
}

impl Settings {
    /// Default TOML config file path (~/.embedgate/config.toml).
    pub fn default_toml_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".embedgate")
            .join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &std::path::Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }

    /// Write a commented TOML config file with current settings.
    pub fn save_toml(&self, path: &std::path::Path) -> Result<(), String> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize settings: {}", e))?;

        let content = format!(
            "# embedgate configuration file.\n\
             #\n\
             # Priority: env var > this file > defaults.\n\
             # Run `embedgate config init` to regenerate this file.\n\
             \n\
             {raw}"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
        }

        std::fs::write(path, content)
            .map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }

    /// Get a setting value by dotted path (e.g., "handshake.max_ticks").
    pub fn get(&self, path: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;

        for part in path.split('.') {
            current = current.get(part)?;
        }

        match current {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::Null => Some("null".to_string()),
            other => Some(other.to_string()),
        }
    }
}
