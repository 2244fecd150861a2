//! Embedding configuration and the seam to the third-party widget factory.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;

use crate::config::Config;
use crate::widget::bridge::EventHooks;

/// Navigation bar options passed to the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationOptions {
    pub enabled: bool,
    pub goto_library: bool,
    pub title: bool,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            goto_library: true,
            title: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedSource {
    pub library_type: String,
    pub object_id: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomCss {
    pub font_family: String,
}

/// The configuration document the widget factory is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedConfig {
    pub server_url: String,
    pub placeholder: String,
    pub src: EmbedSource,
    pub enable_responsive: bool,
    pub navigation_bar: NavigationOptions,
    pub custom_css: CustomCss,
}

/// The "dashboard information" block shown next to the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    #[serde(rename = "Environment")]
    pub environment: String,
    #[serde(rename = "Project ID")]
    pub project_id: String,
    #[serde(rename = "Object ID")]
    pub object_id: String,
    #[serde(rename = "Base URL")]
    pub base_url: String,
}

impl EmbedConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            server_url: config.library.base_url.clone(),
            placeholder: config.widget.placeholder.clone(),
            src: EmbedSource {
                library_type: config.library.library_type.as_str().to_string(),
                object_id: config.library.object_id.clone(),
                project_id: config.library.project_id.clone(),
            },
            enable_responsive: config.widget.enable_responsive,
            navigation_bar: config.widget.navigation,
            custom_css: CustomCss {
                font_family: config.widget.font_family.clone(),
            },
        }
    }

    pub fn summary(&self) -> DashboardSummary {
        let environment = url::Url::parse(&self.server_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.server_url.clone());
        DashboardSummary {
            environment,
            project_id: self.src.project_id.clone(),
            object_id: self.src.object_id.clone(),
            base_url: self.server_url.clone(),
        }
    }
}

/// What the widget's `getAuthToken()` hands back.
#[derive(Debug, Default)]
pub enum AuthTokenSource {
    /// Return nothing and let the widget use its own cookie session.
    #[default]
    Cookie,
    Token(SecretString),
}

impl AuthTokenSource {
    pub fn get_auth_token(&self) -> Option<&SecretString> {
        match self {
            Self::Cookie => None,
            Self::Token(token) => Some(token),
        }
    }
}

/// Everything the factory needs besides the event hooks.
#[derive(Debug)]
pub struct WidgetRequest {
    pub embed: EmbedConfig,
    pub auth_token: AuthTokenSource,
}

impl WidgetRequest {
    pub fn new(embed: EmbedConfig) -> Self {
        Self {
            embed,
            auth_token: AuthTokenSource::Cookie,
        }
    }

    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = AuthTokenSource::Token(token);
        self
    }
}

/// A rendered document returned by `exportToPDF()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Control handle returned by the factory for one widget instance.
#[async_trait]
pub trait WidgetControl: Send {
    async fn refresh(&mut self) -> Result<(), String>;

    async fn export_to_pdf(&mut self) -> Result<ExportedDocument, String>;

    /// Tear down the instance. Called once, before the handle is dropped.
    fn release(&mut self) {}
}

/// Creates widget instances. May fail synchronously (error or panic).
pub trait WidgetFactory: Send {
    fn create(
        &mut self,
        request: &WidgetRequest,
        hooks: EventHooks,
    ) -> Result<Box<dyn WidgetControl>, String>;
}
