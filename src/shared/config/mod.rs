//! Application configuration module
//!
//! Configuration is supplied once at process start. It carries the provider
//! settings, the app namespace used for document paths and the optional
//! token for the startup sign-in. Validation collapses it to a single
//! [`ConfigValidity`] flag that the rest of the core consumes.
//!
//! # Sources
//!
//! - [`AppConfig::builder`] for programmatic setup
//! - [`AppConfig::from_toml_str`] for a TOML file
//! - [`AppConfig::from_env`] for `DOC_SESSION_*` environment variables

use crate::shared::document::DocumentLayout;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default app namespace
pub const DEFAULT_APP_ID: &str = "default-app-id";
/// Default collection holding the per-user document
pub const DEFAULT_COLLECTION: &str = "dashboard_data";
/// Default per-user document name
pub const DEFAULT_DOCUMENT: &str = "profile";

const ENV_APP_ID: &str = "DOC_SESSION_APP_ID";
const ENV_PROVIDER_CONFIG: &str = "DOC_SESSION_PROVIDER_CONFIG";
const ENV_AUTH_TOKEN: &str = "DOC_SESSION_AUTH_TOKEN";

/// Connection settings for the identity provider and document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub api_key: String,
    pub project_id: String,
    #[serde(default)]
    pub auth_domain: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Namespace segment of every document path
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// Provider settings; absent means the backing service is not configured
    #[serde(default)]
    pub provider: Option<ProviderSettings>,
    /// Token for the startup sign-in; anonymous sign-in when absent
    #[serde(default)]
    pub initial_auth_token: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_document")]
    pub document: String,
}

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_document() -> String {
    DEFAULT_DOCUMENT.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            provider: None,
            initial_auth_token: None,
            collection: default_collection(),
            document: default_document(),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read configuration from `DOC_SESSION_*` environment variables.
    ///
    /// `DOC_SESSION_PROVIDER_CONFIG` holds the provider settings as a JSON object.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Ok(app_id) = std::env::var(ENV_APP_ID) {
            builder = builder.app_id(app_id);
        }
        if let Ok(raw) = std::env::var(ENV_PROVIDER_CONFIG) {
            let settings: ProviderSettings =
                serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
            builder = builder.provider(settings);
        }
        if let Ok(token) = std::env::var(ENV_AUTH_TOKEN) {
            if !token.is_empty() {
                builder = builder.initial_auth_token(token);
            }
        }
        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(ConfigError::MissingValue("provider"))?;
        if provider.api_key.trim().is_empty() {
            return Err(ConfigError::MissingValue("provider.apiKey"));
        }
        if provider.project_id.trim().is_empty() {
            return Err(ConfigError::MissingValue("provider.projectId"));
        }
        Ok(())
    }

    /// Validity flag consumed by the session core
    pub fn validity(&self) -> ConfigValidity {
        match self.validate() {
            Ok(()) => ConfigValidity::Valid,
            Err(e) => ConfigValidity::Invalid(e.to_string()),
        }
    }

    /// Document layout for this app
    pub fn document_layout(&self) -> DocumentLayout {
        DocumentLayout::for_app(&self.app_id, &self.collection, &self.document)
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    app_id: Option<String>,
    provider: Option<ProviderSettings>,
    initial_auth_token: Option<String>,
    collection: Option<String>,
    document: Option<String>,
}

impl AppConfigBuilder {
    /// Set the app namespace
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Set the provider settings
    pub fn provider(mut self, settings: ProviderSettings) -> Self {
        self.provider = Some(settings);
        self
    }

    /// Set the startup sign-in token
    pub fn initial_auth_token(mut self, token: impl Into<String>) -> Self {
        self.initial_auth_token = Some(token.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let config = AppConfig {
            app_id: self.app_id.unwrap_or_else(default_app_id),
            provider: self.provider,
            initial_auth_token: self.initial_auth_token,
            collection: self.collection.unwrap_or_else(default_collection),
            document: self.document.unwrap_or_else(default_document),
        };
        for (name, value) in [
            ("app_id", &config.app_id),
            ("collection", &config.collection),
            ("document", &config.document),
        ] {
            if value.is_empty() || value.contains('/') {
                return Err(ConfigError::InvalidSegment(name, value.clone()));
            }
        }
        Ok(config)
    }
}

/// Result of validating the configuration once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidity {
    Valid,
    Invalid(String),
}

impl ConfigValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid path segment for {0}: {1:?}")]
    InvalidSegment(&'static str, String),
    #[error("parse error: {0}")]
    Parse(String),
}
