//! View selection
//!
//! Pure mapping from configuration validity and session state to the screen
//! that should be shown. Holds no state; call it again whenever either input
//! changes.

use crate::session::state::SessionState;
use crate::shared::error::{SessionError, StoreOperation};
use crate::shared::identity::Identity;
use crate::sync::controller::DocumentStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Message shown when the session is in `ConfigError`
pub const BACKEND_MISCONFIGURED_MESSAGE: &str =
    "The authentication service is misconfigured or unreachable.";

/// Banner over the dashboard when the realtime channel failed
pub const STREAM_FAILED_MESSAGE: &str = "Failed to stream dashboard data.";

/// Banner when a write to the document was rejected
pub const SAVE_FAILED_MESSAGE: &str = "Failed to save data to the document store.";

/// Banner when the document could not be checked or read
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load dashboard data.";

/// Which auth form is shown to a signed-out user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

impl AuthMode {
    pub fn toggle(self) -> Self {
        match self {
            Self::SignIn => Self::SignUp,
            Self::SignUp => Self::SignIn,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::SignIn => "Sign In",
            Self::SignUp => "Sign Up",
        }
    }

    pub fn submit_label(&self) -> &'static str {
        match self {
            Self::SignIn => "Login to Dashboard",
            Self::SignUp => "Create Account",
        }
    }

    /// Link text for switching to the other mode
    pub fn toggle_prompt(&self) -> &'static str {
        match self {
            Self::SignIn => "Need an account? Sign Up",
            Self::SignUp => "Already have an account? Sign In",
        }
    }
}

/// Screen to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", content = "detail", rename_all = "snake_case")]
pub enum ViewState {
    ConfigError,
    AuthError(String),
    Loading,
    Dashboard(Identity),
    LoginOrSignup(AuthMode),
}

impl ViewState {
    pub fn title(&self) -> &'static str {
        match self {
            Self::ConfigError => "Configuration Error",
            Self::AuthError(_) => "Authentication Error",
            Self::Loading => "Connecting...",
            Self::Dashboard(_) => "Dashboard",
            Self::LoginOrSignup(mode) => mode.title(),
        }
    }
}

/// Pick the screen for the current inputs
pub fn select_view(config_valid: bool, state: &SessionState, mode: AuthMode) -> ViewState {
    if !config_valid {
        return ViewState::ConfigError;
    }
    match state {
        SessionState::ConfigError => {
            ViewState::AuthError(BACKEND_MISCONFIGURED_MESSAGE.to_string())
        }
        SessionState::Uninitialized | SessionState::Authenticating => ViewState::Loading,
        SessionState::Authenticated(identity) => ViewState::Dashboard(identity.clone()),
        SessionState::AuthError(message) => ViewState::AuthError(message.clone()),
        SessionState::Unauthenticated => ViewState::LoginOrSignup(mode),
    }
}

/// Presentation data for the dashboard screen
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub user_label: String,
    pub user_id: String,
    /// Pretty JSON of the document, `None` while nothing has arrived yet
    pub data: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Shown over the (possibly stale) data when a store call failed
    pub banner: Option<String>,
}

impl DashboardSummary {
    pub fn new(identity: &Identity, status: &DocumentStatus) -> Self {
        let record = status.record.as_ref().filter(|record| record.exists);
        Self {
            user_label: identity.display_label().to_string(),
            user_id: identity.id.clone(),
            data: record.map(|record| record.fields_json()),
            last_synced_at: status.record.as_ref().and_then(|r| r.last_synced_at),
            banner: status.error.as_ref().map(|error| banner_for(error).to_string()),
        }
    }
}

fn banner_for(error: &SessionError) -> &'static str {
    match error {
        SessionError::StoreFailure {
            operation: StoreOperation::BootstrapWrite | StoreOperation::MergeWrite,
            ..
        } => SAVE_FAILED_MESSAGE,
        SessionError::StoreFailure { .. } => LOAD_FAILED_MESSAGE,
        _ => STREAM_FAILED_MESSAGE,
    }
}
