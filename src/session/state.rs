//! Session state machine
//!
//! ```text
//! Uninitialized ──ready, no session──▶ Unauthenticated ◀──sign-out push──┐
//!       │                                   │                           │
//!       │ startup sign-in                   └──signed-in push──▶ Authenticated
//!       ▼                                                               ▲
//! Authenticating ──signed-in push───────────────────────────────────────┘
//!
//! ConfigError: terminal, ignores every push.
//! AuthError:   kept on sign-out pushes, left only when an identity arrives.
//! ```

use crate::session::provider::ProviderEvent;
use crate::shared::identity::Identity;
use serde::Serialize;

/// Current authentication state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Authenticated(Identity),
    Unauthenticated,
    ConfigError,
    AuthError(String),
}

impl SessionState {
    /// State after the provider pushes `event`
    pub fn on_provider_event(&self, event: ProviderEvent) -> SessionState {
        match (self, event) {
            (Self::ConfigError, _) => Self::ConfigError,
            (_, ProviderEvent::SignedIn(identity)) => Self::Authenticated(identity),
            (Self::AuthError(message), ProviderEvent::SignedOut) => {
                Self::AuthError(message.clone())
            }
            (_, ProviderEvent::SignedOut) => Self::Unauthenticated,
        }
    }

    /// The identity carried by `Authenticated`
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Whether only a reload can leave this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConfigError | Self::AuthError(_))
    }

    /// Whether moving to `next` ends the session of the current identity
    pub fn releases_identity(&self, next: &SessionState) -> bool {
        match (self.identity(), next.identity()) {
            (Some(current), Some(next)) => current.id != next.id,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// The identity `next` starts a session for, if it differs from the current one
    pub fn establishes_identity<'a>(&self, next: &'a SessionState) -> Option<&'a Identity> {
        let incoming = next.identity()?;
        match self.identity() {
            Some(current) if current.id == incoming.id => None,
            _ => Some(incoming),
        }
    }

    /// Short name for logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Authenticating => "authenticating",
            Self::Authenticated(_) => "authenticated",
            Self::Unauthenticated => "unauthenticated",
            Self::ConfigError => "config_error",
            Self::AuthError(_) => "auth_error",
        }
    }
}
