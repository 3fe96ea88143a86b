//! Session Error Types
//!
//! This module defines the error taxonomy that crosses the core boundary.
//! Every failure reported by the identity provider or the document store is
//! translated into one of these kinds before it reaches a caller.
//!
//! # Error Categories
//!
//! - `ConfigInvalid` - Backing service misconfigured, surfaced once, never retried
//! - `AuthFailure` - Form-level sign-in/sign-up failure, retryable with new input
//! - `InitialAuthFailed` - Startup sign-in failed, surfaced as a session-level error
//! - `Subscription` - Realtime channel failed, session stays authenticated
//! - `NotAttached` - A document operation was issued without an attached identity
//! - `StoreFailure` - A one-shot store call (existence check, write) failed
//!
//! # Collaborator Codes
//!
//! The provider and the store report failures through stable codes
//! ([`ProviderErrorCode`], [`StoreErrorCode`]), never through free text.
//!
//! # Usage
//!
//! ```rust
//! use doc_session::shared::error::{AuthFailureKind, SessionError};
//!
//! let error = SessionError::auth(AuthFailureKind::WrongPassword);
//! assert_eq!(error.auth_kind(), Some(AuthFailureKind::WrongPassword));
//! ```
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the session core
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Configuration is missing or invalid
    #[error("Configuration invalid: {reason}")]
    ConfigInvalid {
        /// Why validation rejected the configuration
        reason: String,
    },

    /// Interactive sign-in or sign-up was rejected
    #[error("Authentication failed: {kind}")]
    AuthFailure {
        /// Which failure the provider reported
        kind: AuthFailureKind,
    },

    /// The startup token/anonymous sign-in failed
    #[error("Initial authentication failed")]
    InitialAuthFailed,

    /// The realtime subscription reported a transport failure
    #[error("Subscription error: {code}")]
    Subscription {
        /// Store-side failure code
        code: StoreErrorCode,
    },

    /// A document operation was issued with no attached identity
    #[error("No identity is attached to the document controller")]
    NotAttached,

    /// A one-shot store operation failed
    #[error("Store {operation} failed: {code}")]
    StoreFailure {
        /// The operation that failed
        operation: StoreOperation,
        /// Store-side failure code
        code: StoreErrorCode,
    },
}

impl SessionError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }

    /// Create an authentication failure
    pub fn auth(kind: AuthFailureKind) -> Self {
        Self::AuthFailure { kind }
    }

    /// Create a store failure for `operation`
    pub fn store(operation: StoreOperation, code: StoreErrorCode) -> Self {
        Self::StoreFailure { operation, code }
    }

    /// The auth failure kind, if this is an `AuthFailure`
    pub fn auth_kind(&self) -> Option<AuthFailureKind> {
        match self {
            Self::AuthFailure { kind } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the whole view should be replaced rather than showing the error inline
    pub fn replaces_view(&self) -> bool {
        matches!(self, Self::ConfigInvalid { .. } | Self::InitialAuthFailed)
    }
}

/// Reasons an interactive sign-in or sign-up can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureKind {
    /// Email or password does not meet the account format rules
    InvalidCredentialsFormat,
    /// An account already exists for the email
    EmailAlreadyInUse,
    /// The email is malformed
    InvalidEmail,
    /// No account exists for the email
    UserNotFound,
    /// The password does not match
    WrongPassword,
    /// The provider could not be reached or failed internally
    ProviderUnavailable,
}

impl AuthFailureKind {
    /// Text shown inline next to the auth form
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentialsFormat => {
                "Enter a valid email and a password of at least 6 characters."
            }
            Self::EmailAlreadyInUse => "Email already registered!",
            Self::InvalidEmail => "Invalid email!",
            Self::UserNotFound => "User not registered!",
            Self::WrongPassword => "Wrong password!",
            Self::ProviderUnavailable => "Authentication failed. Try again.",
        }
    }

    /// Translate a provider code reported by `signUp`
    pub fn from_sign_up(code: &ProviderErrorCode) -> Self {
        match code {
            ProviderErrorCode::EmailAlreadyInUse => Self::EmailAlreadyInUse,
            ProviderErrorCode::InvalidEmail | ProviderErrorCode::WeakPassword => {
                Self::InvalidCredentialsFormat
            }
            _ => Self::ProviderUnavailable,
        }
    }

    /// Translate a provider code reported by `signIn`
    pub fn from_sign_in(code: &ProviderErrorCode) -> Self {
        match code {
            ProviderErrorCode::InvalidEmail => Self::InvalidEmail,
            ProviderErrorCode::UserNotFound => Self::UserNotFound,
            ProviderErrorCode::WrongPassword => Self::WrongPassword,
            _ => Self::ProviderUnavailable,
        }
    }
}

impl std::fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidCredentialsFormat => "invalid credentials format",
            Self::EmailAlreadyInUse => "email already in use",
            Self::InvalidEmail => "invalid email",
            Self::UserNotFound => "user not found",
            Self::WrongPassword => "wrong password",
            Self::ProviderUnavailable => "provider unavailable",
        };
        f.write_str(name)
    }
}

/// Stable failure codes reported by an identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    InvalidEmail,
    UserNotFound,
    WrongPassword,
    EmailAlreadyInUse,
    WeakPassword,
    InvalidToken,
    NetworkRequestFailed,
    InvalidApiKey,
    /// Any code this crate does not recognise
    Other(String),
}

impl ProviderErrorCode {
    /// Parse a provider code such as `auth/wrong-password`
    pub fn from_code(code: &str) -> Self {
        match code {
            "auth/invalid-email" => Self::InvalidEmail,
            "auth/user-not-found" => Self::UserNotFound,
            "auth/wrong-password" => Self::WrongPassword,
            "auth/email-already-in-use" => Self::EmailAlreadyInUse,
            "auth/weak-password" => Self::WeakPassword,
            "auth/invalid-custom-token" => Self::InvalidToken,
            "auth/network-request-failed" => Self::NetworkRequestFailed,
            "auth/invalid-api-key" => Self::InvalidApiKey,
            other => Self::Other(other.to_string()),
        }
    }

    /// The provider's string form of this code
    pub fn as_code(&self) -> &str {
        match self {
            Self::InvalidEmail => "auth/invalid-email",
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::EmailAlreadyInUse => "auth/email-already-in-use",
            Self::WeakPassword => "auth/weak-password",
            Self::InvalidToken => "auth/invalid-custom-token",
            Self::NetworkRequestFailed => "auth/network-request-failed",
            Self::InvalidApiKey => "auth/invalid-api-key",
            Self::Other(code) => code,
        }
    }

    /// Whether the provider is unreachable or rejects the app's settings,
    /// rather than the particular sign-in attempt
    pub fn is_configuration_failure(&self) -> bool {
        matches!(self, Self::NetworkRequestFailed | Self::InvalidApiKey)
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Stable failure codes reported by a document store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorCode {
    PermissionDenied,
    Unavailable,
    NotFound,
    Internal,
}

impl std::fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PermissionDenied => "permission-denied",
            Self::Unavailable => "unavailable",
            Self::NotFound => "not-found",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// One-shot store operations that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    ExistenceCheck,
    BootstrapWrite,
    MergeWrite,
    Read,
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExistenceCheck => "existence check",
            Self::BootstrapWrite => "bootstrap write",
            Self::MergeWrite => "merge write",
            Self::Read => "read",
        };
        f.write_str(name)
    }
}
