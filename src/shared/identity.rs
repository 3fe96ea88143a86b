//! Identity and credential types
//!
//! An [`Identity`] is an immutable snapshot produced by the identity provider
//! on each state-change event. [`Credentials`] carry the email/password pair
//! entered in the auth form, with the checks applied before the provider is
//! contacted.

use crate::shared::error::AuthFailureKind;
use serde::{Deserialize, Serialize};

/// Minimum password length accepted when creating an account
pub const MIN_PASSWORD_LEN: usize = 6;

/// Label used when an identity has neither email nor display name
const ANONYMOUS_LABEL: &str = "Anonymous User";

/// Authenticated user snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Opaque provider-assigned user id
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_anonymous: bool,
}

impl Identity {
    /// Identity signed in with an email address
    pub fn with_email(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            display_name: None,
            is_anonymous: false,
        }
    }

    /// Anonymous identity
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
            is_anonymous: true,
        }
    }

    /// Set the display name
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name to show for this user: email, then display name, then a fixed label
    pub fn display_label(&self) -> &str {
        self.email
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or(ANONYMOUS_LABEL)
    }
}

/// Email/password pair from the auth form
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
            password: password.into(),
        }
    }

    /// Checks applied before an account is created
    pub fn check_for_sign_up(&self) -> Result<(), AuthFailureKind> {
        if !looks_like_email(&self.email) || self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthFailureKind::InvalidCredentialsFormat);
        }
        Ok(())
    }

    /// Checks applied before signing in to an existing account
    pub fn check_for_sign_in(&self) -> Result<(), AuthFailureKind> {
        if !looks_like_email(&self.email) {
            return Err(AuthFailureKind::InvalidEmail);
        }
        // an empty password can never match the account's
        if self.password.is_empty() {
            return Err(AuthFailureKind::WrongPassword);
        }
        Ok(())
    }
}

/// Shallow email shape check; the provider has the final word.
fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    }
}
