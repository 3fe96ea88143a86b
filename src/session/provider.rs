//! Identity provider collaborator
//!
//! The provider is a black box reached through [`IdentityProvider`]. Calls
//! report failures by stable [`ProviderErrorCode`]; "who is logged in" is
//! only ever learned from the pushed [`ProviderEvent`] stream.

use crate::shared::error::ProviderErrorCode;
use crate::shared::identity::Identity;
use std::future::Future;
use uuid::Uuid;

/// State change pushed by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// A user session is active
    SignedIn(Identity),
    /// No user session is active
    SignedOut,
}

impl ProviderEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedIn(identity) => Some(identity),
            Self::SignedOut => None,
        }
    }
}

impl From<Option<Identity>> for ProviderEvent {
    fn from(identity: Option<Identity>) -> Self {
        identity.map_or(Self::SignedOut, Self::SignedIn)
    }
}

/// Callback invoked for every pushed state change, in emission order
pub type StateListener = Box<dyn Fn(ProviderEvent) + Send + Sync>;

/// Token returned by [`IdentityProvider::on_state_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

impl ListenerHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote identity provider
///
/// Implementations push the current state to a newly registered listener
/// once the provider is ready, then every change after that.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Create an account. Success only means the account exists.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), ProviderErrorCode>> + Send;

    /// Sign in to an existing account.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), ProviderErrorCode>> + Send;

    /// Start an anonymous session.
    fn sign_in_anonymous(&self) -> impl Future<Output = Result<(), ProviderErrorCode>> + Send;

    /// Start a session from a pre-issued token.
    fn sign_in_with_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<(), ProviderErrorCode>> + Send;

    /// Request termination of the current session.
    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderErrorCode>> + Send;

    /// Register a state-change listener.
    fn on_state_change(&self, listener: StateListener) -> ListenerHandle;

    /// Drop a listener registered with [`on_state_change`](Self::on_state_change).
    fn remove_listener(&self, handle: ListenerHandle);
}
