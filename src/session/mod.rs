//! Identity session
//!
//! Wraps sign-up, sign-in, sign-out and the provider's pushed state changes
//! into one [`SessionState`] machine.

/// Identity provider collaborator interface
pub mod provider;

/// Session state and transition rules
pub mod state;

/// The session manager
pub mod manager;

pub use manager::{IdentitySessionManager, SessionDependent, INITIAL_AUTH_FAILED_MESSAGE};
pub use provider::{IdentityProvider, ListenerHandle, ProviderEvent, StateListener};
pub use state::SessionState;
