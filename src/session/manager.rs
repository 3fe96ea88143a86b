//! Identity Session Manager
//!
//! Owns the current [`SessionState`]. Exactly one listener is registered with
//! the provider at construction; pushed events are queued and applied one at
//! a time, in emission order.
//!
//! Transitions out of an authenticated identity first await every registered
//! [`SessionDependent::identity_released`], so nothing downstream keeps
//! serving the old user's data once the new state is visible.

use crate::session::provider::{IdentityProvider, ListenerHandle, ProviderEvent};
use crate::session::state::SessionState;
use crate::shared::config::ConfigValidity;
use crate::shared::error::{AuthFailureKind, SessionError};
use crate::shared::identity::{Credentials, Identity};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

/// Message stored in `AuthError` when the startup sign-in fails
pub const INITIAL_AUTH_FAILED_MESSAGE: &str = "Initial connection failed.";

/// Component that must react to identity changes before they become visible
pub trait SessionDependent: Send + Sync {
    /// A new identity became authenticated (called after the state is published)
    fn identity_established(&self, identity: Identity) -> BoxFuture<'_, ()>;

    /// The current identity is going away (called before the state is published)
    fn identity_released(&self) -> BoxFuture<'_, ()>;
}

/// Session manager wrapping one identity provider
pub struct IdentitySessionManager<P: IdentityProvider> {
    provider: Arc<P>,
    validity: ConfigValidity,
    state_tx: watch::Sender<SessionState>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ProviderEvent>>,
    listener: Mutex<Option<ListenerHandle>>,
    dependents: Mutex<Vec<Arc<dyn SessionDependent>>>,
}

impl<P: IdentityProvider> IdentitySessionManager<P> {
    /// Create the manager and register its provider listener.
    ///
    /// With an invalid configuration the manager starts in `ConfigError` and
    /// never contacts the provider.
    pub fn new(provider: Arc<P>, validity: ConfigValidity) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let (initial, listener) = match &validity {
            ConfigValidity::Valid => {
                let handle = provider.on_state_change(Box::new(move |event| {
                    if events_tx.send(event).is_err() {
                        tracing::debug!("[SESSION] Dropping provider event, manager is gone");
                    }
                }));
                tracing::info!("[SESSION] Registered provider state listener");
                (SessionState::Uninitialized, Some(handle))
            }
            ConfigValidity::Invalid(reason) => {
                tracing::error!("[SESSION] Configuration invalid: {}", reason);
                (SessionState::ConfigError, None)
            }
        };

        let (state_tx, _) = watch::channel(initial);
        Self {
            provider,
            validity,
            state_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            listener: Mutex::new(listener),
            dependents: Mutex::new(Vec::new()),
        }
    }

    /// Register a component to be notified around identity changes
    pub fn register_dependent(&self, dependent: Arc<dyn SessionDependent>) {
        self.dependents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dependent);
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Receiver that observes every published state
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn config_validity(&self) -> &ConfigValidity {
        &self.validity
    }

    /// Wait for the next provider event and apply it.
    ///
    /// Returns `None` once the provider has dropped the listener.
    pub async fn process_next(&self) -> Option<SessionState> {
        let mut events = self.events_rx.lock().await;
        let event = events.recv().await?;
        Some(self.apply(event).await)
    }

    /// Apply every event already queued, without waiting for new ones
    pub async fn drain_pending(&self) -> usize {
        let mut events = self.events_rx.lock().await;
        let mut applied = 0;
        while let Ok(event) = events.try_recv() {
            self.apply(event).await;
            applied += 1;
        }
        applied
    }

    /// Apply provider events until the listener is dropped
    pub async fn run(&self) {
        while self.process_next().await.is_some() {}
        tracing::info!("[SESSION] Provider event stream closed");
    }

    async fn apply(&self, event: ProviderEvent) -> SessionState {
        let current = self.state();
        let next = current.on_provider_event(event);

        if current.releases_identity(&next) {
            tracing::info!(
                "[SESSION] Releasing identity {} before {} transition",
                current.identity().map(|i| i.id.as_str()).unwrap_or_default(),
                next.label()
            );
            for dependent in self.dependents_snapshot() {
                dependent.identity_released().await;
            }
        }

        self.state_tx.send_replace(next.clone());
        tracing::info!("[SESSION] {} -> {}", current.label(), next.label());

        if let Some(identity) = current.establishes_identity(&next) {
            tracing::info!("[SESSION] Identity {} established", identity.id);
            for dependent in self.dependents_snapshot() {
                dependent.identity_established(identity.clone()).await;
            }
        }

        next
    }

    fn dependents_snapshot(&self) -> Vec<Arc<dyn SessionDependent>> {
        self.dependents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_configured(&self) -> Result<(), SessionError> {
        match &self.validity {
            ConfigValidity::Valid => Ok(()),
            ConfigValidity::Invalid(reason) => Err(SessionError::config(reason.clone())),
        }
    }

    /// Create an account.
    ///
    /// The session becomes `Authenticated` only when the provider pushes it.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.ensure_configured()?;
        let credentials = Credentials::new(email, password);
        credentials
            .check_for_sign_up()
            .map_err(SessionError::auth)?;

        self.provider
            .sign_up(&credentials.email, &credentials.password)
            .await
            .map_err(|code| {
                tracing::warn!("[SESSION] Sign-up rejected by provider: {}", code);
                SessionError::auth(AuthFailureKind::from_sign_up(&code))
            })?;

        tracing::info!("[SESSION] Account created for {}", credentials.email);
        Ok(())
    }

    /// Sign in to an existing account.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.ensure_configured()?;
        let credentials = Credentials::new(email, password);
        credentials
            .check_for_sign_in()
            .map_err(SessionError::auth)?;

        self.provider
            .sign_in(&credentials.email, &credentials.password)
            .await
            .map_err(|code| {
                tracing::warn!("[SESSION] Sign-in rejected by provider: {}", code);
                SessionError::auth(AuthFailureKind::from_sign_in(&code))
            })?;

        tracing::info!("[SESSION] Sign-in accepted for {}", credentials.email);
        Ok(())
    }

    /// Start an anonymous session
    pub async fn sign_in_anonymous(&self) -> Result<(), SessionError> {
        self.ensure_configured()?;
        self.provider.sign_in_anonymous().await.map_err(|code| {
            tracing::error!("[SESSION] Anonymous sign-in failed: {}", code);
            SessionError::InitialAuthFailed
        })
    }

    /// Start a session from a pre-issued token
    pub async fn sign_in_with_token(&self, token: &str) -> Result<(), SessionError> {
        self.ensure_configured()?;
        self.provider.sign_in_with_token(token).await.map_err(|code| {
            tracing::error!("[SESSION] Token sign-in failed: {}", code);
            SessionError::InitialAuthFailed
        })
    }

    /// Startup sign-in used when no interactive credentials exist.
    ///
    /// Uses `token` when present, an anonymous session otherwise. No retry is
    /// attempted. A provider that is unreachable or rejects the app's settings
    /// leaves the session in `ConfigError`; any other failure lands in
    /// `AuthError`. Both hold until an identity is pushed or the app reloads.
    pub async fn bootstrap_sign_in(&self, token: Option<&str>) -> Result<(), SessionError> {
        self.ensure_configured()?;
        self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Uninitialized {
                *state = SessionState::Authenticating;
                true
            } else {
                false
            }
        });

        let result = match token {
            Some(token) => self.provider.sign_in_with_token(token).await,
            None => self.provider.sign_in_anonymous().await,
        };
        let code = match result {
            Ok(()) => return Ok(()),
            Err(code) => code,
        };

        let (next, error) = if code.is_configuration_failure() {
            (
                SessionState::ConfigError,
                SessionError::config(format!("identity provider unavailable ({code})")),
            )
        } else {
            (
                SessionState::AuthError(INITIAL_AUTH_FAILED_MESSAGE.to_string()),
                SessionError::InitialAuthFailed,
            )
        };

        let current = self.state();
        if !current.is_authenticated() {
            tracing::error!(
                "[SESSION] {} -> {}: startup sign-in failed with {}",
                current.label(),
                next.label(),
                code
            );
            self.state_tx.send_replace(next);
        }
        Err(error)
    }

    /// Ask the provider to end the session.
    ///
    /// Completion is observed through the pushed state, not through this call.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.ensure_configured()?;
        self.provider.sign_out().await.map_err(|code| {
            tracing::warn!("[SESSION] Sign-out request failed: {}", code);
            SessionError::auth(AuthFailureKind::ProviderUnavailable)
        })
    }

    /// Unregister the provider listener. Safe to call more than once.
    pub fn shutdown(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            self.provider.remove_listener(handle);
            tracing::info!("[SESSION] Provider state listener removed");
        }
    }
}

impl<P: IdentityProvider> Drop for IdentitySessionManager<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
