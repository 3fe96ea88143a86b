//! Session wiring
//!
//! [`Session`] is what a front end holds for the life of the process: it
//! validates the configuration once, owns the session manager and the
//! document controller, registers the controller for identity changes and
//! derives the view to render.

use crate::session::manager::{IdentitySessionManager, SessionDependent};
use crate::session::provider::IdentityProvider;
use crate::session::state::SessionState;
use crate::shared::config::{AppConfig, ConfigValidity};
use crate::shared::document::DocumentLayout;
use crate::shared::error::SessionError;
use crate::sync::controller::DocumentController;
use crate::sync::store::DocumentStore;
use crate::view::{select_view, AuthMode, DashboardSummary, ViewState};
use std::sync::Arc;

/// Identity-gated document session
pub struct Session<P: IdentityProvider, S: DocumentStore> {
    config: AppConfig,
    validity: ConfigValidity,
    manager: IdentitySessionManager<P>,
    documents: DocumentController<S>,
}

impl<P: IdentityProvider, S: DocumentStore> Session<P, S> {
    /// Build a session using the configuration's document layout
    pub fn new(config: AppConfig, provider: Arc<P>, store: Arc<S>) -> Self {
        let layout = config.document_layout();
        Self::with_layout(config, layout, provider, store)
    }

    /// Build a session with an explicit document layout
    pub fn with_layout(
        config: AppConfig,
        layout: DocumentLayout,
        provider: Arc<P>,
        store: Arc<S>,
    ) -> Self {
        let validity = config.validity();
        let manager = IdentitySessionManager::new(provider, validity.clone());
        let documents = DocumentController::new(store, layout);
        if validity.is_valid() {
            manager.register_dependent(Arc::new(documents.clone()) as Arc<dyn SessionDependent>);
        }
        Self {
            config,
            validity,
            manager,
            documents,
        }
    }

    /// Apply the provider's ready event and, when no session was restored,
    /// run the startup sign-in (configured token, else anonymous).
    pub async fn start(&self) -> Result<(), SessionError> {
        if let ConfigValidity::Invalid(reason) = &self.validity {
            return Err(SessionError::config(reason.clone()));
        }
        self.manager.drain_pending().await;

        if self.manager.state().is_authenticated() {
            tracing::info!("[SESSION] Restored stored session");
            return Ok(());
        }

        let result = self
            .manager
            .bootstrap_sign_in(self.config.initial_auth_token.as_deref())
            .await;
        self.manager.drain_pending().await;
        result
    }

    /// Apply every queued provider event
    pub async fn pump(&self) {
        self.manager.drain_pending().await;
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.manager.sign_in(email, password).await?;
        self.pump().await;
        Ok(())
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.manager.sign_up(email, password).await?;
        self.pump().await;
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.manager.sign_out().await?;
        self.pump().await;
        Ok(())
    }

    /// Attach the signed-in identity's document again after a store failure
    pub async fn retry_documents(&self) -> Result<(), SessionError> {
        let state = self.manager.state();
        let identity = state.identity().ok_or(SessionError::NotAttached)?;
        tracing::info!("[SESSION] Retrying document attach for {}", identity.id);
        self.documents.attach(identity).await
    }

    pub fn state(&self) -> SessionState {
        self.manager.state()
    }

    /// Screen for the current state
    pub fn view(&self, mode: AuthMode) -> ViewState {
        select_view(self.validity.is_valid(), &self.manager.state(), mode)
    }

    /// Dashboard data, when a user is signed in
    pub fn dashboard(&self) -> Option<DashboardSummary> {
        let state = self.manager.state();
        let identity = state.identity()?;
        Some(DashboardSummary::new(identity, &self.documents.status()))
    }

    pub fn manager(&self) -> &IdentitySessionManager<P> {
        &self.manager
    }

    pub fn documents(&self) -> &DocumentController<S> {
        &self.documents
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Release the document subscription and the provider listener
    pub fn shutdown(&self) {
        self.documents.detach();
        self.manager.shutdown();
        tracing::info!("[SESSION] Shut down");
    }
}
