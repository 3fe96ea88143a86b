//! In-process identity provider
//!
//! Keeps accounts in a map, pushes the current state to each new listener
//! and every change after that. Listeners are invoked outside the internal
//! lock, in registration order.

use crate::session::provider::{IdentityProvider, ListenerHandle, ProviderEvent, StateListener};
use crate::shared::error::ProviderErrorCode;
use crate::shared::identity::{Identity, MIN_PASSWORD_LEN};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Account {
    id: String,
    password: String,
    display_name: Option<String>,
}

#[derive(Default)]
struct ProviderInner {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, Identity>,
    current: Option<Identity>,
    listeners: Vec<(ListenerHandle, Arc<dyn Fn(ProviderEvent) + Send + Sync>)>,
    fail_next: Option<ProviderErrorCode>,
}

/// Identity provider backed by in-memory accounts
#[derive(Default)]
pub struct MemoryIdentityProvider {
    inner: Mutex<ProviderInner>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, ProviderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an account with a fixed id
    pub fn with_account(self, id: &str, email: &str, password: &str) -> Self {
        self.inner().accounts.insert(
            email.to_string(),
            Account {
                id: id.to_string(),
                password: password.to_string(),
                display_name: None,
            },
        );
        self
    }

    /// Accept `token` as a sign-in for `identity`
    pub fn with_token(self, token: &str, identity: Identity) -> Self {
        self.inner().tokens.insert(token.to_string(), identity);
        self
    }

    /// Start with a stored session for `identity`
    pub fn with_stored_session(self, identity: Identity) -> Self {
        self.inner().current = Some(identity);
        self
    }

    /// Make the next call fail with `code`
    pub fn fail_next(&self, code: ProviderErrorCode) {
        self.inner().fail_next = Some(code);
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.inner().current.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner().listeners.len()
    }

    /// Sign the user out from the provider side, as a remote logout would
    pub fn revoke_session(&self) {
        self.emit(None);
    }

    /// Push an arbitrary identity, as a provider-side account switch would
    pub fn push_identity(&self, identity: Identity) {
        self.emit(Some(identity));
    }

    fn take_failure(&self) -> Result<(), ProviderErrorCode> {
        match self.inner().fail_next.take() {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn emit(&self, identity: Option<Identity>) {
        let listeners: Vec<_> = {
            let mut inner = self.inner();
            inner.current = identity.clone();
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        let event = ProviderEvent::from(identity);
        for listener in listeners {
            listener(event.clone());
        }
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<(), ProviderErrorCode> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        if !email.contains('@') {
            return Err(ProviderErrorCode::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderErrorCode::WeakPassword);
        }

        let account = {
            let mut inner = self.inner();
            if inner.accounts.contains_key(email) {
                return Err(ProviderErrorCode::EmailAlreadyInUse);
            }
            let account = Account {
                id: Uuid::new_v4().simple().to_string(),
                password: password.to_string(),
                display_name: None,
            };
            inner.accounts.insert(email.to_string(), account.clone());
            account
        };

        // a new account is signed in immediately
        self.emit(Some(Identity::with_email(account.id, email)));
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<(), ProviderErrorCode> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        if !email.contains('@') {
            return Err(ProviderErrorCode::InvalidEmail);
        }

        let account = self
            .inner()
            .accounts
            .get(email)
            .cloned()
            .ok_or(ProviderErrorCode::UserNotFound)?;
        if account.password != password {
            return Err(ProviderErrorCode::WrongPassword);
        }

        let mut identity = Identity::with_email(account.id, email);
        identity.display_name = account.display_name;
        self.emit(Some(identity));
        Ok(())
    }

    async fn sign_in_anonymous(&self) -> Result<(), ProviderErrorCode> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        let existing = self.current_identity().filter(|i| i.is_anonymous);
        let identity =
            existing.unwrap_or_else(|| Identity::anonymous(Uuid::new_v4().simple().to_string()));
        self.emit(Some(identity));
        Ok(())
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<(), ProviderErrorCode> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        let identity = self
            .inner()
            .tokens
            .get(token)
            .cloned()
            .ok_or(ProviderErrorCode::InvalidToken)?;
        self.emit(Some(identity));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderErrorCode> {
        tokio::task::yield_now().await;
        self.take_failure()?;
        self.emit(None);
        Ok(())
    }

    fn on_state_change(&self, listener: StateListener) -> ListenerHandle {
        let handle = ListenerHandle::new();
        let listener: Arc<dyn Fn(ProviderEvent) + Send + Sync> = Arc::from(listener);
        let current = {
            let mut inner = self.inner();
            inner.listeners.push((handle, Arc::clone(&listener)));
            inner.current.clone()
        };
        // provider is ready: report the stored session, if any
        listener(ProviderEvent::from(current));
        handle
    }

    fn remove_listener(&self, handle: ListenerHandle) {
        self.inner().listeners.retain(|(h, _)| *h != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(provider: &MemoryIdentityProvider) -> Arc<Mutex<Vec<ProviderEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        provider.on_state_change(Box::new(move |event| sink.lock().unwrap().push(event)));
        seen
    }

    #[tokio::test]
    async fn test_listener_gets_ready_event() {
        let provider = MemoryIdentityProvider::new();
        let seen = recording(&provider);
        assert_eq!(*seen.lock().unwrap(), vec![ProviderEvent::SignedOut]);
    }

    #[tokio::test]
    async fn test_sign_in_errors() {
        let provider = MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret");
        assert_eq!(
            provider.sign_in("x@b.com", "secret").await,
            Err(ProviderErrorCode::UserNotFound)
        );
        assert_eq!(
            provider.sign_in("a@b.com", "nope").await,
            Err(ProviderErrorCode::WrongPassword)
        );
        assert!(provider.current_identity().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_then_duplicate() {
        let provider = MemoryIdentityProvider::new();
        let seen = recording(&provider);
        provider.sign_up("new@b.com", "longpass").await.unwrap();
        assert_eq!(
            provider.sign_up("new@b.com", "longpass").await,
            Err(ProviderErrorCode::EmailAlreadyInUse)
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let provider = MemoryIdentityProvider::new();
        provider.fail_next(ProviderErrorCode::NetworkRequestFailed);
        assert!(provider.sign_in_anonymous().await.is_err());
        assert!(provider.sign_in_anonymous().await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_listener() {
        let provider = MemoryIdentityProvider::new();
        let handle = provider.on_state_change(Box::new(|_| {}));
        assert_eq!(provider.listener_count(), 1);
        provider.remove_listener(handle);
        assert_eq!(provider.listener_count(), 0);
    }
}
