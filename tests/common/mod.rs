//! Common test utilities and helpers
//!
//! - Session and config fixtures over the in-memory collaborators
//! - `RecordingStore`, a store that keeps every callback it was ever given so
//!   tests can replay deliveries a real network might still have in flight
//! - `GatedStore`, a store whose first merge write waits until it is let go

#![allow(dead_code)]

use doc_session::memory::{MemoryDocumentStore, MemoryIdentityProvider};
use doc_session::session::{ProviderEvent, SessionDependent, SessionState};
use doc_session::shared::document::{DocumentLayout, DocumentPath, Fields, Patch, Snapshot};
use doc_session::shared::{AppConfig, Identity, ProviderSettings, StoreErrorCode};
use doc_session::sync::{DocumentStore, ErrorCallback, SnapshotCallback, SubscriptionHandle};
use doc_session::Session;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

pub type MemorySession = Session<MemoryIdentityProvider, MemoryDocumentStore>;

/// Configuration that passes validation
pub fn valid_config() -> AppConfig {
    AppConfig::builder()
        .provider(ProviderSettings {
            api_key: "test-key".to_string(),
            project_id: "test-project".to_string(),
            auth_domain: None,
        })
        .build()
        .expect("test config is valid")
}

/// `users/{id}/profile`
pub fn profile_path(identity_id: &str) -> DocumentPath {
    DocumentLayout::flat().path_for(identity_id)
}

/// Session over `provider` and a fresh store, using the flat layout
pub fn flat_session(
    provider: MemoryIdentityProvider,
) -> (MemorySession, Arc<MemoryIdentityProvider>, Arc<MemoryDocumentStore>) {
    flat_session_with(valid_config(), provider)
}

pub fn flat_session_with(
    config: AppConfig,
    provider: MemoryIdentityProvider,
) -> (MemorySession, Arc<MemoryIdentityProvider>, Arc<MemoryDocumentStore>) {
    let provider = Arc::new(provider);
    let store = Arc::new(MemoryDocumentStore::new());
    let session = Session::with_layout(
        config,
        DocumentLayout::flat(),
        Arc::clone(&provider),
        Arc::clone(&store),
    );
    (session, provider, store)
}

pub fn user(id: &str) -> Identity {
    Identity::with_email(id, format!("{id}@example.com"))
}

pub fn event_for(identity: Option<&Identity>) -> ProviderEvent {
    ProviderEvent::from(identity.cloned())
}

/// What a dependent saw when it was asked to release an identity
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseObservation {
    pub state_at_release: SessionState,
    pub open_subscriptions: usize,
}

/// Dependent registered after the controller, recording the world at release time
pub struct ReleaseProbe {
    pub state: watch::Receiver<SessionState>,
    pub store: Arc<MemoryDocumentStore>,
    pub path: DocumentPath,
    pub observed: Mutex<Vec<ReleaseObservation>>,
}

impl SessionDependent for ReleaseProbe {
    fn identity_established(&self, _identity: Identity) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn identity_released(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let observation = ReleaseObservation {
                state_at_release: self.state.borrow().clone(),
                open_subscriptions: self.store.subscriber_count(&self.path),
            };
            self.observed.lock().unwrap().push(observation);
        })
    }
}

struct Recorded {
    path: DocumentPath,
    on_change: Arc<dyn Fn(Snapshot) + Send + Sync>,
    on_error: Arc<dyn Fn(StoreErrorCode) + Send + Sync>,
}

/// Store that never forgets a callback, even after unsubscribe
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryDocumentStore,
    recorded: Mutex<Vec<Recorded>>,
    unsubscribed: Mutex<usize>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every callback ever registered for `path`
    pub fn replay(&self, path: &DocumentPath, fields: Fields) {
        let callbacks: Vec<_> = self
            .recorded
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.path == path)
            .map(|r| Arc::clone(&r.on_change))
            .collect();
        for callback in callbacks {
            callback(Snapshot {
                fields: Some(fields.clone()),
                update_time: None,
            });
        }
    }

    /// Invoke every error callback ever registered for `path`
    pub fn replay_error(&self, path: &DocumentPath, code: StoreErrorCode) {
        let callbacks: Vec<_> = self
            .recorded
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.path == path)
            .map(|r| Arc::clone(&r.on_error))
            .collect();
        for callback in callbacks {
            callback(code);
        }
    }

    pub fn unsubscribe_count(&self) -> usize {
        *self.unsubscribed.lock().unwrap()
    }
}

impl DocumentStore for RecordingStore {
    async fn exists(&self, path: &DocumentPath) -> Result<bool, StoreErrorCode> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &DocumentPath) -> Result<Option<Fields>, StoreErrorCode> {
        self.inner.read(path).await
    }

    async fn merge_write(&self, path: &DocumentPath, patch: &Patch) -> Result<(), StoreErrorCode> {
        self.inner.merge_write(path, patch).await
    }

    fn subscribe(
        &self,
        path: &DocumentPath,
        on_change: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> SubscriptionHandle {
        self.recorded.lock().unwrap().push(Recorded {
            path: path.clone(),
            on_change: Arc::from(on_change),
            on_error: Arc::from(on_error),
        });
        SubscriptionHandle::new()
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) {
        *self.unsubscribed.lock().unwrap() += 1;
    }
}

/// Store that holds its first merge write open until [`open`](Self::open)
pub struct GatedStore {
    pub inner: MemoryDocumentStore,
    armed: AtomicBool,
    entered: Notify,
    gate: Notify,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            gate: Notify::new(),
        }
    }

    /// Resolves once the held write has started
    pub async fn write_started(&self) {
        self.entered.notified().await;
    }

    /// Let the held write through
    pub fn open(&self) {
        self.gate.notify_one();
    }
}

impl DocumentStore for GatedStore {
    async fn exists(&self, path: &DocumentPath) -> Result<bool, StoreErrorCode> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &DocumentPath) -> Result<Option<Fields>, StoreErrorCode> {
        self.inner.read(path).await
    }

    async fn merge_write(&self, path: &DocumentPath, patch: &Patch) -> Result<(), StoreErrorCode> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        self.inner.merge_write(path, patch).await
    }

    fn subscribe(
        &self,
        path: &DocumentPath,
        on_change: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> SubscriptionHandle {
        self.inner.subscribe(path, on_change, on_error)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.inner.unsubscribe(handle)
    }
}
