//! In-process realtime document store
//!
//! Documents live in a map keyed by path. Every applied write resolves
//! server timestamps against the store clock and pushes the full document to
//! each subscriber of that path. A new subscriber receives the current state
//! right away. Per-path call counters and one-shot fault injection make the
//! controller's guarantees observable.

use crate::shared::document::{DocumentPath, Fields, Patch, Snapshot};
use crate::shared::error::StoreErrorCode;
use crate::sync::store::{DocumentStore, ErrorCallback, SnapshotCallback, SubscriptionHandle};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Store calls that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Exists,
    Read,
    Write,
}

/// Per-path call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathStats {
    pub exists_calls: usize,
    pub reads: usize,
    pub writes: usize,
    pub subscribes: usize,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    fields: Fields,
    update_time: DateTime<Utc>,
}

impl StoredDocument {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            fields: Some(self.fields.clone()),
            update_time: Some(self.update_time),
        }
    }
}

struct Subscriber {
    path: DocumentPath,
    on_change: Arc<dyn Fn(Snapshot) + Send + Sync>,
    on_error: Arc<dyn Fn(StoreErrorCode) + Send + Sync>,
}

#[derive(Default)]
struct StoreInner {
    documents: HashMap<DocumentPath, StoredDocument>,
    subscribers: HashMap<Uuid, Subscriber>,
    stats: HashMap<DocumentPath, PathStats>,
    faults: HashMap<FaultPoint, StoreErrorCode>,
    clock: Option<DateTime<Utc>>,
}

impl StoreInner {
    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn stats(&mut self, path: &DocumentPath) -> &mut PathStats {
        self.stats.entry(path.clone()).or_default()
    }

    fn take_fault(&mut self, point: FaultPoint) -> Result<(), StoreErrorCode> {
        match self.faults.remove(&point) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn snapshot(&self, path: &DocumentPath) -> Snapshot {
        self.documents
            .get(path)
            .map(StoredDocument::snapshot)
            .unwrap_or_else(Snapshot::missing)
    }

    fn listeners_for(&self, path: &DocumentPath) -> Vec<Arc<dyn Fn(Snapshot) + Send + Sync>> {
        self.subscribers
            .values()
            .filter(|s| &s.path == path)
            .map(|s| Arc::clone(&s.on_change))
            .collect()
    }
}

/// Document store backed by an in-memory map
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<StoreInner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pin the server clock; `Utc::now()` is used otherwise
    pub fn set_clock(&self, at: DateTime<Utc>) {
        self.inner().clock = Some(at);
    }

    /// Make the next call at `point` fail with `code`
    pub fn fail_next(&self, point: FaultPoint, code: StoreErrorCode) {
        self.inner().faults.insert(point, code);
    }

    /// Stored fields at `path`
    pub fn document(&self, path: &DocumentPath) -> Option<Fields> {
        self.inner().documents.get(path).map(|d| d.fields.clone())
    }

    pub fn stats(&self, path: &DocumentPath) -> PathStats {
        self.inner().stats.get(path).copied().unwrap_or_default()
    }

    /// Open channels for `path`
    pub fn subscriber_count(&self, path: &DocumentPath) -> usize {
        self.inner()
            .subscribers
            .values()
            .filter(|s| &s.path == path)
            .count()
    }

    /// Apply a write from another client, without touching the counters
    pub fn remote_write(&self, path: &DocumentPath, patch: &Patch) {
        let (snapshot, listeners) = {
            let mut inner = self.inner();
            let snapshot = Self::apply(&mut inner, path, patch);
            (snapshot, inner.listeners_for(path))
        };
        notify(listeners, snapshot);
    }

    /// Delete the document at `path`
    pub fn delete(&self, path: &DocumentPath) {
        let listeners = {
            let mut inner = self.inner();
            inner.documents.remove(path);
            inner.listeners_for(path)
        };
        notify(listeners, Snapshot::missing());
    }

    /// Fail every channel open on `path`, as a permission change would
    pub fn fail_subscriptions(&self, path: &DocumentPath, code: StoreErrorCode) {
        let callbacks: Vec<_> = self
            .inner()
            .subscribers
            .values()
            .filter(|s| &s.path == path)
            .map(|s| Arc::clone(&s.on_error))
            .collect();
        for on_error in callbacks {
            on_error(code);
        }
    }

    fn apply(inner: &mut StoreInner, path: &DocumentPath, patch: &Patch) -> Snapshot {
        let now = inner.now();
        let document = inner
            .documents
            .entry(path.clone())
            .or_insert_with(|| StoredDocument {
                fields: Fields::new(),
                update_time: now,
            });
        patch.merge_into(&mut document.fields, now);
        document.update_time = now;
        document.snapshot()
    }
}

fn notify(listeners: Vec<Arc<dyn Fn(Snapshot) + Send + Sync>>, snapshot: Snapshot) {
    for listener in listeners {
        listener(snapshot.clone());
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn exists(&self, path: &DocumentPath) -> Result<bool, StoreErrorCode> {
        tokio::task::yield_now().await;
        let mut inner = self.inner();
        inner.stats(path).exists_calls += 1;
        inner.take_fault(FaultPoint::Exists)?;
        Ok(inner.documents.contains_key(path))
    }

    async fn read(&self, path: &DocumentPath) -> Result<Option<Fields>, StoreErrorCode> {
        tokio::task::yield_now().await;
        let mut inner = self.inner();
        inner.stats(path).reads += 1;
        inner.take_fault(FaultPoint::Read)?;
        Ok(inner.documents.get(path).map(|d| d.fields.clone()))
    }

    async fn merge_write(&self, path: &DocumentPath, patch: &Patch) -> Result<(), StoreErrorCode> {
        tokio::task::yield_now().await;
        let (snapshot, listeners) = {
            let mut inner = self.inner();
            inner.stats(path).writes += 1;
            inner.take_fault(FaultPoint::Write)?;
            let snapshot = Self::apply(&mut inner, path, patch);
            (snapshot, inner.listeners_for(path))
        };
        tracing::debug!("[STORE] Applied merge write to {}", path);
        notify(listeners, snapshot);
        Ok(())
    }

    fn subscribe(
        &self,
        path: &DocumentPath,
        on_change: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new();
        let on_change: Arc<dyn Fn(Snapshot) + Send + Sync> = Arc::from(on_change);
        let snapshot = {
            let mut inner = self.inner();
            inner.stats(path).subscribes += 1;
            inner.subscribers.insert(
                handle.id(),
                Subscriber {
                    path: path.clone(),
                    on_change: Arc::clone(&on_change),
                    on_error: Arc::from(on_error),
                },
            );
            inner.snapshot(path)
        };
        on_change(snapshot);
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if self.inner().subscribers.remove(&handle.id()).is_none() {
            tracing::warn!("[STORE] Unsubscribe of unknown handle {}", handle.id());
        }
    }
}
