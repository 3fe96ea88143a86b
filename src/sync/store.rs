//! Remote document store collaborator
//!
//! One-shot calls are async and report failures by [`StoreErrorCode`].
//! Realtime subscriptions are callback based: the store calls `on_change`
//! with the full document state after every change (and once right after
//! subscribing), or `on_error` when the channel fails.

use crate::shared::document::{DocumentPath, Fields, Patch, Snapshot};
use crate::shared::error::StoreErrorCode;
use std::future::Future;
use uuid::Uuid;

/// Receives the full document state
pub type SnapshotCallback = Box<dyn Fn(Snapshot) + Send + Sync>;

/// Receives subscription transport failures
pub type ErrorCallback = Box<dyn Fn(StoreErrorCode) + Send + Sync>;

/// One open realtime channel.
///
/// Not `Clone`: handing it back to [`DocumentStore::unsubscribe`] consumes it,
/// so a handle is released at most once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote realtime document store
pub trait DocumentStore: Send + Sync + 'static {
    /// Whether a document exists at `path`
    fn exists(
        &self,
        path: &DocumentPath,
    ) -> impl Future<Output = Result<bool, StoreErrorCode>> + Send;

    /// One-shot read; `None` when the document does not exist
    fn read(
        &self,
        path: &DocumentPath,
    ) -> impl Future<Output = Result<Option<Fields>, StoreErrorCode>> + Send;

    /// Merge `patch` into the document, creating it when missing.
    ///
    /// Fields absent from `patch` are preserved.
    fn merge_write(
        &self,
        path: &DocumentPath,
        patch: &Patch,
    ) -> impl Future<Output = Result<(), StoreErrorCode>> + Send;

    /// Open a realtime channel for `path`
    fn subscribe(
        &self,
        path: &DocumentPath,
        on_change: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> SubscriptionHandle;

    /// Close a channel opened by [`subscribe`](Self::subscribe)
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
