//! # Document Synchronization Controller
//!
//! Binds the per-user document to the active identity.
//!
//! ## Attach sequence
//!
//! For a new identity the controller detaches the previous one, then runs
//! existence check, bootstrap write (only when missing) and subscribe, in that
//! order. The sequence is stored in an in-flight map keyed by identity id, so
//! a second `attach` for the same identity joins the running sequence instead
//! of racing a second bootstrap.
//!
//! ## Bootstrap guard
//!
//! The existence check and bootstrap write for an identity run as one shared
//! provisioning future, kept in its own map until it finishes. Releasing an
//! attachment does not drop it, so attach(A), attach(B), attach(A) waits on
//! the first A bootstrap instead of starting a second one.
//!
//! ## Generations
//!
//! Every detach bumps an attachment generation. Store callbacks and attach
//! sequences carry the generation they were started with; anything that
//! arrives for an older generation is dropped. This is what keeps identity
//! A's events out of identity B's session.
//!
//! ## Optimistic writes
//!
//! `write` merges the patch into the local record immediately and marks it
//! pending; the next snapshot from the store replaces it. A failed write rolls
//! the local record back.

use crate::session::manager::SessionDependent;
use crate::shared::document::{
    bootstrap_patch, DocumentLayout, DocumentPath, DocumentRecord, Fields, Patch, Snapshot,
};
use crate::shared::error::{SessionError, StoreErrorCode, StoreOperation};
use crate::shared::identity::Identity;
use crate::sync::store::{DocumentStore, SubscriptionHandle};
use chrono::Utc;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 64;

type AttachFuture = Shared<BoxFuture<'static, Result<(), SessionError>>>;
type ProvisionFuture = Shared<BoxFuture<'static, Result<Provisioned, SessionError>>>;

/// Outcome of the existence check and bootstrap for one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provisioned {
    /// The document exists
    Ready,
    /// The identity was unbound before the bootstrap write started
    Abandoned,
}

/// What presenters render: last known record plus the current channel error
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentStatus {
    pub record: Option<DocumentRecord>,
    /// Set by a subscription failure, cleared by the next snapshot
    pub error: Option<SessionError>,
}

/// Discrete notifications from the controller
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    Attached { path: DocumentPath },
    Bootstrapped { path: DocumentPath },
    Snapshot(DocumentRecord),
    LocalWrite(DocumentRecord),
    WriteConfirmed { path: DocumentPath },
    WriteFailed(SessionError),
    SubscriptionError(SessionError),
    AttachFailed(SessionError),
    Detached { path: DocumentPath },
}

#[derive(Debug, Default)]
struct Attachment {
    generation: u64,
    identity: Option<Identity>,
    path: Option<DocumentPath>,
    handle: Option<SubscriptionHandle>,
}

impl Attachment {
    fn is_bound_to(&self, identity_id: &str) -> bool {
        self.identity.as_ref().is_some_and(|i| i.id == identity_id)
    }
}

struct InFlight {
    generation: u64,
    future: AttachFuture,
}

struct Provisioning {
    token: u64,
    future: ProvisionFuture,
}

/// Released attachment waiting for its handle to be returned to the store
struct Released {
    path: DocumentPath,
    handle: Option<SubscriptionHandle>,
}

struct ControllerCore<S> {
    store: Arc<S>,
    layout: DocumentLayout,
    attachment: Mutex<Attachment>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    provisioning: Mutex<HashMap<String, Provisioning>>,
    status_tx: watch::Sender<DocumentStatus>,
    events_tx: broadcast::Sender<DocumentEvent>,
    stale_dropped: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controller for the active identity's document
pub struct DocumentController<S: DocumentStore> {
    core: Arc<ControllerCore<S>>,
}

impl<S: DocumentStore> Clone for DocumentController<S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<S: DocumentStore> DocumentController<S> {
    pub fn new(store: Arc<S>, layout: DocumentLayout) -> Self {
        let (status_tx, _) = watch::channel(DocumentStatus::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            core: Arc::new(ControllerCore {
                store,
                layout,
                attachment: Mutex::new(Attachment::default()),
                in_flight: Mutex::new(HashMap::new()),
                provisioning: Mutex::new(HashMap::new()),
                status_tx,
                events_tx,
                stale_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Bind the controller to `identity`.
    ///
    /// No-op when already attached to the same identity; joins the running
    /// sequence when one is in flight for it.
    pub async fn attach(&self, identity: &Identity) -> Result<(), SessionError> {
        let (future, released) = {
            let mut attachment = lock(&self.core.attachment);
            let mut in_flight = lock(&self.core.in_flight);
            let same = attachment.is_bound_to(&identity.id);

            if same && attachment.handle.is_some() {
                tracing::debug!("[DOCSYNC] Already attached to {}", identity.id);
                return Ok(());
            }

            let running = in_flight
                .get(&identity.id)
                .filter(|entry| same && entry.generation == attachment.generation)
                .map(|entry| entry.future.clone());

            match running {
                Some(future) => {
                    tracing::debug!("[DOCSYNC] Joining in-flight attach for {}", identity.id);
                    (future, None)
                }
                None => {
                    let released = if same {
                        None
                    } else {
                        self.core.release(&mut attachment, &mut in_flight)
                    };
                    attachment.generation += 1;
                    let generation = attachment.generation;
                    let path = self.core.layout.path_for(&identity.id);
                    attachment.identity = Some(identity.clone());
                    attachment.path = Some(path.clone());

                    let future = Arc::clone(&self.core)
                        .attach_sequence(identity.clone(), path, generation)
                        .boxed()
                        .shared();
                    in_flight.insert(
                        identity.id.clone(),
                        InFlight {
                            generation,
                            future: future.clone(),
                        },
                    );
                    (future, released)
                }
            }
        };

        if let Some(released) = released {
            self.core.finish_release(released);
        }
        future.await
    }

    /// Release the current subscription, if any. Safe to call repeatedly.
    pub fn detach(&self) {
        let released = {
            let mut attachment = lock(&self.core.attachment);
            let mut in_flight = lock(&self.core.in_flight);
            self.core.release(&mut attachment, &mut in_flight)
        };
        match released {
            Some(released) => self.core.finish_release(released),
            None => tracing::debug!("[DOCSYNC] Detach with nothing attached"),
        }
    }

    /// Merge `patch` into the attached document.
    ///
    /// Fields not named in `patch` are preserved.
    pub async fn write(&self, patch: Patch) -> Result<(), SessionError> {
        let (path, generation, previous) = {
            let attachment = lock(&self.core.attachment);
            let path = attachment.path.clone().ok_or(SessionError::NotAttached)?;
            let now = Utc::now();
            let mut previous = None;
            let mut optimistic = None;
            self.core.status_tx.send_modify(|status| {
                previous = status.record.clone();
                let record = status
                    .record
                    .get_or_insert_with(|| DocumentRecord::empty(path.clone()));
                record.apply_optimistic(&patch, now);
                optimistic = Some(record.clone());
            });
            if let Some(record) = optimistic {
                let _ = self.core.events_tx.send(DocumentEvent::LocalWrite(record));
            }
            (path, attachment.generation, previous)
        };

        match self.core.store.merge_write(&path, &patch).await {
            Ok(()) => {
                tracing::debug!("[DOCSYNC] Merge write of {} field(s) to {}", patch.len(), path);
                let _ = self
                    .core
                    .events_tx
                    .send(DocumentEvent::WriteConfirmed { path });
                Ok(())
            }
            Err(code) => {
                tracing::warn!("[DOCSYNC] Merge write to {} failed: {}", path, code);
                let error = SessionError::store(StoreOperation::MergeWrite, code);
                self.core.rollback(generation, previous, error.clone());
                let _ = self
                    .core
                    .events_tx
                    .send(DocumentEvent::WriteFailed(error.clone()));
                Err(error)
            }
        }
    }

    /// Rewrite the bootstrap fields, refreshing the access timestamp
    pub async fn touch(&self) -> Result<(), SessionError> {
        let identity = self.attached_identity().ok_or(SessionError::NotAttached)?;
        self.write(bootstrap_patch(&identity)).await
    }

    /// One-shot read of the attached document, bypassing the subscription
    pub async fn fetch(&self) -> Result<Option<Fields>, SessionError> {
        let path = self.current_path().ok_or(SessionError::NotAttached)?;
        self.core
            .store
            .read(&path)
            .await
            .map_err(|code| SessionError::store(StoreOperation::Read, code))
    }

    pub fn attached_identity(&self) -> Option<Identity> {
        lock(&self.core.attachment).identity.clone()
    }

    pub fn current_path(&self) -> Option<DocumentPath> {
        lock(&self.core.attachment).path.clone()
    }

    /// Whether a realtime channel is open
    pub fn is_subscribed(&self) -> bool {
        lock(&self.core.attachment).handle.is_some()
    }

    /// Snapshot of the current status
    pub fn status(&self) -> DocumentStatus {
        self.core.status_tx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<DocumentStatus> {
        self.core.status_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<DocumentEvent> {
        self.core.events_tx.subscribe()
    }

    /// Store callbacks dropped because their attachment was already released
    pub fn stale_events_dropped(&self) -> u64 {
        self.core.stale_dropped.load(Ordering::Relaxed)
    }
}

impl<S: DocumentStore> ControllerCore<S> {
    fn is_current(&self, generation: u64) -> bool {
        lock(&self.attachment).generation == generation
    }

    /// Clear the attachment under both locks; the handle is returned to the
    /// store by [`finish_release`](Self::finish_release) after they drop.
    fn release(
        &self,
        attachment: &mut Attachment,
        in_flight: &mut HashMap<String, InFlight>,
    ) -> Option<Released> {
        attachment.generation += 1;
        in_flight.clear();
        attachment.identity = None;
        let handle = attachment.handle.take();
        let path = attachment.path.take()?;
        self.status_tx.send_replace(DocumentStatus::default());
        Some(Released { path, handle })
    }

    fn finish_release(&self, released: Released) {
        if let Some(handle) = released.handle {
            self.store.unsubscribe(handle);
        }
        tracing::info!("[DOCSYNC] Detached from {}", released.path);
        let _ = self.events_tx.send(DocumentEvent::Detached {
            path: released.path,
        });
    }

    async fn attach_sequence(
        self: Arc<Self>,
        identity: Identity,
        path: DocumentPath,
        generation: u64,
    ) -> Result<(), SessionError> {
        let result = self.run_attach(&identity, &path, generation).await;

        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.get(&identity.id).map(|entry| entry.generation) == Some(generation) {
                in_flight.remove(&identity.id);
            }
        }

        if let Err(error) = &result {
            tracing::error!("[DOCSYNC] Attach of {} failed: {}", path, error);
            if self.is_current(generation) {
                self.status_tx.send_modify(|status| {
                    status.error = Some(error.clone());
                });
                let _ = self.events_tx.send(DocumentEvent::AttachFailed(error.clone()));
            }
        }
        result
    }

    async fn run_attach(
        self: &Arc<Self>,
        identity: &Identity,
        path: &DocumentPath,
        generation: u64,
    ) -> Result<(), SessionError> {
        tracing::info!("[DOCSYNC] Attaching {} at {}", identity.id, path);

        loop {
            let provisioned = self.provision(identity, path, generation).await?;
            if !self.is_current(generation) {
                tracing::debug!("[DOCSYNC] Attach of {} superseded before subscribing", path);
                return Ok(());
            }
            match provisioned {
                Provisioned::Ready => break,
                // an earlier sequence gave up on the bootstrap, run our own
                Provisioned::Abandoned => continue,
            }
        }

        let on_change = {
            let core = Arc::downgrade(self);
            Box::new(move |snapshot: Snapshot| {
                if let Some(core) = Weak::upgrade(&core) {
                    core.deliver_snapshot(generation, snapshot);
                }
            })
        };
        let on_error = {
            let core = Arc::downgrade(self);
            Box::new(move |code: StoreErrorCode| {
                if let Some(core) = Weak::upgrade(&core) {
                    core.deliver_error(generation, code);
                }
            })
        };

        // the store may deliver the first snapshot before returning
        let handle = self.store.subscribe(path, on_change, on_error);

        let stale = {
            let mut attachment = lock(&self.attachment);
            if attachment.generation == generation {
                attachment.handle = Some(handle);
                None
            } else {
                Some(handle)
            }
        };
        if let Some(handle) = stale {
            tracing::debug!("[DOCSYNC] Attach of {} superseded while subscribing", path);
            self.store.unsubscribe(handle);
            return Ok(());
        }

        tracing::info!("[DOCSYNC] Subscribed to {}", path);
        let _ = self
            .events_tx
            .send(DocumentEvent::Attached { path: path.clone() });
        Ok(())
    }

    /// Join the running existence check and bootstrap for `identity`, or
    /// start one. The entry outlives any release of the attachment.
    fn provision(
        self: &Arc<Self>,
        identity: &Identity,
        path: &DocumentPath,
        token: u64,
    ) -> ProvisionFuture {
        let mut provisioning = lock(&self.provisioning);
        if let Some(entry) = provisioning.get(&identity.id) {
            tracing::debug!("[DOCSYNC] Waiting on in-flight bootstrap for {}", identity.id);
            return entry.future.clone();
        }
        let future = Arc::clone(self)
            .provision_sequence(identity.clone(), path.clone(), token)
            .boxed()
            .shared();
        provisioning.insert(
            identity.id.clone(),
            Provisioning {
                token,
                future: future.clone(),
            },
        );
        future
    }

    async fn provision_sequence(
        self: Arc<Self>,
        identity: Identity,
        path: DocumentPath,
        token: u64,
    ) -> Result<Provisioned, SessionError> {
        let result = self.ensure_document(&identity, &path).await;
        let mut provisioning = lock(&self.provisioning);
        if provisioning.get(&identity.id).map(|entry| entry.token) == Some(token) {
            provisioning.remove(&identity.id);
        }
        result
    }

    async fn ensure_document(
        &self,
        identity: &Identity,
        path: &DocumentPath,
    ) -> Result<Provisioned, SessionError> {
        let exists = self
            .store
            .exists(path)
            .await
            .map_err(|code| SessionError::store(StoreOperation::ExistenceCheck, code))?;
        if exists {
            return Ok(Provisioned::Ready);
        }

        let bound = lock(&self.attachment).is_bound_to(&identity.id);
        if !bound {
            tracing::debug!("[DOCSYNC] Skipping bootstrap of {}, identity released", path);
            return Ok(Provisioned::Abandoned);
        }

        self.store
            .merge_write(path, &bootstrap_patch(identity))
            .await
            .map_err(|code| SessionError::store(StoreOperation::BootstrapWrite, code))?;
        tracing::info!("[DOCSYNC] Bootstrapped document {}", path);
        let _ = self
            .events_tx
            .send(DocumentEvent::Bootstrapped { path: path.clone() });
        Ok(Provisioned::Ready)
    }

    fn deliver_snapshot(&self, generation: u64, snapshot: Snapshot) {
        let attachment = lock(&self.attachment);
        let path = match &attachment.path {
            Some(path) if attachment.generation == generation => path.clone(),
            _ => {
                self.stale_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("[DOCSYNC] Dropping snapshot for released attachment");
                return;
            }
        };

        let mut delivered = None;
        self.status_tx.send_modify(|status| {
            let record = status
                .record
                .get_or_insert_with(|| DocumentRecord::empty(path.clone()));
            if record.path != path {
                *record = DocumentRecord::empty(path.clone());
            }
            record.apply_snapshot(snapshot);
            status.error = None;
            delivered = Some(record.clone());
        });
        if let Some(record) = delivered {
            let _ = self.events_tx.send(DocumentEvent::Snapshot(record));
        }
    }

    fn deliver_error(&self, generation: u64, code: StoreErrorCode) {
        let attachment = lock(&self.attachment);
        if attachment.generation != generation || attachment.path.is_none() {
            self.stale_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("[DOCSYNC] Dropping subscription error for released attachment");
            return;
        }

        tracing::warn!("[DOCSYNC] Subscription error: {}", code);
        let error = SessionError::Subscription { code };
        self.status_tx.send_modify(|status| {
            status.error = Some(error.clone());
        });
        let _ = self.events_tx.send(DocumentEvent::SubscriptionError(error));
    }

    /// Undo an optimistic write and surface its failure.
    ///
    /// With overlapping writes `previous` may predate a snapshot that arrived
    /// while the failed write was outstanding; the next snapshot replaces it.
    fn rollback(&self, generation: u64, previous: Option<DocumentRecord>, error: SessionError) {
        let attachment = lock(&self.attachment);
        if attachment.generation != generation {
            return;
        }
        self.status_tx.send_modify(|status| {
            // a snapshot since the write already carries the store's truth
            let pending = status
                .record
                .as_ref()
                .is_some_and(|record| record.has_pending_writes);
            if pending {
                status.record = previous;
            }
            status.error = Some(error);
        });
    }
}

impl<S: DocumentStore> SessionDependent for DocumentController<S> {
    fn identity_established(&self, identity: Identity) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(error) = self.attach(&identity).await {
                tracing::error!("[DOCSYNC] Could not attach {}: {}", identity.id, error);
            }
        })
    }

    fn identity_released(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.detach() })
    }
}
