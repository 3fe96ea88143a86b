//! Document synchronization
//!
//! The store collaborator interface and the controller that binds one
//! user-scoped document to the active identity.

/// Remote document store interface
pub mod store;

/// Attach/detach/write controller
pub mod controller;

pub use controller::{DocumentController, DocumentEvent, DocumentStatus};
pub use store::{DocumentStore, ErrorCallback, SnapshotCallback, SubscriptionHandle};
