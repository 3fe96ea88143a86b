//! In-memory collaborators
//!
//! Process-local implementations of [`IdentityProvider`](crate::session::IdentityProvider)
//! and [`DocumentStore`](crate::sync::DocumentStore), used by the demo binary
//! and the test suites.

pub mod provider;
pub mod store;

pub use provider::MemoryIdentityProvider;
pub use store::{FaultPoint, MemoryDocumentStore, PathStats};
