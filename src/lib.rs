//! Doc Session - Identity-Gated Realtime Document Session
//!
//! This library keeps three things consistent while a user logs in, logs out
//! or switches identity:
//!
//! - the authentication state pushed by a remote identity provider,
//! - one realtime subscription to the user's own document in a remote store,
//! - the bootstrap write that creates that document the first time.
//!
//! # Module Structure
//!
//! - **`shared`** - Plain data types
//!   - Identities, credentials, document paths and records
//!   - Configuration and validation
//!   - Error taxonomy and collaborator codes
//!
//! - **`session`** - Identity Session Manager
//!   - Provider collaborator trait
//!   - `SessionState` machine driven by pushed provider events
//!
//! - **`sync`** - Document Synchronization Controller
//!   - Store collaborator trait
//!   - attach / detach / merge write with an in-flight bootstrap guard
//!
//! - **`view`** - Pure view selection from session state and config validity
//!
//! - **`app`** - `Session`, wiring the above together for a front end
//!
//! - **`memory`** - In-process provider and store for tests and demos
//!
//! # Usage
//!
//! ```rust,no_run
//! use doc_session::app::Session;
//! use doc_session::memory::{MemoryDocumentStore, MemoryIdentityProvider};
//! use doc_session::shared::AppConfig;
//! use doc_session::view::AuthMode;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! let provider = Arc::new(MemoryIdentityProvider::new());
//! let store = Arc::new(MemoryDocumentStore::new());
//!
//! let session = Session::new(config, provider, store);
//! session.start().await?;
//! println!("{:?}", session.view(AuthMode::SignIn));
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! Everything runs on one cooperative task. Provider pushes are queued and
//! applied one at a time; the document controller drops any store callback
//! that belongs to an attachment it has already released.
//!
//! # Error Handling
//!
//! Collaborator failures are translated to [`shared::SessionError`] at the
//! boundary. No raw provider or store message crosses it.

/// Shared types and data structures
pub mod shared;

/// Identity session state machine
pub mod session;

/// Per-user document synchronization
pub mod sync;

/// View selection
pub mod view;

/// Session wiring for front ends
pub mod app;

/// In-memory collaborators
pub mod memory;

pub use app::Session;
pub use session::{IdentitySessionManager, SessionState};
pub use shared::{Identity, SessionError};
pub use sync::DocumentController;
pub use view::{select_view, AuthMode, ViewState};
