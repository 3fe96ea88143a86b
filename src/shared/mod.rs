//! Shared Module
//!
//! Plain data types used by both the session manager and the document
//! controller: identities, document paths and records, configuration and the
//! error taxonomy. Nothing in here talks to a collaborator.

/// Identity snapshots and credentials
pub mod identity;

/// Document addressing, patches and records
pub mod document;

/// Error taxonomy and collaborator codes
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError, ConfigValidity, ProviderSettings};
pub use document::{DocumentLayout, DocumentPath, DocumentRecord, Fields, Patch, PatchValue, Snapshot};
pub use error::{AuthFailureKind, ProviderErrorCode, SessionError, StoreErrorCode, StoreOperation};
pub use identity::{Credentials, Identity};
