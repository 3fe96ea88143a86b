//! Per-user document types
//!
//! A user's document lives at a path composed from a static namespace, the
//! identity id, a collection name and a fixed document name. This addressing
//! scheme is the only wire contract the core defines.
//!
//! # Example
//!
//! ```rust
//! use doc_session::shared::document::DocumentLayout;
//!
//! let layout = DocumentLayout::for_app("my-app", "dashboard_data", "profile");
//! assert_eq!(
//!     layout.path_for("u1").as_str(),
//!     "artifacts/my-app/users/u1/dashboard_data/profile"
//! );
//! assert_eq!(DocumentLayout::flat().path_for("u1").as_str(), "users/u1/profile");
//! ```

use crate::shared::identity::Identity;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field map of a stored document
pub type Fields = BTreeMap<String, Value>;

/// Field name holding the presence/access timestamp
pub const LAST_ACCESSED_FIELD: &str = "lastAccessed";

/// Status written into a freshly bootstrapped document
pub const ACTIVE_STATUS: &str = "active";

/// Render a timestamp the way the store stores server timestamps.
///
/// Optimistic local values use the same format so they stay field-compatible
/// with the confirmed value.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Address of a document in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How per-user document paths are composed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLayout {
    /// Leading segments shared by every user
    namespace: Vec<String>,
    /// Optional collection between the user segment and the document
    collection: Option<String>,
    document: String,
}

impl DocumentLayout {
    /// `artifacts/{app_id}/users/{uid}/{collection}/{document}`
    pub fn for_app(
        app_id: impl Into<String>,
        collection: impl Into<String>,
        document: impl Into<String>,
    ) -> Self {
        Self {
            namespace: vec!["artifacts".to_string(), app_id.into()],
            collection: Some(collection.into()),
            document: document.into(),
        }
    }

    /// `users/{uid}/profile`
    pub fn flat() -> Self {
        Self {
            namespace: Vec::new(),
            collection: None,
            document: "profile".to_string(),
        }
    }

    /// Path of the document owned by `identity_id`
    pub fn path_for(&self, identity_id: &str) -> DocumentPath {
        let mut segments: Vec<&str> = self.namespace.iter().map(String::as_str).collect();
        // a '/' in an id would shift every following segment
        let escaped = identity_id.replace('/', "%2F");
        segments.push("users");
        segments.push(&escaped);
        if let Some(collection) = &self.collection {
            segments.push(collection);
        }
        segments.push(&self.document);
        DocumentPath(segments.join("/"))
    }
}

/// Value of a field in a merge write
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    /// Literal value
    Value(Value),
    /// Resolved by the store's clock when the write is applied
    ServerTimestamp,
}

/// Merge-write payload: only the listed fields change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch(BTreeMap<String, PatchValue>);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to a literal value
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), PatchValue::Value(value.into()));
        self
    }

    /// Set `field` to the store's clock at write time
    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), PatchValue::ServerTimestamp);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PatchValue)> {
        self.0.iter()
    }

    /// Literal fields with server timestamps replaced by `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> Fields {
        self.0
            .iter()
            .map(|(field, value)| {
                let resolved = match value {
                    PatchValue::Value(v) => v.clone(),
                    PatchValue::ServerTimestamp => timestamp_value(now),
                };
                (field.clone(), resolved)
            })
            .collect()
    }

    /// Merge into `fields`: patched fields overwrite, all others are kept
    pub fn merge_into(&self, fields: &mut Fields, now: DateTime<Utc>) {
        fields.extend(self.resolve(now));
    }
}

impl From<Fields> for Patch {
    fn from(fields: Fields) -> Self {
        Self(
            fields
                .into_iter()
                .map(|(k, v)| (k, PatchValue::Value(v)))
                .collect(),
        )
    }
}

/// Fields written the first time a user's document is created.
///
/// Also used for the "touch" write that refreshes the access timestamp.
pub fn bootstrap_patch(identity: &Identity) -> Patch {
    let greeting = identity.email.as_deref().unwrap_or("User");
    Patch::new()
        .set(
            "message",
            format!("Hello, {}! This is your protected content.", greeting),
        )
        .server_timestamp(LAST_ACCESSED_FIELD)
        .set("userId", identity.id.clone())
        .set("status", ACTIVE_STATUS)
}

/// Full document state delivered by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// `None` when the document does not exist
    pub fields: Option<Fields>,
    /// Server time of the last write, when the document exists
    pub update_time: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn missing() -> Self {
        Self {
            fields: None,
            update_time: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }
}

/// Locally held view of the attached user's document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub path: DocumentPath,
    pub fields: Fields,
    pub exists: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Set while `fields` carries an optimistic write the store has not confirmed
    pub has_pending_writes: bool,
}

impl DocumentRecord {
    /// Record for a path nothing has been observed for yet
    pub fn empty(path: DocumentPath) -> Self {
        Self {
            path,
            fields: Fields::new(),
            exists: false,
            last_synced_at: None,
            has_pending_writes: false,
        }
    }

    /// Replace the record wholesale with the store's state
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.exists = snapshot.exists();
        self.fields = snapshot.fields.unwrap_or_default();
        if snapshot.update_time.is_some() {
            self.last_synced_at = snapshot.update_time;
        }
        self.has_pending_writes = false;
    }

    /// Merge a not-yet-confirmed write into the local fields
    pub fn apply_optimistic(&mut self, patch: &Patch, now: DateTime<Utc>) {
        patch.merge_into(&mut self.fields, now);
        self.exists = true;
        self.last_synced_at = Some(now);
        self.has_pending_writes = true;
    }

    /// Render the fields as pretty JSON for display
    pub fn fields_json(&self) -> String {
        serde_json::to_string_pretty(&self.fields).unwrap_or_default()
    }
}
