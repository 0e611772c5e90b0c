//! K8s-style resource snapshots and the identities and fingerprints derived
//! from them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Namespace + name key of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The minimal summary of a resource that proves it has not meaningfully
/// changed when it compares equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Opaque token the store bumps on every write.
    pub version: String,
    /// Bumped only when the spec changes.
    pub generation: i64,
    /// Compared structurally; iteration order is irrelevant.
    pub labels: HashMap<String, String>,
}

impl Fingerprint {
    pub fn new(version: impl Into<String>, generation: i64) -> Self {
        Self {
            version: version.into(),
            generation,
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Metadata for a resource, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Key-value labels for organizing and selecting resources.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    /// Key-value annotations for storing additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,

    /// Assigned by the store on every write. Empty until first persisted.
    #[serde(default)]
    pub resource_version: String,

    /// Assigned by the store; bumped only on spec changes.
    #[serde(default)]
    pub generation: i64,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn identity(&self) -> ResourceIdentity {
        ResourceIdentity::new(self.namespace.clone(), self.name.clone())
    }
}

/// Full state of a resource as delivered by the store.
///
/// `status` is opaque to the dispatcher; it only ever compares the
/// [`Fingerprint`] derived from `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<S> {
    pub api_version: String,

    pub kind: String,

    pub metadata: ObjectMeta,

    pub spec: S,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub status: serde_json::Value,
}

impl<S> Snapshot<S> {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        metadata: ObjectMeta,
        spec: S,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata,
            spec,
            status: serde_json::Value::Null,
        }
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.metadata.identity()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            version: self.metadata.resource_version.clone(),
            generation: self.metadata.generation,
            labels: self.metadata.labels.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

/// The kind of change a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Added => write!(f, "ADDED"),
            EventKind::Modified => write!(f, "MODIFIED"),
            EventKind::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A single "resource changed" notification. For `Deleted` the snapshot is
/// the last state the store knew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification<S> {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "object")]
    pub snapshot: Snapshot<S>,
}

impl<S> Notification<S> {
    pub fn new(kind: EventKind, snapshot: Snapshot<S>) -> Self {
        Self { kind, snapshot }
    }

    pub fn added(snapshot: Snapshot<S>) -> Self {
        Self::new(EventKind::Added, snapshot)
    }

    pub fn modified(snapshot: Snapshot<S>) -> Self {
        Self::new(EventKind::Modified, snapshot)
    }

    pub fn deleted(snapshot: Snapshot<S>) -> Self {
        Self::new(EventKind::Deleted, snapshot)
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.snapshot.identity()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.snapshot.fingerprint()
    }
}
