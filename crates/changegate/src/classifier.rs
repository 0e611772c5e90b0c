//! Decides whether a change notification is worth reconciling.

use serde::Serialize;

use crate::resource::{EventKind, Fingerprint};

/// Outcome of comparing an incoming notification with the cached fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    /// Resource was deleted; evict, never reconcile.
    Deleted,
    /// First sighting (or re-add after deletion).
    Unseen,
    /// Same version as already processed: duplicate delivery or resync echo.
    Unchanged,
    /// Label set differs from the cached one.
    LabelsChanged,
    /// Generation moved, so the spec changed.
    SpecChanged,
    /// Only the version moved: a status or other non-meaningful write.
    StatusOnly,
}

impl Classification {
    /// Returns true if this classification requires a reconcile.
    pub fn should_dispatch(self) -> bool {
        matches!(
            self,
            Classification::Unseen | Classification::LabelsChanged | Classification::SpecChanged
        )
    }

    /// Returns all classifications.
    pub fn all() -> &'static [Classification] {
        &[
            Classification::Deleted,
            Classification::Unseen,
            Classification::Unchanged,
            Classification::LabelsChanged,
            Classification::SpecChanged,
            Classification::StatusOnly,
        ]
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Deleted => write!(f, "Deleted"),
            Classification::Unseen => write!(f, "Unseen"),
            Classification::Unchanged => write!(f, "Unchanged"),
            Classification::LabelsChanged => write!(f, "LabelsChanged"),
            Classification::SpecChanged => write!(f, "SpecChanged"),
            Classification::StatusOnly => write!(f, "StatusOnly"),
        }
    }
}

/// Classifies a notification against the cached fingerprint, if any.
///
/// Rules are checked in order and the first match wins. When several fields
/// change at once the order favours dispatching: labels are checked before
/// generation, and a label or spec change is never reported as status-only.
pub fn classify(
    kind: EventKind,
    observed: &Fingerprint,
    cached: Option<&Fingerprint>,
) -> Classification {
    if kind == EventKind::Deleted {
        return Classification::Deleted;
    }

    let cached = match (kind, cached) {
        (EventKind::Added, _) | (_, None) => return Classification::Unseen,
        (_, Some(cached)) => cached,
    };

    if observed.version == cached.version {
        return Classification::Unchanged;
    }

    if observed.labels != cached.labels {
        return Classification::LabelsChanged;
    }

    if observed.generation != cached.generation {
        return Classification::SpecChanged;
    }

    Classification::StatusOnly
}
