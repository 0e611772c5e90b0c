//! Outcome reports for dispatched reconciles, and dispatcher counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::classifier::Classification;
use crate::resource::ResourceIdentity;

/// Which stage of a dispatched reconcile failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The store rejected the write because the version was stale.
    ApplyConflict,
    /// The store rejected the write for any other reason.
    ApplyOther,
    /// The reconciler itself returned an error.
    Reconcile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ReconcileOutcome {
    /// The reconciler's snapshot was written; `version` is the stored version.
    Applied { version: String },
    /// The reconciler found nothing to write.
    NoChange,
    /// Completed with an error. Nothing is retried; the next notification
    /// for the resource triggers a fresh attempt.
    Failed { kind: FailureKind, message: String },
}

impl ReconcileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed { .. })
    }
}

/// Emitted once per dispatched reconcile when it completes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub dispatch_id: String,
    pub identity: ResourceIdentity,
    pub classification: Classification,
    pub outcome: ReconcileOutcome,
    pub timestamp: DateTime<Utc>,
}

impl ReconcileReport {
    pub fn new(
        dispatch_id: impl Into<String>,
        identity: ResourceIdentity,
        classification: Classification,
        outcome: ReconcileOutcome,
    ) -> Self {
        Self {
            dispatch_id: dispatch_id.into(),
            identity,
            classification,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

/// Fans reconcile reports out to any number of subscribers.
#[derive(Clone)]
pub struct ReportBroadcaster {
    sender: broadcast::Sender<ReconcileReport>,
}

impl ReportBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn send(&self, report: ReconcileReport) {
        // No active receivers is fine
        let _ = self.sender.send(report);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileReport> {
        self.sender.subscribe()
    }
}

impl Default for ReportBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Point-in-time copy of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub notifications: u64,
    pub deleted: u64,
    pub unseen: u64,
    pub unchanged: u64,
    pub labels_changed: u64,
    pub spec_changed: u64,
    pub status_only: u64,
    pub dispatched: u64,
    pub applied: u64,
    pub no_change: u64,
    pub apply_conflicts: u64,
    pub apply_errors: u64,
    pub reconcile_errors: u64,
}

impl DispatchStats {
    /// Reconciles that have finished, whatever their outcome.
    pub fn completed(&self) -> u64 {
        self.applied + self.no_change + self.apply_conflicts + self.apply_errors + self.reconcile_errors
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    notifications: AtomicU64,
    deleted: AtomicU64,
    unseen: AtomicU64,
    unchanged: AtomicU64,
    labels_changed: AtomicU64,
    spec_changed: AtomicU64,
    status_only: AtomicU64,
    dispatched: AtomicU64,
    applied: AtomicU64,
    no_change: AtomicU64,
    apply_conflicts: AtomicU64,
    apply_errors: AtomicU64,
    reconcile_errors: AtomicU64,
}

impl Counters {
    pub(crate) fn record_classification(&self, classification: Classification) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        let counter = match classification {
            Classification::Deleted => &self.deleted,
            Classification::Unseen => &self.unseen,
            Classification::Unchanged => &self.unchanged,
            Classification::LabelsChanged => &self.labels_changed,
            Classification::SpecChanged => &self.spec_changed,
            Classification::StatusOnly => &self.status_only,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: &ReconcileOutcome) {
        let counter = match outcome {
            ReconcileOutcome::Applied { .. } => &self.applied,
            ReconcileOutcome::NoChange => &self.no_change,
            ReconcileOutcome::Failed { kind, .. } => match kind {
                FailureKind::ApplyConflict => &self.apply_conflicts,
                FailureKind::ApplyOther => &self.apply_errors,
                FailureKind::Reconcile => &self.reconcile_errors,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            notifications: self.notifications.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            unseen: self.unseen.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            labels_changed: self.labels_changed.load(Ordering::Relaxed),
            spec_changed: self.spec_changed.load(Ordering::Relaxed),
            status_only: self.status_only.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            no_change: self.no_change.load(Ordering::Relaxed),
            apply_conflicts: self.apply_conflicts.load(Ordering::Relaxed),
            apply_errors: self.apply_errors.load(Ordering::Relaxed),
            reconcile_errors: self.reconcile_errors.load(Ordering::Relaxed),
        }
    }
}
