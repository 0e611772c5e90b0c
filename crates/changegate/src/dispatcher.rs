//! The change-aware dispatcher.
//!
//! A single consumption loop classifies every notification against the
//! shadow cache and records the new fingerprint in the same locked section.
//! Notifications that warrant action launch a reconcile task through the
//! injected [`Spawner`]; the loop never waits for those tasks.
//!
//! Reconciles for the same resource are not serialized. If two overlap, the
//! store's optimistic concurrency check decides which write wins and the
//! loser is reported as an apply conflict.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tokio::sync::{broadcast, Notify, Semaphore};
use tracing::Instrument;

use crate::cache::ShadowCache;
use crate::classifier::{classify, Classification};
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, Result, StoreError};
use crate::executor::{Spawner, TokioSpawner};
use crate::reconciler::{Reconciled, Reconciler};
use crate::report::{
    Counters, DispatchStats, FailureKind, ReconcileOutcome, ReconcileReport, ReportBroadcaster,
};
use crate::resource::{Notification, ResourceIdentity, Snapshot};
use crate::store::Store;
use crate::stream::ChangeStream;

/// What the dispatcher decided for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub identity: ResourceIdentity,
    pub classification: Classification,
    /// Set when a reconcile task was launched.
    pub dispatch_id: Option<String>,
}

impl Decision {
    pub fn dispatched(&self) -> bool {
        self.dispatch_id.is_some()
    }
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Held by a dispatched task; dropping it marks the task finished.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct Dispatcher<S> {
    cache: Arc<ShadowCache>,
    store: Arc<dyn Store<S>>,
    reconciler: Arc<dyn Reconciler<S>>,
    spawner: Arc<dyn Spawner>,
    limiter: Option<Arc<Semaphore>>,
    reports: ReportBroadcaster,
    counters: Arc<Counters>,
    in_flight: Arc<InFlight>,
    record_applied_versions: bool,
}

impl<S> Dispatcher<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Creates a dispatcher with an empty cache that spawns reconciles onto
    /// the ambient Tokio runtime.
    ///
    /// Fails with [`DispatchError::Config`] if `config` does not validate.
    pub fn new<St, R>(
        store: Arc<St>,
        reconciler: Arc<R>,
        config: &DispatcherConfig,
    ) -> Result<Self>
    where
        St: Store<S> + 'static,
        R: Reconciler<S> + 'static,
    {
        config.validate()?;

        let limiter = match config.max_concurrent_reconciles {
            0 => None,
            permits => Some(Arc::new(Semaphore::new(permits))),
        };

        Ok(Self {
            cache: Arc::new(ShadowCache::new()),
            store,
            reconciler,
            spawner: Arc::new(TokioSpawner::new()),
            limiter,
            reports: ReportBroadcaster::new(config.report_capacity),
            counters: Arc::new(Counters::default()),
            in_flight: Arc::new(InFlight::default()),
            record_applied_versions: config.record_applied_versions,
        })
    }

    /// Uses the given cache instead of a fresh one.
    pub fn with_cache(mut self, cache: Arc<ShadowCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Launches reconcile tasks through the given spawner.
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Returns a receiver for reconcile outcome reports.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<ReconcileReport> {
        self.reports.subscribe()
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Number of dispatched reconciles that have not finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Resolves once no dispatched reconcile is in flight. With a
    /// [`crate::ManualSpawner`] this only resolves after its queue is run.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await
    }

    /// Classifies one notification, updates the cache, and dispatches a
    /// reconcile if the classification calls for one.
    pub fn handle(&self, notification: Notification<S>) -> Decision {
        let identity = notification.identity();
        let observed = notification.fingerprint();
        let kind = notification.kind;

        let (classification, previous_generation) = self.cache.observe(&identity, |slot| {
            let previous_generation = slot.as_ref().map(|cached| cached.generation);
            let classification = classify(kind, &observed, slot.as_ref());
            match classification {
                Classification::Deleted => *slot = None,
                Classification::Unchanged => {}
                _ => *slot = Some(observed.clone()),
            }
            (classification, previous_generation)
        });
        self.counters.record_classification(classification);

        log::debug!(
            "Received {} for {} (version {}), classified {}",
            kind,
            identity,
            observed.version,
            classification
        );
        match classification {
            Classification::Deleted => log::info!("{} deleted, evicted from cache", identity),
            Classification::Unchanged => log::debug!(
                "{} version {} already handled, skip",
                identity,
                observed.version
            ),
            Classification::StatusOnly => {
                log::debug!("Status updated for {}, skip", identity)
            }
            Classification::Unseen => log::info!("No cache entry for {}, reconciling", identity),
            Classification::LabelsChanged => {
                log::info!("Labels updated for {}, reconciling", identity)
            }
            Classification::SpecChanged => log::info!(
                "Spec updated for {} (generation {:?} -> {}), reconciling",
                identity,
                previous_generation,
                observed.generation
            ),
        }

        let dispatch_id = if classification.should_dispatch() {
            Some(self.dispatch(identity.clone(), classification, notification.snapshot))
        } else {
            None
        };

        Decision {
            identity,
            classification,
            dispatch_id,
        }
    }

    /// Forces a reconcile of the resource's current state.
    ///
    /// The snapshot is fetched from the store and handled as a fresh `Added`
    /// notification, which always dispatches.
    pub async fn trigger(&self, id: &ResourceIdentity) -> Result<Decision> {
        let snapshot = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        log::info!("Manual reconcile requested for {}", id);
        Ok(self.handle(Notification::added(snapshot)))
    }

    /// Drains `stream` until it ends or fails.
    ///
    /// The end of the stream returns the final counters. A stream error is a
    /// subscription failure and is returned as
    /// [`DispatchError::Subscription`]. Dispatched reconciles keep running
    /// either way; await [`Dispatcher::wait_idle`] to drain them.
    pub async fn run(&self, stream: ChangeStream<S>) -> Result<DispatchStats> {
        self.run_until(stream, std::future::pending::<()>()).await
    }

    /// Like [`Dispatcher::run`], but also stops when `shutdown` resolves.
    pub async fn run_until<F>(
        &self,
        mut stream: ChangeStream<S>,
        shutdown: F,
    ) -> Result<DispatchStats>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        log::info!("Dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::info!("Dispatcher shutdown requested");
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok(notification)) => {
                        self.handle(notification);
                    }
                    Some(Err(e)) => {
                        log::error!("Change subscription failed: {}", e);
                        return Err(DispatchError::Subscription(e));
                    }
                    None => {
                        log::info!("Change stream ended");
                        break;
                    }
                },
            }
        }

        let stats = self.stats();
        log::info!(
            "Dispatcher stopped after {} notifications ({} dispatched)",
            stats.notifications,
            stats.dispatched
        );
        Ok(stats)
    }

    fn dispatch(
        &self,
        identity: ResourceIdentity,
        classification: Classification,
        snapshot: Snapshot<S>,
    ) -> String {
        let dispatch_id = uuid::Uuid::new_v4().to_string();
        self.counters.record_dispatch();

        let span = tracing::info_span!(
            "reconcile",
            resource = %identity,
            dispatch_id = %dispatch_id,
            classification = %classification,
        );

        let task = ReconcileTask {
            dispatch_id: dispatch_id.clone(),
            identity,
            classification,
            snapshot,
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            reconciler: Arc::clone(&self.reconciler),
            limiter: self.limiter.clone(),
            reports: self.reports.clone(),
            counters: Arc::clone(&self.counters),
            record_applied_versions: self.record_applied_versions,
            _in_flight: self.in_flight.enter(),
        };

        self.spawner.spawn(task.run().instrument(span).boxed());
        dispatch_id
    }
}

/// Everything one dispatched reconcile needs, moved into its task.
struct ReconcileTask<S> {
    dispatch_id: String,
    identity: ResourceIdentity,
    classification: Classification,
    snapshot: Snapshot<S>,
    cache: Arc<ShadowCache>,
    store: Arc<dyn Store<S>>,
    reconciler: Arc<dyn Reconciler<S>>,
    limiter: Option<Arc<Semaphore>>,
    reports: ReportBroadcaster,
    counters: Arc<Counters>,
    record_applied_versions: bool,
    _in_flight: InFlightGuard,
}

impl<S> ReconcileTask<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn run(self) {
        let _permit = match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };

        let outcome = self.execute().await;
        self.counters.record_outcome(&outcome);
        self.reports.send(ReconcileReport::new(
            self.dispatch_id.clone(),
            self.identity.clone(),
            self.classification,
            outcome,
        ));
    }

    async fn execute(&self) -> ReconcileOutcome {
        let updated = match self.reconciler.reconcile(self.snapshot.clone()).await {
            Ok(Reconciled::Apply(updated)) => updated,
            Ok(Reconciled::Unchanged) => {
                log::debug!("{} already in desired state", self.identity);
                return ReconcileOutcome::NoChange;
            }
            Err(e) => {
                log::error!("Failed to reconcile {}: {}", self.identity, e);
                return ReconcileOutcome::Failed {
                    kind: FailureKind::Reconcile,
                    message: e.to_string(),
                };
            }
        };

        match self.store.apply(updated).await {
            Ok(stored) => {
                let version = stored.metadata.resource_version.clone();
                if self.record_applied_versions {
                    self.record_applied(&stored);
                }
                log::info!("Reconciled {}, applied version {}", self.identity, version);
                ReconcileOutcome::Applied { version }
            }
            Err(e) if e.is_conflict() => {
                log::warn!(
                    "Apply for {} lost a version race, waiting for the next change: {}",
                    self.identity,
                    e
                );
                ReconcileOutcome::Failed {
                    kind: FailureKind::ApplyConflict,
                    message: e.to_string(),
                }
            }
            Err(e) => {
                log::error!("Failed to apply reconciled {}: {}", self.identity, e);
                ReconcileOutcome::Failed {
                    kind: FailureKind::ApplyOther,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Records the fingerprint of our own write so its echo is classified as
    /// unchanged.
    ///
    /// Only replaces the entry this task was dispatched for. If the loop has
    /// since cached a newer write, or the resource was evicted or recreated,
    /// the cache is left alone.
    fn record_applied(&self, stored: &Snapshot<S>) {
        let dispatched_version = &self.snapshot.metadata.resource_version;
        let fingerprint = stored.fingerprint();
        let recorded = self.cache.observe(&self.identity, |slot| match slot {
            Some(cached) if cached.version == *dispatched_version => {
                *cached = fingerprint;
                true
            }
            _ => false,
        });
        if !recorded {
            log::debug!(
                "Cache for {} moved past version {}, not recording applied version {}",
                self.identity,
                dispatched_version,
                stored.metadata.resource_version
            );
        }
    }
}
