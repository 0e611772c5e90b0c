//! Test harness running a dispatcher against a memory store.
//!
//! The `TestHarness` owns:
//! - A `MemoryStore` of deployments and its change feed
//! - A `Dispatcher` consuming that feed on a background task
//! - A `ReplicaLabeler` reconciler that records every call
//! - Optionally a `DelayedApply` wrapper that holds back apply responses

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use changegate::{
    DispatchError, DispatchStats, Dispatcher, DispatcherConfig, MemoryStore, ReconcileError,
    Reconciled, Reconciler, ResourceIdentity, ShadowCache, Snapshot, Store, StoreError,
};

use super::builders::DeploymentSpec;

pub const REPLICA_LABEL: &str = "multipleReplicas";

/// Labels each deployment with whether it runs more than one replica.
#[derive(Default)]
pub struct ReplicaLabeler {
    calls: AtomicUsize,
    seen: Mutex<Vec<(ResourceIdentity, String)>>,
}

impl ReplicaLabeler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identity and version of every snapshot reconciled, in call order.
    pub fn seen(&self) -> Vec<(ResourceIdentity, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reconciler<DeploymentSpec> for ReplicaLabeler {
    async fn reconcile(
        &self,
        mut snapshot: Snapshot<DeploymentSpec>,
    ) -> Result<Reconciled<DeploymentSpec>, ReconcileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((
            snapshot.identity(),
            snapshot.metadata.resource_version.clone(),
        ));

        let desired = if snapshot.spec.replicas > 1 { "true" } else { "false" };
        if snapshot.metadata.labels.get(REPLICA_LABEL).map(String::as_str) == Some(desired) {
            return Ok(Reconciled::Unchanged);
        }

        snapshot
            .metadata
            .labels
            .insert(REPLICA_LABEL.to_string(), desired.to_string());
        Ok(Reconciled::Apply(snapshot))
    }
}

/// Isolated store + dispatcher pair for integration tests.
pub struct TestHarness {
    pub store: Arc<MemoryStore<DeploymentSpec>>,
    pub dispatcher: Arc<Dispatcher<DeploymentSpec>>,
    pub reconciler: Arc<ReplicaLabeler>,
    pub cache: Arc<ShadowCache>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<DispatchStats, DispatchError>>>,
}

impl TestHarness {
    /// Creates a harness with the default config. Call `start` to begin
    /// consuming the change feed.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self::build(config, None)
    }

    /// Like `with_config`, but every apply response reaches the dispatcher
    /// `delay` after the write (and its notification) landed in the store.
    pub fn with_apply_delay(config: DispatcherConfig, delay: Duration) -> Self {
        Self::build(config, Some(delay))
    }

    fn build(config: DispatcherConfig, apply_delay: Option<Duration>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Arc::new(ReplicaLabeler::default());
        let cache = Arc::new(ShadowCache::new());
        let dispatcher = match apply_delay {
            None => Dispatcher::new(Arc::clone(&store), Arc::clone(&reconciler), &config),
            Some(delay) => Dispatcher::new(
                Arc::new(DelayedApply {
                    inner: Arc::clone(&store),
                    delay,
                }),
                Arc::clone(&reconciler),
                &config,
            ),
        }
        .unwrap()
        .with_cache(Arc::clone(&cache));

        Self {
            store,
            dispatcher: Arc::new(dispatcher),
            reconciler,
            cache,
            shutdown: None,
            task: None,
        }
    }

    /// Subscribes to the store and runs the dispatcher in the background.
    pub fn start(&mut self) {
        let stream = self.store.subscribe_stream();
        let dispatcher = Arc::clone(&self.dispatcher);
        let (tx, rx) = oneshot::channel::<()>();

        self.shutdown = Some(tx);
        self.task = Some(tokio::spawn(async move {
            dispatcher
                .run_until(stream, async {
                    let _ = rx.await;
                })
                .await
        }));
    }

    /// Waits until at least `notifications` have been handled and every
    /// dispatched reconcile has finished.
    pub async fn settle(&self, notifications: u64) -> DispatchStats {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let stats = self.dispatcher.stats();
            if stats.notifications >= notifications && self.dispatcher.in_flight() == 0 {
                return stats;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "dispatcher did not settle: expected {} notifications, stats {:?}",
                    notifications, stats
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Waits until at least `notifications` have been handled, ignoring
    /// reconciles still in flight.
    pub async fn wait_for_notifications(&self, notifications: u64) -> DispatchStats {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let stats = self.dispatcher.stats();
            if stats.notifications >= notifications {
                return stats;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "expected {} notifications, stats {:?}",
                    notifications, stats
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stops the consumption loop and returns its result.
    pub async fn stop(&mut self) -> Result<DispatchStats, DispatchError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let task = self.task.take().expect("harness was not started");
        let result = task.await.expect("dispatcher task panicked");
        self.dispatcher.wait_idle().await;
        result
    }

    pub fn label(&self, id: &ResourceIdentity) -> Option<String> {
        self.store
            .snapshot(id)
            .and_then(|d| d.metadata.labels.get(REPLICA_LABEL).cloned())
    }
}

/// Store wrapper whose apply response arrives late: the write and its
/// notification land immediately, the caller hears back after `delay`.
pub struct DelayedApply {
    inner: Arc<MemoryStore<DeploymentSpec>>,
    delay: Duration,
}

#[async_trait]
impl Store<DeploymentSpec> for DelayedApply {
    async fn get(
        &self,
        id: &ResourceIdentity,
    ) -> Result<Option<Snapshot<DeploymentSpec>>, StoreError> {
        Ok(self.inner.snapshot(id))
    }

    async fn apply(
        &self,
        snapshot: Snapshot<DeploymentSpec>,
    ) -> Result<Snapshot<DeploymentSpec>, StoreError> {
        let stored = self.inner.update(snapshot)?;
        tokio::time::sleep(self.delay).await;
        Ok(stored)
    }
}
