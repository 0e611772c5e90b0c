//! In-memory store with optimistic concurrency and a change feed.
//!
//! Behaves like a K8s API server for a single resource type:
//! - every write gets a new store-wide revision as its `resource_version`
//! - `generation` starts at 1 and is bumped only when the spec changes
//! - `apply` ignores `status`; status is written through `update_status`
//! - every write is announced to subscribers in write order
//! - `resync` re-delivers the current state of every resource

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{StoreError, StreamError};
use crate::resource::{Notification, ResourceIdentity, Snapshot};
use crate::store::Store;
use crate::stream::{from_broadcast, ChangeSource, ChangeStream};

const DEFAULT_FEED_CAPACITY: usize = 1024;

pub struct MemoryStore<S> {
    objects: RwLock<HashMap<ResourceIdentity, Snapshot<S>>>,
    revision: AtomicU64,
    sender: broadcast::Sender<Notification<S>>,
}

impl<S> MemoryStore<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Creates a store whose change feed buffers up to `capacity`
    /// notifications per subscriber before the subscriber lags.
    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            objects: RwLock::new(HashMap::new()),
            revision: AtomicU64::new(0),
            sender,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ResourceIdentity, Snapshot<S>>> {
        match self.objects.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ResourceIdentity, Snapshot<S>>> {
        match self.objects.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn next_version(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn announce(&self, notification: Notification<S>) {
        // No subscribers is fine
        let _ = self.sender.send(notification);
    }

    /// Subscribes to the change feed. Only writes made after this call are
    /// delivered; call [`MemoryStore::resync`] to replay current state.
    pub fn subscribe_stream(&self) -> ChangeStream<S> {
        from_broadcast(self.sender.subscribe())
    }

    /// Creates a new resource. Its version and generation are assigned by
    /// the store.
    pub fn create(&self, mut snapshot: Snapshot<S>) -> Result<Snapshot<S>, StoreError> {
        let id = snapshot.identity();
        let mut objects = self.write();
        if objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }

        snapshot.metadata.resource_version = self.next_version();
        snapshot.metadata.generation = 1;
        objects.insert(id, snapshot.clone());
        self.announce(Notification::added(snapshot.clone()));
        Ok(snapshot)
    }

    /// Writes a snapshot, enforcing that its version is the current one.
    pub fn update(&self, snapshot: Snapshot<S>) -> Result<Snapshot<S>, StoreError> {
        let id = snapshot.identity();
        let mut objects = self.write();
        let current = objects
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if snapshot.metadata.resource_version != current.metadata.resource_version {
            return Err(StoreError::Conflict {
                identity: id,
                expected: snapshot.metadata.resource_version,
                actual: current.metadata.resource_version.clone(),
            });
        }

        if snapshot.spec != current.spec {
            current.metadata.generation += 1;
        }
        current.spec = snapshot.spec;
        current.metadata.labels = snapshot.metadata.labels;
        current.metadata.annotations = snapshot.metadata.annotations;
        current.metadata.resource_version = self.next_version();

        let stored = current.clone();
        self.announce(Notification::modified(stored.clone()));
        Ok(stored)
    }

    /// Replaces the status. Bumps the version, never the generation.
    pub fn update_status(
        &self,
        id: &ResourceIdentity,
        status: serde_json::Value,
    ) -> Result<Snapshot<S>, StoreError> {
        let mut objects = self.write();
        let current = objects
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        current.status = status;
        current.metadata.resource_version = self.next_version();

        let stored = current.clone();
        self.announce(Notification::modified(stored.clone()));
        Ok(stored)
    }

    /// Removes a resource and announces its last state.
    pub fn delete(&self, id: &ResourceIdentity) -> Result<Snapshot<S>, StoreError> {
        let mut objects = self.write();
        let removed = objects
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.announce(Notification::deleted(removed.clone()));
        Ok(removed)
    }

    /// Re-delivers every resource as `Modified` without writing anything.
    /// Returns how many notifications were sent.
    pub fn resync(&self) -> usize {
        let objects = self.read();
        let mut snapshots: Vec<_> = objects.values().cloned().collect();
        snapshots.sort_by(|a, b| a.identity().cmp(&b.identity()));

        let count = snapshots.len();
        for snapshot in snapshots {
            self.announce(Notification::modified(snapshot));
        }
        count
    }

    pub fn snapshot(&self, id: &ResourceIdentity) -> Option<Snapshot<S>> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl<S> Default for MemoryStore<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> Store<S> for MemoryStore<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    async fn get(&self, id: &ResourceIdentity) -> Result<Option<Snapshot<S>>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn apply(&self, snapshot: Snapshot<S>) -> Result<Snapshot<S>, StoreError> {
        self.update(snapshot)
    }
}

#[async_trait]
impl<S> ChangeSource<S> for MemoryStore<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    async fn subscribe(&self) -> Result<ChangeStream<S>, StreamError> {
        Ok(self.subscribe_stream())
    }
}
