//! Shadow cache of the last meaningful fingerprint observed per resource.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::resource::{Fingerprint, ResourceIdentity};

/// Concurrency-safe map from resource identity to the last observed
/// [`Fingerprint`].
///
/// One mutex covers the whole map, so every operation is atomic with respect
/// to every other. Created once per dispatcher; there is no global instance.
#[derive(Debug, Default)]
pub struct ShadowCache {
    entries: Mutex<HashMap<ResourceIdentity, Fingerprint>>,
}

impl ShadowCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceIdentity, Fingerprint>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Shadow cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn get(&self, id: &ResourceIdentity) -> Option<Fingerprint> {
        self.lock().get(id).cloned()
    }

    pub fn put(&self, id: ResourceIdentity, fingerprint: Fingerprint) {
        self.lock().insert(id, fingerprint);
    }

    pub fn delete(&self, id: &ResourceIdentity) -> Option<Fingerprint> {
        self.lock().remove(id)
    }

    /// Runs `f` with exclusive access to the entry for `id`.
    ///
    /// The closure sees the current entry (or `None`) and may replace or clear
    /// it; whatever is left in the slot is written back before the lock is
    /// released. The closure must not block or call back into the cache.
    pub fn observe<R>(
        &self,
        id: &ResourceIdentity,
        f: impl FnOnce(&mut Option<Fingerprint>) -> R,
    ) -> R {
        let mut entries = self.lock();
        let mut slot = entries.get(id).cloned();
        let result = f(&mut slot);
        match slot {
            Some(fingerprint) => {
                entries.insert(id.clone(), fingerprint);
            }
            None => {
                entries.remove(id);
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
