//! Interface to the remote state store.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::resource::{ResourceIdentity, Snapshot};

/// Read and write access to the remote store.
///
/// Implementations must enforce optimistic concurrency on [`Store::apply`]:
/// a snapshot whose `metadata.resource_version` is not the store's current
/// version for that identity is rejected with [`StoreError::Conflict`].
#[async_trait]
pub trait Store<S>: Send + Sync {
    /// Fetches the current snapshot, or `None` if the resource does not exist.
    async fn get(&self, id: &ResourceIdentity) -> Result<Option<Snapshot<S>>, StoreError>;

    /// Writes a snapshot and returns the stored result with its new version.
    async fn apply(&self, snapshot: Snapshot<S>) -> Result<Snapshot<S>, StoreError>;
}
