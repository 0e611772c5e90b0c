//! Contract for resource-specific reconcile logic.

use std::future::Future;

use async_trait::async_trait;

use crate::error::ReconcileError;
use crate::resource::Snapshot;

/// What a reconcile run wants written back to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled<S> {
    /// Submit this snapshot through [`crate::Store::apply`]. Its
    /// `resource_version` should be the one the reconcile read.
    Apply(Snapshot<S>),
    /// Desired state already holds; nothing to write.
    Unchanged,
}

/// Business logic that drives a resource towards its desired state.
///
/// Must be idempotent: the dispatcher delivers at least once and may run two
/// reconciles for the same resource concurrently.
#[async_trait]
pub trait Reconciler<S>: Send + Sync {
    async fn reconcile(&self, snapshot: Snapshot<S>) -> Result<Reconciled<S>, ReconcileError>;
}

/// A [`Reconciler`] backed by an async closure. See [`reconciler_fn`].
pub struct FnReconciler<F> {
    f: F,
}

/// Wraps an async closure as a [`Reconciler`].
pub fn reconciler_fn<S, F, Fut>(f: F) -> FnReconciler<F>
where
    F: Fn(Snapshot<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reconciled<S>, ReconcileError>> + Send,
{
    FnReconciler { f }
}

#[async_trait]
impl<S, F, Fut> Reconciler<S> for FnReconciler<F>
where
    S: Send + 'static,
    F: Fn(Snapshot<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reconciled<S>, ReconcileError>> + Send,
{
    async fn reconcile(&self, snapshot: Snapshot<S>) -> Result<Reconciled<S>, ReconcileError> {
        (self.f)(snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ObjectMeta;

    #[tokio::test]
    async fn test_reconciler_fn() {
        let reconciler = reconciler_fn(|mut snapshot: Snapshot<u32>| async move {
            if snapshot.spec > 1 {
                snapshot.metadata.labels.insert("scaled".to_string(), "true".to_string());
                Ok(Reconciled::Apply(snapshot))
            } else {
                Ok(Reconciled::Unchanged)
            }
        });

        let single = Snapshot::new("v1", "App", ObjectMeta::new("default", "a"), 1);
        assert_eq!(
            reconciler.reconcile(single).await.unwrap(),
            Reconciled::Unchanged
        );

        let scaled = Snapshot::new("v1", "App", ObjectMeta::new("default", "b"), 3);
        match reconciler.reconcile(scaled).await.unwrap() {
            Reconciled::Apply(updated) => {
                assert_eq!(
                    updated.metadata.labels.get("scaled").map(String::as_str),
                    Some("true")
                );
            }
            Reconciled::Unchanged => panic!("expected an update"),
        }
    }

    #[tokio::test]
    async fn test_reconciler_fn_error() {
        let reconciler = reconciler_fn(|_snapshot: Snapshot<u32>| async move {
            Err::<Reconciled<u32>, _>(ReconcileError::failed("image pull secret missing"))
        });
        let snapshot = Snapshot::new("v1", "App", ObjectMeta::new("default", "a"), 1);
        let err = reconciler.reconcile(snapshot).await.unwrap_err();
        assert!(err.to_string().contains("image pull secret missing"));
    }

    /// Copies the replica count from a companion `<name>-defaults` resource.
    struct FromDefaults {
        store: crate::memory::MemoryStore<u32>,
    }

    #[async_trait]
    impl Reconciler<u32> for FromDefaults {
        async fn reconcile(
            &self,
            mut snapshot: Snapshot<u32>,
        ) -> Result<Reconciled<u32>, ReconcileError> {
            let defaults_id = crate::resource::ResourceIdentity::new(
                snapshot.namespace(),
                format!("{}-defaults", snapshot.name()),
            );
            let defaults = crate::store::Store::get(&self.store, &defaults_id)
                .await?
                .ok_or(crate::error::StoreError::NotFound(defaults_id))?;

            if snapshot.spec == defaults.spec {
                return Ok(Reconciled::Unchanged);
            }
            snapshot.spec = defaults.spec;
            Ok(Reconciled::Apply(snapshot))
        }
    }

    #[tokio::test]
    async fn test_store_errors_propagate_with_question_mark() {
        let reconciler = FromDefaults {
            store: crate::memory::MemoryStore::new(),
        };
        let web = Snapshot::new("v1", "App", ObjectMeta::new("default", "web"), 1);

        let err = reconciler.reconcile(web.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Store(crate::error::StoreError::NotFound(_))
        ));

        reconciler
            .store
            .create(Snapshot::new(
                "v1",
                "App",
                ObjectMeta::new("default", "web-defaults"),
                3,
            ))
            .unwrap();
        match reconciler.reconcile(web).await.unwrap() {
            Reconciled::Apply(updated) => assert_eq!(updated.spec, 3),
            Reconciled::Unchanged => panic!("expected an update"),
        }
    }
}
