pub mod cache;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod memory;
pub mod reconciler;
pub mod report;
pub mod resource;
pub mod store;
pub mod stream;
pub mod telemetry;

pub use cache::ShadowCache;
pub use classifier::{classify, Classification};
pub use config::{load_config, load_config_from_str, ConfigFormat, DispatcherConfig, LogFormat, LoggingConfig};
pub use dispatcher::{Decision, Dispatcher};
pub use error::{ConfigError, DispatchError, ReconcileError, Result, StoreError, StreamError};
pub use executor::{ManualSpawner, Spawner, Task, TokioSpawner};
pub use memory::MemoryStore;
pub use reconciler::{reconciler_fn, FnReconciler, Reconciled, Reconciler};
pub use report::{DispatchStats, FailureKind, ReconcileOutcome, ReconcileReport, ReportBroadcaster};
pub use resource::{EventKind, Fingerprint, Notification, ObjectMeta, ResourceIdentity, Snapshot};
pub use store::Store;
pub use stream::{channel, from_broadcast, ChangeSource, ChangeStream, NotificationSender};
pub use telemetry::init_logging;
