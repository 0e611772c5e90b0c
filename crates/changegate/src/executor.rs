//! Task spawners for dispatched reconciles.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;

/// A unit of dispatched work.
pub type Task = BoxFuture<'static, ()>;

/// Launches dispatched reconcile tasks.
///
/// Injected into the dispatcher so tests can swap the Tokio runtime for a
/// deterministic queue.
pub trait Spawner: Send + Sync {
    fn spawn(&self, task: Task);
}

/// Runs each task as an independent Tokio task.
#[derive(Debug, Clone, Default)]
pub struct TokioSpawner {
    handle: Option<Handle>,
}

impl TokioSpawner {
    /// Spawns onto the ambient runtime. `spawn` must then be called from
    /// within a Tokio runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns onto the given runtime, from any thread.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl Spawner for TokioSpawner {
    fn spawn(&self, task: Task) {
        match &self.handle {
            Some(handle) => {
                handle.spawn(task);
            }
            None => {
                tokio::spawn(task);
            }
        }
    }
}

/// Queues tasks until [`ManualSpawner::run_pending`] drives them.
///
/// Tasks run one at a time in submission order, which makes dispatch
/// deterministic in tests.
#[derive(Default)]
pub struct ManualSpawner {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    fn pop(&self) -> Option<Task> {
        match self.queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    /// Number of queued tasks not yet run.
    pub fn pending(&self) -> usize {
        match self.queue.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Runs queued tasks to completion, including any they enqueue, and
    /// returns how many ran.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop() {
            task.await;
            ran += 1;
        }
        ran
    }
}

impl Spawner for ManualSpawner {
    fn spawn(&self, task: Task) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(task),
            Err(poisoned) => poisoned.into_inner().push_back(task),
        }
    }
}

impl std::fmt::Debug for ManualSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualSpawner")
            .field("pending", &self.pending())
            .finish()
    }
}
