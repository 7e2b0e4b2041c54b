//! The public surface: submission, polling, shutdown.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::adapter::{Database, SqliteDatabase};
use crate::discovery::discover_databases;
use crate::domain::{Operation, PoolError, ResourceId, TaskId, TaskRequest, TaskStatus};
use crate::locks::ResourceLocks;
use crate::queue::TaskQueue;
use crate::status::{StatusCounts, StatusTable};
use crate::worker::{WorkerContext, WorkerGroup};

/// Worker count for `resource_count` known resources.
///
/// Coarse heuristic trading parallelism against the cost of opening many
/// database handles at once; fixed at construction, never resized.
fn sized_workers(resource_count: usize) -> usize {
    if resource_count > 20 {
        5
    } else {
        (resource_count / 4).max(1)
    }
}

/// Background task pool over a set of independent database files.
///
/// `submit` enqueues and returns an id immediately; completion is observed
/// only by polling [`TaskPool::get_status`]. Operations against the same
/// resource execute one at a time; operations against different resources run
/// in parallel, bounded by the worker count.
pub struct TaskPool {
    queue: Arc<TaskQueue>,
    status: Arc<StatusTable>,
    locks: Arc<ResourceLocks>,
    workers: WorkerGroup,
    num_workers: usize,
}

impl TaskPool {
    /// Discover `*.db` files under `db_dir` and start a pool over them with
    /// the SQLite adapter.
    pub fn new(db_dir: impl AsRef<Path>) -> Self {
        let resources = discover_databases(db_dir);
        Self::with_adapter(resources, Arc::new(SqliteDatabase::new()))
    }

    /// Start a pool over `resources` with a custom adapter, sized by policy.
    pub fn with_adapter(resources: Vec<ResourceId>, adapter: Arc<dyn Database>) -> Self {
        let num_workers = sized_workers(resources.len());
        Self::with_adapter_and_workers(resources, adapter, num_workers)
    }

    /// Start a pool with an explicit worker count.
    pub fn with_adapter_and_workers(
        resources: Vec<ResourceId>,
        adapter: Arc<dyn Database>,
        num_workers: usize,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let status = Arc::new(StatusTable::new());
        let locks = Arc::new(ResourceLocks::seeded(&resources));

        info!(
            resources = resources.len(),
            workers = num_workers,
            "starting task pool"
        );
        let workers = WorkerGroup::spawn(
            num_workers,
            WorkerContext {
                queue: Arc::clone(&queue),
                status: Arc::clone(&status),
                locks: Arc::clone(&locks),
                adapter,
            },
        );

        Self {
            queue,
            status,
            locks,
            workers,
            num_workers,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Queue a database operation.
    ///
    /// The operation name is validated against the enumerated set here; an
    /// unsupported name is the only error surfaced synchronously, and nothing
    /// is enqueued for it. Everything else is reported through the status
    /// record.
    pub async fn submit(
        &self,
        resource_id: ResourceId,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<TaskId, PoolError> {
        let operation: Operation = operation.parse()?;
        Ok(self.submit_operation(resource_id, operation, params).await)
    }

    /// Queue an already-typed operation. Cannot fail: the enum is the
    /// validation.
    pub async fn submit_operation(
        &self,
        resource_id: ResourceId,
        operation: Operation,
        params: serde_json::Value,
    ) -> TaskId {
        let request = TaskRequest {
            task_id: TaskId::generate(),
            resource_id,
            operation,
            params,
        };
        let task_id = request.task_id;
        self.status.insert_queued(&request).await;
        self.queue.push(request).await;
        task_id
    }

    /// Current record for `task_id`, or the `Unknown` sentinel.
    pub async fn get_status(&self, task_id: TaskId) -> TaskStatus {
        self.status.get(task_id).await
    }

    /// Counts by state across every task ever submitted.
    pub async fn counts(&self) -> StatusCounts {
        self.status.counts().await
    }

    /// Number of tasks admitted but not yet picked up.
    pub async fn queued_len(&self) -> usize {
        self.queue.len().await
    }

    /// Number of resources the lock registry currently knows.
    pub fn known_resources(&self) -> usize {
        self.locks.len()
    }

    /// Stop workers from taking new tasks. Tasks still queued stay `queued`
    /// forever; in-flight tasks run to completion.
    pub fn request_shutdown(&self) {
        self.workers.request_shutdown();
    }

    /// [`TaskPool::request_shutdown`] plus waiting for every worker to exit.
    pub async fn shutdown_and_join(&self) {
        self.workers.shutdown_and_join().await;
    }
}
