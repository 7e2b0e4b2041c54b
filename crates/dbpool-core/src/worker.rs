//! Worker group: long-lived tasks draining the queue with per-resource
//! serialization.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::adapter::{AdapterError, Database};
use crate::domain::TaskRequest;
use crate::locks::ResourceLocks;
use crate::queue::TaskQueue;
use crate::status::StatusTable;

/// Everything a worker needs, shared across the group.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub status: Arc<StatusTable>,
    pub locks: Arc<ResourceLocks>,
    pub adapter: Arc<dyn Database>,
}

/// Handle to the spawned workers.
/// - `request_shutdown` flips the watch flag observed between dequeues
/// - `shutdown_and_join` additionally waits for every loop to exit
pub(crate) struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerGroup {
    /// Spawn `n` workers over the shared context.
    pub fn spawn(n: usize, ctx: WorkerContext) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let ctx = ctx.clone();
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, ctx, &mut rx).await;
            }));
        }

        Self {
            shutdown_tx,
            joins: Mutex::new(joins),
        }
    }

    /// Stop taking new tasks. In-flight tasks finish; queued ones are never
    /// picked up.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers to exit their loops.
    pub async fn shutdown_and_join(&self) {
        self.request_shutdown();
        let joins: Vec<_> = self.joins.lock().await.drain(..).collect();
        for join in joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: WorkerContext,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // The pop can wait indefinitely, so race it against the stop flag.
        let request = tokio::select! {
            changed = shutdown_rx.changed() => {
                match changed {
                    // Flag flipped; the check at the top of the loop decides.
                    Ok(()) => continue,
                    // Sender gone: the pool was dropped without a shutdown
                    // call. Same meaning as the flag.
                    Err(_) => break,
                }
            }
            request = ctx.queue.pop() => request,
        };

        run_one(worker_id, &ctx, request).await;
    }
    debug!(worker_id, "worker exited");
}

/// Execute one task. Failures are recorded on the task's status and never
/// escape this boundary, so one bad task cannot take the worker down.
async fn run_one(worker_id: usize, ctx: &WorkerContext, request: TaskRequest) {
    let task_id = request.task_id;
    ctx.status.mark_running(task_id).await;
    debug!(worker_id, task = %task_id, resource = %request.resource_id, op = %request.operation, "task started");

    // One in-flight operation per resource; created on demand for resources
    // unseen at startup.
    let lock = ctx.locks.get_or_create(&request.resource_id);
    let _guard = lock.lock().await;

    match execute(ctx.adapter.as_ref(), &request).await {
        Ok(result) => {
            ctx.status.mark_completed(task_id, result).await;
            debug!(worker_id, task = %task_id, "task completed");
        }
        Err(e) => {
            warn!(worker_id, task = %task_id, error = %e, "task failed");
            ctx.status.mark_error(task_id, e.to_string()).await;
        }
    }
}

/// Open, execute, close. The handle is closed unconditionally; a close
/// failure is logged but does not override the operation's outcome.
async fn execute(
    adapter: &dyn Database,
    request: &TaskRequest,
) -> Result<serde_json::Value, AdapterError> {
    let mut handle = adapter.open(&request.resource_id).await?;
    let outcome = handle.execute(request.operation, &request.params).await;
    if let Err(e) = handle.close().await {
        warn!(resource = %request.resource_id, error = %e, "handle close failed");
    }
    outcome
}
