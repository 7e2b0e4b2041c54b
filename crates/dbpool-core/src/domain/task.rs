//! Task records: the queued envelope, lifecycle states, and the status view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Operation, ResourceId, TaskId};

/// What travels through the queue: everything a worker needs to execute one
/// operation. Immutable once enqueued; lifecycle lives in [`TaskRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: TaskId,
    pub resource_id: ResourceId,
    pub operation: Operation,
    /// Operation-specific argument bag, opaque to the pool.
    pub params: serde_json::Value,
}

/// Task lifecycle state. Forward-only:
/// Queued -> Running -> Completed | Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Error,
}

impl TaskState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Error)
    }
}

/// Single source of truth for one task's lifecycle.
///
/// Created at submission, mutated only through the transition methods below,
/// read by callers as a clone (copy-out).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub resource_id: ResourceId,
    pub operation: Operation,
    pub params: serde_json::Value,
    pub state: TaskState,
    /// Set exactly once, on the Completed transition. Mutually exclusive with
    /// `error`.
    pub result: Option<serde_json::Value>,
    /// Set exactly once, on the Error transition.
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn queued(request: &TaskRequest) -> Self {
        Self {
            task_id: request.task_id,
            resource_id: request.resource_id.clone(),
            operation: request.operation,
            params: request.params.clone(),
            state: TaskState::Queued,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark as picked up by a worker.
    pub fn mark_running(&mut self) {
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Terminal success.
    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.state = TaskState::Completed;
        self.result = Some(result);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    /// Terminal failure. A failed task is never retried.
    pub fn mark_error(&mut self, error: String) {
        self.state = TaskState::Error;
        self.error = Some(error);
        self.result = None;
        self.finished_at = Some(Utc::now());
    }
}

/// Poll result for [`crate::pool::TaskPool::get_status`].
///
/// An id that was never submitted (including ids minted by another pool
/// instance) is not an error; it yields the `Unknown` sentinel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskStatus {
    Found(TaskRecord),
    Unknown,
}

impl TaskStatus {
    pub fn record(&self) -> Option<&TaskRecord> {
        match self {
            TaskStatus::Found(record) => Some(record),
            TaskStatus::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TaskStatus::Unknown)
    }
}
