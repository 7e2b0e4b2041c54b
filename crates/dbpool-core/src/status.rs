//! Status Table: task id -> lifecycle record, polled by callers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::{TaskId, TaskRecord, TaskRequest, TaskState, TaskStatus};

/// Counts by state, for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub error: usize,
}

/// Mutex-guarded table with copy-out reads.
///
/// Entries are created at submission and kept for the pool's lifetime; there
/// is no eviction, so the table grows with the number of submitted tasks.
/// Callers that need bookkeeping diff submitted ids against terminal ones.
#[derive(Debug, Default)]
pub struct StatusTable {
    records: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly submitted task as queued.
    pub async fn insert_queued(&self, request: &TaskRequest) {
        let mut records = self.records.lock().await;
        records.insert(request.task_id, TaskRecord::queued(request));
    }

    pub async fn mark_running(&self, task_id: TaskId) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&task_id) {
            record.mark_running();
        }
    }

    pub async fn mark_completed(&self, task_id: TaskId, result: serde_json::Value) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&task_id) {
            record.mark_completed(result);
        }
    }

    pub async fn mark_error(&self, task_id: TaskId, error: String) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&task_id) {
            record.mark_error(error);
        }
    }

    /// Copy-out read; unknown ids yield the sentinel, never an error.
    pub async fn get(&self, task_id: TaskId) -> TaskStatus {
        let records = self.records.lock().await;
        match records.get(&task_id) {
            Some(record) => TaskStatus::Found(record.clone()),
            None => TaskStatus::Unknown,
        }
    }

    pub async fn counts(&self) -> StatusCounts {
        let records = self.records.lock().await;
        let mut counts = StatusCounts::default();
        for record in records.values() {
            match record.state {
                TaskState::Queued => counts.queued += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Error => counts.error += 1,
            }
        }
        counts
    }
}
