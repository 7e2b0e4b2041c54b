//! Unbounded FIFO shared by all workers.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::domain::TaskRequest;

/// Mutex-guarded deque plus a notifier.
///
/// Admission order is global FIFO; execution order per resource is decided by
/// the lock registry once several workers hold tasks for the same resource.
#[derive(Debug, Default)]
pub struct TaskQueue {
    items: Mutex<VecDeque<TaskRequest>>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue; never blocks beyond the lock.
    pub async fn push(&self, request: TaskRequest) {
        {
            let mut items = self.items.lock().await;
            items.push_back(request);
        }
        // Notify after dropping the lock; Notify stores a permit, so a push
        // racing a not-yet-parked pop is not lost.
        self.notify.notify_one();
    }

    /// Dequeue, waiting until an item is available.
    ///
    /// The caller races this against the shutdown signal with `select!`, so
    /// the wait itself never needs a timeout.
    pub async fn pop(&self) -> TaskRequest {
        loop {
            let notified = self.notify.notified();
            {
                let mut items = self.items.lock().await;
                if let Some(request) = items.pop_front() {
                    return request;
                }
            }
            notified.await;
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::domain::{Operation, ResourceId, TaskId};

    fn request(n: u8) -> TaskRequest {
        TaskRequest {
            task_id: TaskId::generate(),
            resource_id: ResourceId::from(format!("dbs/{n}.db").as_str()),
            operation: Operation::Fetch,
            params: serde_json::json!({ "n": n }),
        }
    }

    #[tokio::test]
    async fn pops_in_admission_order() {
        let queue = TaskQueue::new();
        let first = request(1);
        let second = request(2);
        let first_id = first.task_id;
        let second_id = second.task_id;

        queue.push(first).await;
        queue.push(second).await;

        assert_eq!(queue.pop().await.task_id, first_id);
        assert_eq!(queue.pop().await.task_id, second_id);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let queue = Arc::new(TaskQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(request(7)).await;

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("pop should wake up")
            .unwrap();
        assert_eq!(popped.params["n"], 7);
    }
}
