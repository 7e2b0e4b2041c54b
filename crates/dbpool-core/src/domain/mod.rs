//! Domain model: identifiers, operation kinds, task records.

pub mod ids;
pub mod operation;
pub mod task;

pub use ids::{ResourceId, TaskId};
pub use operation::{Operation, PoolError};
pub use task::{TaskRecord, TaskRequest, TaskState, TaskStatus};
