//! dbpool-core
//!
//! Background task pool that serializes operations per database file while
//! letting operations on different files run in parallel.
//!
//! # Module layout
//! - **domain**: ids, operation kinds, task records and status views
//! - **adapter**: the `Database` port and the SQLite implementation
//! - **discovery**: `*.db` enumeration used to seed the pool
//! - **locks**: per-resource mutual-exclusion registry
//! - **queue**: unbounded FIFO shared by the workers
//! - **status**: the task status table polled by callers
//! - **worker**: worker group and the per-task execution loop
//! - **pool**: the public surface (`submit` / `get_status` / shutdown)

pub mod adapter;
pub mod discovery;
pub mod domain;
pub mod locks;
pub mod pool;
pub mod queue;
pub mod status;
pub mod worker;

pub use adapter::{AdapterError, Database, DatabaseHandle, SqliteDatabase};
pub use discovery::discover_databases;
pub use domain::{Operation, PoolError, ResourceId, TaskId, TaskRecord, TaskState, TaskStatus};
pub use pool::TaskPool;
pub use status::StatusCounts;
