//! Database adapter port.
//!
//! The pool treats the database as an external collaborator behind this seam:
//! open a handle for a resource, execute one operation, close the handle. The
//! trait objects make the implementation swappable (SQLite in production,
//! scripted fakes in tests).

mod sqlite;

pub use sqlite::SqliteDatabase;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Operation, ResourceId};

/// Adapter failures, split the way callers observe them: the resource could
/// not be opened at all, or it opened but the operation itself failed.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation error: {0}")]
    Operation(String),
}

/// Factory side of the port: one handle per task, never shared or pooled.
#[async_trait]
pub trait Database: Send + Sync {
    /// Open a fresh handle scoped to `resource`. May fail with
    /// [`AdapterError::Connection`].
    async fn open(&self, resource: &ResourceId) -> Result<Box<dyn DatabaseHandle>, AdapterError>;
}

/// One open connection. The worker executes exactly one operation on it and
/// closes it unconditionally, even on failure.
#[async_trait]
pub trait DatabaseHandle: Send {
    async fn execute(
        &mut self,
        operation: Operation,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, AdapterError>;

    /// Best-effort close; the worker logs failures and moves on.
    async fn close(self: Box<Self>) -> Result<(), AdapterError>;
}
