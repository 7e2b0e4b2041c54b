//! Operation kinds and the synchronous validation surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced directly to the submitting caller.
///
/// Everything that goes wrong *inside* a task (connection failures, bad SQL)
/// is recorded on the task's status instead and observed by polling.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("unsupported operation: {0} (expected fetch|insert|update|delete)")]
    UnsupportedOperation(String),
}

/// The enumerated set of database operations the pool dispatches.
///
/// An enum keeps matching exhaustive; anything outside this set is rejected at
/// `submit` time and never enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Fetch,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Fetch => "fetch",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl FromStr for Operation {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(Operation::Fetch),
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(PoolError::UnsupportedOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
