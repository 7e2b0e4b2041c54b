//! Strongly-typed identifiers.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of one submitted task.
///
/// ULID-based: sortable by creation time, generatable without coordination.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Ulid);

impl TaskId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier of an independently lockable database (its file path).
///
/// All tasks carrying the same `ResourceId` serialize on the same lock, so the
/// path is kept verbatim: two spellings of the same file are two resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(PathBuf);

impl ResourceId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for ResourceId {
    fn from(p: PathBuf) -> Self {
        Self(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique_and_sortable() {
        let a = TaskId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = TaskId::generate();

        assert_ne!(a, b);
        assert!(a < b);
        assert!(a.to_string().starts_with("task-"));
    }

    #[test]
    fn task_id_round_trips_through_serde() {
        let id = TaskId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn resource_ids_compare_by_path_spelling() {
        let a = ResourceId::from("db/users.db");
        let b = ResourceId::from("db/users.db");
        let c = ResourceId::from("./db/users.db");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
