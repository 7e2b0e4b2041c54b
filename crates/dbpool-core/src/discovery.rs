//! Database discovery: enumerate `*.db` files in a directory.
//!
//! The result seeds the lock registry and feeds the worker sizing policy; the
//! registry still grows lazily if a task arrives for a path not listed here.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::domain::ResourceId;

/// All `*.db` files directly inside `db_dir` (extension match is
/// case-insensitive), sorted by path. A missing or unreadable directory yields
/// an empty set rather than an error.
pub fn discover_databases(db_dir: impl AsRef<Path>) -> Vec<ResourceId> {
    let db_dir = db_dir.as_ref();
    let entries = match fs::read_dir(db_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %db_dir.display(), error = %e, "database directory not readable");
            return Vec::new();
        }
    };

    let mut found: Vec<ResourceId> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("db"))
        })
        .map(ResourceId::from)
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_db_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("users.db"), b"").unwrap();
        std::fs::write(dir.path().join("ORDERS.DB"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested.db")).unwrap();

        let found = discover_databases(dir.path());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| {
            r.as_path()
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("db"))
        }));
    }

    #[test]
    fn missing_directory_yields_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(discover_databases(&missing).is_empty());
    }
}
