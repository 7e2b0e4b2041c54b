//! SQLite implementation of the database adapter.
//!
//! Opens existing `*.db` files (never creates them), applies WAL journal mode
//! and a 30 s busy timeout, and executes the four CRUD operations from JSON
//! parameter bags. Identifiers are quoted; values always bind as parameters.

use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::task::spawn_blocking;
use tracing::warn;

use super::{AdapterError, Database, DatabaseHandle};
use crate::domain::{Operation, ResourceId};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter factory. Stateless; every task gets its own [`SqliteHandle`].
#[derive(Debug, Clone, Default)]
pub struct SqliteDatabase;

impl SqliteDatabase {
    pub fn new() -> Self {
        Self
    }

    /// Table names in `resource`, sorted. Convenience for callers outside the
    /// pool (the CLI); not part of the adapter port.
    pub fn list_tables(&self, resource: &ResourceId) -> Result<Vec<String>, AdapterError> {
        let conn = open_connection(resource)?;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .map_err(operation_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(operation_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(operation_error)?;
        Ok(names)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn open(&self, resource: &ResourceId) -> Result<Box<dyn DatabaseHandle>, AdapterError> {
        let resource = resource.clone();
        let conn = spawn_blocking(move || open_connection(&resource))
            .await
            .map_err(join_error)??;
        Ok(Box::new(SqliteHandle { conn: Some(conn) }))
    }
}

fn open_connection(resource: &ResourceId) -> Result<Connection, AdapterError> {
    // No CREATE flag: a task against a missing file must fail as a connection
    // error instead of silently manufacturing an empty database.
    let conn = Connection::open_with_flags(
        resource.as_path(),
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
    )
    .map_err(|e| AdapterError::Connection(format!("{}: {e}", resource)))?;

    if let Err(e) = conn.execute_batch("PRAGMA journal_mode = WAL;") {
        warn!(resource = %resource, error = %e, "could not enable WAL mode");
    }
    if let Err(e) = conn.busy_timeout(BUSY_TIMEOUT) {
        warn!(resource = %resource, error = %e, "could not set busy timeout");
    }
    Ok(conn)
}

fn operation_error(e: rusqlite::Error) -> AdapterError {
    AdapterError::Operation(e.to_string())
}

/// One open connection. rusqlite is synchronous and the busy timeout can
/// park a call for up to 30 s, so every operation runs on the blocking
/// thread pool; the connection travels into the closure and back.
struct SqliteHandle {
    conn: Option<Connection>,
}

#[async_trait]
impl DatabaseHandle for SqliteHandle {
    async fn execute(
        &mut self,
        operation: Operation,
        params: &Value,
    ) -> Result<Value, AdapterError> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| AdapterError::Operation("handle already closed".into()))?;
        let params = params.clone();
        let (conn, outcome) = spawn_blocking(move || {
            let outcome = run_operation(&conn, operation, &params);
            (conn, outcome)
        })
        .await
        .map_err(join_error)?;
        self.conn = Some(conn);
        outcome
    }

    async fn close(mut self: Box<Self>) -> Result<(), AdapterError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        spawn_blocking(move || {
            conn.close()
                .map_err(|(_, e)| AdapterError::Connection(format!("close failed: {e}")))
        })
        .await
        .map_err(join_error)?
    }
}

fn join_error(e: tokio::task::JoinError) -> AdapterError {
    AdapterError::Operation(format!("blocking task failed: {e}"))
}

fn run_operation(
    conn: &Connection,
    operation: Operation,
    params: &Value,
) -> Result<Value, AdapterError> {
    match operation {
        Operation::Fetch => fetch(conn, decode(operation, params)?),
        Operation::Insert => insert(conn, decode(operation, params)?),
        Operation::Update => update(conn, decode(operation, params)?),
        Operation::Delete => delete(conn, decode(operation, params)?),
    }
}

fn decode<'de, T: Deserialize<'de>>(
    operation: Operation,
    params: &'de Value,
) -> Result<T, AdapterError> {
    T::deserialize(params)
        .map_err(|e| AdapterError::Operation(format!("invalid {operation} parameters: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FetchParams {
    table: String,
    #[serde(default = "all_columns")]
    columns: String,
    #[serde(rename = "where", default)]
    filter: Option<Map<String, Value>>,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default)]
    descending: bool,
    #[serde(default)]
    limit: Option<i64>,
}

fn all_columns() -> String {
    "*".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InsertParams {
    table: String,
    data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateParams {
    table: String,
    data: Map<String, Value>,
    #[serde(rename = "where")]
    filter: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteParams {
    table: String,
    #[serde(rename = "where")]
    filter: Map<String, Value>,
}

fn fetch(conn: &Connection, p: FetchParams) -> Result<Value, AdapterError> {
    let mut sql = format!(
        "SELECT {} FROM {}",
        column_list(&p.columns),
        quote_ident(&p.table)
    );
    let mut binds: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(filter) = &p.filter
        && !filter.is_empty()
    {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause(filter, &mut binds));
    }
    if let Some(order_by) = &p.order_by {
        let dir = if p.descending { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY {} {dir}", quote_ident(order_by)));
    }
    if let Some(limit) = p.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql).map_err(operation_error)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let mut rows = stmt
        .query(params_from_iter(binds))
        .map_err(operation_error)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(operation_error)? {
        let mut object = Map::new();
        for (i, name) in column_names.iter().enumerate() {
            let value = match row.get_ref(i).map_err(operation_error)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(n) => json!(n),
                ValueRef::Real(f) => json!(f),
                ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => json!(b),
            };
            object.insert(name.clone(), value);
        }
        out.push(Value::Object(object));
    }
    Ok(Value::Array(out))
}

fn insert(conn: &Connection, p: InsertParams) -> Result<Value, AdapterError> {
    if p.data.is_empty() {
        return Err(AdapterError::Operation("insert requires non-empty data".into()));
    }
    let columns: Vec<String> = p.data.keys().map(|k| quote_ident(k)).collect();
    let placeholders: Vec<&str> = p.data.iter().map(|_| "?").collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&p.table),
        columns.join(", "),
        placeholders.join(", "),
    );
    let binds: Vec<rusqlite::types::Value> = p.data.values().map(bind_value).collect();

    conn.execute(&sql, params_from_iter(binds))
        .map_err(operation_error)?;
    Ok(json!(conn.last_insert_rowid()))
}

fn update(conn: &Connection, p: UpdateParams) -> Result<Value, AdapterError> {
    if p.data.is_empty() {
        return Err(AdapterError::Operation("update requires non-empty data".into()));
    }
    if p.filter.is_empty() {
        return Err(AdapterError::Operation(
            "update requires a non-empty where clause".into(),
        ));
    }
    let set_clause: Vec<String> = p
        .data
        .keys()
        .map(|k| format!("{} = ?", quote_ident(k)))
        .collect();
    let mut binds: Vec<rusqlite::types::Value> = p.data.values().map(bind_value).collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(&p.table),
        set_clause.join(", "),
        where_clause(&p.filter, &mut binds),
    );

    let affected = conn
        .execute(&sql, params_from_iter(binds))
        .map_err(operation_error)?;
    Ok(json!(affected))
}

fn delete(conn: &Connection, p: DeleteParams) -> Result<Value, AdapterError> {
    if p.filter.is_empty() {
        return Err(AdapterError::Operation(
            "delete requires a non-empty where clause".into(),
        ));
    }
    let mut binds: Vec<rusqlite::types::Value> = Vec::new();
    let sql = format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(&p.table),
        where_clause(&p.filter, &mut binds),
    );

    let affected = conn
        .execute(&sql, params_from_iter(binds))
        .map_err(operation_error)?;
    Ok(json!(affected))
}

/// AND-combined equality clause; pushes the bound values onto `binds`.
fn where_clause(filter: &Map<String, Value>, binds: &mut Vec<rusqlite::types::Value>) -> String {
    let clauses: Vec<String> = filter
        .iter()
        .map(|(column, value)| {
            binds.push(bind_value(value));
            format!("{} = ?", quote_ident(column))
        })
        .collect();
    clauses.join(" AND ")
}

/// `*` passes through; otherwise each comma-separated column is quoted.
fn column_list(columns: &str) -> String {
    if columns.trim() == "*" {
        return "*".to_string();
    }
    columns
        .split(',')
        .map(|c| quote_ident(c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn bind_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        // Nested structures are stored as their JSON text.
        other => Sql::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl std::fmt::Debug for dyn DatabaseHandle {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("DatabaseHandle")
        }
    }

    fn seeded_db(dir: &tempfile::TempDir) -> ResourceId {
        let path = dir.path().join("users.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER);
             INSERT INTO users (name, age) VALUES ('alice', 30), ('bob', 25), ('carol', 41);",
        )
        .unwrap();
        ResourceId::from(path)
    }

    #[tokio::test]
    async fn open_missing_file_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ResourceId::from(dir.path().join("nope.db"));

        let err = SqliteDatabase::new().open(&missing).await.unwrap_err();
        assert!(matches!(err, AdapterError::Connection(_)));
    }

    #[tokio::test]
    async fn fetch_with_filter_order_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let resource = seeded_db(&dir);
        let mut handle = SqliteDatabase::new().open(&resource).await.unwrap();

        let rows = handle
            .execute(
                Operation::Fetch,
                &json!({"table": "users", "order_by": "age", "descending": true, "limit": 2}),
            )
            .await
            .unwrap();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "carol");
        assert_eq!(rows[1]["name"], "alice");

        let filtered = handle
            .execute(
                Operation::Fetch,
                &json!({"table": "users", "where": {"name": "bob"}, "columns": "name, age"}),
            )
            .await
            .unwrap();
        assert_eq!(filtered, json!([{"name": "bob", "age": 25}]));

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn insert_update_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let resource = seeded_db(&dir);
        let db = SqliteDatabase::new();

        let mut handle = db.open(&resource).await.unwrap();
        let rowid = handle
            .execute(
                Operation::Insert,
                &json!({"table": "users", "data": {"name": "dave", "age": 19}}),
            )
            .await
            .unwrap();
        assert!(rowid.as_i64().unwrap() > 0);

        let updated = handle
            .execute(
                Operation::Update,
                &json!({"table": "users", "data": {"age": 20}, "where": {"name": "dave"}}),
            )
            .await
            .unwrap();
        assert_eq!(updated, json!(1));

        let deleted = handle
            .execute(
                Operation::Delete,
                &json!({"table": "users", "where": {"name": "dave"}}),
            )
            .await
            .unwrap();
        assert_eq!(deleted, json!(1));
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_parameter_is_an_operation_error() {
        let dir = tempfile::tempdir().unwrap();
        let resource = seeded_db(&dir);
        let mut handle = SqliteDatabase::new().open(&resource).await.unwrap();

        let err = handle
            .execute(
                Operation::Fetch,
                &json!({"table": "users", "limitt": 1}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Operation(_)));
        assert!(err.to_string().contains("invalid fetch parameters"));
    }

    #[tokio::test]
    async fn delete_without_where_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let resource = seeded_db(&dir);
        let mut handle = SqliteDatabase::new().open(&resource).await.unwrap();

        let err = handle
            .execute(Operation::Delete, &json!({"table": "users", "where": {}}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("non-empty where"));
    }

    /// The busy-timeout wait happens off the async runtime. This runs on the
    /// default current-thread test runtime: if the write below blocked the
    /// runtime thread, the ticker task could never fire while another
    /// connection holds the write lock.
    #[tokio::test]
    async fn busy_database_does_not_stall_the_runtime() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let resource = seeded_db(&dir);

        // Hold the write lock from a plain thread for a while.
        let blocker = {
            let path = resource.as_path().to_path_buf();
            std::thread::spawn(move || {
                let conn = Connection::open(path).unwrap();
                conn.execute_batch("BEGIN IMMEDIATE;").unwrap();
                std::thread::sleep(Duration::from_millis(300));
                conn.execute_batch("COMMIT;").unwrap();
            })
        };
        // Give the blocker time to take the lock.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let ticks = Arc::new(AtomicU32::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        let mut handle = SqliteDatabase::new().open(&resource).await.unwrap();
        let rowid = handle
            .execute(
                Operation::Insert,
                &json!({"table": "users", "data": {"name": "eve", "age": 33}}),
            )
            .await
            .unwrap();
        assert!(rowid.as_i64().unwrap() > 0);

        // The insert waited on the busy timeout, yet the runtime kept ticking.
        assert!(ticks.load(Ordering::Relaxed) >= 5);
        ticker.abort();
        handle.close().await.unwrap();
        blocker.join().unwrap();
    }

    #[test]
    fn list_tables_reports_sorted_names() {
        let dir = tempfile::tempdir().unwrap();
        let resource = seeded_db(&dir);

        let tables = SqliteDatabase::new().list_tables(&resource).unwrap();
        assert_eq!(tables, vec!["users".to_string()]);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("na\"me"), "\"na\"\"me\"");
        assert_eq!(column_list("*"), "*");
        assert_eq!(column_list("name, age"), "\"name\", \"age\"");
    }
}
