//! dbpool command line.
//!
//! CRUD commands go through the task pool: submit, then poll `get_status`
//! until the task is terminal. `list-dbs` and `list-tables` read directly.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use tokio::time::sleep;

use dbpool_core::{ResourceId, SqliteDatabase, TaskPool, TaskStatus, discover_databases};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "dbpool", about = "Task pool over a directory of SQLite files")]
struct Cli {
    /// Directory containing *.db files.
    #[arg(long, default_value = "Databases")]
    db_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List discovered *.db files.
    ListDbs,

    /// List tables in a database (default: the first discovered one).
    ListTables {
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Fetch rows.
    Fetch {
        table: String,
        /// Comma-separated column list, or *.
        #[arg(long, default_value = "*")]
        columns: String,
        /// JSON object for an AND-combined WHERE clause.
        #[arg(long, value_parser = parse_json_object)]
        r#where: Option<Map<String, Value>>,
        #[arg(long)]
        order_by: Option<String>,
        /// Sort descending.
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Insert a row.
    Insert {
        table: String,
        /// JSON object of column/value pairs.
        #[arg(long, value_parser = parse_json_object)]
        data: Map<String, Value>,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Update rows.
    Update {
        table: String,
        #[arg(long, value_parser = parse_json_object)]
        data: Map<String, Value>,
        #[arg(long, value_parser = parse_json_object)]
        r#where: Map<String, Value>,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Delete rows.
    Delete {
        table: String,
        #[arg(long, value_parser = parse_json_object)]
        r#where: Map<String, Value>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn parse_json_object(arg: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(arg) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("JSON must represent an object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::ListDbs => {
            for resource in discover_databases(&cli.db_dir) {
                println!("{resource}");
            }
            Ok(())
        }
        Command::ListTables { db } => {
            let resource = target_database(&cli.db_dir, db)?;
            for table in SqliteDatabase::new().list_tables(&resource)? {
                println!("{table}");
            }
            Ok(())
        }
        Command::Fetch {
            table,
            columns,
            r#where,
            order_by,
            desc,
            limit,
            db,
        } => {
            let mut params = json!({
                "table": table,
                "columns": columns,
                "descending": desc,
            });
            if let Some(filter) = r#where {
                params["where"] = Value::Object(filter);
            }
            if let Some(order_by) = order_by {
                params["order_by"] = json!(order_by);
            }
            if let Some(limit) = limit {
                params["limit"] = json!(limit);
            }
            submit_and_wait(&cli.db_dir, db, "fetch", params).await
        }
        Command::Insert { table, data, db } => {
            let params = json!({"table": table, "data": data});
            submit_and_wait(&cli.db_dir, db, "insert", params).await
        }
        Command::Update {
            table,
            data,
            r#where,
            db,
        } => {
            let params = json!({"table": table, "data": data, "where": r#where});
            submit_and_wait(&cli.db_dir, db, "update", params).await
        }
        Command::Delete { table, r#where, db } => {
            let params = json!({"table": table, "where": r#where});
            submit_and_wait(&cli.db_dir, db, "delete", params).await
        }
    }
}

/// The explicit `--db` target, or the first discovered database.
fn target_database(db_dir: &Path, db: Option<PathBuf>) -> Result<ResourceId, Box<dyn Error>> {
    if let Some(db) = db {
        return Ok(ResourceId::from(db));
    }
    discover_databases(db_dir)
        .into_iter()
        .next()
        .ok_or_else(|| format!("no .db files found in {}", db_dir.display()).into())
}

/// Fire-and-forget submission plus the caller-side poll loop: there is no
/// blocking "await completion" primitive in the pool itself.
async fn submit_and_wait(
    db_dir: &Path,
    db: Option<PathBuf>,
    operation: &str,
    params: Value,
) -> Result<(), Box<dyn Error>> {
    let resource = target_database(db_dir, db)?;
    let pool = TaskPool::new(db_dir);

    let task_id = pool.submit(resource, operation, params).await?;
    let record = loop {
        match pool.get_status(task_id).await {
            TaskStatus::Found(record) if record.state.is_terminal() => break record,
            _ => sleep(POLL_INTERVAL).await,
        }
    };
    pool.shutdown_and_join().await;

    println!("{}", serde_json::to_string_pretty(&record)?);
    match record.error {
        None => Ok(()),
        Some(error) => Err(error.into()),
    }
}
