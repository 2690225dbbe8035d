//! Database Connection Management
//!
//! This module provides the database connection, schema initialization and
//! transaction handling used by every hierarchy strategy.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any file path, or `:memory:` for an ephemeral store
//! - **One connection**: A single libsql connection guarded by an async mutex.
//!   Holding the guard for a whole transaction serializes mutations, which the
//!   wide range updates of the nested set and closure table strategies require.
//! - **Explicit transactions**: `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK`, so a
//!   failed mutation never leaves half-shifted intervals or closure rows behind.
//! - **Idempotent schema**: `CREATE TABLE IF NOT EXISTS` for every strategy table
//!
//! # Persisted Layout
//!
//! | Table              | Strategy           | Side state                          |
//! |--------------------|--------------------|-------------------------------------|
//! | `adjacency_nodes`  | Adjacency list     | none                                |
//! | `nested_set_nodes` | Nested set         | `left_index, right_index, level, root_id` |
//! | `path_nodes`       | Materialized path  | `path`                              |
//! | `closure_nodes`    | Closure table      | rows in `closure_entries`           |

use crate::db::error::DatabaseError;
use libsql::{Builder, Connection, Database};
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Path that selects an in-memory database
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Busy timeout applied to the connection (milliseconds)
const BUSY_TIMEOUT_MS: u32 = 5000;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS adjacency_nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        name TEXT NOT NULL,
        parent_id INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_adjacency_parent ON adjacency_nodes(entity_type, parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_adjacency_name ON adjacency_nodes(entity_type, name)",
    "CREATE TABLE IF NOT EXISTS nested_set_nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        name TEXT NOT NULL,
        parent_id INTEGER,
        left_index INTEGER NOT NULL,
        right_index INTEGER NOT NULL,
        level INTEGER NOT NULL,
        root_id INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_nested_set_interval ON nested_set_nodes(entity_type, left_index, right_index)",
    "CREATE INDEX IF NOT EXISTS idx_nested_set_name ON nested_set_nodes(entity_type, name)",
    "CREATE TABLE IF NOT EXISTS path_nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        name TEXT NOT NULL,
        parent_id INTEGER,
        path TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS idx_path_prefix ON path_nodes(entity_type, path)",
    "CREATE INDEX IF NOT EXISTS idx_path_name ON path_nodes(entity_type, name)",
    "CREATE TABLE IF NOT EXISTS closure_nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        name TEXT NOT NULL,
        parent_id INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_closure_nodes_name ON closure_nodes(entity_type, name)",
    "CREATE TABLE IF NOT EXISTS closure_entries (
        ancestor_id INTEGER NOT NULL,
        descendant_id INTEGER NOT NULL,
        level INTEGER NOT NULL,
        PRIMARY KEY (ancestor_id, descendant_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_closure_descendant ON closure_entries(descendant_id, level)",
];

/// Database service owning the libsql connection
///
/// # Examples
///
/// ```no_run
/// use orgtree_core::db::DatabaseService;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = DatabaseService::new_in_memory().await?;
///     let tx = db.begin().await?;
///     tx.commit().await?;
///     Ok(())
/// }
/// ```
pub struct DatabaseService {
    /// Kept alive for the lifetime of the connection
    _db: Database,

    /// The single connection; the guard doubles as the mutation lock
    conn: Mutex<Connection>,

    /// Path to the database file (or `:memory:`)
    pub db_path: PathBuf,

    /// Set when a transaction guard was dropped without commit or rollback
    abandoned: AtomicBool,
}

impl fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseService")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` and initialize the schema
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let in_memory = db_path.as_os_str() == IN_MEMORY_PATH;

        if !in_memory {
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        Self::initialize_schema(&conn, in_memory).await?;

        tracing::debug!("Opened hierarchy database at {}", db_path.display());

        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
            db_path,
            abandoned: AtomicBool::new(false),
        })
    }

    /// Open a fresh in-memory database
    pub async fn new_in_memory() -> Result<Self, DatabaseError> {
        Self::new(PathBuf::from(IN_MEMORY_PATH)).await
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements may return rows, so we must use query() instead of execute().
    async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create every strategy table and index (safe to call repeatedly)
    async fn initialize_schema(conn: &Connection, in_memory: bool) -> Result<(), DatabaseError> {
        if !in_memory {
            Self::execute_pragma(conn, "PRAGMA journal_mode = WAL").await?;
        }
        Self::execute_pragma(conn, &format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS)).await?;

        for statement in SCHEMA {
            conn.execute(statement, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("{}: {}", statement.trim(), e))
            })?;
        }

        Ok(())
    }

    async fn lock(&self) -> MutexGuard<'_, Connection> {
        let conn = self.conn.lock().await;
        if self.abandoned.swap(false, Ordering::SeqCst) {
            tracing::warn!("Rolling back a transaction abandoned before completion");
            let _ = conn.execute("ROLLBACK", ()).await;
        }
        conn
    }

    /// Acquire the connection for reads
    ///
    /// The guard is held for as long as the caller keeps it, so multi-query
    /// reads observe one consistent state.
    pub async fn connection(&self) -> MutexGuard<'_, Connection> {
        self.lock().await
    }

    /// Begin a write transaction
    ///
    /// The returned guard must be finished with [`Transaction::commit`],
    /// [`Transaction::rollback`] or [`Transaction::finish`].
    pub async fn begin(&self) -> Result<Transaction<'_>, DatabaseError> {
        let conn = self.lock().await;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(Transaction {
            conn,
            abandoned: &self.abandoned,
            finished: false,
        })
    }
}

/// An open write transaction holding the connection lock
pub struct Transaction<'a> {
    conn: MutexGuard<'a, Connection>,
    abandoned: &'a AtomicBool,
    finished: bool,
}

impl Transaction<'_> {
    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        self.finished = true;
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _ = self.conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        self.finished = true;
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to roll back transaction: {}", e))
        })?;
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`
    ///
    /// A failed commit is reported through `E`; a failed rollback is logged and
    /// the original error is returned.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::warn!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.abandoned.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::rows::{query_i64, query_one};
    use tempfile::TempDir;

    async fn count_adjacency(db: &DatabaseService) -> i64 {
        let conn = db.connection().await;
        query_i64(&conn, "SELECT COUNT(*) FROM adjacency_nodes", ())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = DatabaseService::new_in_memory().await.unwrap();

        let tx = db.begin().await.unwrap();
        tx.execute(
            "INSERT INTO adjacency_nodes (entity_type, name) VALUES ('team', 'A')",
            (),
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(count_adjacency(&db).await, 0);
    }

    #[tokio::test]
    async fn test_finish_commits_ok_and_rolls_back_err() {
        let db = DatabaseService::new_in_memory().await.unwrap();

        let tx = db.begin().await.unwrap();
        tx.execute(
            "INSERT INTO adjacency_nodes (entity_type, name) VALUES ('team', 'A')",
            (),
        )
        .await
        .unwrap();
        let kept: Result<(), DatabaseError> = tx.finish(Ok(())).await;
        assert!(kept.is_ok());

        let tx = db.begin().await.unwrap();
        tx.execute(
            "INSERT INTO adjacency_nodes (entity_type, name) VALUES ('team', 'B')",
            (),
        )
        .await
        .unwrap();
        let failed: Result<(), DatabaseError> = tx
            .finish(Err(DatabaseError::sql_execution("forced")))
            .await;
        assert!(failed.is_err());

        assert_eq!(count_adjacency(&db).await, 1);
    }

    #[tokio::test]
    async fn test_abandoned_transaction_is_rolled_back_on_next_use() {
        let db = DatabaseService::new_in_memory().await.unwrap();

        {
            let tx = db.begin().await.unwrap();
            tx.execute(
                "INSERT INTO adjacency_nodes (entity_type, name) VALUES ('team', 'A')",
                (),
            )
            .await
            .unwrap();
            // Dropped without commit or rollback
        }

        // A new transaction can start, and the abandoned insert is gone
        let tx = db.begin().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(count_adjacency(&db).await, 0);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("orgtree.db");

        {
            let db = DatabaseService::new(db_path.clone()).await.unwrap();
            let tx = db.begin().await.unwrap();
            tx.execute(
                "INSERT INTO adjacency_nodes (entity_type, name) VALUES ('team', 'A')",
                (),
            )
            .await
            .unwrap();
            tx.commit().await.unwrap();
        }

        let reopened = DatabaseService::new(db_path).await.unwrap();
        assert_eq!(count_adjacency(&reopened).await, 1);
    }

    async fn journal_mode(db: &DatabaseService) -> Option<String> {
        let conn = db.connection().await;
        query_one(&conn, "PRAGMA journal_mode", (), |row| Ok(row.get::<String>(0)?))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connection_pragmas() {
        let temp_dir = TempDir::new().unwrap();
        let file_db = DatabaseService::new(temp_dir.path().join("pragmas.db"))
            .await
            .unwrap();
        assert_eq!(journal_mode(&file_db).await.as_deref(), Some("wal"));

        let memory_db = DatabaseService::new_in_memory().await.unwrap();
        assert_eq!(journal_mode(&memory_db).await.as_deref(), Some("memory"));

        for db in [&file_db, &memory_db] {
            let conn = db.connection().await;
            let timeout = query_i64(&conn, "PRAGMA busy_timeout", ()).await.unwrap();
            assert_eq!(timeout, i64::from(BUSY_TIMEOUT_MS));
        }
    }
}
