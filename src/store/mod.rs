//! SQLite result storage.
//!
//! Persists the most recent result set of each differential query so the next
//! run, including one after a restart, has a baseline to diff against:
//! - query_results: name, results (json), row_count, updated_at
//! - host: key/value pairs, currently the generated host uuid
//!
//! Snapshot-mode queries never touch this store.

pub mod diff;

use crate::query::{ResultSet, Row};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored results could not be decoded: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("could not determine data directory")]
    NoDataDir,
    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Summary of one stored baseline.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredQuery {
    pub name: String,
    pub row_count: usize,
    pub updated_at: i64,
}

/// Data directory for the database and result logs
/// (~/.local/share/vigil or platform equivalent).
pub fn data_dir() -> Result<PathBuf, StoreError> {
    let dir = directories::ProjectDirs::from("", "", "vigil")
        .ok_or(StoreError::NoDataDir)?
        .data_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_db_path() -> Result<PathBuf, StoreError> {
    Ok(data_dir()?.join("vigil.db"))
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS query_results (
            name TEXT PRIMARY KEY,
            results TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS host (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn load_results(conn: &Connection, name: &str) -> Result<Option<ResultSet>, StoreError> {
    let encoded: Option<String> = conn
        .query_row(
            "SELECT results FROM query_results WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    match encoded {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Prior-run results keyed by query name.
///
/// The connection sits behind a mutex, so every read-diff-write cycle on the
/// store is serialized even if more than one scheduler shares it.
pub struct ResultStore {
    conn: Mutex<Connection>,
}

impl ResultStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(ResultStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(ResultStore {
            conn: Mutex::new(conn),
        })
    }

    /// Stored results for `name`, or `None` if the query never ran in
    /// differential mode.
    pub fn get(&self, name: &str) -> Result<Option<ResultSet>, StoreError> {
        let conn = self.conn.lock();
        load_results(&conn, name)
    }

    /// All stored baselines, by name.
    pub fn list(&self) -> Result<Vec<StoredQuery>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, row_count, updated_at
             FROM query_results
             ORDER BY name",
        )?;

        let stored = stmt
            .query_map([], |row| {
                Ok(StoredQuery {
                    name: row.get(0)?,
                    row_count: row.get::<_, i64>(1)?.max(0) as usize,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stored)
    }

    /// Drop the baseline for `name`. Returns false if nothing was stored.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM query_results WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }

    /// Host uuid, generated on first use and stable across restarts.
    pub fn host_uuid(&self) -> Result<String, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row("SELECT value FROM host WHERE key = 'uuid'", [], |row| row.get(0))
            .optional()?;

        let uuid = match existing {
            Some(uuid) => uuid,
            None => {
                let uuid = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO host (key, value) VALUES ('uuid', ?1)",
                    params![uuid],
                )?;
                uuid
            }
        };

        tx.commit()?;
        Ok(uuid)
    }

    /// Load the stored results for `name`, hand them to `compare`, then replace
    /// them with `results`, all in one transaction. If any step fails the
    /// transaction rolls back and the previous results stay in place.
    fn swap_results<T>(
        &self,
        name: &str,
        results: &[Row],
        compare: impl FnOnce(&[Row]) -> T,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous = load_results(&tx, name)?.unwrap_or_default();
        let outcome = compare(&previous);

        let encoded = serde_json::to_string(results)?;
        tx.execute(
            "INSERT INTO query_results (name, results, row_count, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                results = excluded.results,
                row_count = excluded.row_count,
                updated_at = excluded.updated_at",
            params![
                name,
                encoded,
                results.len() as i64,
                chrono::Utc::now().timestamp()
            ],
        )?;

        tx.commit()?;
        Ok(outcome)
    }
}
