//! Query execution.
//!
//! The scheduler only needs "query text in, rows out". [`SqliteEngine`] runs
//! query text against a SQLite database and stringifies every column; other
//! data sources plug in through [`QueryEngine`].

use crate::query::{ResultSet, Row};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("error executing query ({query}): {message}")]
pub struct ExecutionError {
    pub query: String,
    pub message: String,
}

impl ExecutionError {
    pub fn new(query: &str, message: impl ToString) -> Self {
        ExecutionError {
            query: query.to_string(),
            message: message.to_string(),
        }
    }
}

pub trait QueryEngine: Send + Sync {
    fn execute(&self, query: &str) -> Result<ResultSet, ExecutionError>;
}

pub struct SqliteEngine {
    conn: Mutex<Connection>,
}

impl SqliteEngine {
    /// Open `path` read-only. Scheduled queries observe the source, they never
    /// write to it.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteEngine {
            conn: Mutex::new(conn),
        }
    }
}

impl QueryEngine for SqliteEngine {
    fn execute(&self, query: &str) -> Result<ResultSet, ExecutionError> {
        let fail = |e: rusqlite::Error| ExecutionError::new(query, e);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(query).map_err(fail)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt.query([]).map_err(fail)?;
        let mut results = Vec::new();

        while let Some(source) = rows.next().map_err(fail)? {
            let mut row = Row::new();
            for (index, column) in columns.iter().enumerate() {
                let value = source.get_ref(index).map_err(fail)?;
                row.insert(column.clone(), value_to_string(value));
            }
            results.push(row);
        }

        Ok(results)
    }
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
        ValueRef::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for byte in bytes {
                let _ = write!(hex, "{byte:02x}");
            }
            hex
        }
    }
}
