//! SQL execution stores.
//!
//! The browser renders statements for the store's dialect and hands the
//! SQL text over; stores return plain rows with the column labels of the
//! statement. [`SqliteStore`] runs them on a SQLite database, a file or an
//! in-memory one.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use tracing::debug;

use crate::config::{SettingsError, StoreSettings};
use crate::query::Record;
use crate::sql::Dialect;
use crate::star::mapping::PhysicalCatalog;

/// Errors that can occur while executing statements.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store configuration error: {0}")]
    Settings(#[from] SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Statement returned no rows: {0}")]
    NoRows(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result set of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    /// Column labels in select order.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    /// Records keyed by `labels`, built as they are pulled. `labels` replace
    /// the column names of the statement.
    pub fn into_records(self, labels: Vec<String>) -> impl Iterator<Item = Record> {
        self.rows
            .into_iter()
            .map(move |row| labels.iter().cloned().zip(row).collect())
    }
}

/// Executes rendered statements.
pub trait Store {
    /// Dialect the statements have to be rendered in.
    fn dialect(&self) -> Dialect;

    fn fetch(&self, sql: &str) -> StoreResult<Rows>;

    /// Tables and their columns, as visible to the store.
    fn catalog(&self) -> StoreResult<PhysicalCatalog>;
}

/// SQLite database store.
pub struct SqliteStore {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteStore {
    /// Open the database configured in `settings`, an in-memory database
    /// when no path is set.
    pub fn from_settings(settings: &StoreSettings) -> StoreResult<Self> {
        match settings.resolved_path()? {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "opening sqlite store");
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Run a batch of statements, such as a schema and its data.
    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// First column of the first row of `sql`.
    pub fn scalar(&self, sql: &str) -> StoreResult<Value> {
        let rows = self.fetch(sql)?;
        rows.rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .ok_or_else(|| StoreError::NoRows(sql.to_string()))
    }
}

impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn fetch(&self, sql: &str) -> StoreResult<Rows> {
        debug!(sql = %sql, "executing statement");
        let mut statement = self.conn.prepare(sql)?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();

        let mut result = statement.query([])?;
        let mut rows = Vec::new();
        while let Some(row) = result.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(json_value(row.get_ref(index)?));
            }
            rows.push(values);
        }
        Ok(Rows { columns, rows })
    }

    fn catalog(&self) -> StoreResult<PhysicalCatalog> {
        let mut catalog = PhysicalCatalog::new();
        let mut tables = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let names = tables
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut info = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        for name in names {
            let columns = info
                .query_map([&name], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            catalog.add_table(None, &name, columns);
        }
        Ok(catalog)
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}
