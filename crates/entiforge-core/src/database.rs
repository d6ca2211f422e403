//! Physical store handle.
//!
//! One SQLite connection guarded by a mutex. Each operation takes the
//! connection for one step and gives it back; nothing holds it across steps.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::config::ForgeConfig;
use crate::error::Result;

/// A column as reported by the physical store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalColumn {
    /// Column name.
    pub name: String,
    /// Declared SQL type.
    pub declared_type: String,
    /// Whether the column carries `NOT NULL`.
    pub not_null: bool,
    /// Whether the column is (part of) the primary key.
    pub primary_key: bool,
    /// Default expression as written in the DDL.
    pub default: Option<String>,
    /// Whether a single-column uniqueness constraint covers the column.
    pub unique: bool,
}

/// Handle on the physical SQLite store shared by all components.
pub struct Database {
    conn: Mutex<Connection>,
    config: Arc<ForgeConfig>,
}

impl Database {
    /// Open the database described by the configuration.
    pub fn open(config: Arc<ForgeConfig>) -> Result<Self> {
        let conn = match &config.database_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };
        conn.pragma_update(None, "foreign_keys", true)?;

        debug!(path = ?config.database_path, "database opened");

        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Open an in-memory database with default configuration.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Arc::new(ForgeConfig::in_memory()))
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Shared handle on the configuration.
    pub fn config_arc(&self) -> Arc<ForgeConfig> {
        Arc::clone(&self.config)
    }

    /// Run a closure against the connection outside of any explicit transaction.
    pub fn with_connection<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run a closure inside one transaction.
    ///
    /// Commits when the closure returns `Ok`, rolls back otherwise.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Check whether a table exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.with_connection(|conn| table_exists(conn, table))
    }

    /// List all user tables, sorted by name.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.with_connection(table_names)
    }

    /// Read the physical column layout of a table in declaration order.
    pub fn columns(&self, table: &str) -> Result<Vec<PhysicalColumn>> {
        self.with_connection(|conn| {
            let unique = unique_columns(conn, table)?;
            let mut stmt = conn.prepare(
                "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
            )?;
            let rows = stmt.query_map(params![table], |row| {
                let name: String = row.get(0)?;
                Ok(PhysicalColumn {
                    unique: unique.contains(&name),
                    name,
                    declared_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    default: row.get(3)?,
                    primary_key: row.get::<_, i64>(4)? != 0,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Count rows in a table.
    pub fn row_count(&self, table: &str) -> Result<u64> {
        self.with_connection(|conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

/// Check whether a table exists on the given connection.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// List all user tables on the given connection, sorted by name.
pub fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

fn unique_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1 AND origin = 'u'")?;
    let indexes = stmt
        .query_map(params![table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut columns = Vec::new();
    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1)")?;
    for index in indexes {
        let covered = info
            .query_map(params![index], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        if let [single] = covered.as_slice() {
            columns.push(single.clone());
        }
    }
    Ok(columns)
}

/// Quote an SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
