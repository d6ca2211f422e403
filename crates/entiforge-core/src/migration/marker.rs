//! The applied-revision marker.
//!
//! A one-row table in the target store naming the last applied revision.
//! No row means the store is at base.

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::ForgeConfig;
use crate::database::{quote_ident, table_exists};
use crate::error::Result;

/// Access to the marker table.
#[derive(Debug, Clone)]
pub struct RevisionMarker {
    table: String,
}

impl RevisionMarker {
    /// Marker stored in the configured revision table.
    pub fn new(config: &ForgeConfig) -> Self {
        Self {
            table: config.revision_table.clone(),
        }
    }

    /// Name of the marker table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the marker table if missing.
    pub fn ensure(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (version_num TEXT NOT NULL PRIMARY KEY)",
            quote_ident(&self.table)
        ))?;
        Ok(())
    }

    /// The last applied revision. A missing table reads as base.
    pub fn current(&self, conn: &Connection) -> Result<Option<String>> {
        if !table_exists(conn, &self.table)? {
            return Ok(None);
        }
        let revision = conn
            .query_row(
                &format!("SELECT version_num FROM {} LIMIT 1", quote_ident(&self.table)),
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(revision)
    }

    /// Point the marker at `revision`, or at base for `None`.
    pub fn set(&self, conn: &Connection, revision: Option<&str>) -> Result<()> {
        self.ensure(conn)?;
        let table = quote_ident(&self.table);
        conn.execute(&format!("DELETE FROM {table}"), [])?;
        if let Some(revision) = revision {
            conn.execute(
                &format!("INSERT INTO {table} (version_num) VALUES (?1)"),
                params![revision],
            )?;
        }
        Ok(())
    }

    /// Explicitly mark the store as being at base.
    pub fn stamp_base(&self, conn: &Connection) -> Result<()> {
        self.set(conn, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_lifecycle() {
        let conn = Connection::open_in_memory().unwrap();
        let marker = RevisionMarker::new(&ForgeConfig::default());

        assert_eq!(marker.current(&conn).unwrap(), None);

        marker.set(&conn, Some("rev_a")).unwrap();
        assert_eq!(marker.current(&conn).unwrap().as_deref(), Some("rev_a"));

        marker.set(&conn, Some("rev_b")).unwrap();
        assert_eq!(marker.current(&conn).unwrap().as_deref(), Some("rev_b"));
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM entity_revision", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);

        marker.stamp_base(&conn).unwrap();
        assert_eq!(marker.current(&conn).unwrap(), None);
        assert!(table_exists(&conn, "entity_revision").unwrap());
    }
}
