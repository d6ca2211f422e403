//! Physical schema of the catalog table itself.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::config::ForgeConfig;
use crate::database::{quote_ident, table_exists};
use crate::error::Result;

/// Description stored on the bootstrap node.
const BOOTSTRAP_DESCRIPTION: &str = "Catalog of entities, fields and pages";

/// DDL for the catalog table and its indexes.
pub fn create_table_sql(config: &ForgeConfig) -> String {
    let table = quote_ident(&config.catalog_table);
    let name_idx = quote_ident(&format!("{}_name_idx", config.catalog_table));
    let parent_idx = quote_ident(&format!("{}_parent_idx", config.catalog_table));
    format!(
        "CREATE TABLE {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name VARCHAR(100) NOT NULL,
            description VARCHAR(500),
            table_name VARCHAR(50) UNIQUE,
            is_field BOOLEAN NOT NULL DEFAULT 0,
            is_page BOOLEAN NOT NULL DEFAULT 0,
            parent_id INTEGER REFERENCES {table}(id) ON DELETE CASCADE,
            field_type VARCHAR(50),
            required BOOLEAN NOT NULL DEFAULT 0,
            default_value VARCHAR(500),
            \"unique\" BOOLEAN NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            CHECK (parent_id IS NULL OR parent_id <> id)
        );
        CREATE INDEX {name_idx} ON {table} (name);
        CREATE INDEX {parent_idx} ON {table} (parent_id);"
    )
}

/// Create the catalog table when it does not exist yet.
pub fn ensure_table(conn: &Connection, config: &ForgeConfig) -> Result<bool> {
    if table_exists(conn, &config.catalog_table)? {
        return Ok(false);
    }
    conn.execute_batch(&create_table_sql(config))?;
    info!(table = %config.catalog_table, "catalog table created");
    Ok(true)
}

/// Drop the catalog table if present.
pub fn drop_table(conn: &Connection, config: &ForgeConfig) -> Result<()> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {}",
        quote_ident(&config.catalog_table)
    ))?;
    Ok(())
}

/// Drop and recreate the catalog table from its fixed schema.
pub fn recreate(conn: &Connection, config: &ForgeConfig) -> Result<()> {
    if table_exists(conn, &config.catalog_table)? {
        info!(table = %config.catalog_table, "dropping existing catalog table");
        drop_table(conn, config)?;
    }
    conn.execute_batch(&create_table_sql(config))?;
    info!(table = %config.catalog_table, "catalog table recreated");
    Ok(())
}

/// Insert the protected bootstrap node when absent. Returns its id.
pub fn ensure_bootstrap(conn: &Connection, config: &ForgeConfig) -> Result<i64> {
    let table = quote_ident(&config.catalog_table);
    let existing: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1 AND parent_id IS NULL ORDER BY id LIMIT 1"),
            params![config.bootstrap_name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let now = chrono::Utc::now().naive_utc();
    conn.execute(
        &format!(
            "INSERT INTO {table} (name, description, table_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)"
        ),
        params![
            config.bootstrap_name,
            BOOTSTRAP_DESCRIPTION,
            config.catalog_table,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[test]
    fn test_recreate_is_repeatable() {
        let db = Database::open_in_memory().unwrap();
        let config = db.config_arc();

        db.transaction(|tx| recreate(tx, &config)).unwrap();
        let first = db.transaction(|tx| ensure_bootstrap(tx, &config)).unwrap();
        let again = db.transaction(|tx| ensure_bootstrap(tx, &config)).unwrap();
        assert_eq!(first, again);
        assert_eq!(db.row_count(&config.catalog_table).unwrap(), 1);

        db.transaction(|tx| recreate(tx, &config)).unwrap();
        assert_eq!(db.row_count(&config.catalog_table).unwrap(), 0);
        assert!(!db.transaction(|tx| ensure_table(tx, &config)).unwrap());
    }

    #[test]
    fn test_catalog_rejects_self_parent_at_storage_level() {
        let db = Database::open_in_memory().unwrap();
        let config = db.config_arc();
        db.transaction(|tx| ensure_table(tx, &config)).unwrap();

        let result = db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO entity_catalog (id, name, parent_id, created_at, updated_at)
                 VALUES (7, 'loop', 7, '2024-01-01 00:00:00', '2024-01-01 00:00:00')",
                [],
            )
        });
        assert!(result.is_err());
    }
}
