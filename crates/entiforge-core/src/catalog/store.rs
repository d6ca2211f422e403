//! The entity tree store.
//!
//! Nodes live in one flat table keyed by integer id; the tree is walked by
//! `parent_id` lookups, never by embedded references.

use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;

use super::node::{EntityNode, NewNode};
use super::types::FieldType;
use super::validate::{check_not_reserved, check_shape, ValidationError};
use crate::config::ForgeConfig;
use crate::database::{quote_ident, Database};
use crate::error::{Error, Result};

const COLUMNS: &str = "id, name, description, table_name, is_field, is_page, parent_id, \
                       field_type, required, default_value, \"unique\", created_at, updated_at";

/// A root entity together with its ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDescriptor {
    /// The entity node.
    pub entity: EntityNode,
    /// Direct field children, ordered by id.
    pub fields: Vec<EntityNode>,
}

/// Persistence for catalog nodes.
pub struct EntityStore {
    db: Arc<Database>,
}

impl EntityStore {
    /// Create a store over the given database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The underlying database.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Validate and insert a node.
    pub fn create(&self, node: NewNode) -> Result<EntityNode> {
        let config = self.db.config();
        let node = self.db.transaction(|tx| insert_node(tx, config, &node))?;

        debug!(id = node.id, name = %node.name, kind = %node.kind(), "catalog node created");
        Ok(node)
    }

    /// Validate and persist changes to an existing node.
    ///
    /// `created_at` is preserved; `updated_at` is refreshed.
    pub fn update(&self, node: &EntityNode) -> Result<EntityNode> {
        let config = self.db.config();
        self.db.transaction(|tx| {
            if fetch(tx, config, node.id)?.is_none() {
                return Err(Error::NotFound { id: node.id });
            }
            check_shape(
                &node.name,
                node.description.as_deref(),
                node.table_name.as_deref(),
                node.is_field,
            )?;
            if node.parent_id == Some(node.id) {
                return Err(ValidationError::SelfParent { id: node.id }.into());
            }
            check_parent(tx, config, &node.name, node.is_field, node.parent_id)?;
            if let Some(parent_id) = node.parent_id {
                check_acyclic(tx, config, node.id, parent_id)?;
            }
            if node.is_field || node.parent_id.is_some() {
                if let Some(child) = children(tx, config, node.id, true)?.into_iter().next() {
                    return Err(ValidationError::FieldParentNotRoot {
                        name: child.name,
                        parent_id: node.id,
                    }
                    .into());
                }
            }
            if let Some(table) = node.table_name.as_deref() {
                check_not_reserved(table, &node.name, config)?;
                check_table_unique(tx, config, table, Some(node.id))?;
            }

            let now = chrono::Utc::now().naive_utc();
            tx.execute(
                &format!(
                    "UPDATE {} SET name = ?2, description = ?3, table_name = ?4, is_field = ?5,
                     is_page = ?6, parent_id = ?7, field_type = ?8, required = ?9,
                     default_value = ?10, \"unique\" = ?11, updated_at = ?12
                     WHERE id = ?1",
                    table(config)
                ),
                params![
                    node.id,
                    node.name,
                    node.description,
                    node.table_name,
                    node.is_field,
                    node.is_page,
                    node.parent_id,
                    node.field_type.as_ref().map(FieldType::as_str),
                    node.required,
                    node.default_value,
                    node.unique,
                    now,
                ],
            )?;
            fetch(tx, config, node.id)?.ok_or(Error::NotFound { id: node.id })
        })
    }

    /// Fetch a node by id.
    pub fn get(&self, id: i64) -> Result<Option<EntityNode>> {
        let config = self.db.config();
        self.db.with_connection(|conn| fetch(conn, config, id))
    }

    /// First node with the given name, by ascending id.
    pub fn find_by_name(&self, name: &str) -> Result<Option<EntityNode>> {
        let config = self.db.config();
        self.db
            .with_connection(|conn| lookup_by_name(conn, config, name))
    }

    /// Direct children of a node with the given `is_field` flag, by ascending id.
    pub fn children_of(&self, parent_id: i64, is_field: bool) -> Result<Vec<EntityNode>> {
        let config = self.db.config();
        self.db
            .with_connection(|conn| children(conn, config, parent_id, is_field))
    }

    /// Direct field children of an entity.
    pub fn fields_of(&self, entity_id: i64) -> Result<Vec<EntityNode>> {
        self.children_of(entity_id, true)
    }

    /// All nodes without a parent that are not fields, by ascending id.
    ///
    /// This order fixes the order of the migration chain.
    pub fn root_entities(&self) -> Result<Vec<EntityNode>> {
        let config = self.db.config();
        self.db.with_connection(|conn| {
            query_nodes(
                conn,
                &format!(
                    "SELECT {COLUMNS} FROM {} WHERE parent_id IS NULL AND is_field = 0 ORDER BY id",
                    table(config)
                ),
                [],
            )
        })
    }

    /// Every node, by ascending id.
    pub fn nodes(&self) -> Result<Vec<EntityNode>> {
        let config = self.db.config();
        self.db.with_connection(|conn| {
            query_nodes(
                conn,
                &format!("SELECT {COLUMNS} FROM {} ORDER BY id", table(config)),
                [],
            )
        })
    }

    /// An entity with its fields.
    pub fn describe(&self, id: i64) -> Result<EntityDescriptor> {
        let config = self.db.config();
        self.db.with_connection(|conn| {
            let entity = fetch(conn, config, id)?.ok_or(Error::NotFound { id })?;
            let fields = children(conn, config, id, true)?;
            Ok(EntityDescriptor { entity, fields })
        })
    }

    /// Delete every node whose name is not protected. Returns the number of
    /// rows removed.
    pub fn delete_all_except(&self, protected: &[&str]) -> Result<usize> {
        let config = self.db.config();
        self.db
            .transaction(|tx| delete_all_except(tx, config, protected))
    }
}

/// First node with the given name on an open connection.
pub(crate) fn lookup_by_name(
    conn: &Connection,
    config: &ForgeConfig,
    name: &str,
) -> Result<Option<EntityNode>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM {} WHERE name = ?1 ORDER BY id LIMIT 1",
        table(config)
    );
    Ok(conn.query_row(&sql, params![name], node_from_row).optional()?)
}

/// Validate and insert a node on an open connection.
pub(crate) fn insert_node(conn: &Connection, config: &ForgeConfig, node: &NewNode) -> Result<EntityNode> {
    check_shape(
        &node.name,
        node.description.as_deref(),
        node.table_name.as_deref(),
        node.is_field,
    )?;
    if let (Some(id), Some(parent_id)) = (node.id, node.parent_id) {
        if id == parent_id {
            return Err(ValidationError::SelfParent { id }.into());
        }
    }
    check_parent(conn, config, &node.name, node.is_field, node.parent_id)?;
    if let Some(table) = node.table_name.as_deref() {
        check_not_reserved(table, &node.name, config)?;
        check_table_unique(conn, config, table, node.id)?;
    }

    let now = chrono::Utc::now().naive_utc();
    conn.execute(
        &format!(
            "INSERT INTO {} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            table(config)
        ),
        params![
            node.id,
            node.name,
            node.description,
            node.table_name,
            node.is_field,
            node.is_page,
            node.parent_id,
            node.field_type.as_ref().map(FieldType::as_str),
            node.required,
            node.default_value,
            node.unique,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    fetch(conn, config, id)?.ok_or(Error::NotFound { id })
}

/// Delete every catalog node whose name is not in `protected`.
///
/// Returns the number of rows removed, cascaded children included.
pub(crate) fn delete_all_except(
    conn: &Connection,
    config: &ForgeConfig,
    protected: &[&str],
) -> Result<usize> {
    let filter = if protected.is_empty() {
        String::new()
    } else {
        let placeholders = (1..=protected.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" WHERE name NOT IN ({placeholders})")
    };

    let before = row_count(conn, config)?;
    conn.execute(
        &format!("DELETE FROM {}{filter}", table(config)),
        params_from_iter(protected.iter()),
    )?;
    Ok(before.saturating_sub(row_count(conn, config)?))
}

fn row_count(conn: &Connection, config: &ForgeConfig) -> Result<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table(config)),
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn table(config: &ForgeConfig) -> String {
    quote_ident(&config.catalog_table)
}

fn fetch(conn: &Connection, config: &ForgeConfig, id: i64) -> Result<Option<EntityNode>> {
    let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = ?1", table(config));
    Ok(conn.query_row(&sql, params![id], node_from_row).optional()?)
}

fn children(
    conn: &Connection,
    config: &ForgeConfig,
    parent_id: i64,
    is_field: bool,
) -> Result<Vec<EntityNode>> {
    query_nodes(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM {} WHERE parent_id = ?1 AND is_field = ?2 ORDER BY id",
            table(config)
        ),
        params![parent_id, is_field],
    )
}

fn query_nodes<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<EntityNode>> {
    let mut stmt = conn.prepare(sql)?;
    let nodes = stmt
        .query_map(params, node_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(nodes)
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<EntityNode> {
    let field_type: Option<String> = row.get(7)?;
    Ok(EntityNode {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        table_name: row.get(3)?,
        is_field: row.get(4)?,
        is_page: row.get(5)?,
        parent_id: row.get(6)?,
        field_type: field_type.as_deref().map(FieldType::parse),
        required: row.get(8)?,
        default_value: row.get(9)?,
        unique: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn check_parent(
    conn: &Connection,
    config: &ForgeConfig,
    name: &str,
    is_field: bool,
    parent_id: Option<i64>,
) -> Result<()> {
    let Some(parent_id) = parent_id else {
        if is_field {
            return Err(ValidationError::FieldWithoutParent {
                name: name.to_string(),
            }
            .into());
        }
        return Ok(());
    };

    let parent =
        fetch(conn, config, parent_id)?.ok_or(ValidationError::ParentNotFound { parent_id })?;
    if is_field && !parent.is_root_entity() {
        return Err(ValidationError::FieldParentNotRoot {
            name: name.to_string(),
            parent_id,
        }
        .into());
    }
    Ok(())
}

/// Walk the ancestors of `parent_id`; reaching `id` means a cycle.
fn check_acyclic(conn: &Connection, config: &ForgeConfig, id: i64, parent_id: i64) -> Result<()> {
    let sql = format!("SELECT parent_id FROM {} WHERE id = ?1", table(config));
    let mut seen = HashSet::new();
    let mut cursor = Some(parent_id);

    while let Some(current) = cursor {
        if current == id {
            return Err(ValidationError::Cycle { id, parent_id }.into());
        }
        if !seen.insert(current) {
            // Pre-existing loop above us; refuse to join it.
            return Err(ValidationError::Cycle { id, parent_id }.into());
        }
        cursor = conn
            .query_row(&sql, params![current], |row| row.get::<_, Option<i64>>(0))
            .optional()?
            .flatten();
    }
    Ok(())
}

fn check_table_unique(
    conn: &Connection,
    config: &ForgeConfig,
    table_name: &str,
    exclude: Option<i64>,
) -> Result<()> {
    let sql = format!("SELECT id FROM {} WHERE table_name = ?1", table(config));
    let owner: Option<i64> = conn
        .query_row(&sql, params![table_name], |row| row.get(0))
        .optional()?;
    match owner {
        Some(owner) if Some(owner) != exclude => Err(ValidationError::DuplicateTableName {
            table: table_name.to_string(),
            owner,
        }
        .into()),
        _ => Ok(()),
    }
}
