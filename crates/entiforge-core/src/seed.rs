//! Built-in system entities and default pages.

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{insert_node, lookup_by_name, FieldType, NewNode};
use crate::config::ForgeConfig;
use crate::database::{quote_ident, table_exists, Database};
use crate::error::{Error, Result};

/// Table that holds page rows once migrations have run.
pub const PAGES_TABLE: &str = "pages";

/// Layout installed for the login page.
pub const LOGIN_LAYOUT: &str = include_str!("../data/login_layout.json");

/// A field of a built-in entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemField {
    /// Field name.
    pub name: &'static str,
    /// Field description.
    pub description: &'static str,
    /// Field type.
    pub field_type: FieldType,
    /// Whether the column is NOT NULL.
    pub required: bool,
    /// Whether the column is unique.
    pub unique: bool,
    /// Raw default value.
    pub default_value: Option<&'static str>,
}

/// A built-in root entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemEntity {
    /// Entity name.
    pub name: &'static str,
    /// Entity description.
    pub description: &'static str,
    /// Physical table.
    pub table_name: &'static str,
    /// Fields in insertion order.
    pub fields: Vec<SystemField>,
}

fn field(name: &'static str, description: &'static str, field_type: FieldType) -> SystemField {
    SystemField {
        name,
        description,
        field_type,
        required: false,
        unique: false,
        default_value: None,
    }
}

/// The entities every catalog starts with.
pub fn system_entities() -> Vec<SystemEntity> {
    vec![
        SystemEntity {
            name: "Users",
            description: "System entity for managing users",
            table_name: "users",
            fields: vec![
                SystemField {
                    required: true,
                    unique: true,
                    ..field("email", "User's email address", FieldType::String)
                },
                SystemField {
                    required: true,
                    ..field("password", "User's hashed password", FieldType::Password)
                },
            ],
        },
        SystemEntity {
            name: "Pages",
            description: "System entity for managing pages",
            table_name: PAGES_TABLE,
            fields: vec![
                SystemField {
                    required: true,
                    ..field("title", "Page title", FieldType::String)
                },
                SystemField {
                    required: true,
                    unique: true,
                    ..field("slug", "URL-friendly page identifier", FieldType::String)
                },
                field("entity_type", "Entity type to display", FieldType::String),
                SystemField {
                    required: true,
                    ..field("layout", "Page layout configuration", FieldType::Json)
                },
                SystemField {
                    default_value: Some("10"),
                    ..field("items_per_page", "Number of items per page", FieldType::Integer)
                },
            ],
        },
    ]
}

/// What a seeding run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Entities inserted by this run.
    pub created: Vec<String>,
    /// Entities that were already present.
    pub existing: Vec<String>,
}

/// Insert the system entities that are missing, matching by name.
pub fn seed_defaults(conn: &Connection, config: &ForgeConfig) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    for entity in system_entities() {
        if lookup_by_name(conn, config, entity.name)?.is_some() {
            debug!(entity = entity.name, "system entity already present");
            report.existing.push(entity.name.to_string());
            continue;
        }

        let parent = insert_node(
            conn,
            config,
            &NewNode::entity(entity.name, entity.table_name).with_description(entity.description),
        )?;
        for system_field in &entity.fields {
            let mut node = NewNode::field(parent.id, system_field.name, system_field.field_type.clone())
                .with_description(system_field.description);
            if system_field.required {
                node = node.required();
            }
            if system_field.unique {
                node = node.unique();
            }
            if let Some(default) = system_field.default_value {
                node = node.with_default(default);
            }
            insert_node(conn, config, &node)?;
        }
        info!(entity = entity.name, fields = entity.fields.len(), "system entity created");
        report.created.push(entity.name.to_string());
    }
    Ok(report)
}

/// Insert or refresh the login page row. Returns the installed layout.
///
/// Needs the pages table, so it runs after migrations.
pub fn install_default_pages(db: &Database) -> Result<serde_json::Value> {
    let layout: serde_json::Value = serde_json::from_str(LOGIN_LAYOUT)?;
    let document = layout.to_string();

    db.transaction(|tx| {
        if !table_exists(tx, PAGES_TABLE)? {
            return Err(Error::InvalidData(format!(
                "table '{PAGES_TABLE}' does not exist; apply migrations first"
            )));
        }
        tx.execute(
            &format!(
                "INSERT INTO {} (title, slug, layout, entity_type) VALUES (?1, ?2, ?3, NULL)
                 ON CONFLICT (slug) DO UPDATE SET layout = excluded.layout, updated_at = CURRENT_TIMESTAMP",
                quote_ident(PAGES_TABLE)
            ),
            params!["Login", "login", document],
        )?;
        Ok(())
    })?;

    info!(slug = "login", "default pages installed");
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{schema, EntityStore};
    use std::sync::Arc;

    #[test]
    fn test_system_entities_shape() {
        let entities = system_entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "Users");
        assert_eq!(entities[1].fields.len(), 5);
        let items = &entities[1].fields[4];
        assert_eq!(items.default_value, Some("10"));
        assert!(!items.required);
        assert!(!entities[1].fields[2].required);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let config = db.config_arc();
        db.transaction(|tx| schema::ensure_table(tx, &config)).unwrap();

        let first = db.transaction(|tx| seed_defaults(tx, &config)).unwrap();
        assert_eq!(first.created, vec!["Users", "Pages"]);

        let second = db.transaction(|tx| seed_defaults(tx, &config)).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing, vec!["Users", "Pages"]);

        let store = EntityStore::new(db);
        assert_eq!(store.nodes().unwrap().len(), 2 + 2 + 5);
        let users = store.find_by_name("Users").unwrap().unwrap();
        let fields = store.fields_of(users.id).unwrap();
        assert_eq!(fields[0].name, "email");
        assert!(fields[0].required && fields[0].unique);
        assert_eq!(fields[1].field_type, Some(FieldType::Password));
    }

    #[test]
    fn test_login_layout_is_json() {
        let layout: serde_json::Value = serde_json::from_str(LOGIN_LAYOUT).unwrap();
        assert_eq!(layout["title"], "Login");
    }

    #[test]
    fn test_install_pages_requires_table() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            install_default_pages(&db),
            Err(Error::InvalidData(_))
        ));
    }
}
