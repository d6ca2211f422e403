//! Catalog nodes.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::types::FieldType;

/// What a catalog node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A record type, possibly owning a physical table.
    Entity,
    /// A column of its parent entity.
    Field,
    /// A UI page descriptor; catalog-only.
    Page,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Entity => write!(f, "entity"),
            NodeKind::Field => write!(f, "field"),
            NodeKind::Page => write!(f, "page"),
        }
    }
}

/// A persisted catalog node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityNode {
    /// Stable identity.
    pub id: i64,
    /// Display name; unique only among siblings by convention.
    pub name: String,
    /// Free text.
    pub description: Option<String>,
    /// Physical table owned by a root entity.
    pub table_name: Option<String>,
    /// Whether this node is a column of its parent.
    pub is_field: bool,
    /// Whether this node is a page descriptor.
    pub is_page: bool,
    /// Parent node.
    pub parent_id: Option<i64>,
    /// Field type token, meaningful for fields only.
    pub field_type: Option<FieldType>,
    /// Drives column nullability.
    pub required: bool,
    /// Literal or JSON-serialized default.
    pub default_value: Option<String>,
    /// Drives a uniqueness constraint.
    pub unique: bool,
    /// Assigned by the store on insert.
    pub created_at: NaiveDateTime,
    /// Refreshed by the store on every update.
    pub updated_at: NaiveDateTime,
}

impl EntityNode {
    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        if self.is_field {
            NodeKind::Field
        } else if self.is_page {
            NodeKind::Page
        } else {
            NodeKind::Entity
        }
    }

    /// A root entity has no parent and is not a field.
    pub fn is_root_entity(&self) -> bool {
        self.parent_id.is_none() && !self.is_field
    }

    /// Resolved field type; fields without a token are strings.
    pub fn resolved_field_type(&self) -> FieldType {
        self.field_type.clone().unwrap_or(FieldType::String)
    }

    /// Column name derived from the node name.
    pub fn column_name(&self) -> String {
        column_name(&self.name)
    }
}

/// Normalize a display name into a column name.
pub fn column_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// A node about to be written to the catalog.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewNode {
    /// Explicit id; assigned by the store when absent.
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Free text.
    pub description: Option<String>,
    /// Physical table name.
    pub table_name: Option<String>,
    /// Whether this node is a field.
    pub is_field: bool,
    /// Whether this node is a page.
    pub is_page: bool,
    /// Parent node.
    pub parent_id: Option<i64>,
    /// Field type.
    pub field_type: Option<FieldType>,
    /// Whether the field is required.
    pub required: bool,
    /// Default value.
    pub default_value: Option<String>,
    /// Whether the field is unique.
    pub unique: bool,
}

impl NewNode {
    /// A root entity owning the given table.
    pub fn entity(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: Some(table_name.into()),
            ..Self::default()
        }
    }

    /// An optional field of the given parent entity.
    pub fn field(parent_id: i64, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            is_field: true,
            parent_id: Some(parent_id),
            field_type: Some(field_type),
            ..Self::default()
        }
    }

    /// A page descriptor.
    pub fn page(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_page: true,
            ..Self::default()
        }
    }

    /// Use an explicit id.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the parent.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_name_normalization() {
        assert_eq!(column_name("Items Per Page"), "items_per_page");
        assert_eq!(column_name("email"), "email");
        assert_eq!(column_name("First  Name"), "first__name");
    }

    #[test]
    fn test_builders() {
        let field = NewNode::field(3, "slug", FieldType::String)
            .required()
            .unique()
            .with_default("home");
        assert!(field.is_field);
        assert!(field.required);
        assert!(field.unique);
        assert_eq!(field.parent_id, Some(3));
        assert_eq!(field.default_value.as_deref(), Some("home"));

        let entity = NewNode::entity("Users", "users").with_description("people");
        assert!(!entity.is_field);
        assert_eq!(entity.table_name.as_deref(), Some("users"));

        let page = NewNode::page("Dashboard");
        assert!(page.is_page);
        assert!(page.table_name.is_none());
    }
}
