//! Migration script artifacts.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::catalog::PhysicalType;
use crate::database::quote_literal;

/// A typed literal used as a column default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultLiteral {
    /// Integer literal.
    Integer(i64),
    /// Finite floating point literal.
    Float(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Quoted string literal.
    Text(String),
}

impl DefaultLiteral {
    /// Render as an SQL literal.
    pub fn sql(&self) -> String {
        match self {
            DefaultLiteral::Integer(v) => v.to_string(),
            DefaultLiteral::Float(v) => {
                let text = v.to_string();
                if text.contains(['.', 'e', 'E']) {
                    text
                } else {
                    format!("{text}.0")
                }
            }
            DefaultLiteral::Boolean(v) => if *v { "1" } else { "0" }.to_string(),
            DefaultLiteral::Text(v) => quote_literal(v),
        }
    }
}

/// Default applied by the store when a row omits the column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnDefault {
    /// The insertion time.
    CurrentTimestamp,
    /// A fixed literal.
    Literal {
        /// The literal value.
        value: DefaultLiteral,
    },
}

impl ColumnDefault {
    /// Render as an SQL default expression.
    pub fn sql(&self) -> String {
        match self {
            ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            ColumnDefault::Literal { value } => value.sql(),
        }
    }
}

/// One column of a generated table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Physical type.
    pub physical_type: PhysicalType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether a uniqueness constraint applies.
    pub unique: bool,
    /// Whether this is the synthetic primary key.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
    /// Column default.
    pub default: Option<ColumnDefault>,
    /// Whether the column is refreshed to the current time on row update.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub on_update: bool,
}

impl ColumnSpec {
    /// A column with no constraints beyond its nullability.
    pub fn new(name: impl Into<String>, physical_type: PhysicalType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            physical_type,
            nullable,
            unique: false,
            primary_key: false,
            default: None,
            on_update: false,
        }
    }

    /// The synthetic integer primary key.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, PhysicalType::Integer, false)
        }
    }

    /// A non-null timestamp defaulting to the insertion time.
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self {
            default: Some(ColumnDefault::CurrentTimestamp),
            ..Self::new(name, PhysicalType::DateTime, false)
        }
    }
}

/// A data statement run right after table creation: fill NULLs in `column`
/// with a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backfill {
    /// Target column.
    pub column: String,
    /// JSON-serialized value.
    pub value: String,
}

/// Create one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeAction {
    /// Table to create.
    pub table: String,
    /// Columns in creation order.
    pub columns: Vec<ColumnSpec>,
    /// Data statements applied after creation.
    #[serde(default)]
    pub backfill: Vec<Backfill>,
}

/// Drop one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowngradeAction {
    /// Table to drop.
    pub table: String,
}

/// A unit of the migration chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationScript {
    /// Identifier of this script.
    pub revision_id: String,
    /// The script this one follows; `None` for the first.
    pub down_revision: Option<String>,
    /// Catalog id of the originating entity.
    pub entity_id: i64,
    /// Name of the originating entity.
    pub entity: String,
    /// When the script was written.
    pub generated_at: NaiveDateTime,
    /// Forward action.
    pub upgrade: UpgradeAction,
    /// Reverse action.
    pub downgrade: DowngradeAction,
}

impl MigrationScript {
    /// The table this script manages.
    pub fn table(&self) -> &str {
        &self.upgrade.table
    }
}
