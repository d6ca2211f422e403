//! Write-time validation of catalog nodes.

use thiserror::Error;

use crate::config::ForgeConfig;

/// Maximum length of a node name.
pub const MAX_NAME_LEN: usize = 100;

/// Maximum length of a node description.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Maximum length of a physical table name.
pub const MAX_TABLE_NAME_LEN: usize = 50;

/// A malformed catalog write. Nothing is persisted when one is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Name is empty or whitespace.
    #[error("node name must not be empty")]
    EmptyName,

    /// Name is too long.
    #[error("node name '{name}' exceeds 100 characters")]
    NameTooLong {
        /// The offending name.
        name: String,
    },

    /// Description is too long.
    #[error("description exceeds 500 characters")]
    DescriptionTooLong,

    /// A node names itself as its parent.
    #[error("node {id} cannot be its own parent")]
    SelfParent {
        /// The node id.
        id: i64,
    },

    /// The parent assignment would close a cycle.
    #[error("assigning parent {parent_id} to node {id} would create a cycle")]
    Cycle {
        /// The node id.
        id: i64,
        /// The rejected parent.
        parent_id: i64,
    },

    /// Parent does not exist.
    #[error("parent node {parent_id} does not exist")]
    ParentNotFound {
        /// The missing parent.
        parent_id: i64,
    },

    /// A field without a parent.
    #[error("field '{name}' must belong to an entity")]
    FieldWithoutParent {
        /// The field name.
        name: String,
    },

    /// A field whose parent is not a root entity.
    #[error("field '{name}' has parent {parent_id}, which is not a root entity")]
    FieldParentNotRoot {
        /// The field name.
        name: String,
        /// The parent id.
        parent_id: i64,
    },

    /// A table name on a field node.
    #[error("field '{name}' cannot own a table")]
    TableNameOnField {
        /// The field name.
        name: String,
    },

    /// Table name with invalid characters or length.
    #[error("invalid table name '{table}': {reason}")]
    InvalidTableName {
        /// The table name.
        table: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Table name in the reserved system namespace.
    #[error("table name '{table}' uses the reserved prefix '{prefix}'")]
    ReservedTableName {
        /// The table name.
        table: String,
        /// The reserved prefix.
        prefix: String,
    },

    /// Table name already owned by another node.
    #[error("table name '{table}' is already used by node {owner}")]
    DuplicateTableName {
        /// The table name.
        table: String,
        /// The node owning it.
        owner: i64,
    },
}

/// Check the parts of a node that need no catalog lookups.
pub(crate) fn check_shape(
    name: &str,
    description: Option<&str>,
    table_name: Option<&str>,
    is_field: bool,
) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong {
            name: name.to_string(),
        });
    }
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(ValidationError::DescriptionTooLong);
    }
    if let Some(table) = table_name {
        if is_field {
            return Err(ValidationError::TableNameOnField {
                name: name.to_string(),
            });
        }
        check_table_name(table)?;
    }
    Ok(())
}

/// Table names are lower-case identifiers: `^[a-z][a-z0-9_]*$`.
pub fn check_table_name(table: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidTableName {
        table: table.to_string(),
        reason,
    };

    let mut chars = table.chars();
    match chars.next() {
        None => return Err(invalid("must not be empty")),
        Some(c) if !c.is_ascii_lowercase() => {
            return Err(invalid("must start with a lower-case letter"))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(invalid("only lower-case letters, digits and '_' are allowed"));
    }
    if table.len() > MAX_TABLE_NAME_LEN {
        return Err(invalid("longer than 50 characters"));
    }
    Ok(())
}

/// Reject user tables in the reserved namespace.
pub(crate) fn check_not_reserved(
    table: &str,
    name: &str,
    config: &ForgeConfig,
) -> Result<(), ValidationError> {
    let is_bootstrap = name == config.bootstrap_name && table == config.catalog_table;
    if config.is_reserved_table(table) && !is_bootstrap {
        return Err(ValidationError::ReservedTableName {
            table: table.to_string(),
            prefix: config.reserved_prefix.clone(),
        });
    }
    Ok(())
}
