//! Configuration shared by every component.

use std::path::PathBuf;

/// Default directory for generated migration scripts.
pub const DEFAULT_SCRIPTS_DIR: &str = "./migrations/versions";

/// Default name of the catalog's own table.
pub const DEFAULT_CATALOG_TABLE: &str = "entity_catalog";

/// Default name of the applied-revision table.
pub const DEFAULT_REVISION_TABLE: &str = "entity_revision";

/// Tables starting with this prefix belong to the system and are never
/// generated, migrated or dropped.
pub const DEFAULT_RESERVED_PREFIX: &str = "entity_";

/// Name of the protected catalog node describing the catalog itself.
pub const DEFAULT_BOOTSTRAP_NAME: &str = "Entity";

/// Length of bounded text columns.
pub const DEFAULT_STRING_LENGTH: u32 = 255;

/// Configuration for the catalog, generator, runner and reset pipeline.
///
/// Built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// SQLite database file. `None` opens an in-memory database.
    pub database_path: Option<PathBuf>,

    /// Directory receiving one JSON document per migration script.
    pub scripts_dir: PathBuf,

    /// Physical table holding the catalog.
    pub catalog_table: String,

    /// Physical table holding the applied-revision marker.
    pub revision_table: String,

    /// Table-name prefix reserved for system tables.
    pub reserved_prefix: String,

    /// Name of the protected bootstrap node.
    pub bootstrap_name: String,

    /// Length used for bounded text columns.
    pub string_length: u32,
}

impl ForgeConfig {
    /// Create a configuration for the given database file.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(database_path.into()),
            ..Self::default()
        }
    }

    /// Create a configuration backed by an in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set the scripts directory.
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    /// Set the catalog table name.
    pub fn with_catalog_table(mut self, table: impl Into<String>) -> Self {
        self.catalog_table = table.into();
        self
    }

    /// Set the revision-marker table name.
    pub fn with_revision_table(mut self, table: impl Into<String>) -> Self {
        self.revision_table = table.into();
        self
    }

    /// Set the reserved table prefix.
    pub fn with_reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_prefix = prefix.into();
        self
    }

    /// Set the bounded text length.
    pub fn with_string_length(mut self, length: u32) -> Self {
        self.string_length = length;
        self
    }

    /// Check whether a physical table is owned by the system.
    pub fn is_reserved_table(&self, table: &str) -> bool {
        table == self.catalog_table
            || table == self.revision_table
            || (!self.reserved_prefix.is_empty() && table.starts_with(&self.reserved_prefix))
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            scripts_dir: PathBuf::from(DEFAULT_SCRIPTS_DIR),
            catalog_table: DEFAULT_CATALOG_TABLE.to_string(),
            revision_table: DEFAULT_REVISION_TABLE.to_string(),
            reserved_prefix: DEFAULT_RESERVED_PREFIX.to_string(),
            bootstrap_name: DEFAULT_BOOTSTRAP_NAME.to_string(),
            string_length: DEFAULT_STRING_LENGTH,
        }
    }
}
