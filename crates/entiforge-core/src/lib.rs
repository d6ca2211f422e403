//! Entiforge Core - entity catalog, migration generation and the reset pipeline.
//!
//! Entities and their fields are described as rows in a self-referential
//! catalog table. From that catalog the crate generates a linear chain of
//! table-creation scripts and applies it to the same SQLite store.

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod migration;
pub mod pipeline;
pub mod seed;

pub use catalog::{
    EntityDescriptor, EntityNode, EntityStore, FieldType, NewNode, NodeKind, PhysicalType,
    TypeMapper, ValidationError,
};
pub use config::ForgeConfig;
pub use database::Database;
pub use error::{Error, Result};
pub use migration::{
    ChainStatus, GenerationReport, MigrationError, MigrationGenerator, MigrationRunner,
    MigrationScript, ScriptRepository,
};
pub use pipeline::{PipelineError, PipelineReport, ResetPipeline, Stage, StageReport};
pub use seed::{install_default_pages, system_entities};
