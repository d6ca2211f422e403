//! Migration generation and execution.
//!
//! The catalog is turned into a linear chain of scripts, one per root
//! entity, each creating that entity's table. The runner applies the chain
//! to the physical store and tracks progress in a one-row marker table.
//!
//! # Example
//!
//! ```ignore
//! use entiforge_core::migration::{MigrationGenerator, MigrationRunner, ScriptRepository};
//!
//! let repository = ScriptRepository::open(&config.scripts_dir)?;
//! let report = MigrationGenerator::new(db.clone(), repository.clone()).generate()?;
//! if report.is_clean() {
//!     MigrationRunner::new(db, repository).upgrade()?;
//! }
//! ```

pub mod chain;
pub mod ddl;
pub mod error;
pub mod generator;
pub mod marker;
pub mod repository;
pub mod runner;
pub mod script;

pub use error::MigrationError;
pub use generator::{
    build_script, plan_default, revision_id, DefaultPlan, EntityOutcome, GenerationReport,
    MigrationGenerator, OutcomeStatus,
};
pub use marker::RevisionMarker;
pub use repository::ScriptRepository;
pub use runner::{ChainEntry, ChainStatus, MigrationRunner, UpgradeReport};
pub use script::{
    Backfill, ColumnDefault, ColumnSpec, DefaultLiteral, DowngradeAction, MigrationScript,
    UpgradeAction,
};
