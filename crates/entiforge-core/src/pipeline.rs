//! The reset and rebuild pipeline.
//!
//! Five stages run in a fixed order, each gated on the previous one. A
//! failing stage stops the run but keeps whatever earlier stages committed;
//! every stage is safe to run again, so recovery is a rerun from the top.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::{delete_all_except, schema};
use crate::database::{quote_ident, table_names, Database};
use crate::migration::{
    GenerationReport, MigrationError, MigrationGenerator, MigrationRunner, ScriptRepository,
    UpgradeReport,
};
use crate::seed::{seed_defaults, SeedReport};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Drop user tables, clear the catalog and the chain.
    Wipe,
    /// Rebuild the catalog table from its fixed schema.
    RecreateCatalog,
    /// Insert the built-in entities.
    SeedDefaults,
    /// Write migration scripts for the catalog.
    Generate,
    /// Bring the store up to the chain's head.
    Apply,
}

impl Stage {
    /// Every stage, in order.
    pub const ALL: [Stage; 5] = [
        Stage::Wipe,
        Stage::RecreateCatalog,
        Stage::SeedDefaults,
        Stage::Generate,
        Stage::Apply,
    ];

    /// Stable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Wipe => "wipe",
            Stage::RecreateCatalog => "recreate_catalog",
            Stage::SeedDefaults => "seed_defaults",
            Stage::Generate => "generate",
            Stage::Apply => "apply",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the wipe stage removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WipeReport {
    /// Revisions reverted through the chain.
    pub reverted: Vec<String>,
    /// Tables dropped directly.
    pub dropped_tables: Vec<String>,
    /// Catalog rows deleted.
    pub deleted_nodes: usize,
    /// Script files removed.
    pub cleared_scripts: usize,
}

/// Result of one stage.
#[derive(Debug, Serialize)]
#[serde(tag = "stage", content = "report", rename_all = "snake_case")]
pub enum StageReport {
    /// See [`WipeReport`].
    Wipe(WipeReport),
    /// Id of the bootstrap node after the rebuild.
    RecreateCatalog {
        /// Bootstrap node id.
        bootstrap_id: i64,
    },
    /// See [`SeedReport`].
    SeedDefaults(SeedReport),
    /// See [`GenerationReport`].
    Generate(GenerationReport),
    /// See [`UpgradeReport`].
    Apply(UpgradeReport),
}

impl StageReport {
    /// The stage this report belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            StageReport::Wipe(_) => Stage::Wipe,
            StageReport::RecreateCatalog { .. } => Stage::RecreateCatalog,
            StageReport::SeedDefaults(_) => Stage::SeedDefaults,
            StageReport::Generate(_) => Stage::Generate,
            StageReport::Apply(_) => Stage::Apply,
        }
    }
}

/// Reports of a completed pipeline run.
#[derive(Debug, Default, Serialize)]
pub struct PipelineReport {
    /// One report per stage, in order.
    pub stages: Vec<StageReport>,
}

/// A stage failed; later stages did not run.
#[derive(Debug, Error)]
#[error("pipeline stage '{stage}' failed: {source}")]
pub struct PipelineError {
    /// The failing stage.
    pub stage: Stage,
    /// Reports of the stages that completed before it.
    pub completed: Vec<StageReport>,
    /// Cause.
    #[source]
    pub source: MigrationError,
}

/// Drives the reset and rebuild stages.
pub struct ResetPipeline {
    db: Arc<Database>,
    repository: ScriptRepository,
}

impl ResetPipeline {
    /// Pipeline over `db`, with scripts in the configured directory.
    pub fn new(db: Arc<Database>) -> Result<Self, MigrationError> {
        let repository = ScriptRepository::open(&db.config().scripts_dir)?;
        Ok(Self::with_repository(db, repository))
    }

    /// Pipeline over `db` using an explicit script repository.
    pub fn with_repository(db: Arc<Database>, repository: ScriptRepository) -> Self {
        Self { db, repository }
    }

    /// Run every stage in order.
    pub fn run(&self) -> Result<PipelineReport, PipelineError> {
        let mut completed = Vec::new();

        for stage in Stage::ALL {
            match self.run_stage(stage) {
                Ok(stage_report) => completed.push(stage_report),
                Err(source) => {
                    error!(stage = %stage, error = %source, "pipeline aborted");
                    return Err(PipelineError {
                        stage,
                        completed,
                        source,
                    });
                }
            }
        }

        info!(stages = completed.len(), "pipeline finished");
        Ok(PipelineReport { stages: completed })
    }

    /// Run one stage on its own.
    pub fn run_stage(&self, stage: Stage) -> Result<StageReport, MigrationError> {
        info!(stage = %stage, "stage started");
        let report = match stage {
            Stage::Wipe => StageReport::Wipe(self.wipe()?),
            Stage::RecreateCatalog => StageReport::RecreateCatalog {
                bootstrap_id: self.recreate_catalog()?,
            },
            Stage::SeedDefaults => StageReport::SeedDefaults(self.seed()?),
            Stage::Generate => StageReport::Generate(self.generate()?),
            Stage::Apply => StageReport::Apply(self.runner().upgrade()?),
        };
        info!(stage = %stage, "stage completed");
        Ok(report)
    }

    fn runner(&self) -> MigrationRunner {
        MigrationRunner::new(Arc::clone(&self.db), self.repository.clone())
    }

    fn wipe(&self) -> Result<WipeReport, MigrationError> {
        let config = self.db.config();
        let runner = self.runner();
        let mut report = WipeReport::default();

        let current = runner.current()?;
        let chain_known = match runner.chain() {
            Ok(chain) => current
                .as_deref()
                .is_some_and(|rev| chain.iter().any(|s| s.revision_id == rev)),
            Err(err) => {
                warn!(error = %err, "existing chain unusable; marking base");
                false
            }
        };
        if chain_known {
            report.reverted = runner.downgrade_to(None)?;
        } else {
            runner.stamp_base()?;
        }

        report.dropped_tables = self.db.transaction(|tx| {
            let mut dropped = Vec::new();
            for table in table_names(tx)? {
                if config.is_reserved_table(&table) {
                    continue;
                }
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table)))?;
                dropped.push(table);
            }
            Ok::<_, crate::error::Error>(dropped)
        })?;

        report.deleted_nodes = self.db.transaction(|tx| {
            if !crate::database::table_exists(tx, &config.catalog_table)? {
                return Ok(0);
            }
            delete_all_except(tx, config, &[config.bootstrap_name.as_str()])
        })?;

        report.cleared_scripts = self.repository.clear()?;

        info!(
            reverted = report.reverted.len(),
            dropped = report.dropped_tables.len(),
            deleted_nodes = report.deleted_nodes,
            cleared_scripts = report.cleared_scripts,
            "store wiped"
        );
        Ok(report)
    }

    fn recreate_catalog(&self) -> Result<i64, MigrationError> {
        let config = self.db.config();
        let id = self.db.transaction(|tx| {
            schema::recreate(tx, config)?;
            schema::ensure_bootstrap(tx, config)
        })?;
        Ok(id)
    }

    fn seed(&self) -> Result<SeedReport, MigrationError> {
        let config = self.db.config();
        let report = self.db.transaction(|tx| {
            schema::ensure_table(tx, config)?;
            seed_defaults(tx, config)
        })?;
        info!(
            created = report.created.len(),
            existing = report.existing.len(),
            "defaults seeded"
        );
        Ok(report)
    }

    fn generate(&self) -> Result<GenerationReport, MigrationError> {
        let generator = MigrationGenerator::new(Arc::clone(&self.db), self.repository.clone());
        let mut report = generator.generate()?;
        if report.is_clean() {
            return Ok(report);
        }
        for failure in &report.failures {
            warn!(error = %failure, "entity not generated");
        }
        Err(report.failures.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_names() {
        let names: Vec<String> = Stage::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["wipe", "recreate_catalog", "seed_defaults", "generate", "apply"]
        );
    }

    #[test]
    fn test_stage_report_json() {
        let report = StageReport::RecreateCatalog { bootstrap_id: 1 };
        assert_eq!(report.stage(), Stage::RecreateCatalog);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stage"], "recreate_catalog");
        assert_eq!(json["report"]["bootstrap_id"], 1);
    }
}
