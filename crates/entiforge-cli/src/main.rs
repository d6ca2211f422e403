//! Entiforge Command-Line Interface
//!
//! Maintenance commands for the entity catalog, the migration chain and the
//! reset pipeline.

mod formatter;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use entiforge_core::config::DEFAULT_SCRIPTS_DIR;
use entiforge_core::pipeline::Stage;
use entiforge_core::{
    install_default_pages, Database, EntityStore, ForgeConfig, MigrationGenerator,
    MigrationRunner, ResetPipeline, ScriptRepository,
};
use formatter::OutputFormat;

/// Default database file.
const DEFAULT_DATABASE: &str = "./data/entiforge.db";

/// Entiforge Command-Line Interface
#[derive(Parser, Debug)]
#[command(name = "entiforge")]
#[command(version, about = "Entity catalog and migration pipeline")]
pub struct Args {
    /// SQLite database file
    #[arg(short, long, default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Directory holding migration scripts
    #[arg(short, long, default_value = DEFAULT_SCRIPTS_DIR)]
    pub scripts_dir: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wipe the store and rebuild it from the default entities
    Reset,
    /// Drop and recreate the catalog table
    RecreateCatalog,
    /// Insert the default system entities if missing
    Seed,
    /// Generate migration scripts from the catalog
    Generate,
    /// Apply pending migration scripts
    Migrate {
        /// Stop after this revision
        #[arg(long)]
        to: Option<String>,
    },
    /// Revert applied migration scripts
    Downgrade {
        /// Revert down to this revision; base when omitted
        #[arg(long)]
        to: Option<String>,
    },
    /// Show the migration chain
    Status,
    /// List catalog nodes
    Catalog,
    /// Install the default pages
    SetupPages,
}

impl Args {
    /// Convert arguments into a forge configuration.
    pub fn into_config(self) -> (ForgeConfig, Command, OutputFormat) {
        let config = ForgeConfig::new(self.database).with_scripts_dir(self.scripts_dir);
        (config, self.command, self.format)
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0} entity(ies) could not be generated")]
    Generation(usize),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entiforge=info,entiforge_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let (config, command, format) = args.into_config();

    tracing::info!(
        database = ?config.database_path,
        scripts_dir = %config.scripts_dir.display(),
        "configuration loaded"
    );

    let db = Arc::new(Database::open(Arc::new(config))?);
    let formatter = formatter::create_formatter(format);
    let repository = || ScriptRepository::open(&db.config().scripts_dir);

    let output = match command {
        Command::Reset => {
            let report = ResetPipeline::new(Arc::clone(&db))?.run()?;
            formatter.format_pipeline(&report)
        }
        Command::RecreateCatalog => {
            let report = ResetPipeline::new(Arc::clone(&db))?.run_stage(Stage::RecreateCatalog)?;
            formatter.format_stage(&report)
        }
        Command::Seed => {
            let report = ResetPipeline::new(Arc::clone(&db))?.run_stage(Stage::SeedDefaults)?;
            formatter.format_stage(&report)
        }
        Command::Generate => {
            let report = MigrationGenerator::new(Arc::clone(&db), repository()?).generate()?;
            println!("{}", formatter.format_generation(&report));
            if !report.is_clean() {
                return Err(CliError::Generation(report.failures.len()).into());
            }
            return Ok(());
        }
        Command::Migrate { to } => {
            let report = MigrationRunner::new(Arc::clone(&db), repository()?).upgrade_to(to.as_deref())?;
            formatter.format_upgrade(&report)
        }
        Command::Downgrade { to } => {
            let reverted =
                MigrationRunner::new(Arc::clone(&db), repository()?).downgrade_to(to.as_deref())?;
            formatter.format_reverted(&reverted)
        }
        Command::Status => {
            let status = MigrationRunner::new(Arc::clone(&db), repository()?).status()?;
            formatter.format_status(&status)
        }
        Command::Catalog => {
            let nodes = EntityStore::new(Arc::clone(&db)).nodes()?;
            formatter.format_nodes(&nodes)
        }
        Command::SetupPages => {
            let layout = install_default_pages(&db)?;
            formatter.format_document(&layout)
        }
    };

    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_to() {
        let args = Args::parse_from(["entiforge", "--format", "json", "migrate", "--to", "rev1"]);
        let (config, command, format) = args.into_config();
        assert_eq!(format, OutputFormat::Json);
        assert_eq!(config.database_path, Some(PathBuf::from(DEFAULT_DATABASE)));
        assert!(matches!(command, Command::Migrate { to: Some(ref rev) } if rev == "rev1"));
    }

    #[test]
    fn test_parse_paths() {
        let args = Args::parse_from([
            "entiforge",
            "--database",
            "/tmp/x.db",
            "--scripts-dir",
            "/tmp/versions",
            "status",
        ]);
        let (config, command, _) = args.into_config();
        assert_eq!(config.scripts_dir, PathBuf::from("/tmp/versions"));
        assert!(matches!(command, Command::Status));
    }
}
