//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use entiforge_core::migration::{ChainStatus, GenerationReport, OutcomeStatus, UpgradeReport};
use entiforge_core::pipeline::{PipelineReport, StageReport};
use entiforge_core::EntityNode;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format catalog nodes.
    fn format_nodes(&self, nodes: &[EntityNode]) -> String;

    /// Format a generation run.
    fn format_generation(&self, report: &GenerationReport) -> String;

    /// Format an upgrade run.
    fn format_upgrade(&self, report: &UpgradeReport) -> String;

    /// Format reverted revisions.
    fn format_reverted(&self, reverted: &[String]) -> String;

    /// Format the chain status.
    fn format_status(&self, status: &ChainStatus) -> String;

    /// Format one stage report.
    fn format_stage(&self, report: &StageReport) -> String;

    /// Format a full pipeline run.
    fn format_pipeline(&self, report: &PipelineReport) -> String;

    /// Format an arbitrary JSON document.
    fn format_document(&self, document: &serde_json::Value) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_nodes(&self, nodes: &[EntityNode]) -> String {
        if nodes.is_empty() {
            return "Catalog is empty".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec![
            "id", "kind", "name", "parent", "table", "type", "required", "unique", "default",
        ]);
        for node in nodes {
            table.add_row(vec![
                Cell::new(node.id),
                Cell::new(node.kind()),
                Cell::new(&node.name),
                Cell::new(opt(node.parent_id.map(|p| p.to_string()))),
                Cell::new(opt(node.table_name.clone())),
                Cell::new(opt(node.field_type.as_ref().map(|t| t.to_string()))),
                Cell::new(flag(node.is_field && node.required)),
                Cell::new(flag(node.is_field && node.unique)),
                Cell::new(opt(node.default_value.clone())),
            ]);
        }
        table.to_string()
    }

    fn format_generation(&self, report: &GenerationReport) -> String {
        let mut table = Table::new();
        table.set_header(vec!["entity", "table", "status", "detail"]);
        for outcome in &report.outcomes {
            let detail = match &outcome.status {
                OutcomeStatus::Generated { revision } | OutcomeStatus::Skipped { revision } => {
                    revision.clone()
                }
                OutcomeStatus::Excluded { reason } | OutcomeStatus::Failed { reason } => {
                    reason.clone()
                }
            };
            table.add_row(vec![
                Cell::new(&outcome.entity),
                Cell::new(opt(outcome.table.clone())),
                Cell::new(&outcome.status),
                Cell::new(detail),
            ]);
        }
        format!(
            "{table}\nhead: {}",
            report.head.as_deref().unwrap_or("base")
        )
    }

    fn format_upgrade(&self, report: &UpgradeReport) -> String {
        let mut lines: Vec<String> = report
            .applied
            .iter()
            .map(|rev| format!("applied  {rev}"))
            .chain(report.skipped.iter().map(|rev| format!("skipped  {rev}")))
            .collect();
        if lines.is_empty() {
            lines.push("Already up to date".to_string());
        }
        lines.push(format!(
            "current: {}",
            report.current.as_deref().unwrap_or("base")
        ));
        lines.join("\n")
    }

    fn format_reverted(&self, reverted: &[String]) -> String {
        if reverted.is_empty() {
            return "Nothing to revert".to_string();
        }
        reverted
            .iter()
            .map(|rev| format!("reverted {rev}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_status(&self, status: &ChainStatus) -> String {
        let mut table = Table::new();
        table.set_header(vec!["revision", "down revision", "table", "applied", "head"]);
        for entry in &status.entries {
            table.add_row(vec![
                Cell::new(&entry.revision),
                Cell::new(opt(entry.down_revision.clone())),
                Cell::new(&entry.table),
                Cell::new(flag(entry.applied)),
                Cell::new(flag(entry.head)),
            ]);
        }
        format!("{table}\n{status}")
    }

    fn format_stage(&self, report: &StageReport) -> String {
        let body = match report {
            StageReport::Wipe(wipe) => format!(
                "reverted {} revision(s), dropped {} table(s), deleted {} node(s), removed {} script(s)",
                wipe.reverted.len(),
                wipe.dropped_tables.len(),
                wipe.deleted_nodes,
                wipe.cleared_scripts
            ),
            StageReport::RecreateCatalog { bootstrap_id } => {
                format!("catalog rebuilt, bootstrap node {bootstrap_id}")
            }
            StageReport::SeedDefaults(seed) => format!(
                "created: [{}], already present: [{}]",
                seed.created.join(", "),
                seed.existing.join(", ")
            ),
            StageReport::Generate(generation) => self.format_generation(generation),
            StageReport::Apply(upgrade) => self.format_upgrade(upgrade),
        };
        format!("== {} ==\n{body}", report.stage())
    }

    fn format_pipeline(&self, report: &PipelineReport) -> String {
        report
            .stages
            .iter()
            .map(|stage| self.format_stage(stage))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn format_document(&self, document: &serde_json::Value) -> String {
        serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string())
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_nodes(&self, nodes: &[EntityNode]) -> String {
        pretty(serde_json::to_value(nodes))
    }

    fn format_generation(&self, report: &GenerationReport) -> String {
        pretty(serde_json::to_value(report))
    }

    fn format_upgrade(&self, report: &UpgradeReport) -> String {
        pretty(serde_json::to_value(report))
    }

    fn format_reverted(&self, reverted: &[String]) -> String {
        serde_json::json!({ "reverted": reverted }).to_string()
    }

    fn format_status(&self, status: &ChainStatus) -> String {
        pretty(serde_json::to_value(status))
    }

    fn format_stage(&self, report: &StageReport) -> String {
        pretty(serde_json::to_value(report))
    }

    fn format_pipeline(&self, report: &PipelineReport) -> String {
        pretty(serde_json::to_value(report))
    }

    fn format_document(&self, document: &serde_json::Value) -> String {
        document.to_string()
    }
}

fn pretty(value: serde_json::Result<serde_json::Value>) -> String {
    match value {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    }
}

fn opt(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entiforge_core::migration::{ChainEntry, EntityOutcome};

    fn status() -> ChainStatus {
        ChainStatus {
            current: Some("r1".to_string()),
            head: Some("r2".to_string()),
            entries: vec![
                ChainEntry {
                    revision: "r1".to_string(),
                    down_revision: None,
                    table: "users".to_string(),
                    applied: true,
                    head: false,
                },
                ChainEntry {
                    revision: "r2".to_string(),
                    down_revision: Some("r1".to_string()),
                    table: "pages".to_string(),
                    applied: false,
                    head: true,
                },
            ],
        }
    }

    #[test]
    fn test_table_status() {
        let output = TableFormatter.format_status(&status());
        assert!(output.contains("users"));
        assert!(output.contains("pending=1"));
    }

    #[test]
    fn test_json_status() {
        let output = JsonFormatter.format_status(&status());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["entries"][1]["head"], true);
        assert_eq!(value["current"], "r1");
    }

    #[test]
    fn test_generation_table() {
        let report = GenerationReport {
            head: Some("r9".to_string()),
            outcomes: vec![EntityOutcome {
                entity_id: 3,
                entity: "Orders".to_string(),
                table: Some("orders".to_string()),
                status: OutcomeStatus::Failed {
                    reason: "duplicate column".to_string(),
                },
            }],
            ..GenerationReport::default()
        };
        let output = TableFormatter.format_generation(&report);
        assert!(output.contains("failed"));
        assert!(output.contains("duplicate column"));
        assert!(output.ends_with("head: r9"));

        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_generation(&report)).unwrap();
        assert_eq!(json["outcomes"][0]["status"], "failed");
        assert_eq!(json["outcomes"][0]["reason"], "duplicate column");
    }

    #[test]
    fn test_format_display() {
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Table.to_string(), "table");
    }

    #[test]
    fn test_formatter_moves_across_threads() {
        let formatter = create_formatter(OutputFormat::Json);
        let output = std::thread::spawn(move || formatter.format_status(&status()))
            .join()
            .unwrap();
        assert!(output.contains("\"current\""));
    }
}
