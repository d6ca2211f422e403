//! Applying and reverting the migration chain.
//!
//! Every script runs in its own transaction together with the marker update,
//! so the marker always names the last script whose effects committed.

use std::fmt;
use std::sync::Arc;

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::chain;
use super::ddl;
use super::error::MigrationError;
use super::marker::RevisionMarker;
use super::repository::ScriptRepository;
use super::script::MigrationScript;
use crate::database::Database;

/// One script's position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainEntry {
    /// Revision id.
    pub revision: String,
    /// Predecessor.
    pub down_revision: Option<String>,
    /// Target table.
    pub table: String,
    /// Whether the script's effects are in the store.
    pub applied: bool,
    /// Whether this is the last script of the chain.
    pub head: bool,
}

/// Snapshot of the chain against the marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    /// Revision named by the marker.
    pub current: Option<String>,
    /// Last revision of the chain.
    pub head: Option<String>,
    /// Scripts in chain order.
    pub entries: Vec<ChainEntry>,
}

impl ChainStatus {
    /// Number of scripts not yet applied.
    pub fn pending(&self) -> usize {
        self.entries.iter().filter(|e| !e.applied).count()
    }

    /// True when the marker is at head.
    pub fn is_up_to_date(&self) -> bool {
        self.current == self.head
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "current={} head={} pending={}",
            self.current.as_deref().unwrap_or("base"),
            self.head.as_deref().unwrap_or("base"),
            self.pending()
        )
    }
}

/// Result of an upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    /// Revisions whose DDL ran.
    pub applied: Vec<String>,
    /// Revisions passed over because they target system tables.
    pub skipped: Vec<String>,
    /// Marker after the run.
    pub current: Option<String>,
}

/// Applies scripts from a repository to the physical store.
pub struct MigrationRunner {
    db: Arc<Database>,
    repository: ScriptRepository,
    marker: RevisionMarker,
}

impl MigrationRunner {
    /// Create a runner reading scripts from `repository`.
    pub fn new(db: Arc<Database>, repository: ScriptRepository) -> Self {
        let marker = RevisionMarker::new(db.config());
        Self {
            db,
            repository,
            marker,
        }
    }

    /// The last applied revision.
    pub fn current(&self) -> Result<Option<String>, MigrationError> {
        Ok(self.db.with_connection(|conn| self.marker.current(conn))?)
    }

    /// All scripts in chain order.
    pub fn chain(&self) -> Result<Vec<MigrationScript>, MigrationError> {
        chain::order(self.repository.list()?)
    }

    /// The chain against the marker.
    pub fn status(&self) -> Result<ChainStatus, MigrationError> {
        let chain = self.chain()?;
        let current = self.current()?;
        let applied_upto = applied_count(&chain, current.as_deref())?;
        let last = chain.len().saturating_sub(1);
        let entries = chain
            .iter()
            .enumerate()
            .map(|(idx, script)| ChainEntry {
                revision: script.revision_id.clone(),
                down_revision: script.down_revision.clone(),
                table: script.table().to_string(),
                applied: idx < applied_upto,
                head: idx == last,
            })
            .collect();
        Ok(ChainStatus {
            current,
            head: chain.last().map(|s| s.revision_id.clone()),
            entries,
        })
    }

    /// Apply every pending script.
    pub fn upgrade(&self) -> Result<UpgradeReport, MigrationError> {
        self.upgrade_to(None)
    }

    /// Apply pending scripts up to and including `target`, or to head for
    /// `None`. Stops at the first failure; earlier scripts stay applied.
    pub fn upgrade_to(&self, target: Option<&str>) -> Result<UpgradeReport, MigrationError> {
        let chain = self.chain()?;
        let current = self.current()?;
        let start = applied_count(&chain, current.as_deref())?;
        let end = match target {
            None => chain.len(),
            Some(rev) => position(&chain, rev)? + 1,
        };

        let mut report = UpgradeReport {
            current: current.clone(),
            ..UpgradeReport::default()
        };
        if end <= start {
            debug!(current = ?current, "nothing to upgrade");
            return Ok(report);
        }

        self.db.with_connection(|conn| self.marker.ensure(conn))?;

        for script in &chain[start..end] {
            if self.apply(script)? {
                report.applied.push(script.revision_id.clone());
            } else {
                report.skipped.push(script.revision_id.clone());
            }
            report.current = Some(script.revision_id.clone());
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            current = ?report.current,
            "upgrade finished"
        );
        Ok(report)
    }

    /// Revert applied scripts newest first down to `target`, or to base for
    /// `None`. Returns the reverted revisions in the order they ran.
    pub fn downgrade_to(&self, target: Option<&str>) -> Result<Vec<String>, MigrationError> {
        let chain = self.chain()?;
        let current = self.current()?;
        let applied = applied_count(&chain, current.as_deref())?;
        let keep = match target {
            None => 0,
            Some(rev) => {
                let idx = position(&chain, rev)?;
                if idx >= applied {
                    return Err(MigrationError::UnknownRevision {
                        revision: rev.to_string(),
                    });
                }
                idx + 1
            }
        };

        let mut reverted = Vec::new();
        for script in chain[keep..applied].iter().rev() {
            self.revert(script)?;
            reverted.push(script.revision_id.clone());
        }

        info!(reverted = reverted.len(), target = ?target, "downgrade finished");
        Ok(reverted)
    }

    /// Mark the store as being at base without touching any table.
    pub fn stamp_base(&self) -> Result<(), MigrationError> {
        Ok(self.db.with_connection(|conn| self.marker.stamp_base(conn))?)
    }

    /// Returns `false` when the script was passed over.
    fn apply(&self, script: &MigrationScript) -> Result<bool, MigrationError> {
        let config = self.db.config();
        let table = script.table();
        let revision = script.revision_id.as_str();

        if config.is_reserved_table(table) {
            warn!(revision, table, "script targets a system table; skipped");
            self.db
                .transaction(|tx| self.marker.set(tx, Some(revision)))?;
            return Ok(false);
        }

        self.db
            .transaction(|tx| {
                run_upgrade(tx, script)?;
                self.marker.set(tx, Some(revision))
            })
            .map_err(|source| MigrationError::Apply {
                revision: revision.to_string(),
                table: table.to_string(),
                source,
            })?;

        info!(revision, table, "revision applied");
        Ok(true)
    }

    fn revert(&self, script: &MigrationScript) -> Result<(), MigrationError> {
        let config = self.db.config();
        let table = script.downgrade.table.as_str();
        let revision = script.revision_id.as_str();
        let down = script.down_revision.as_deref();

        let reserved = config.is_reserved_table(table);
        if reserved {
            warn!(revision, table, "script targets a system table; not dropped");
        }

        self.db
            .transaction(|tx| {
                if !reserved {
                    tx.execute_batch(&ddl::drop_table_sql(&script.downgrade))?;
                }
                self.marker.set(tx, down)
            })
            .map_err(|source| MigrationError::Apply {
                revision: revision.to_string(),
                table: table.to_string(),
                source,
            })?;

        info!(revision, table, "revision reverted");
        Ok(())
    }
}

fn run_upgrade(conn: &Connection, script: &MigrationScript) -> crate::error::Result<()> {
    conn.execute_batch(&ddl::create_table_sql(&script.upgrade))?;
    for trigger in ddl::update_trigger_sql(&script.upgrade) {
        conn.execute_batch(&trigger)?;
    }
    for backfill in &script.upgrade.backfill {
        conn.execute(
            &ddl::backfill_sql(&script.upgrade.table, backfill),
            params![backfill.value],
        )?;
    }
    Ok(())
}

fn position(chain: &[MigrationScript], revision: &str) -> Result<usize, MigrationError> {
    chain
        .iter()
        .position(|s| s.revision_id == revision)
        .ok_or_else(|| MigrationError::UnknownRevision {
            revision: revision.to_string(),
        })
}

/// Number of leading chain scripts covered by the marker.
fn applied_count(chain: &[MigrationScript], current: Option<&str>) -> Result<usize, MigrationError> {
    match current {
        None => Ok(0),
        Some(rev) => position(chain, rev).map(|idx| idx + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PhysicalType;
    use crate::migration::script::{Backfill, ColumnSpec, DowngradeAction, UpgradeAction};
    use tempfile::TempDir;

    fn script(revision: &str, down: Option<&str>, table: &str) -> MigrationScript {
        MigrationScript {
            revision_id: revision.to_string(),
            down_revision: down.map(str::to_string),
            entity_id: 0,
            entity: table.to_string(),
            generated_at: chrono::NaiveDateTime::default(),
            upgrade: UpgradeAction {
                table: table.to_string(),
                columns: vec![
                    ColumnSpec::primary_key("id"),
                    ColumnSpec::new("label", PhysicalType::Text, true),
                    ColumnSpec::timestamp("created_at"),
                    ColumnSpec {
                        on_update: true,
                        ..ColumnSpec::timestamp("updated_at")
                    },
                ],
                backfill: vec![],
            },
            downgrade: DowngradeAction {
                table: table.to_string(),
            },
        }
    }

    fn setup(scripts: &[MigrationScript]) -> (TempDir, Arc<Database>, MigrationRunner) {
        let tmp = TempDir::new().unwrap();
        let repo = ScriptRepository::open(tmp.path()).unwrap();
        for s in scripts {
            repo.save(s).unwrap();
        }
        let db = Arc::new(Database::open_in_memory().unwrap());
        let runner = MigrationRunner::new(Arc::clone(&db), repo);
        (tmp, db, runner)
    }

    #[test]
    fn test_upgrade_and_downgrade() {
        let (_tmp, db, runner) = setup(&[
            script("r1", None, "alpha"),
            script("r2", Some("r1"), "beta"),
            script("r3", Some("r2"), "gamma"),
        ]);

        let status = runner.status().unwrap();
        assert_eq!(status.pending(), 3);
        assert_eq!(status.current, None);
        assert_eq!(status.head.as_deref(), Some("r3"));

        let report = runner.upgrade_to(Some("r2")).unwrap();
        assert_eq!(report.applied, vec!["r1", "r2"]);
        assert!(db.table_exists("beta").unwrap());
        assert!(!db.table_exists("gamma").unwrap());

        let report = runner.upgrade().unwrap();
        assert_eq!(report.applied, vec!["r3"]);
        assert_eq!(runner.current().unwrap().as_deref(), Some("r3"));
        assert!(runner.status().unwrap().is_up_to_date());

        assert!(runner.upgrade().unwrap().applied.is_empty());

        let reverted = runner.downgrade_to(Some("r1")).unwrap();
        assert_eq!(reverted, vec!["r3", "r2"]);
        assert!(db.table_exists("alpha").unwrap());
        assert!(!db.table_exists("beta").unwrap());
        assert_eq!(runner.current().unwrap().as_deref(), Some("r1"));

        runner.downgrade_to(None).unwrap();
        assert_eq!(runner.current().unwrap(), None);
        assert!(!db.table_exists("alpha").unwrap());
    }

    #[test]
    fn test_failure_keeps_marker_at_last_success() {
        let (_tmp, db, runner) = setup(&[
            script("r1", None, "alpha"),
            script("r2", Some("r1"), "beta"),
        ]);
        db.with_connection(|conn| conn.execute_batch("CREATE TABLE beta (x INTEGER)"))
            .unwrap();

        let err = runner.upgrade().unwrap_err();
        match err {
            MigrationError::Apply { revision, table, .. } => {
                assert_eq!(revision, "r2");
                assert_eq!(table, "beta");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.current().unwrap().as_deref(), Some("r1"));
        assert!(db.table_exists("alpha").unwrap());
    }

    #[test]
    fn test_failed_backfill_rolls_back_table() {
        let mut broken = script("r2", Some("r1"), "beta");
        broken.upgrade.backfill.push(Backfill {
            column: "missing".to_string(),
            value: "{}".to_string(),
        });
        let (_tmp, db, runner) = setup(&[script("r1", None, "alpha"), broken]);

        let err = runner.upgrade().unwrap_err();
        assert!(matches!(err, MigrationError::Apply { ref revision, .. } if revision == "r2"));
        assert!(db.table_exists("alpha").unwrap());
        assert!(!db.table_exists("beta").unwrap());
        assert_eq!(runner.current().unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn test_reserved_table_is_skipped() {
        let (_tmp, db, runner) = setup(&[
            script("r1", None, "entity_shadow"),
            script("r2", Some("r1"), "alpha"),
        ]);

        let report = runner.upgrade().unwrap();
        assert_eq!(report.skipped, vec!["r1"]);
        assert_eq!(report.applied, vec!["r2"]);
        assert!(!db.table_exists("entity_shadow").unwrap());
        assert_eq!(runner.current().unwrap().as_deref(), Some("r2"));
    }

    #[test]
    fn test_unknown_revisions() {
        let (_tmp, _db, runner) = setup(&[script("r1", None, "alpha")]);
        assert!(matches!(
            runner.upgrade_to(Some("nope")),
            Err(MigrationError::UnknownRevision { .. })
        ));
        assert!(matches!(
            runner.downgrade_to(Some("r1")),
            Err(MigrationError::UnknownRevision { .. })
        ));
    }
}
