//! Durable storage for migration scripts.
//!
//! One JSON document per script, named after its revision id. Writes go
//! through a temporary file and a rename so a crash never leaves a
//! half-written script behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::script::MigrationScript;
use crate::error::Result;

const EXTENSION: &str = "json";

/// A directory of migration scripts.
#[derive(Debug, Clone)]
pub struct ScriptRepository {
    dir: PathBuf,
}

impl ScriptRepository {
    /// Open a repository, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, revision: &str) -> PathBuf {
        self.dir.join(format!("{revision}.{EXTENSION}"))
    }

    /// Check whether a script with this revision exists.
    pub fn contains(&self, revision: &str) -> bool {
        self.path(revision).is_file()
    }

    /// Load one script.
    pub fn load(&self, revision: &str) -> Result<MigrationScript> {
        let bytes = fs::read(self.path(revision))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist a script, replacing any previous version atomically.
    pub fn save(&self, script: &MigrationScript) -> Result<PathBuf> {
        let path = self.path(&script.revision_id);
        let tmp = self.dir.join(format!(".{}.{EXTENSION}.tmp", script.revision_id));
        let body = serde_json::to_vec_pretty(script)?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        debug!(revision = %script.revision_id, path = %path.display(), "script saved");
        Ok(path)
    }

    /// Load every script, ordered by file name.
    pub fn list(&self) -> Result<Vec<MigrationScript>> {
        let mut paths = self.script_paths()?;
        paths.sort();
        paths
            .iter()
            .map(|path| {
                let bytes = fs::read(path)?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }

    /// Remove every script. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let paths = self.script_paths()?;
        for path in &paths {
            fs::remove_file(path)?;
        }
        Ok(paths.len())
    }

    fn script_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_script = path.is_file()
                && path.extension().is_some_and(|ext| ext == EXTENSION)
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if is_script {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::script::{DowngradeAction, UpgradeAction};
    use tempfile::TempDir;

    fn script(revision: &str, down: Option<&str>) -> MigrationScript {
        MigrationScript {
            revision_id: revision.to_string(),
            down_revision: down.map(str::to_string),
            entity_id: 1,
            entity: "Things".to_string(),
            generated_at: chrono::Utc::now().naive_utc(),
            upgrade: UpgradeAction {
                table: "things".to_string(),
                columns: vec![],
                backfill: vec![],
            },
            downgrade: DowngradeAction {
                table: "things".to_string(),
            },
        }
    }

    #[test]
    fn test_save_load_list_clear() {
        let tmp = TempDir::new().unwrap();
        let repo = ScriptRepository::open(tmp.path().join("versions")).unwrap();

        assert!(repo.list().unwrap().is_empty());
        assert!(!repo.contains("b"));

        repo.save(&script("b", Some("a"))).unwrap();
        repo.save(&script("a", None)).unwrap();
        fs::write(repo.dir().join("notes.txt"), "ignored").unwrap();

        assert!(repo.contains("a"));
        assert_eq!(repo.load("b").unwrap().down_revision.as_deref(), Some("a"));

        let revisions: Vec<_> = repo
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.revision_id)
            .collect();
        assert_eq!(revisions, vec!["a", "b"]);

        assert_eq!(repo.clear().unwrap(), 2);
        assert!(repo.list().unwrap().is_empty());
        assert!(repo.dir().join("notes.txt").exists());
    }

    #[test]
    fn test_save_overwrites() {
        let tmp = TempDir::new().unwrap();
        let repo = ScriptRepository::open(tmp.path()).unwrap();

        repo.save(&script("a", None)).unwrap();
        repo.save(&script("a", Some("z"))).unwrap();

        assert_eq!(repo.list().unwrap().len(), 1);
        assert_eq!(repo.load("a").unwrap().down_revision.as_deref(), Some("z"));
    }
}
