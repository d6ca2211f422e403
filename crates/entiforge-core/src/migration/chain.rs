//! Ordering scripts into one linear chain.

use std::collections::{HashMap, HashSet};

use super::error::MigrationError;
use super::script::MigrationScript;

/// Order scripts from first to last by following `down_revision` links.
///
/// The first script is the single one without a predecessor. Branches,
/// several roots, links to unknown revisions and scripts unreachable from
/// the root are rejected.
pub fn order(scripts: Vec<MigrationScript>) -> Result<Vec<MigrationScript>, MigrationError> {
    if scripts.is_empty() {
        return Ok(Vec::new());
    }

    let known: HashSet<&str> = scripts.iter().map(|s| s.revision_id.as_str()).collect();
    if known.len() != scripts.len() {
        return Err(broken("duplicate revision ids"));
    }

    let mut roots = Vec::new();
    let mut successor: HashMap<&str, usize> = HashMap::new();
    for (idx, script) in scripts.iter().enumerate() {
        match script.down_revision.as_deref() {
            Some(down) if !known.contains(down) => {
                return Err(broken(format!(
                    "revision {} follows unknown revision {down}",
                    script.revision_id
                )));
            }
            Some(down) => {
                if let Some(&other) = successor.get(down) {
                    return Err(broken(format!(
                        "revision {down} has two successors: {} and {}",
                        scripts[other].revision_id, script.revision_id
                    )));
                }
                successor.insert(down, idx);
            }
            None => roots.push(idx),
        }
    }

    let root = match roots.as_slice() {
        [root] => *root,
        [] => return Err(broken("no first revision; the links form a cycle")),
        many => {
            let names: Vec<&str> = many
                .iter()
                .map(|&i| scripts[i].revision_id.as_str())
                .collect();
            return Err(broken(format!("several first revisions: {}", names.join(", "))));
        }
    };

    let mut sequence = vec![root];
    let mut cursor = root;
    while let Some(&next) = successor.get(scripts[cursor].revision_id.as_str()) {
        sequence.push(next);
        cursor = next;
    }
    if sequence.len() != scripts.len() {
        return Err(broken(format!(
            "{} revision(s) unreachable from {}",
            scripts.len() - sequence.len(),
            scripts[root].revision_id
        )));
    }

    let mut slots: Vec<Option<MigrationScript>> = scripts.into_iter().map(Some).collect();
    Ok(sequence
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect())
}

fn broken(reason: impl Into<String>) -> MigrationError {
    MigrationError::BrokenChain {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::script::{DowngradeAction, UpgradeAction};

    fn script(revision: &str, down: Option<&str>) -> MigrationScript {
        MigrationScript {
            revision_id: revision.to_string(),
            down_revision: down.map(str::to_string),
            entity_id: 0,
            entity: revision.to_string(),
            generated_at: chrono::NaiveDateTime::default(),
            upgrade: UpgradeAction {
                table: revision.to_string(),
                columns: vec![],
                backfill: vec![],
            },
            downgrade: DowngradeAction {
                table: revision.to_string(),
            },
        }
    }

    fn ids(chain: &[MigrationScript]) -> Vec<&str> {
        chain.iter().map(|s| s.revision_id.as_str()).collect()
    }

    #[test]
    fn test_orders_shuffled_chain() {
        let chain = order(vec![
            script("c", Some("b")),
            script("a", None),
            script("b", Some("a")),
        ])
        .unwrap();
        assert_eq!(ids(&chain), vec!["a", "b", "c"]);
        assert!(order(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_dangling_link() {
        let err = order(vec![script("y", Some("x")), script("z", Some("y"))]).unwrap_err();
        assert!(err.to_string().contains("unknown revision x"));
    }

    #[test]
    fn test_rejects_branch() {
        let err = order(vec![
            script("a", None),
            script("b", Some("a")),
            script("c", Some("a")),
        ])
        .unwrap_err();
        assert!(matches!(err, MigrationError::BrokenChain { .. }));
    }

    #[test]
    fn test_rejects_two_roots() {
        let err = order(vec![script("a", None), script("b", None)]).unwrap_err();
        assert!(err.to_string().contains("several first revisions"));
    }

    #[test]
    fn test_rejects_unreachable_cycle() {
        let err = order(vec![
            script("a", None),
            script("b", Some("c")),
            script("c", Some("b")),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }
}
