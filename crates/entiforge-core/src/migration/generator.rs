//! Migration script generation.
//!
//! Walks the root entities of the catalog in id order and writes one
//! table-creation script per entity, each linked to the previous one. A
//! script that already exists is kept as is, so running the generator twice
//! over an unchanged catalog writes nothing new.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::chain;
use super::error::MigrationError;
use super::repository::ScriptRepository;
use super::script::{
    Backfill, ColumnDefault, ColumnSpec, DefaultLiteral, DowngradeAction, MigrationScript,
    UpgradeAction,
};
use crate::catalog::{EntityNode, EntityStore, FieldType, TypeMapper};
use crate::database::Database;

/// Column names every generated table carries.
pub const ID_COLUMN: &str = "id";
/// Insertion timestamp column.
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Last-update timestamp column.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// What happened to one root entity during generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A new script was written.
    Generated {
        /// Its revision.
        revision: String,
    },
    /// The entity already has a script.
    Skipped {
        /// The existing revision.
        revision: String,
    },
    /// The entity is not eligible for generation.
    Excluded {
        /// Why.
        reason: String,
    },
    /// Generation failed; the rest of the run continued.
    Failed {
        /// Why.
        reason: String,
    },
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Generated { .. } => write!(f, "generated"),
            OutcomeStatus::Skipped { .. } => write!(f, "skipped"),
            OutcomeStatus::Excluded { .. } => write!(f, "excluded"),
            OutcomeStatus::Failed { .. } => write!(f, "failed"),
        }
    }
}

/// Per-entity result line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityOutcome {
    /// Catalog id.
    pub entity_id: i64,
    /// Entity name.
    pub entity: String,
    /// Target table, when known.
    pub table: Option<String>,
    /// What happened.
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Result of one generation run.
#[derive(Debug, Default, Serialize)]
pub struct GenerationReport {
    /// Head of the chain before the run.
    pub starting_revision: Option<String>,
    /// Last revision of the chain after the run.
    pub head: Option<String>,
    /// One line per root entity, in processing order.
    pub outcomes: Vec<EntityOutcome>,
    /// Per-entity failures.
    #[serde(skip)]
    pub failures: Vec<MigrationError>,
}

impl GenerationReport {
    /// Revisions written in this run.
    pub fn generated(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                OutcomeStatus::Generated { revision } => Some(revision.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Revisions that already existed.
    pub fn skipped(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                OutcomeStatus::Skipped { revision } => Some(revision.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True when no entity failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// How a field default is expressed in the generated script.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultPlan {
    /// No default.
    None,
    /// A literal column default.
    Column(DefaultLiteral),
    /// A JSON value written into existing NULL cells after creation.
    Backfill(String),
}

/// Decide how a raw default string is carried into the script.
///
/// JSON fields never get a column default; their value is normalized to a
/// JSON document and backfilled. Other fields get a typed literal when the
/// text parses as one, otherwise a quoted string.
pub fn plan_default(field_type: &FieldType, raw: Option<&str>) -> DefaultPlan {
    let Some(raw) = raw else {
        return DefaultPlan::None;
    };

    if field_type.is_json() {
        let document = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => value.to_string(),
            Err(_) => serde_json::Value::String(raw.to_string()).to_string(),
        };
        return DefaultPlan::Backfill(document);
    }

    DefaultPlan::Column(parse_literal(raw))
}

/// Parse a default into a typed literal.
pub fn parse_literal(raw: &str) -> DefaultLiteral {
    let text = raw.trim();
    match text {
        "true" | "True" | "TRUE" => return DefaultLiteral::Boolean(true),
        "false" | "False" | "FALSE" => return DefaultLiteral::Boolean(false),
        _ => {}
    }
    if let Ok(v) = text.parse::<i64>() {
        return DefaultLiteral::Integer(v);
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(v) = text.parse::<f64>() {
            if v.is_finite() {
                return DefaultLiteral::Float(v);
            }
        }
    }
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return DefaultLiteral::Text(text[1..text.len() - 1].to_string());
        }
    }
    DefaultLiteral::Text(raw.to_string())
}

/// Revision identifier for an entity's table-creation script.
///
/// Derived only from catalog data, so the same entity always yields the
/// same identifier.
pub fn revision_id(entity: &EntityNode) -> Result<String, MigrationError> {
    let table = entity
        .table_name
        .as_deref()
        .ok_or_else(|| generation_error(entity, "entity has no table name"))?;
    let digest = blake3::hash(entity.name.as_bytes());
    let bytes = digest.as_bytes();
    let prefix = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Ok(format!(
        "{}_{:04}_create_{table}_table",
        entity.created_at.format("%Y%m%d_%H%M%S"),
        prefix % 10_000
    ))
}

/// Build the script for one entity and its fields.
pub fn build_script(
    entity: &EntityNode,
    fields: &[EntityNode],
    down_revision: Option<String>,
    mapper: &TypeMapper,
) -> Result<MigrationScript, MigrationError> {
    let revision = revision_id(entity)?;
    let table = entity
        .table_name
        .clone()
        .ok_or_else(|| generation_error(entity, "entity has no table name"))?;

    let mut seen: HashSet<String> = [ID_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN]
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut columns = vec![
        ColumnSpec::primary_key(ID_COLUMN),
        ColumnSpec::timestamp(CREATED_AT_COLUMN),
        ColumnSpec {
            on_update: true,
            ..ColumnSpec::timestamp(UPDATED_AT_COLUMN)
        },
    ];
    let mut backfill = Vec::new();

    for field in fields {
        let name = field.column_name();
        if !seen.insert(name.clone()) {
            return Err(generation_error(
                entity,
                format!("field '{}' maps to duplicate column '{name}'", field.name),
            ));
        }

        let field_type = field.resolved_field_type();
        let mut column = ColumnSpec::new(&name, mapper.map(&field_type), !field.required);
        column.unique = field.unique;

        match plan_default(&field_type, field.default_value.as_deref()) {
            DefaultPlan::None => {}
            DefaultPlan::Column(value) => {
                column.default = Some(ColumnDefault::Literal { value });
            }
            DefaultPlan::Backfill(value) => backfill.push(Backfill {
                column: name.clone(),
                value,
            }),
        }
        columns.push(column);
    }

    Ok(MigrationScript {
        revision_id: revision,
        down_revision,
        entity_id: entity.id,
        entity: entity.name.clone(),
        generated_at: chrono::Utc::now().naive_utc(),
        upgrade: UpgradeAction {
            table: table.clone(),
            columns,
            backfill,
        },
        downgrade: DowngradeAction { table },
    })
}

fn generation_error(entity: &EntityNode, reason: impl Into<String>) -> MigrationError {
    MigrationError::Generation {
        entity_id: entity.id,
        entity: entity.name.clone(),
        reason: reason.into(),
    }
}

/// Writes migration scripts for the catalog's root entities.
pub struct MigrationGenerator {
    db: Arc<Database>,
    store: EntityStore,
    repository: ScriptRepository,
    mapper: TypeMapper,
}

impl MigrationGenerator {
    /// Create a generator writing into `repository`.
    pub fn new(db: Arc<Database>, repository: ScriptRepository) -> Self {
        let mapper = TypeMapper::new(db.config().string_length);
        Self {
            store: EntityStore::new(Arc::clone(&db)),
            db,
            repository,
            mapper,
        }
    }

    /// The script repository.
    pub fn repository(&self) -> &ScriptRepository {
        &self.repository
    }

    /// Generate scripts for every eligible root entity.
    ///
    /// New scripts always append to the head of the existing chain. Per-entity
    /// failures are collected in the report. Only failures to read the entity
    /// list or to order the existing scripts abort the run.
    pub fn generate(&self) -> Result<GenerationReport, MigrationError> {
        let existing = chain::order(self.repository.list()?)?;
        let mut tail = existing.last().map(|s| s.revision_id.clone());
        let mut known: Vec<KnownScript> = existing.iter().map(KnownScript::from).collect();

        let mut report = GenerationReport {
            starting_revision: tail.clone(),
            ..GenerationReport::default()
        };

        for entity in self.store.root_entities()? {
            let table = entity.table_name.clone();
            let status = match self.generate_one(&entity, &mut known, &mut tail) {
                Ok(status) => status,
                Err(err) => {
                    warn!(entity = %entity.name, error = %err, "generation failed");
                    let reason = match &err {
                        MigrationError::Generation { reason, .. } => reason.clone(),
                        other => other.to_string(),
                    };
                    report.failures.push(err);
                    OutcomeStatus::Failed { reason }
                }
            };
            report.outcomes.push(EntityOutcome {
                entity_id: entity.id,
                entity: entity.name.clone(),
                table,
                status,
            });
        }

        report.head = tail;
        info!(
            generated = report.generated().len(),
            skipped = report.skipped().len(),
            failed = report.failures.len(),
            head = ?report.head,
            "generation finished"
        );
        Ok(report)
    }

    fn generate_one(
        &self,
        entity: &EntityNode,
        known: &mut Vec<KnownScript>,
        tail: &mut Option<String>,
    ) -> Result<OutcomeStatus, MigrationError> {
        let config = self.db.config();
        if entity.is_page {
            return Ok(OutcomeStatus::Excluded {
                reason: "page".to_string(),
            });
        }
        let table = entity
            .table_name
            .as_deref()
            .ok_or_else(|| generation_error(entity, "entity has no table name"))?;
        if config.is_reserved_table(table) {
            debug!(entity = %entity.name, table, "reserved table excluded");
            return Ok(OutcomeStatus::Excluded {
                reason: format!("reserved table '{table}'"),
            });
        }

        let revision = revision_id(entity)?;

        if let Some(found) = existing_script(known, &revision, entity.id, table) {
            return if found.table == table {
                info!(entity = %entity.name, revision = %found.revision, "script exists; skipped");
                Ok(OutcomeStatus::Skipped {
                    revision: found.revision.clone(),
                })
            } else if found.entity_id == entity.id {
                Err(generation_error(
                    entity,
                    format!(
                        "revision {} already creates table '{}' for this entity",
                        found.revision, found.table
                    ),
                ))
            } else {
                Err(generation_error(
                    entity,
                    format!(
                        "table '{table}' is already created by revision {}",
                        found.revision
                    ),
                ))
            };
        }

        let fields = self.store.fields_of(entity.id)?;
        let script = build_script(entity, &fields, tail.clone(), &self.mapper)?;
        self.repository.save(&script)?;
        info!(entity = %entity.name, revision = %revision, down = ?tail, "script generated");
        known.push(KnownScript::from(&script));
        *tail = Some(revision.clone());
        Ok(OutcomeStatus::Generated { revision })
    }
}

/// Identity of a script already in the chain.
#[derive(Debug, Clone)]
struct KnownScript {
    revision: String,
    entity_id: i64,
    table: String,
}

impl From<&MigrationScript> for KnownScript {
    fn from(script: &MigrationScript) -> Self {
        Self {
            revision: script.revision_id.clone(),
            entity_id: script.entity_id,
            table: script.table().to_string(),
        }
    }
}

/// The script already standing for an entity: same revision, same entity
/// or same target table, in that order of preference.
fn existing_script<'a>(
    known: &'a [KnownScript],
    revision: &str,
    entity_id: i64,
    table: &str,
) -> Option<&'a KnownScript> {
    known
        .iter()
        .find(|k| k.revision == revision)
        .or_else(|| {
            known
                .iter()
                .find(|k| k.entity_id == entity_id && k.table == table)
        })
        .or_else(|| known.iter().find(|k| k.entity_id == entity_id))
        .or_else(|| known.iter().find(|k| k.table == table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PhysicalType;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn node(id: i64, name: &str) -> EntityNode {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        EntityNode {
            id,
            name: name.to_string(),
            description: None,
            table_name: None,
            is_field: false,
            is_page: false,
            parent_id: None,
            field_type: None,
            required: false,
            default_value: None,
            unique: false,
            created_at: at,
            updated_at: at,
        }
    }

    fn entity(id: i64, name: &str, table: &str) -> EntityNode {
        EntityNode {
            table_name: Some(table.to_string()),
            ..node(id, name)
        }
    }

    fn field(id: i64, parent: i64, name: &str, ty: FieldType) -> EntityNode {
        EntityNode {
            is_field: true,
            parent_id: Some(parent),
            field_type: Some(ty),
            ..node(id, name)
        }
    }

    #[test]
    fn test_revision_id_is_stable() {
        let users = entity(1, "Users", "users");
        let first = revision_id(&users).unwrap();
        assert_eq!(first, revision_id(&users).unwrap());
        assert!(first.starts_with("20240309_140507_"));
        assert!(first.ends_with("_create_users_table"));
        let hash = &first["20240309_140507_".len()..][..4];
        assert!(hash.chars().all(|c| c.is_ascii_digit()));

        assert!(revision_id(&node(2, "Loose")).is_err());
    }

    #[test]
    fn test_build_script_columns() {
        let users = entity(1, "Users", "users");
        let fields = vec![
            EntityNode {
                required: true,
                unique: true,
                ..field(2, 1, "Email", FieldType::String)
            },
            field(3, 1, "Display Name", FieldType::Text),
            EntityNode {
                default_value: Some("10".to_string()),
                ..field(4, 1, "quota", FieldType::Integer)
            },
        ];
        let script =
            build_script(&users, &fields, Some("prev".into()), &TypeMapper::default()).unwrap();

        let names: Vec<_> = script.upgrade.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["id", "created_at", "updated_at", "email", "display_name", "quota"]
        );
        assert_eq!(script.down_revision.as_deref(), Some("prev"));
        assert_eq!(script.downgrade.table, "users");

        assert!(script.upgrade.columns[0].primary_key);
        assert!(script.upgrade.columns[2].on_update);

        let email = &script.upgrade.columns[3];
        assert!(!email.nullable);
        assert!(email.unique);
        assert_eq!(email.physical_type, PhysicalType::VarChar { length: 255 });

        assert!(script.upgrade.columns[4].nullable);
        assert_eq!(
            script.upgrade.columns[5].default,
            Some(ColumnDefault::Literal {
                value: DefaultLiteral::Integer(10)
            })
        );
    }

    #[test]
    fn test_json_default_becomes_backfill() {
        let pages = entity(1, "Pages", "pages");
        let fields = vec![
            EntityNode {
                default_value: Some("{\"a\": [1, 2]}".to_string()),
                ..field(2, 1, "layout", FieldType::Json)
            },
            EntityNode {
                default_value: Some("plain".to_string()),
                ..field(3, 1, "meta", FieldType::Json)
            },
        ];
        let script = build_script(&pages, &fields, None, &TypeMapper::default()).unwrap();

        assert!(script.upgrade.columns.iter().all(|c| c.name == "id"
            || c.name == "created_at"
            || c.name == "updated_at"
            || c.default.is_none()));
        assert_eq!(
            script.upgrade.backfill,
            vec![
                Backfill {
                    column: "layout".to_string(),
                    value: "{\"a\":[1,2]}".to_string(),
                },
                Backfill {
                    column: "meta".to_string(),
                    value: "\"plain\"".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_columns_fail() {
        let things = entity(1, "Things", "things");
        let err = build_script(
            &things,
            &[field(2, 1, "ID", FieldType::Integer)],
            None,
            &TypeMapper::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrationError::Generation { entity_id: 1, .. }));

        let err = build_script(
            &things,
            &[
                field(2, 1, "Full Name", FieldType::String),
                field(3, 1, "full name", FieldType::String),
            ],
            None,
            &TypeMapper::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("full_name"));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("10"), DefaultLiteral::Integer(10));
        assert_eq!(parse_literal(" -4 "), DefaultLiteral::Integer(-4));
        assert_eq!(parse_literal("2.5"), DefaultLiteral::Float(2.5));
        assert_eq!(parse_literal("True"), DefaultLiteral::Boolean(true));
        assert_eq!(parse_literal("false"), DefaultLiteral::Boolean(false));
        assert_eq!(parse_literal("'quoted'"), DefaultLiteral::Text("quoted".into()));
        assert_eq!(parse_literal("inf"), DefaultLiteral::Text("inf".into()));
        assert_eq!(parse_literal("NaN"), DefaultLiteral::Text("NaN".into()));
        assert_eq!(parse_literal("hello"), DefaultLiteral::Text("hello".into()));
    }

    #[test]
    fn test_plan_default() {
        assert_eq!(plan_default(&FieldType::Integer, None), DefaultPlan::None);
        assert_eq!(
            plan_default(&FieldType::Integer, Some("10")),
            DefaultPlan::Column(DefaultLiteral::Integer(10))
        );
        assert_eq!(
            plan_default(&FieldType::Json, Some("[1, 2]")),
            DefaultPlan::Backfill("[1,2]".to_string())
        );
    }

    #[test]
    fn test_existing_script_lookup() {
        let known = vec![
            KnownScript {
                revision: "r1".to_string(),
                entity_id: 1,
                table: "users".to_string(),
            },
            KnownScript {
                revision: "r2".to_string(),
                entity_id: 2,
                table: "pages".to_string(),
            },
        ];

        let by_revision = existing_script(&known, "r2", 9, "other").unwrap();
        assert_eq!(by_revision.revision, "r2");

        let renamed = existing_script(&known, "r9", 1, "users").unwrap();
        assert_eq!(renamed.revision, "r1");

        let same_table = existing_script(&known, "r9", 7, "pages").unwrap();
        assert_eq!(same_table.revision, "r2");

        assert!(existing_script(&known, "r9", 7, "orders").is_none());
    }
}
