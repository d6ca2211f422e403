//! SQL rendering for migration actions.

use super::script::{Backfill, ColumnSpec, DowngradeAction, UpgradeAction};
use crate::database::quote_ident;

/// Render one column definition.
pub fn column_sql(column: &ColumnSpec) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.physical_type.sql_type());
    if column.primary_key {
        sql.push_str(" PRIMARY KEY AUTOINCREMENT");
    }
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if column.unique && !column.primary_key {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default.sql());
    }
    sql
}

/// Render the `CREATE TABLE` statement.
pub fn create_table_sql(action: &UpgradeAction) -> String {
    let columns: Vec<String> = action
        .columns
        .iter()
        .map(|c| format!("    {}", column_sql(c)))
        .collect();
    format!(
        "CREATE TABLE {} (\n{}\n)",
        quote_ident(&action.table),
        columns.join(",\n")
    )
}

/// Render the triggers that refresh `on_update` columns.
///
/// Requires a primary key column; tables without one get no triggers.
pub fn update_trigger_sql(action: &UpgradeAction) -> Vec<String> {
    let Some(pk) = action.columns.iter().find(|c| c.primary_key) else {
        return Vec::new();
    };
    let table = quote_ident(&action.table);
    action
        .columns
        .iter()
        .filter(|c| c.on_update)
        .map(|column| {
            let col = quote_ident(&column.name);
            format!(
                "CREATE TRIGGER {} AFTER UPDATE ON {table} FOR EACH ROW WHEN NEW.{col} IS OLD.{col} \
                 BEGIN UPDATE {table} SET {col} = CURRENT_TIMESTAMP WHERE {pk} = OLD.{pk}; END",
                quote_ident(&format!("{}_{}_refresh", action.table, column.name)),
                pk = quote_ident(&pk.name),
            )
        })
        .collect()
}

/// Render a backfill; the value binds as `?1`.
pub fn backfill_sql(table: &str, backfill: &Backfill) -> String {
    let col = quote_ident(&backfill.column);
    format!(
        "UPDATE {} SET {col} = ?1 WHERE {col} IS NULL",
        quote_ident(table)
    )
}

/// Render the `DROP TABLE` statement.
pub fn drop_table_sql(action: &DowngradeAction) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(&action.table))
}
