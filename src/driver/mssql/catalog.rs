//! `sys` catalog views.

use super::MsSqlDriver;
use crate::catalog::{
    information_schema_routines, literal_default, mark_primary, push_foreign_key_column,
    push_index_column, push_trigger, routines_from_rows,
};
use crate::driver::{Driver, non_empty};
use crate::error::Result;
use crate::model::{
    Column, FkAction, ForeignKey, Index, IndexColumn, IndexKind, Routine, Table, TableKind,
    Trigger, TriggerEvent, TriggerTiming,
};

pub(super) fn databases(driver: &mut MsSqlDriver) -> Result<Vec<String>> {
    let rows = driver.fetch_all("SELECT name FROM sys.databases ORDER BY name")?;
    non_empty(rows.iter().filter_map(|r| r.text("name")).collect(), "databases")
}

pub(super) fn schemas(driver: &mut MsSqlDriver) -> Result<Vec<String>> {
    let rows = driver.fetch_all("SELECT name FROM sys.schemas ORDER BY name")?;
    non_empty(rows.iter().filter_map(|r| r.text("name")).collect(), "schemas")
}

pub(super) fn tables(driver: &mut MsSqlDriver) -> Result<Vec<Table>> {
    let sql = format!(
        "SELECT o.name AS name, o.type AS kind, CAST(ep.value AS nvarchar(max)) AS comment, \
         (SELECT SUM(p.rows) FROM sys.partitions p WHERE p.object_id = o.object_id AND p.index_id IN (0, 1)) AS row_count \
         FROM sys.objects o LEFT JOIN sys.extended_properties ep \
         ON ep.major_id = o.object_id AND ep.minor_id = 0 AND ep.name = 'MS_Description' \
         WHERE o.schema_id = SCHEMA_ID({}) AND o.type IN ('S', 'U', 'V') ORDER BY o.name",
        driver.schema_literal()
    );
    let rows = driver.fetch_all(&sql)?;
    let tables = rows
        .iter()
        .filter_map(|row| {
            let kind = match row.text("kind").as_deref().map(str::trim) {
                Some("V") => TableKind::View,
                Some("S") => TableKind::System,
                _ => TableKind::Table,
            };
            let mut table = Table::new(row.text("name")?, kind);
            table.comment = row.text("comment");
            table.rows = row.int("row_count").and_then(|n| u64::try_from(n).ok());
            Some(table)
        })
        .collect();
    Ok(tables)
}

/// Rebuild a declared type from `sys.columns` sizes.
///
/// `max_length` is in bytes (two per character for the N types) and -1
/// means `max`.
fn column_type(name: &str, max_length: i64, precision: i64, scale: i64) -> String {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "char" | "varchar" | "binary" | "varbinary" | "nchar" | "nvarchar" => {
            let length = match (max_length, lower.starts_with('n')) {
                (-1, _) => "max".to_string(),
                (n, true) => (n / 2).to_string(),
                (n, false) => n.to_string(),
            };
            format!("{}({})", lower, length)
        }
        "decimal" | "numeric" => format!("{}({},{})", lower, precision, scale),
        "datetime2" | "datetimeoffset" | "time" => format!("{}({})", lower, scale),
        _ => lower,
    }
}

/// Whether the whole text sits inside one pair of parentheses.
fn wrapped(text: &str) -> bool {
    if !text.starts_with('(') || !text.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == text.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// `((0))` and `(N'x')` as stored by SQL Server.
fn strip_default(default: Option<String>) -> Option<String> {
    let mut text = default?;
    while wrapped(&text) {
        text = text[1..text.len() - 1].to_string();
    }
    let text = match text.strip_prefix('N') {
        Some(rest) if rest.starts_with('\'') => rest.to_string(),
        _ => text,
    };
    literal_default(Some(text))
}

pub(super) fn columns(driver: &mut MsSqlDriver, table: &str) -> Result<Vec<Column>> {
    let sql = format!(
        "SELECT c.name AS name, t.name AS type, c.max_length AS max_length, c.precision AS precision, \
         c.scale AS scale, c.is_nullable AS nullable, c.is_identity AS is_identity, \
         c.is_computed AS is_computed, c.collation_name AS collation, d.definition AS default_expr, \
         CAST(ep.value AS nvarchar(max)) AS comment \
         FROM sys.columns c JOIN sys.types t ON t.user_type_id = c.user_type_id \
         LEFT JOIN sys.default_constraints d ON d.object_id = c.default_object_id \
         LEFT JOIN sys.extended_properties ep \
         ON ep.major_id = c.object_id AND ep.minor_id = c.column_id AND ep.name = 'MS_Description' \
         WHERE c.object_id = OBJECT_ID({}) ORDER BY c.column_id",
        driver.object_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(name), Some(base)) = (row.text("name"), row.text("type")) else {
            continue;
        };
        let raw_type = column_type(
            &base,
            row.int("max_length").unwrap_or(0),
            row.int("precision").unwrap_or(0),
            row.int("scale").unwrap_or(0),
        );
        let mut column = Column::new(name, raw_type);
        column.nullable = row.flag("nullable");
        column.auto_increment = row.flag("is_identity");
        column.generated = row.flag("is_computed");
        column.collation = row.text("collation");
        column.default = strip_default(row.text("default_expr"));
        column.comment = row.text("comment");
        columns.push(column);
    }
    let mut columns = non_empty(columns, "columns")?;
    let indexes = indexes(driver, table)?;
    mark_primary(&mut columns, &indexes);
    Ok(columns)
}

pub(super) fn indexes(driver: &mut MsSqlDriver, table: &str) -> Result<Vec<Index>> {
    let sql = format!(
        "SELECT i.name AS name, i.is_primary_key AS is_primary, i.is_unique AS is_unique, \
         i.type_desc AS kind, c.name AS column_name, ic.is_descending_key AS descending \
         FROM sys.indexes i \
         JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
         JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
         WHERE i.object_id = OBJECT_ID({}) AND ic.is_included_column = 0 \
         ORDER BY i.is_primary_key DESC, i.name, ic.key_ordinal",
        driver.object_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
    let mut indexes = Vec::new();
    for row in rows {
        let (Some(name), Some(column)) = (row.text("name"), row.text("column_name")) else {
            continue;
        };
        let kind = if row.flag("is_primary") {
            IndexKind::Primary
        } else if row.text("kind").as_deref() == Some("SPATIAL") {
            IndexKind::Spatial
        } else if row.flag("is_unique") {
            IndexKind::Unique
        } else {
            IndexKind::Index
        };
        push_index_column(
            &mut indexes,
            &name,
            kind,
            IndexColumn {
                name: column,
                prefix: None,
                descending: row.flag("descending"),
            },
        );
    }
    Ok(indexes)
}

pub(super) fn foreign_keys(driver: &mut MsSqlDriver, table: &str) -> Result<Vec<ForeignKey>> {
    let sql = format!(
        "SELECT fk.name AS name, pc.name AS source, SCHEMA_NAME(rt.schema_id) AS target_schema, \
         rt.name AS target_table, rc.name AS target, \
         fk.delete_referential_action_desc AS on_delete, fk.update_referential_action_desc AS on_update \
         FROM sys.foreign_keys fk \
         JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id \
         JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id \
         JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id \
         JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id \
         WHERE fk.parent_object_id = OBJECT_ID({}) ORDER BY fk.name, fkc.constraint_column_id",
        driver.object_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
    let current = driver.schema.clone();
    let mut keys = Vec::new();
    for row in rows {
        let (Some(name), Some(source), Some(target_table), Some(target)) = (
            row.text("name"),
            row.text("source"),
            row.text("target_table"),
            row.text("target"),
        ) else {
            continue;
        };
        let action = |column: &str| {
            row.text(column)
                .and_then(|a| FkAction::parse(&a))
                .unwrap_or(FkAction::NoAction)
        };
        push_foreign_key_column(
            &mut keys,
            &name,
            source,
            row.text("target_schema").filter(|s| Some(s) != current.as_ref()),
            target_table,
            target,
            action("on_delete"),
            action("on_update"),
        );
    }
    Ok(keys)
}

pub(super) fn triggers(driver: &mut MsSqlDriver, table: &str) -> Result<Vec<Trigger>> {
    let sql = format!(
        "SELECT o.name AS name, \
         CASE WHEN OBJECTPROPERTY(o.object_id, 'ExecIsInsteadOfTrigger') = 1 THEN 'INSTEAD OF' ELSE 'AFTER' END AS timing, \
         CASE WHEN OBJECTPROPERTY(o.object_id, 'ExecIsInsertTrigger') = 1 THEN 'INSERT ' ELSE '' END + \
         CASE WHEN OBJECTPROPERTY(o.object_id, 'ExecIsUpdateTrigger') = 1 THEN 'UPDATE ' ELSE '' END + \
         CASE WHEN OBJECTPROPERTY(o.object_id, 'ExecIsDeleteTrigger') = 1 THEN 'DELETE' ELSE '' END AS event, \
         OBJECT_DEFINITION(o.object_id) AS statement \
         FROM sys.objects o WHERE o.type = 'TR' AND o.parent_object_id = OBJECT_ID({}) ORDER BY o.name",
        driver.object_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
    let mut triggers = Vec::new();
    for row in rows {
        let Some(name) = row.text("name") else {
            continue;
        };
        let timing = row
            .text("timing")
            .and_then(|t| TriggerTiming::parse(&t))
            .unwrap_or(TriggerTiming::After);
        let events = TriggerEvent::parse_list(&row.text("event").unwrap_or_default());
        push_trigger(&mut triggers, name, timing, events, row.text("statement"));
    }
    Ok(triggers)
}

pub(super) fn routines(driver: &mut MsSqlDriver) -> Result<Vec<Routine>> {
    let (routines_sql, params_sql) = information_schema_routines(&driver.schema_literal());
    let routines = driver.fetch_all(&routines_sql)?;
    let params = driver.fetch_all(&params_sql)?;
    Ok(routines_from_rows(routines, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_type() {
        assert_eq!(column_type("nvarchar", 100, 0, 0), "nvarchar(50)");
        assert_eq!(column_type("varbinary", -1, 0, 0), "varbinary(max)");
        assert_eq!(column_type("decimal", 9, 10, 2), "decimal(10,2)");
        assert_eq!(column_type("int", 4, 10, 0), "int");
    }

    #[test]
    fn test_strip_default() {
        assert_eq!(strip_default(Some("((0))".into())), Some("0".to_string()));
        assert_eq!(strip_default(Some("(N'it''s')".into())), Some("it's".to_string()));
        assert_eq!(strip_default(Some("(getdate())".into())), Some("getdate()".to_string()));
        assert_eq!(strip_default(Some("((1)+(2))".into())), Some("(1)+(2)".to_string()));
        assert_eq!(strip_default(None), None);
    }
}
