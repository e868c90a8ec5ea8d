//! `information_schema` introspection for MySQL and MariaDB.

use super::MySqlDriver;
use crate::catalog::{
    ddl, information_schema_routines, literal_default, push_foreign_key_column, push_index_column, push_trigger,
    routines_from_rows,
};
use crate::driver::{Driver, non_empty};
use crate::error::Result;
use crate::model::{
    Column, FkAction, ForeignKey, Index, IndexColumn, IndexKind, Privileges, Routine, Table,
    TableKind, Trigger, TriggerEvent, TriggerTiming,
};

pub(super) fn databases(driver: &mut MySqlDriver) -> Result<Vec<String>> {
    let rows = driver.fetch_all("SELECT SCHEMA_NAME AS name FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME")?;
    let names = rows.iter().filter_map(|r| r.text("name")).collect();
    non_empty(names, "databases")
}

fn table_kind(kind: &str) -> TableKind {
    match kind {
        "VIEW" => TableKind::View,
        "SYSTEM VIEW" => TableKind::System,
        _ => TableKind::Table,
    }
}

pub(super) fn tables(driver: &mut MySqlDriver) -> Result<Vec<Table>> {
    let rows = driver.fetch_all(
        "SELECT TABLE_NAME AS name, TABLE_TYPE AS type, ENGINE AS engine, TABLE_COMMENT AS comment, \
         TABLE_ROWS AS `rows`, DATA_LENGTH AS data_length, INDEX_LENGTH AS index_length, \
         TABLE_COLLATION AS collation \
         FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME",
    )?;
    let tables = rows
        .iter()
        .filter_map(|row| {
            let mut table = Table::new(row.text("name")?, table_kind(&row.text("type").unwrap_or_default()));
            table.engine = row.text("engine");
            // Views report the literal comment "VIEW".
            table.comment = row
                .text("comment")
                .filter(|c| !c.is_empty() && !(table.kind.is_view() && c == "VIEW"));
            table.rows = row.int("rows").and_then(|n| u64::try_from(n).ok());
            table.data_length = row.int("data_length").and_then(|n| u64::try_from(n).ok());
            table.index_length = row.int("index_length").and_then(|n| u64::try_from(n).ok());
            table.collation = row.text("collation");
            Some(table)
        })
        .collect();
    Ok(tables)
}

/// MariaDB 10.2.7+ reports defaults as expressions: `NULL` and quoted strings.
fn normalize_default(driver: &MySqlDriver, default: Option<String>) -> Option<String> {
    let server = driver.server_info();
    if server.mariadb && server.version.at_least(10, 2, 7) {
        literal_default(default)
    } else {
        default
    }
}

pub(super) fn columns(driver: &mut MySqlDriver, table: &str) -> Result<Vec<Column>> {
    let sql = format!(
        "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS type, IS_NULLABLE AS nullable, COLUMN_DEFAULT AS `default`, \
         EXTRA AS extra, COLLATION_NAME AS collation, PRIVILEGES AS privileges, COLUMN_COMMENT AS comment, \
         COLUMN_KEY AS `key` FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
        driver.codec.quote_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(name), Some(raw_type)) = (row.text("name"), row.text("type")) else {
            continue;
        };
        let extra = row.text("extra").unwrap_or_default().to_ascii_lowercase();
        let mut column = Column::new(name, raw_type);
        column.nullable = row.flag("nullable");
        column.default = normalize_default(driver, row.text("default"));
        column.auto_increment = extra.contains("auto_increment");
        column.generated = extra.contains("generated");
        column.collation = row.text("collation");
        column.privileges = row
            .text("privileges")
            .map(|p| Privileges::from_list(&p))
            .unwrap_or_else(Privileges::all);
        column.comment = row.text("comment").filter(|c| !c.is_empty());
        column.primary = row.text("key").as_deref() == Some("PRI");
        columns.push(column);
    }
    non_empty(columns, "columns")
}

pub(super) fn indexes(driver: &mut MySqlDriver, table: &str) -> Result<Vec<Index>> {
    let sql = format!("SHOW INDEX FROM {}", driver.codec.quote_identifier(table));
    let rows = driver.fetch_all(&sql)?;
    let mut indexes = Vec::new();
    for row in rows {
        let (Some(name), Some(column)) = (row.text("Key_name"), row.text("Column_name")) else {
            continue;
        };
        let kind = if name == "PRIMARY" {
            IndexKind::Primary
        } else {
            match row.text("Index_type").as_deref() {
                Some("FULLTEXT") => IndexKind::Fulltext,
                Some("SPATIAL") => IndexKind::Spatial,
                _ if row.int("Non_unique") == Some(0) => IndexKind::Unique,
                _ => IndexKind::Index,
            }
        };
        push_index_column(
            &mut indexes,
            &name,
            kind,
            IndexColumn {
                name: column,
                prefix: row.int("Sub_part").and_then(|n| u32::try_from(n).ok()),
                descending: row.text("Collation").as_deref() == Some("D"),
            },
        );
    }
    Ok(indexes)
}

pub(super) fn foreign_keys(driver: &mut MySqlDriver, table: &str) -> Result<Vec<ForeignKey>> {
    let mut keys = if driver.server_info().version.at_least(5, 1, 16) {
        from_referential_constraints(driver, table)?
    } else {
        Vec::new()
    };
    if keys.is_empty() {
        keys = from_create_table(driver, table)?;
    }
    let current = driver.database.clone();
    for key in &mut keys {
        if key.target_database.is_some() && key.target_database == current {
            key.target_database = None;
        }
    }
    Ok(keys)
}

fn from_referential_constraints(driver: &mut MySqlDriver, table: &str) -> Result<Vec<ForeignKey>> {
    let sql = format!(
        "SELECT k.CONSTRAINT_NAME AS name, k.COLUMN_NAME AS source, k.REFERENCED_TABLE_SCHEMA AS target_db, \
         k.REFERENCED_TABLE_NAME AS target_table, k.REFERENCED_COLUMN_NAME AS target, \
         r.DELETE_RULE AS on_delete, r.UPDATE_RULE AS on_update \
         FROM information_schema.KEY_COLUMN_USAGE k \
         JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
         ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
         AND r.TABLE_NAME = k.TABLE_NAME \
         WHERE k.TABLE_SCHEMA = DATABASE() AND k.TABLE_NAME = {} AND k.REFERENCED_TABLE_NAME IS NOT NULL \
         ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION",
        driver.codec.quote_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
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
                .unwrap_or(FkAction::Restrict)
        };
        let fresh = !keys.iter().any(|k: &ForeignKey| k.name == name);
        push_foreign_key_column(
            &mut keys,
            &name,
            source,
            None,
            target_table,
            target,
            action("on_delete"),
            action("on_update"),
        );
        if fresh {
            if let Some(key) = keys.last_mut() {
                key.target_database = row.text("target_db");
            }
        }
    }
    Ok(keys)
}

fn from_create_table(driver: &mut MySqlDriver, table: &str) -> Result<Vec<ForeignKey>> {
    let sql = format!("SHOW CREATE TABLE {}", driver.codec.quote_identifier(table));
    let rows = driver.fetch_all(&sql)?;
    let Some(ddl) = rows.first().and_then(|r| r.get_index(1)).and_then(|v| v.to_text()) else {
        return Ok(Vec::new());
    };
    let mut keys = ddl::foreign_keys(&ddl, FkAction::Restrict);
    for key in &mut keys {
        // MySQL qualifies the target with a database, never a schema.
        key.target_database = key.target_schema.take();
    }
    Ok(keys)
}

pub(super) fn triggers(driver: &mut MySqlDriver, table: &str) -> Result<Vec<Trigger>> {
    let sql = format!(
        "SELECT TRIGGER_NAME AS name, ACTION_TIMING AS timing, EVENT_MANIPULATION AS event, \
         ACTION_STATEMENT AS statement FROM information_schema.TRIGGERS \
         WHERE EVENT_OBJECT_SCHEMA = DATABASE() AND EVENT_OBJECT_TABLE = {} \
         ORDER BY ACTION_TIMING, EVENT_MANIPULATION",
        driver.codec.quote_literal(table)
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
            .unwrap_or(TriggerTiming::Before);
        let events = TriggerEvent::parse_list(&row.text("event").unwrap_or_default());
        push_trigger(&mut triggers, name, timing, events, row.text("statement"));
    }
    Ok(triggers)
}

pub(super) fn routines(driver: &mut MySqlDriver) -> Result<Vec<Routine>> {
    let (routines_sql, params_sql) = information_schema_routines("DATABASE()");
    let routines = driver.fetch_all(&routines_sql)?;
    let params = driver.fetch_all(&params_sql)?;
    Ok(routines_from_rows(routines, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_kind() {
        assert_eq!(table_kind("BASE TABLE"), TableKind::Table);
        assert_eq!(table_kind("VIEW"), TableKind::View);
        assert_eq!(table_kind("SYSTEM VIEW"), TableKind::System);
    }
}
