//! `sqlite_master` and PRAGMA introspection.
//!
//! Constraint names and trigger details are only available in the stored
//! DDL, which is parsed with [`crate::catalog::ddl`].

use super::SqliteDriver;
use crate::catalog::{ddl, literal_default, push_index_column};
use crate::driver::Driver;
use crate::error::Result;
use crate::model::{
    Column, FkAction, ForeignKey, Index, IndexColumn, IndexKind, Table, TableKind, Trigger,
};

pub(super) fn tables(driver: &mut SqliteDriver) -> Result<Vec<Table>> {
    let rows = driver.fetch_all(
        "SELECT name, type FROM sqlite_master WHERE type IN ('table', 'view') \
         AND name NOT LIKE 'sqlite!_%' ESCAPE '!' ORDER BY name",
    )?;
    let tables = rows
        .iter()
        .filter_map(|row| {
            let kind = match row.text("type").as_deref() {
                Some("view") => TableKind::View,
                _ => TableKind::Table,
            };
            Some(Table::new(row.text("name")?, kind))
        })
        .collect();
    Ok(tables)
}

fn table_ddl(driver: &mut SqliteDriver, table: &str) -> Result<Option<String>> {
    let sql = format!(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = {}",
        driver.codec.quote_literal(table)
    );
    Ok(driver.fetch_value(&sql)?.and_then(|v| v.to_text()))
}

pub(super) fn columns(driver: &mut SqliteDriver, table: &str) -> Result<Vec<Column>> {
    let pragma = if driver.server_info().version.at_least(3, 26, 0) {
        "table_xinfo"
    } else {
        "table_info"
    };
    let sql = format!("PRAGMA {}({})", pragma, driver.codec.quote_identifier(table));
    let rows = driver.fetch_all(&sql)?;
    let primary_count = rows.iter().filter(|r| r.int("pk").unwrap_or(0) > 0).count();
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(name) = row.text("name") else {
            continue;
        };
        let mut column = Column::new(name, row.text("type").unwrap_or_default());
        let primary = row.int("pk").unwrap_or(0) > 0;
        column.nullable = !row.flag("notnull") && !primary;
        column.default = literal_default(row.text("dflt_value"));
        column.primary = primary;
        // INTEGER PRIMARY KEY aliases the rowid.
        column.auto_increment =
            primary && primary_count == 1 && column.raw_type.eq_ignore_ascii_case("INTEGER");
        column.generated = matches!(row.int("hidden"), Some(2) | Some(3));
        columns.push(column);
    }
    Ok(columns)
}

pub(super) fn indexes(driver: &mut SqliteDriver, table: &str) -> Result<Vec<Index>> {
    let sql = format!("PRAGMA index_list({})", driver.codec.quote_identifier(table));
    let list = driver.fetch_all(&sql)?;
    let info = if driver.server_info().version.at_least(3, 9, 0) {
        "index_xinfo"
    } else {
        "index_info"
    };

    let mut indexes = Vec::new();
    for entry in list {
        let Some(name) = entry.text("name") else {
            continue;
        };
        let kind = match entry.text("origin").as_deref() {
            Some("pk") => IndexKind::Primary,
            _ if entry.flag("unique") => IndexKind::Unique,
            _ => IndexKind::Index,
        };
        let sql = format!("PRAGMA {}({})", info, driver.codec.quote_identifier(&name));
        let mut added = false;
        for row in driver.fetch_all(&sql)? {
            // index_xinfo also lists the auxiliary rowid; key = 0 marks it.
            if row.get("key").is_some() && !row.flag("key") {
                continue;
            }
            let Some(column) = row.text("name") else {
                continue;
            };
            push_index_column(
                &mut indexes,
                &name,
                kind,
                IndexColumn {
                    name: column,
                    prefix: None,
                    descending: row.flag("desc"),
                },
            );
            added = true;
        }
        if !added {
            indexes.push(Index::new(name, kind));
        }
    }

    if !indexes.iter().any(|i| i.kind == IndexKind::Primary) {
        let mut pk: Vec<(i64, String)> = driver
            .fetch_all(&format!("PRAGMA table_info({})", driver.codec.quote_identifier(table)))?
            .iter()
            .filter_map(|r| Some((r.int("pk").filter(|n| *n > 0)?, r.text("name")?)))
            .collect();
        pk.sort();
        if !pk.is_empty() {
            let mut primary = Index::new("PRIMARY", IndexKind::Primary);
            primary.columns = pk
                .into_iter()
                .map(|(_, name)| IndexColumn {
                    name,
                    prefix: None,
                    descending: false,
                })
                .collect();
            indexes.insert(0, primary);
        }
    }
    Ok(indexes)
}

pub(super) fn foreign_keys(driver: &mut SqliteDriver, table: &str) -> Result<Vec<ForeignKey>> {
    let sql = format!("PRAGMA foreign_key_list({})", driver.codec.quote_identifier(table));
    let rows = driver.fetch_all(&sql)?;
    let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
    for row in rows {
        let (Some(id), Some(target_table), Some(source)) =
            (row.int("id"), row.text("table"), row.text("from"))
        else {
            continue;
        };
        let target = row.text("to");
        let action = |column: &str| {
            row.text(column)
                .and_then(|a| FkAction::parse(&a))
                .unwrap_or(FkAction::NoAction)
        };
        match keys.iter_mut().find(|(key_id, _)| *key_id == id) {
            Some((_, key)) => {
                key.source.push(source);
                key.target.extend(target);
            }
            None => keys.push((
                id,
                ForeignKey {
                    name: String::new(),
                    source: vec![source],
                    target_database: None,
                    target_schema: None,
                    target_table,
                    target: target.into_iter().collect(),
                    on_delete: action("on_delete"),
                    on_update: action("on_update"),
                },
            )),
        }
    }
    // PRAGMA lists keys in reverse declaration order.
    keys.sort_by_key(|(id, _)| *id);

    let declared = match table_ddl(driver, table)? {
        Some(text) => ddl::foreign_keys(&text, FkAction::NoAction),
        None => Vec::new(),
    };
    let mut result = Vec::with_capacity(keys.len());
    for (_, mut key) in keys {
        // `REFERENCES t` without columns targets t's primary key.
        if key.target.is_empty() {
            key.target = indexes(driver, &key.target_table)?
                .into_iter()
                .find(|i| i.kind == IndexKind::Primary)
                .map(|i| i.columns.into_iter().map(|c| c.name).collect())
                .unwrap_or_default();
        }
        if let Some(found) = declared.iter().find(|d| {
            d.target_table.eq_ignore_ascii_case(&key.target_table) && d.source == key.source
        }) {
            key.name = found.name.clone();
        }
        result.push(key);
    }
    Ok(result)
}

pub(super) fn triggers(driver: &mut SqliteDriver, table: &str) -> Result<Vec<Trigger>> {
    let sql = format!(
        "SELECT name, sql FROM sqlite_master WHERE type = 'trigger' AND tbl_name = {} ORDER BY name",
        driver.codec.quote_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
    let mut triggers = Vec::new();
    for row in rows {
        let (Some(name), Some(text)) = (row.text("name"), row.text("sql")) else {
            continue;
        };
        match ddl::trigger(&text) {
            Some(mut trigger) => {
                trigger.name = name;
                triggers.push(trigger);
            }
            None => tracing::debug!(trigger = %name, "unparsed trigger DDL"),
        }
    }
    Ok(triggers)
}
