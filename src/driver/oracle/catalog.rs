//! `ALL_*` dictionary views.
//!
//! Oracle folds unquoted aliases to upper case, so every alias is quoted.

use super::OracleDriver;
use crate::catalog::{literal_default, mark_primary, push_foreign_key_column, push_index_column, push_trigger, routines_from_rows};
use crate::driver::{Driver, non_empty};
use crate::error::Result;
use crate::model::{
    Column, FkAction, ForeignKey, Index, IndexColumn, IndexKind, Routine, Table, TableKind,
    Trigger, TriggerEvent, TriggerTiming,
};

pub(super) fn databases(driver: &mut OracleDriver) -> Result<Vec<String>> {
    let rows = driver.fetch_all(r#"SELECT tablespace_name AS "name" FROM user_tablespaces ORDER BY 1"#)?;
    non_empty(rows.iter().filter_map(|r| r.text("name")).collect(), "tablespaces")
}

pub(super) fn schemas(driver: &mut OracleDriver) -> Result<Vec<String>> {
    let rows = driver.fetch_all(r#"SELECT username AS "name" FROM all_users ORDER BY username"#)?;
    non_empty(rows.iter().filter_map(|r| r.text("name")).collect(), "schemas")
}

pub(super) fn tables(driver: &mut OracleDriver) -> Result<Vec<Table>> {
    let owner = driver.schema_literal();
    let tablespace = match &driver.tablespace {
        Some(name) => format!(" AND t.tablespace_name = {}", driver.codec.quote_literal(name)),
        None => String::new(),
    };
    let sql = format!(
        r#"SELECT t.table_name AS "name", 'TABLE' AS "kind", t.num_rows AS "row_count", c.comments AS "comment"
         FROM all_tables t LEFT JOIN all_tab_comments c ON c.owner = t.owner AND c.table_name = t.table_name
         WHERE t.owner = {owner}{tablespace}
         UNION ALL
         SELECT v.view_name, 'VIEW', NULL, c.comments
         FROM all_views v LEFT JOIN all_tab_comments c ON c.owner = v.owner AND c.table_name = v.view_name
         WHERE v.owner = {owner}
         ORDER BY 1"#,
    );
    let rows = driver.fetch_all(&sql)?;
    let tables = rows
        .iter()
        .filter_map(|row| {
            let kind = match row.text("kind").as_deref() {
                Some("VIEW") => TableKind::View,
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

/// Declared type from the dictionary's split length columns.
fn column_type(data_type: &str, length: Option<i64>, precision: Option<i64>, scale: Option<i64>, char_used: Option<&str>) -> String {
    match data_type {
        "VARCHAR2" | "NVARCHAR2" | "CHAR" | "NCHAR" | "RAW" => {
            let unit = match (data_type, char_used) {
                ("VARCHAR2" | "CHAR", Some("C")) => " CHAR",
                _ => "",
            };
            match length {
                Some(length) => format!("{}({}{})", data_type, length, unit),
                None => data_type.to_string(),
            }
        }
        "NUMBER" => match (precision, scale) {
            (Some(p), Some(0)) => format!("NUMBER({})", p),
            (Some(p), Some(s)) => format!("NUMBER({},{})", p, s),
            _ => "NUMBER".to_string(),
        },
        _ => data_type.to_string(),
    }
}

pub(super) fn columns(driver: &mut OracleDriver, table: &str) -> Result<Vec<Column>> {
    let identity = if driver.server_info().version.at_least(12, 0, 0) {
        "c.identity_column"
    } else {
        "'NO'"
    };
    let sql = format!(
        r#"SELECT c.column_name AS "name", c.data_type AS "type", c.char_length AS "length",
         c.data_precision AS "precision", c.data_scale AS "scale", c.char_used AS "char_used",
         c.nullable AS "nullable", c.data_default AS "default_expr", {identity} AS "identity",
         cc.comments AS "comment"
         FROM all_tab_columns c LEFT JOIN all_col_comments cc
         ON cc.owner = c.owner AND cc.table_name = c.table_name AND cc.column_name = c.column_name
         WHERE c.owner = {} AND c.table_name = {} ORDER BY c.column_id"#,
        driver.schema_literal(),
        driver.codec.quote_literal(table),
    );
    let rows = driver.fetch_all(&sql)?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(name), Some(data_type)) = (row.text("name"), row.text("type")) else {
            continue;
        };
        let raw_type = column_type(
            &data_type,
            row.int("length").filter(|n| *n > 0),
            row.int("precision"),
            row.int("scale"),
            row.text("char_used").as_deref(),
        );
        let mut column = Column::new(name, raw_type);
        column.nullable = row.flag("nullable");
        column.auto_increment = row.flag("identity");
        column.default = literal_default(row.text("default_expr").map(|d| d.trim().to_string()));
        column.comment = row.text("comment");
        columns.push(column);
    }
    let mut columns = non_empty(columns, "columns")?;
    let indexes = indexes(driver, table)?;
    mark_primary(&mut columns, &indexes);
    Ok(columns)
}

pub(super) fn indexes(driver: &mut OracleDriver, table: &str) -> Result<Vec<Index>> {
    let sql = format!(
        r#"SELECT i.index_name AS "name", i.uniqueness AS "uniqueness", c.constraint_type AS "constraint_type",
         ic.column_name AS "column_name", ic.descend AS "descend"
         FROM all_indexes i
         JOIN all_ind_columns ic ON ic.index_owner = i.owner AND ic.index_name = i.index_name
         LEFT JOIN all_constraints c ON c.owner = i.table_owner AND c.table_name = i.table_name
         AND c.index_name = i.index_name AND c.constraint_type = 'P'
         WHERE i.table_owner = {} AND i.table_name = {}
         ORDER BY c.constraint_type, i.index_name, ic.column_position"#,
        driver.schema_literal(),
        driver.codec.quote_literal(table),
    );
    let rows = driver.fetch_all(&sql)?;
    let mut indexes = Vec::new();
    for row in rows {
        let (Some(name), Some(column)) = (row.text("name"), row.text("column_name")) else {
            continue;
        };
        let kind = if row.text("constraint_type").as_deref() == Some("P") {
            IndexKind::Primary
        } else if row.text("uniqueness").as_deref() == Some("UNIQUE") {
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
                descending: row.text("descend").as_deref() == Some("DESC"),
            },
        );
    }
    Ok(indexes)
}

pub(super) fn foreign_keys(driver: &mut OracleDriver, table: &str) -> Result<Vec<ForeignKey>> {
    let sql = format!(
        r#"SELECT c.constraint_name AS "name", cc.column_name AS "source", r.owner AS "target_schema",
         r.table_name AS "target_table", rc.column_name AS "target", c.delete_rule AS "on_delete"
         FROM all_constraints c
         JOIN all_cons_columns cc ON cc.owner = c.owner AND cc.constraint_name = c.constraint_name
         JOIN all_constraints r ON r.owner = c.r_owner AND r.constraint_name = c.r_constraint_name
         JOIN all_cons_columns rc ON rc.owner = r.owner AND rc.constraint_name = r.constraint_name
         AND rc.position = cc.position
         WHERE c.constraint_type = 'R' AND c.owner = {} AND c.table_name = {}
         ORDER BY c.constraint_name, cc.position"#,
        driver.schema_literal(),
        driver.codec.quote_literal(table),
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
        // Oracle has no ON UPDATE clause.
        push_foreign_key_column(
            &mut keys,
            &name,
            source,
            row.text("target_schema").filter(|s| Some(s) != current.as_ref()),
            target_table,
            target,
            row.text("on_delete")
                .and_then(|a| FkAction::parse(&a))
                .unwrap_or(FkAction::NoAction),
            FkAction::NoAction,
        );
    }
    Ok(keys)
}

pub(super) fn triggers(driver: &mut OracleDriver, table: &str) -> Result<Vec<Trigger>> {
    let sql = format!(
        r#"SELECT trigger_name AS "name", trigger_type AS "timing", triggering_event AS "event",
         trigger_body AS "statement" FROM all_triggers
         WHERE table_owner = {} AND table_name = {} ORDER BY trigger_name"#,
        driver.schema_literal(),
        driver.codec.quote_literal(table),
    );
    let rows = driver.fetch_all(&sql)?;
    let mut triggers = Vec::new();
    for row in rows {
        let Some(name) = row.text("name") else {
            continue;
        };
        // trigger_type reads like `BEFORE EACH ROW`.
        let timing = row
            .text("timing")
            .and_then(|t| TriggerTiming::parse(&t))
            .unwrap_or(TriggerTiming::After);
        let events = TriggerEvent::parse_list(&row.text("event").unwrap_or_default());
        push_trigger(&mut triggers, name, timing, events, row.text("statement"));
    }
    Ok(triggers)
}

pub(super) fn routines(driver: &mut OracleDriver) -> Result<Vec<Routine>> {
    let owner = driver.schema_literal();
    let routines = driver.fetch_all(&format!(
        r#"SELECT p.object_name AS "specific_name", p.object_name AS "name", p.object_type AS "kind",
         (SELECT a.data_type FROM all_arguments a WHERE a.owner = p.owner AND a.object_name = p.object_name
          AND a.package_name IS NULL AND a.position = 0 AND ROWNUM = 1) AS "returns",
         NULL AS "body", 'PL/SQL' AS "language"
         FROM all_procedures p
         WHERE p.owner = {owner} AND p.object_type IN ('PROCEDURE', 'FUNCTION') AND p.procedure_name IS NULL
         ORDER BY p.object_name"#,
    ))?;
    let params = driver.fetch_all(&format!(
        r#"SELECT object_name AS "specific_name", argument_name AS "name", in_out AS "mode",
         data_type AS "data_type" FROM all_arguments
         WHERE owner = {owner} AND package_name IS NULL ORDER BY object_name, position"#,
    ))?;
    Ok(routines_from_rows(routines, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_type() {
        assert_eq!(column_type("VARCHAR2", Some(20), None, None, Some("C")), "VARCHAR2(20 CHAR)");
        assert_eq!(column_type("RAW", Some(16), None, None, None), "RAW(16)");
        assert_eq!(column_type("NUMBER", None, Some(10), Some(0), None), "NUMBER(10)");
        assert_eq!(column_type("NUMBER", None, Some(8), Some(2), None), "NUMBER(8,2)");
        assert_eq!(column_type("NUMBER", None, None, None, None), "NUMBER");
        assert_eq!(column_type("DATE", Some(7), None, None, None), "DATE");
    }
}
