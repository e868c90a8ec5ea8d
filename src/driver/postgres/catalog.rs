//! `pg_catalog` introspection.

use super::PostgresDriver;
use crate::catalog::{ddl, information_schema_routines, push_index_column, push_trigger, routines_from_rows};
use crate::driver::{Driver, non_empty};
use crate::error::Result;
use crate::model::{
    Column, FkAction, ForeignKey, Index, IndexColumn, IndexKind, Privileges, Routine, Table,
    TableKind, Trigger, TriggerEvent, TriggerTiming,
};

pub(super) fn databases(driver: &mut PostgresDriver) -> Result<Vec<String>> {
    let rows = driver.fetch_all(
        "SELECT datname AS name FROM pg_database \
         WHERE datallowconn AND NOT datistemplate AND has_database_privilege(datname, 'CONNECT') \
         ORDER BY datname",
    )?;
    non_empty(rows.iter().filter_map(|r| r.text("name")).collect(), "databases")
}

pub(super) fn schemas(driver: &mut PostgresDriver) -> Result<Vec<String>> {
    let rows = driver.fetch_all(
        "SELECT nspname AS name FROM pg_namespace \
         WHERE nspname <> 'pg_toast' AND nspname NOT LIKE 'pg!_temp!_%' ESCAPE '!' \
         AND nspname NOT LIKE 'pg!_toast!_temp!_%' ESCAPE '!' ORDER BY nspname",
    )?;
    non_empty(rows.iter().filter_map(|r| r.text("name")).collect(), "schemas")
}

fn table_kind(relkind: &str) -> TableKind {
    match relkind {
        "v" => TableKind::View,
        "m" => TableKind::MaterializedView,
        "f" => TableKind::Foreign,
        _ => TableKind::Table,
    }
}

pub(super) fn tables(driver: &mut PostgresDriver) -> Result<Vec<Table>> {
    let sql = format!(
        "SELECT c.relname AS name, c.relkind::text AS kind, obj_description(c.oid, 'pg_class') AS comment, \
         CASE WHEN c.reltuples >= 0 THEN c.reltuples::bigint END AS rows, \
         pg_relation_size(c.oid) AS data_length, pg_indexes_size(c.oid) AS index_length \
         FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE n.nspname = {} AND c.relkind IN ('r', 'v', 'm', 'f', 'p') ORDER BY c.relname",
        driver.schema_literal()
    );
    let rows = driver.fetch_all(&sql)?;
    let tables = rows
        .iter()
        .filter_map(|row| {
            let mut table = Table::new(row.text("name")?, table_kind(&row.text("kind").unwrap_or_default()));
            table.comment = row.text("comment");
            if !table.kind.is_view() {
                table.rows = row.int("rows").and_then(|n| u64::try_from(n).ok());
                table.data_length = row.int("data_length").and_then(|n| u64::try_from(n).ok());
                table.index_length = row.int("index_length").and_then(|n| u64::try_from(n).ok());
            }
            Some(table)
        })
        .collect();
    Ok(tables)
}

pub(super) fn columns(driver: &mut PostgresDriver, table: &str) -> Result<Vec<Column>> {
    let version = driver.server_info().version;
    let identity = if version.at_least(10, 0, 0) {
        "a.attidentity::text"
    } else {
        "''"
    };
    let generated = if version.at_least(12, 0, 0) {
        "a.attgenerated::text"
    } else {
        "''"
    };
    let sql = format!(
        "SELECT a.attname AS name, format_type(a.atttypid, a.atttypmod) AS type, NOT a.attnotnull AS nullable, \
         pg_get_expr(d.adbin, d.adrelid) AS default_expr, col_description(c.oid, a.attnum) AS comment, \
         {identity} AS identity, {generated} AS generated, coll.collname AS collation, \
         has_column_privilege(c.oid, a.attnum, 'SELECT') AS can_select, \
         has_column_privilege(c.oid, a.attnum, 'INSERT') AS can_insert, \
         has_column_privilege(c.oid, a.attnum, 'UPDATE') AS can_update, \
         has_column_privilege(c.oid, a.attnum, 'REFERENCES') AS can_reference, \
         EXISTS (SELECT 1 FROM pg_index i WHERE i.indrelid = c.oid AND i.indisprimary \
         AND a.attnum = ANY(i.indkey)) AS is_primary \
         FROM pg_attribute a JOIN pg_class c ON c.oid = a.attrelid \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
         LEFT JOIN pg_collation coll ON coll.oid = a.attcollation AND coll.collname <> 'default' \
         WHERE n.nspname = {schema} AND c.relname = {table} AND a.attnum > 0 AND NOT a.attisdropped \
         ORDER BY a.attnum",
        identity = identity,
        generated = generated,
        schema = driver.schema_literal(),
        table = driver.codec.quote_literal(table),
    );
    let rows = driver.fetch_all(&sql)?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(name), Some(raw_type)) = (row.text("name"), row.text("type")) else {
            continue;
        };
        let mut column = Column::new(name, raw_type);
        let default = row.text("default_expr");
        let identity = row.text("identity").unwrap_or_default();
        column.nullable = row.flag("nullable");
        column.generated = row.text("generated").as_deref() == Some("s");
        column.auto_increment = identity == "a"
            || identity == "d"
            || default.as_deref().is_some_and(|d| d.starts_with("nextval("));
        column.default = default.filter(|_| !column.generated);
        column.comment = row.text("comment");
        column.collation = row.text("collation");
        column.privileges = Privileges {
            select: row.flag("can_select"),
            insert: row.flag("can_insert"),
            update: row.flag("can_update"),
            references: row.flag("can_reference"),
        };
        column.primary = row.flag("is_primary");
        columns.push(column);
    }
    non_empty(columns, "columns")
}

pub(super) fn indexes(driver: &mut PostgresDriver, table: &str) -> Result<Vec<Index>> {
    let sql = format!(
        "SELECT ic.relname AS name, i.indisprimary AS is_primary, i.indisunique AS is_unique, \
         COALESCE(a.attname, pg_get_indexdef(i.indexrelid, k.ord::int, true)) AS column_name, \
         (i.indoption[k.ord - 1] & 1) = 1 AS descending \
         FROM pg_index i JOIN pg_class ic ON ic.oid = i.indexrelid \
         JOIN pg_class c ON c.oid = i.indrelid JOIN pg_namespace n ON n.oid = c.relnamespace \
         CROSS JOIN LATERAL unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
         LEFT JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum \
         WHERE n.nspname = {} AND c.relname = {} \
         ORDER BY i.indisprimary DESC, i.indisunique DESC, ic.relname, k.ord",
        driver.schema_literal(),
        driver.codec.quote_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
    let mut indexes = Vec::new();
    for row in rows {
        let (Some(name), Some(column)) = (row.text("name"), row.text("column_name")) else {
            continue;
        };
        let kind = if row.flag("is_primary") {
            IndexKind::Primary
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

pub(super) fn foreign_keys(driver: &mut PostgresDriver, table: &str) -> Result<Vec<ForeignKey>> {
    let sql = format!(
        "SELECT con.conname AS name, pg_get_constraintdef(con.oid) AS definition, tn.nspname AS target_schema \
         FROM pg_constraint con JOIN pg_class c ON c.oid = con.conrelid \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         JOIN pg_class tc ON tc.oid = con.confrelid JOIN pg_namespace tn ON tn.oid = tc.relnamespace \
         WHERE con.contype = 'f' AND n.nspname = {} AND c.relname = {} ORDER BY con.conname",
        driver.schema_literal(),
        driver.codec.quote_literal(table)
    );
    let rows = driver.fetch_all(&sql)?;
    let current = driver.schema.clone();
    let mut keys = Vec::new();
    for row in rows {
        let Some(definition) = row.text("definition") else {
            continue;
        };
        for mut key in ddl::foreign_keys(&definition, FkAction::NoAction) {
            key.name = row.text("name").unwrap_or_default();
            key.target_schema = row.text("target_schema").filter(|s| Some(s) != current.as_ref());
            keys.push(key);
        }
    }
    Ok(keys)
}

pub(super) fn triggers(driver: &mut PostgresDriver, table: &str) -> Result<Vec<Trigger>> {
    let sql = format!(
        "SELECT trigger_name AS name, action_timing AS timing, event_manipulation AS event, \
         action_statement AS statement FROM information_schema.triggers \
         WHERE event_object_schema = {} AND event_object_table = {} ORDER BY trigger_name",
        driver.schema_literal(),
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

pub(super) fn routines(driver: &mut PostgresDriver) -> Result<Vec<Routine>> {
    let (routines_sql, params_sql) = information_schema_routines(&driver.schema_literal());
    let routines = driver.fetch_all(&routines_sql)?;
    let params = driver.fetch_all(&params_sql)?;
    Ok(routines_from_rows(routines, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_kind() {
        assert_eq!(table_kind("r"), TableKind::Table);
        assert_eq!(table_kind("p"), TableKind::Table);
        assert_eq!(table_kind("m"), TableKind::MaterializedView);
        assert_eq!(table_kind("f"), TableKind::Foreign);
    }
}
