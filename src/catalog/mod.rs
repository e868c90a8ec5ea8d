//! Catalog helpers shared by the drivers.
//!
//! Drivers own their introspection queries; this module holds the pieces
//! they have in common: type-string parsing, DDL text extraction, folding of
//! one-row-per-column catalog results into entities, and row identity.

pub mod ddl;
pub mod types;

use crate::cursor::Row;
use crate::dialect::{Backend, MutationLimit};
use crate::model::{
    Column, ForeignKey, FkAction, Index, IndexColumn, IndexKind, ParamDirection, Routine,
    RoutineKind, RoutineParam, RowIdentity, Trigger, TriggerEvent, TriggerTiming,
};

/// `information_schema` routine and parameter queries for `schema`, an SQL
/// expression such as `DATABASE()` or a quoted literal.
pub(crate) fn information_schema_routines(schema: &str) -> (String, String) {
    let routines = format!(
        "SELECT r.specific_name AS specific_name, r.routine_name AS name, r.routine_type AS kind, \
         r.data_type AS returns, r.routine_definition AS body, r.external_language AS language \
         FROM information_schema.routines r WHERE r.routine_schema = {} ORDER BY r.routine_name",
        schema
    );
    let params = format!(
        "SELECT p.specific_name AS specific_name, p.parameter_name AS name, p.parameter_mode AS mode, \
         p.data_type AS data_type FROM information_schema.parameters p \
         WHERE p.specific_schema = {} ORDER BY p.specific_name, p.ordinal_position",
        schema
    );
    (routines, params)
}

/// Fold the two `information_schema` results into routines.
///
/// Return-value rows (no name or mode) are skipped.
pub(crate) fn routines_from_rows(routines: Vec<Row>, params: Vec<Row>) -> Vec<Routine> {
    routines
        .into_iter()
        .filter_map(|row| {
            let name = row.text("name")?;
            let specific = row.text("specific_name").unwrap_or_else(|| name.clone());
            let kind = match row.text("kind")?.to_ascii_uppercase().as_str() {
                "FUNCTION" => RoutineKind::Function,
                _ => RoutineKind::Procedure,
            };
            let params = params
                .iter()
                .filter(|p| p.text("specific_name").as_deref() == Some(specific.as_str()))
                .filter_map(|p| {
                    let name = p.text("name").filter(|n| !n.is_empty())?;
                    Some(RoutineParam {
                        name,
                        direction: ParamDirection::parse(&p.text("mode").unwrap_or_default()),
                        data_type: p.text("data_type").unwrap_or_default(),
                    })
                })
                .collect();
            Some(Routine {
                name,
                kind,
                params,
                returns: match kind {
                    RoutineKind::Function => row.text("returns"),
                    RoutineKind::Procedure => None,
                },
                body: row.text("body"),
                language: row.text("language"),
            })
        })
        .collect()
}

/// Default expression as stored by catalogs that keep it as SQL text:
/// `NULL` means no default and a quoted string yields its contents.
pub(crate) fn literal_default(default: Option<String>) -> Option<String> {
    let default = default?;
    if default.eq_ignore_ascii_case("NULL") {
        return None;
    }
    let inner = default
        .strip_prefix('\'')
        .and_then(|d| d.strip_suffix('\''))
        .map(|d| d.replace("''", "'"));
    inner.or(Some(default))
}

/// Append one catalog row (one indexed column) to the index list.
pub(crate) fn push_index_column(indexes: &mut Vec<Index>, name: &str, kind: IndexKind, column: IndexColumn) {
    match indexes.iter_mut().rev().find(|i| i.name == name) {
        Some(index) => index.columns.push(column),
        None => {
            let mut index = Index::new(name, kind);
            index.columns.push(column);
            indexes.push(index);
        }
    }
}

/// Append one catalog row (one constraint column pair) to the key list.
#[allow(clippy::too_many_arguments)]
pub(crate) fn push_foreign_key_column(
    keys: &mut Vec<ForeignKey>,
    name: &str,
    source: String,
    target_schema: Option<String>,
    target_table: String,
    target: String,
    on_delete: FkAction,
    on_update: FkAction,
) {
    match keys.iter_mut().rev().find(|k| k.name == name) {
        Some(key) => {
            key.source.push(source);
            key.target.push(target);
        }
        None => keys.push(ForeignKey {
            name: name.to_string(),
            source: vec![source],
            target_database: None,
            target_schema,
            target_table,
            target: vec![target],
            on_delete,
            on_update,
        }),
    }
}

/// Merge one trigger row; catalogs list multi-event triggers once per event.
pub(crate) fn push_trigger(
    triggers: &mut Vec<Trigger>,
    name: String,
    timing: TriggerTiming,
    events: Vec<TriggerEvent>,
    statement: Option<String>,
) {
    if let Some(existing) = triggers.iter_mut().find(|t| t.name == name) {
        for event in events {
            if !existing.events.contains(&event) {
                existing.events.push(event);
            }
        }
        return;
    }
    triggers.push(Trigger {
        name,
        timing,
        events,
        statement,
    });
}

/// Mark columns that belong to the primary index.
pub(crate) fn mark_primary(columns: &mut [Column], indexes: &[Index]) {
    let Some(primary) = indexes.iter().find(|i| i.kind == IndexKind::Primary) else {
        return;
    };
    for column in columns.iter_mut() {
        if primary.columns.iter().any(|c| c.name == column.name) {
            column.primary = true;
        }
    }
}

/// Columns that address exactly one row of a table.
///
/// Primary key first, then a unique index whose columns are all NOT NULL,
/// then the backend's pseudo-column.
pub fn row_identity(backend: Backend, columns: &[Column], indexes: &[Index]) -> Option<RowIdentity> {
    if let Some(primary) = indexes.iter().find(|i| i.kind == IndexKind::Primary) {
        return Some(RowIdentity {
            columns: primary.columns.iter().map(|c| c.name.clone()).collect(),
            synthetic: false,
        });
    }

    let flagged: Vec<String> = columns.iter().filter(|c| c.primary).map(|c| c.name.clone()).collect();
    if !flagged.is_empty() {
        return Some(RowIdentity {
            columns: flagged,
            synthetic: false,
        });
    }

    let not_null = |name: &str| columns.iter().any(|c| c.name == name && !c.nullable);
    let unique = indexes.iter().find(|i| {
        i.kind == IndexKind::Unique
            && !i.columns.is_empty()
            && i.columns.iter().all(|c| c.prefix.is_none() && not_null(&c.name))
    });
    if let Some(unique) = unique {
        return Some(RowIdentity {
            columns: unique.columns.iter().map(|c| c.name.clone()).collect(),
            synthetic: false,
        });
    }

    match backend.dialect().mutation_limit() {
        MutationLimit::RowIdentity { column, .. } => Some(RowIdentity {
            columns: vec![column.to_string()],
            synthetic: true,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn index(name: &str, kind: IndexKind, cols: &[&str]) -> Index {
        let mut index = Index::new(name, kind);
        for col in cols {
            index.columns.push(IndexColumn {
                name: col.to_string(),
                prefix: None,
                descending: false,
            });
        }
        index
    }

    fn column(name: &str, nullable: bool) -> Column {
        let mut column = Column::new(name, "int");
        column.nullable = nullable;
        column
    }

    #[test]
    fn test_row_identity_prefers_primary() {
        let columns = vec![column("id", false), column("email", false)];
        let indexes = vec![
            index("uq_email", IndexKind::Unique, &["email"]),
            index("PRIMARY", IndexKind::Primary, &["id"]),
        ];
        let identity = row_identity(Backend::MySql, &columns, &indexes).unwrap();
        assert_eq!(identity.columns, vec!["id"]);
        assert!(!identity.synthetic);
    }

    #[test]
    fn test_row_identity_unique_not_null() {
        let columns = vec![column("a", true), column("b", false)];
        let indexes = vec![
            index("uq_a", IndexKind::Unique, &["a"]),
            index("uq_b", IndexKind::Unique, &["b"]),
        ];
        let identity = row_identity(Backend::MySql, &columns, &indexes).unwrap();
        assert_eq!(identity.columns, vec!["b"]);
    }

    #[test]
    fn test_row_identity_synthetic() {
        let columns = vec![column("a", true)];
        assert_eq!(
            row_identity(Backend::Postgres, &columns, &[]),
            Some(RowIdentity {
                columns: vec!["ctid".to_string()],
                synthetic: true
            })
        );
        assert_eq!(row_identity(Backend::MySql, &columns, &[]), None);
    }

    #[test]
    fn test_literal_default() {
        assert_eq!(literal_default(Some("NULL".into())), None);
        assert_eq!(literal_default(Some("'it''s'".into())), Some("it's".to_string()));
        assert_eq!(literal_default(Some("CURRENT_TIMESTAMP".into())), Some("CURRENT_TIMESTAMP".to_string()));
        assert_eq!(literal_default(Some("'".into())), Some("'".to_string()));
        assert_eq!(literal_default(None), None);
    }

    #[test]
    fn test_push_index_column_groups_by_name() {
        let mut indexes = Vec::new();
        for (name, col) in [("PRIMARY", "a"), ("PRIMARY", "b"), ("ix", "c")] {
            push_index_column(
                &mut indexes,
                name,
                IndexKind::Index,
                IndexColumn {
                    name: col.to_string(),
                    prefix: None,
                    descending: false,
                },
            );
        }
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].column_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_routines_from_rows() {
        let routine_names: Arc<[String]> = ["specific_name", "name", "kind", "returns", "body", "language"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let param_names: Arc<[String]> = ["specific_name", "name", "mode", "data_type"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let routines = vec![Row::new(
            routine_names,
            vec![
                Value::from("add_one"),
                Value::from("add_one"),
                Value::from("FUNCTION"),
                Value::from("int"),
                Value::from("RETURN x + 1"),
                Value::from("SQL"),
            ],
        )];
        let params = vec![
            Row::new(
                param_names.clone(),
                vec![Value::from("add_one"), Value::Null, Value::Null, Value::from("int")],
            ),
            Row::new(
                param_names,
                vec![Value::from("add_one"), Value::from("x"), Value::from("IN"), Value::from("int")],
            ),
        ];
        let parsed = routines_from_rows(routines, params);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind, RoutineKind::Function);
        assert_eq!(parsed[0].returns.as_deref(), Some("int"));
        assert_eq!(parsed[0].params.len(), 1);
        assert_eq!(parsed[0].params[0].name, "x");
    }
}
