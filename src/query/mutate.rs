use super::search::where_clause;
use super::{Assignment, Predicate, UpsertPlan};
use crate::codec::Codec;
use crate::dialect::{Backend, MutationLimit, SubLimit, UpsertStyle};
use crate::error::{Error, Result};
use crate::model::Column;
use crate::value::Value;

fn field<'f>(fields: &'f [Column], name: &str) -> Option<&'f Column> {
    fields.iter().find(|f| f.name == name)
}

fn column_list(codec: &Codec, assignments: &[Assignment]) -> String {
    assignments
        .iter()
        .map(|(name, _)| codec.quote_identifier(name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn value_list(codec: &Codec, fields: &[Column], assignments: &[Assignment]) -> String {
    assignments
        .iter()
        .map(|(name, value)| codec.write_value(field(fields, name), value))
        .collect::<Vec<_>>()
        .join(", ")
}

fn set_list(codec: &Codec, fields: &[Column], assignments: &[Assignment]) -> String {
    assignments
        .iter()
        .map(|(name, value)| {
            format!(
                "{} = {}",
                codec.quote_identifier(name),
                codec.write_value(field(fields, name), value)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// WHERE clause (with leading space) limited to one row where asked.
fn limited_where(
    codec: &Codec,
    table: &str,
    conditions: Option<String>,
    limit_to_one: bool,
) -> Result<(String, String)> {
    let plain = conditions
        .as_ref()
        .map(|c| format!(" WHERE {}", c))
        .unwrap_or_default();
    if !limit_to_one {
        return Ok((plain, String::new()));
    }

    match codec.dialect().mutation_limit() {
        MutationLimit::Limit => Ok((plain, " LIMIT 1".to_string())),
        MutationLimit::Top => Ok((plain, String::new())),
        MutationLimit::RowIdentity { column, sub_limit } => {
            let sub = match sub_limit {
                SubLimit::Limit => format!("SELECT {} FROM {}{} LIMIT 1", column, table, plain),
                SubLimit::RowNum => match &conditions {
                    Some(c) => format!("SELECT {} FROM {} WHERE {} AND ROWNUM = 1", column, table, c),
                    None => format!("SELECT {} FROM {} WHERE ROWNUM = 1", column, table),
                },
            };
            let clause = match &conditions {
                Some(c) => format!(" WHERE ({}) AND {} IN ({})", c, column, sub),
                None => format!(" WHERE {} IN ({})", column, sub),
            };
            Ok((clause, String::new()))
        }
        MutationLimit::Unsupported => Err(Error::unsupported(
            codec.backend().name(),
            "single-row UPDATE/DELETE",
        )),
    }
}

fn top_one(codec: &Codec, limit_to_one: bool) -> &'static str {
    if limit_to_one && codec.dialect().mutation_limit() == MutationLimit::Top {
        " TOP (1)"
    } else {
        ""
    }
}

pub fn build_insert(codec: &Codec, fields: &[Column], table: &str, assignments: &[Assignment]) -> Result<String> {
    let table = codec.quote_identifier(table);
    if assignments.is_empty() {
        return codec
            .dialect()
            .default_values_insert(&table)
            .ok_or_else(|| Error::unsupported(codec.backend().name(), "INSERT without values"));
    }
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        column_list(codec, assignments),
        value_list(codec, fields, assignments)
    ))
}

pub fn build_update(
    codec: &Codec,
    fields: &[Column],
    table: &str,
    assignments: &[Assignment],
    predicates: &[Predicate],
    limit_to_one: bool,
) -> Result<String> {
    if assignments.is_empty() {
        return Err(Error::InvalidInput("UPDATE needs at least one assignment".to_string()));
    }
    let table = codec.quote_identifier(table);
    let conditions = where_clause(codec, fields, predicates)?;
    let (clause, suffix) = limited_where(codec, &table, conditions, limit_to_one)?;
    Ok(format!(
        "UPDATE{} {} SET {}{}{}",
        top_one(codec, limit_to_one),
        table,
        set_list(codec, fields, assignments),
        clause,
        suffix
    ))
}

pub fn build_delete(
    codec: &Codec,
    fields: &[Column],
    table: &str,
    predicates: &[Predicate],
    limit_to_one: bool,
) -> Result<String> {
    let table = codec.quote_identifier(table);
    let conditions = where_clause(codec, fields, predicates)?;
    let (clause, suffix) = limited_where(codec, &table, conditions, limit_to_one)?;
    Ok(format!(
        "DELETE{} FROM {}{}{}",
        top_one(codec, limit_to_one),
        table,
        clause,
        suffix
    ))
}

/// `k1 = v1 AND k2 IS NULL` for one row's key values.
fn key_condition(codec: &Codec, fields: &[Column], row: &[Assignment], key: &[String]) -> Result<String> {
    let mut parts = Vec::with_capacity(key.len());
    for name in key {
        let (_, value) = row
            .iter()
            .find(|(column, _)| column == name)
            .ok_or_else(|| Error::InvalidInput(format!("Row has no value for key column '{}'", name)))?;
        let quoted = codec.quote_identifier(name);
        parts.push(match value {
            Value::Null => format!("{} IS NULL", quoted),
            value => format!("{} = {}", quoted, codec.write_value(field(fields, name), value)),
        });
    }
    Ok(parts.join(" AND "))
}

/// Insert rows, updating those whose key already exists.
///
/// Every row must carry the same columns, in the same order.
pub fn build_upsert(
    codec: &Codec,
    fields: &[Column],
    table: &str,
    rows: &[Vec<Assignment>],
    key: &[String],
) -> Result<UpsertPlan> {
    let first = rows
        .first()
        .ok_or_else(|| Error::InvalidInput("Nothing to insert".to_string()))?;
    if first.is_empty() {
        return Err(Error::InvalidInput("Rows have no columns".to_string()));
    }
    let names: Vec<&str> = first.iter().map(|(n, _)| n.as_str()).collect();
    if rows
        .iter()
        .any(|row| row.len() != names.len() || row.iter().zip(&names).any(|((n, _), m)| n.as_str() != *m))
    {
        return Err(Error::InvalidInput("Rows must share one column list".to_string()));
    }

    let quoted = codec.quote_identifier(table);
    let columns = column_list(codec, first);
    let values: Vec<String> = rows
        .iter()
        .map(|row| format!("({})", value_list(codec, fields, row)))
        .collect();
    let non_key: Vec<&str> = names.iter().copied().filter(|n| !key.iter().any(|k| k == n)).collect();
    let q = |name: &str| codec.quote_identifier(name);

    let style = codec.dialect().upsert_style(codec.server());
    if style != UpsertStyle::Replace && style != UpsertStyle::OnDuplicateKey && key.is_empty() {
        return Err(Error::InvalidInput("Upsert needs a key".to_string()));
    }

    let sql = match style {
        UpsertStyle::OnDuplicateKey => {
            let updates: Vec<String> = names.iter().map(|n| format!("{0} = VALUES({0})", q(*n))).collect();
            format!(
                "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
                quoted,
                columns,
                values.join(", "),
                updates.join(", ")
            )
        }
        UpsertStyle::OnConflict => {
            let target: Vec<String> = key.iter().map(|k| q(k.as_str())).collect();
            let action = if non_key.is_empty() {
                "DO NOTHING".to_string()
            } else {
                let updates: Vec<String> = non_key.iter().map(|n| format!("{0} = EXCLUDED.{0}", q(*n))).collect();
                format!("DO UPDATE SET {}", updates.join(", "))
            };
            format!(
                "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) {}",
                quoted,
                columns,
                values.join(", "),
                target.join(", "),
                action
            )
        }
        UpsertStyle::Replace => format!("REPLACE INTO {} ({}) VALUES {}", quoted, columns, values.join(", ")),
        UpsertStyle::Merge => merge(codec, fields, &quoted, rows, &names, key, &non_key),
        UpsertStyle::UpdateThenInsert => {
            let mut plan = Vec::with_capacity(rows.len());
            for row in rows {
                let assignments: Vec<Assignment> = if non_key.is_empty() {
                    row.clone()
                } else {
                    row.iter()
                        .filter(|(n, _)| non_key.contains(&n.as_str()))
                        .cloned()
                        .collect()
                };
                let update = format!(
                    "UPDATE {} SET {} WHERE {}",
                    quoted,
                    set_list(codec, fields, &assignments),
                    key_condition(codec, fields, row, key)?
                );
                plan.push((update, build_insert(codec, fields, table, row)?));
            }
            return Ok(UpsertPlan::PerRow(plan));
        }
    };
    Ok(UpsertPlan::Single(sql))
}

fn merge(
    codec: &Codec,
    fields: &[Column],
    table: &str,
    rows: &[Vec<Assignment>],
    names: &[&str],
    key: &[String],
    non_key: &[&str],
) -> String {
    let q = |name: &str| codec.quote_identifier(name);
    let on: Vec<String> = key
        .iter()
        .map(|k| format!("{0}.{1} = source.{1}", table, q(k.as_str())))
        .collect();
    let insert_columns: Vec<String> = names.iter().map(|n| q(*n)).collect();
    let insert_values: Vec<String> = names.iter().map(|n| format!("source.{}", q(*n))).collect();
    let matched = if non_key.is_empty() {
        String::new()
    } else {
        let updates: Vec<String> = non_key
            .iter()
            .map(|n| format!("{0}.{1} = source.{1}", table, q(*n)))
            .collect();
        format!(" WHEN MATCHED THEN UPDATE SET {}", updates.join(", "))
    };
    let not_matched = format!(
        " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        insert_columns.join(", "),
        insert_values.join(", ")
    );

    if codec.backend() == Backend::Oracle {
        let selects: Vec<String> = rows
            .iter()
            .map(|row| {
                let items: Vec<String> = row
                    .iter()
                    .map(|(n, v)| format!("{} AS {}", codec.write_value(field(fields, n), v), q(n)))
                    .collect();
                format!("SELECT {} FROM dual", items.join(", "))
            })
            .collect();
        format!(
            "MERGE INTO {} USING ({}) source ON ({}){}{}",
            table,
            selects.join(" UNION ALL "),
            on.join(" AND "),
            matched,
            not_matched
        )
    } else {
        let values: Vec<String> = rows
            .iter()
            .map(|row| format!("({})", value_list(codec, fields, row)))
            .collect();
        format!(
            "MERGE INTO {} USING (VALUES {}) AS source ({}) ON {}{}{};",
            table,
            values.join(", "),
            insert_columns.join(", "),
            on.join(" AND "),
            matched,
            not_matched
        )
    }
}
