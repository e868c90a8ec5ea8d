use super::search::where_clause;
use super::{BuiltSelect, SelectItem, SelectQuery};
use crate::codec::Codec;
use crate::dialect::Pagination;
use crate::error::{Error, Result};
use crate::model::Column;

const AGGREGATES: &[&str] = &["COUNT", "COUNT DISTINCT", "MIN", "MAX", "SUM", "AVG", "GROUP_CONCAT"];

fn field<'f>(fields: &'f [Column], name: &str) -> Option<&'f Column> {
    fields.iter().find(|f| f.name == name)
}

/// Column expression for reading, aliased when it needs conversion.
fn read_expr(codec: &Codec, fields: &[Column], name: &str) -> String {
    let quoted = codec.quote_identifier(name);
    match field(fields, name).and_then(|f| codec.dialect().convert_on_read(f, &quoted)) {
        Some(expr) => format!("{} AS {}", expr, quoted),
        None => quoted,
    }
}

fn aggregate_expr(codec: &Codec, func: &str, column: Option<&str>) -> Result<String> {
    let func = func.trim().to_ascii_uppercase();
    let func = func.split_whitespace().collect::<Vec<_>>().join(" ");
    if !AGGREGATES.contains(&func.as_str()) {
        return Err(Error::InvalidInput(format!("Unknown aggregate '{}'", func)));
    }
    let arg = match column {
        Some(name) => codec.quote_identifier(name),
        None if func == "COUNT" => "*".to_string(),
        None => return Err(Error::InvalidInput(format!("{} needs a column", func))),
    };
    Ok(match func.strip_suffix(" DISTINCT") {
        Some(base) => format!("{}(DISTINCT {})", base, arg),
        None => format!("{}({})", func, arg),
    })
}

fn projection(codec: &Codec, fields: &[Column], query: &SelectQuery) -> Result<String> {
    if query.projection.is_empty() {
        let dialect = codec.dialect();
        let needs_conversion = fields.iter().any(|f| {
            dialect
                .convert_on_read(f, &codec.quote_identifier(&f.name))
                .is_some()
        });
        if !needs_conversion {
            return Ok("*".to_string());
        }
        let exprs: Vec<String> = fields.iter().map(|f| read_expr(codec, fields, &f.name)).collect();
        return Ok(exprs.join(", "));
    }

    let mut exprs = Vec::with_capacity(query.projection.len());
    for item in &query.projection {
        exprs.push(match item {
            SelectItem::Column(name) => read_expr(codec, fields, name),
            SelectItem::Aggregate { func, column } => aggregate_expr(codec, func, column.as_deref())?,
        });
    }
    Ok(exprs.join(", "))
}

/// GROUP BY expressions: plain projected columns when aggregates are mixed
/// in, merged with explicit grouping.
pub fn group_by(codec: &Codec, query: &SelectQuery) -> Vec<String> {
    let grouped = query.projection.iter().any(SelectItem::is_aggregate)
        && query.projection.iter().any(|item| !item.is_aggregate());

    let mut exprs: Vec<String> = Vec::new();
    let implicit = query.projection.iter().filter_map(|item| match item {
        SelectItem::Column(name) if grouped => Some(name),
        _ => None,
    });
    for name in implicit.chain(query.group.iter()) {
        let quoted = codec.quote_identifier(name);
        if !exprs.contains(&quoted) {
            exprs.push(quoted);
        }
    }
    exprs
}

fn tail(codec: &Codec, fields: &[Column], query: &SelectQuery, table: &str) -> Result<String> {
    let mut sql = format!(" FROM {}", table);
    if let Some(conditions) = where_clause(codec, fields, &query.predicates)? {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }
    let group = group_by(codec, query);
    if !group.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&group.join(", "));
    }
    Ok(sql)
}

/// Build the SELECT for one page of the select form.
pub fn build_select(codec: &Codec, fields: &[Column], query: &SelectQuery) -> Result<BuiltSelect> {
    let table = codec.quote_identifier(&query.table);
    let mut body = format!(
        "{}{}",
        projection(codec, fields, query)?,
        tail(codec, fields, query, &table)?
    );
    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| {
                let quoted = codec.quote_identifier(&o.column);
                if o.descending { format!("{} DESC", quoted) } else { quoted }
            })
            .collect();
        body.push_str(" ORDER BY ");
        body.push_str(&order.join(", "));
    }

    let Some(limit) = query.page_size() else {
        return Ok(BuiltSelect {
            sql: format!("SELECT {}", body),
            skip: 0,
        });
    };
    let offset = query.offset();

    let built = match codec.dialect().pagination() {
        Pagination::LimitOffset => {
            let mut sql = format!("SELECT {} LIMIT {}", body, limit);
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
            BuiltSelect { sql, skip: 0 }
        }
        Pagination::TopWithSkip => BuiltSelect {
            sql: format!("SELECT TOP ({}) {}", limit.saturating_add(offset), body),
            skip: offset,
        },
        Pagination::RowNum if offset == 0 => BuiltSelect {
            sql: format!("SELECT * FROM (SELECT {}) WHERE rownum <= {}", body, limit),
            skip: 0,
        },
        Pagination::RowNum => BuiltSelect {
            sql: format!(
                "SELECT * FROM (SELECT t.*, rownum AS rnum FROM (SELECT {}) t WHERE rownum <= {}) WHERE rnum > {}",
                body,
                limit.saturating_add(offset),
                offset
            ),
            skip: 0,
        },
        Pagination::Native => BuiltSelect {
            sql: format!("SELECT {} LIMIT {}", body, limit.saturating_add(offset)),
            skip: offset,
        },
    };
    Ok(built)
}

/// Row count matching the select form's search.
pub fn build_count(codec: &Codec, fields: &[Column], query: &SelectQuery) -> Result<String> {
    let table = codec.quote_identifier(&query.table);
    let tail = tail(codec, fields, query, &table)?;
    if group_by(codec, query).is_empty() {
        Ok(format!("SELECT COUNT(*){}", tail))
    } else {
        Ok(format!("SELECT COUNT(*) FROM (SELECT 1 AS one{}) x", tail))
    }
}
