use once_cell::sync::Lazy;
use regex::Regex;

use super::Predicate;
use crate::codec::Codec;
use crate::dialect::Operator;
use crate::error::{Error, Result};
use crate::model::{Column, TypeCategory};
use crate::value::Value;

static NUMERIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").expect("numeric pattern"));

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+-\d+-\d+").expect("date pattern"));

/// Whether an any-column search for `term` should look at `column`.
///
/// Numeric-looking terms only go to numeric columns and date-shaped terms
/// only to date/time columns. The reverse holds too: numeric columns only
/// get numeric-looking terms, date columns only date-shaped ones. Non-ASCII
/// terms only go to text-capable columns.
pub fn accepts_term(column: &Column, term: &str) -> bool {
    let term = term.trim();
    let category = column.category;
    let numeric_term = NUMERIC_RE.is_match(term);
    let date_term = DATE_RE.is_match(term);

    if numeric_term && !category.is_numeric() {
        return false;
    }
    if date_term && !category.is_temporal() {
        return false;
    }
    if category.is_numeric() && !numeric_term {
        return false;
    }
    if matches!(category, TypeCategory::Date | TypeCategory::DateTime) && !date_term {
        return false;
    }
    term.is_ascii() || category.is_textual()
}

/// Conditions for `predicates` joined with AND; `None` when there are none.
pub fn where_clause(codec: &Codec, fields: &[Column], predicates: &[Predicate]) -> Result<Option<String>> {
    let mut parts = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        parts.push(predicate_sql(codec, fields, predicate)?);
    }
    Ok((!parts.is_empty()).then(|| parts.join(" AND ")))
}

fn predicate_sql(codec: &Codec, fields: &[Column], predicate: &Predicate) -> Result<String> {
    let dialect = codec.dialect();
    if !dialect.operators().contains(&predicate.op) {
        return Err(Error::unsupported(
            codec.backend().name(),
            format!("operator {}", predicate.op),
        ));
    }

    match &predicate.column {
        Some(name) => {
            let field = fields.iter().find(|f| &f.name == name);
            condition(codec, &codec.quote_identifier(name), field, predicate.op, &predicate.value)
        }
        None => {
            let mut alternatives = Vec::new();
            for field in fields.iter().filter(|f| accepts_term(f, &predicate.value)) {
                let expr = codec.quote_identifier(&field.name);
                alternatives.push(condition(codec, &expr, Some(field), predicate.op, &predicate.value)?);
            }
            Ok(match alternatives.len() {
                0 => "1 = 0".to_string(),
                1 => alternatives.remove(0),
                _ => format!("({})", alternatives.join(" OR ")),
            })
        }
    }
}

fn condition(codec: &Codec, expr: &str, field: Option<&Column>, op: Operator, term: &str) -> Result<String> {
    let dialect = codec.dialect();
    let expr = match field {
        Some(column) => dialect.convert_search(expr, column, op, term),
        None => expr.to_string(),
    };

    let sql = match op {
        Operator::IsNull | Operator::IsNotNull => format!("{} {}", expr, op),
        Operator::In | Operator::NotIn => {
            let items: Vec<String> = term
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| codec.quote_literal(item))
                .collect();
            if items.is_empty() {
                return Err(Error::InvalidInput(format!("{} needs at least one value", op)));
            }
            format!("{} {} ({})", expr, op, items.join(", "))
        }
        Operator::Like | Operator::NotLike | Operator::ILike => {
            format!("{} {} {}", expr, op, codec.quote_literal(term))
        }
        Operator::LikeContains => format!("{} LIKE {}", expr, codec.quote_literal(&format!("%{}%", term))),
        Operator::ILikeContains => {
            format!("{} ILIKE {}", expr, codec.quote_literal(&format!("%{}%", term)))
        }
        Operator::Regexp | Operator::NotRegexp => dialect
            .regexp(&expr, &codec.quote_literal(term), op == Operator::NotRegexp)
            .ok_or_else(|| Error::unsupported(codec.backend().name(), format!("operator {}", op)))?,
        Operator::FindInSet => format!("FIND_IN_SET({}, {})", codec.quote_literal(term), expr),
        Operator::Sql => format!("{} {}", expr, term),
        Operator::Eq | Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge | Operator::Ne => {
            let literal = codec.write_value(field, &Value::Text(term.to_string()));
            format!("{} {} {}", expr, op, literal)
        }
    };
    Ok(sql)
}
