//! Search predicates as Elasticsearch query DSL.

use serde_json::{Value as Json, json};

use crate::dialect::{Backend, Operator};
use crate::error::{Error, Result};
use crate::model::Column;
use crate::query::{Predicate, accepts_term};

/// SQL LIKE pattern as a `wildcard` pattern.
fn wildcard(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '*' | '?' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// One condition; the flag says whether it belongs in `must_not`.
fn clause(column: &str, op: Operator, value: &str) -> Result<(Json, bool)> {
    let list: Vec<&str> = value.split(',').map(str::trim).collect();
    let clause = match op {
        Operator::Eq => (json!({ "term": { column: value } }), false),
        Operator::Ne => (json!({ "term": { column: value } }), true),
        Operator::Lt => (json!({ "range": { column: { "lt": value } } }), false),
        Operator::Gt => (json!({ "range": { column: { "gt": value } } }), false),
        Operator::Le => (json!({ "range": { column: { "lte": value } } }), false),
        Operator::Ge => (json!({ "range": { column: { "gte": value } } }), false),
        Operator::Like => (json!({ "wildcard": { column: { "value": wildcard(value) } } }), false),
        Operator::LikeContains => (
            json!({ "wildcard": { column: { "value": format!("*{}*", wildcard(value)) } } }),
            false,
        ),
        Operator::Regexp => (json!({ "regexp": { column: value } }), false),
        Operator::In => (json!({ "terms": { column: list } }), false),
        Operator::IsNull => (json!({ "exists": { "field": column } }), true),
        Operator::IsNotNull => (json!({ "exists": { "field": column } }), false),
        other => {
            return Err(Error::unsupported(
                Backend::Elasticsearch.name(),
                format!("operator {}", other),
            ));
        }
    };
    Ok(clause)
}

/// `bool` query for the select form's predicates.
///
/// An any-column search becomes a `should` over the fields that can hold
/// the term; with none it matches nothing.
pub(super) fn build(fields: &[Column], predicates: &[Predicate]) -> Result<Json> {
    if predicates.is_empty() {
        return Ok(json!({ "match_all": {} }));
    }
    let mut must = Vec::new();
    let mut must_not = Vec::new();
    for predicate in predicates {
        match &predicate.column {
            Some(column) => {
                let (condition, negated) = clause(column, predicate.op, &predicate.value)?;
                if negated {
                    must_not.push(condition);
                } else {
                    must.push(condition);
                }
            }
            None => {
                let mut should = Vec::new();
                for field in fields.iter().filter(|f| accepts_term(f, &predicate.value)) {
                    let (condition, negated) = clause(&field.name, predicate.op, &predicate.value)?;
                    should.push(if negated {
                        json!({ "bool": { "must_not": [condition] } })
                    } else {
                        condition
                    });
                }
                if should.is_empty() {
                    must.push(json!({ "match_none": {} }));
                } else {
                    must.push(json!({ "bool": { "should": should, "minimum_should_match": 1 } }));
                }
            }
        }
    }
    Ok(json!({ "bool": { "filter": must, "must_not": must_not } }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_match_all_without_predicates() {
        assert_eq!(build(&[], &[]).unwrap(), json!({ "match_all": {} }));
    }

    #[test]
    fn test_bool_query() {
        let query = build(
            &[],
            &[
                Predicate::new("status", Operator::Ne, "done"),
                Predicate::new("age", Operator::Ge, "18"),
                Predicate::new("name", Operator::Like, "an%"),
            ],
        )
        .unwrap();
        assert_eq!(
            query,
            json!({ "bool": {
                "filter": [
                    { "range": { "age": { "gte": "18" } } },
                    { "wildcard": { "name": { "value": "an*" } } }
                ],
                "must_not": [ { "term": { "status": "done" } } ]
            } })
        );
    }

    #[test]
    fn test_any_column_without_candidates() {
        let fields = vec![Column::new("n", "integer")];
        let query = build(&fields, &[Predicate::any(Operator::Eq, "abc")]).unwrap();
        assert_eq!(query, json!({ "bool": { "filter": [ { "match_none": {} } ], "must_not": [] } }));
    }
}
