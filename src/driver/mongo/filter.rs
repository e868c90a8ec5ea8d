//! Search predicates as MongoDB query documents.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Binary, Bson, Document, Regex, doc, spec::BinarySubtype};

use super::ID;
use crate::dialect::{Backend, Operator};
use crate::error::{Error, Result};
use crate::model::{Column, TypeCategory};
use crate::query::{Predicate, accepts_term};
use crate::value::Value;

/// Typed BSON for a form value written into `name`.
pub(super) fn encode(fields: &[Column], name: &str, value: &Value) -> Bson {
    match value {
        Value::Text(text) => typed(fields, name, text),
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int(n) => Bson::Int64(*n),
        Value::Float(f) => Bson::Double(*f),
        Value::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.clone(),
        }),
        Value::Json(json) => Bson::try_from(json.clone()).unwrap_or_else(|_| Bson::String(json.to_string())),
    }
}

/// Text from the select form, typed by the field it targets.
fn typed(fields: &[Column], name: &str, text: &str) -> Bson {
    if name == ID {
        if let Ok(id) = ObjectId::parse_str(text) {
            return Bson::ObjectId(id);
        }
    }
    let category = fields.iter().find(|f| f.name == name).map(|f| f.category);
    match category {
        Some(TypeCategory::Integer) => text.trim().parse().map(Bson::Int64).unwrap_or_else(|_| Bson::String(text.to_string())),
        Some(TypeCategory::Float | TypeCategory::Decimal) => text
            .trim()
            .parse()
            .map(Bson::Double)
            .unwrap_or_else(|_| Bson::String(text.to_string())),
        Some(TypeCategory::Boolean) => match text {
            "true" | "1" => Bson::Boolean(true),
            "false" | "0" => Bson::Boolean(false),
            _ => Bson::String(text.to_string()),
        },
        _ => Bson::String(text.to_string()),
    }
}

/// SQL LIKE pattern as an anchored regular expression.
fn like_pattern(pattern: &str) -> String {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c if "\\.+*?()|[]{}^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

fn regex(pattern: String, case_insensitive: bool) -> Bson {
    Bson::RegularExpression(Regex {
        pattern,
        options: if case_insensitive { "i".to_string() } else { String::new() },
    })
}

fn condition(fields: &[Column], column: &str, op: Operator, value: &str) -> Result<Document> {
    let value_of = |text: &str| typed(fields, column, text);
    let list = || -> Vec<Bson> { value.split(',').map(|v| value_of(v.trim())).collect() };
    let test = match op {
        Operator::Eq => value_of(value),
        Operator::Lt => Bson::Document(doc! { "$lt": value_of(value) }),
        Operator::Gt => Bson::Document(doc! { "$gt": value_of(value) }),
        Operator::Le => Bson::Document(doc! { "$lte": value_of(value) }),
        Operator::Ge => Bson::Document(doc! { "$gte": value_of(value) }),
        Operator::Ne => Bson::Document(doc! { "$ne": value_of(value) }),
        Operator::Like => regex(like_pattern(value), false),
        Operator::LikeContains => regex(like_pattern(&format!("%{}%", value)), false),
        Operator::Regexp => regex(value.to_string(), false),
        Operator::In => Bson::Document(doc! { "$in": list() }),
        Operator::NotIn => Bson::Document(doc! { "$nin": list() }),
        Operator::IsNull => Bson::Null,
        Operator::IsNotNull => Bson::Document(doc! { "$ne": Bson::Null }),
        other => return Err(Error::unsupported(Backend::MongoDb.name(), format!("operator {}", other))),
    };
    Ok(doc! { column: test })
}

/// Query document for the select form's predicates; all must hold.
///
/// An any-column search becomes `$or` over the fields that can hold the
/// term, or a filter matching nothing when none can.
pub(super) fn build(fields: &[Column], predicates: &[Predicate]) -> Result<Document> {
    let mut clauses = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let clause = match &predicate.column {
            Some(column) => condition(fields, column, predicate.op, &predicate.value)?,
            None => {
                let mut alternatives = Vec::new();
                for field in fields.iter().filter(|f| accepts_term(f, &predicate.value)) {
                    alternatives.push(Bson::Document(condition(
                        fields,
                        &field.name,
                        predicate.op,
                        &predicate.value,
                    )?));
                }
                if alternatives.is_empty() {
                    doc! { ID: { "$exists": false } }
                } else {
                    doc! { "$or": alternatives }
                }
            }
        };
        clauses.push(clause);
    }
    Ok(match clauses.len() {
        0 => Document::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields() -> Vec<Column> {
        vec![Column::new("_id", "objectId"), Column::new("age", "int"), Column::new("name", "string")]
    }

    #[test]
    fn test_empty_filter() {
        assert_eq!(build(&fields(), &[]).unwrap(), Document::new());
    }

    #[test]
    fn test_operators() {
        let filter = build(
            &fields(),
            &[
                Predicate::new("age", Operator::Ge, "30"),
                Predicate::new("name", Operator::In, "a, b"),
            ],
        )
        .unwrap();
        assert_eq!(
            filter,
            doc! { "$and": [ { "age": { "$gte": 30_i64 } }, { "name": { "$in": ["a", "b"] } } ] }
        );
    }

    #[test]
    fn test_object_id_equality() {
        let filter = build(&fields(), &[Predicate::eq("_id", "65a1b2c3d4e5f60718293a4b")]).unwrap();
        let id = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        assert_eq!(filter, doc! { "_id": id });
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern("a%b_c."), "^a.*b.c\\.$");
    }

    #[test]
    fn test_unsupported_operator() {
        assert!(build(&fields(), &[Predicate::new("name", Operator::FindInSet, "x")]).is_err());
    }
}
