//! Column type string parsing.
//!
//! Catalogs report types as one combined string (`int(10) unsigned zerofill`,
//! `character varying(50)`, `enum('a','b)')`, `timestamp(6) without time zone`).
//! The parser splits it into base type, parenthesized length and modifiers.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take_till},
    character::complete::{anychar, char},
    combinator::{opt, recognize, rest},
    multi::many0,
    sequence::{delimited, pair, tuple},
};

use crate::model::TypeCategory;

/// Decomposed type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub base: String,
    pub length: Option<String>,
    pub unsigned: bool,
    pub zerofill: bool,
}

/// Parse a combined type string. Never fails; unknown shapes end up in `base`.
pub fn parse_type(raw: &str) -> TypeSpec {
    let raw = raw.trim();
    let (head, length, tail) = match split_type(raw) {
        Ok((_, parts)) => parts,
        Err(_) => (raw, None, ""),
    };

    let mut unsigned = false;
    let mut zerofill = false;
    let mut words = Vec::new();
    for word in head.split_whitespace().chain(tail.split_whitespace()) {
        match word.to_ascii_lowercase().as_str() {
            "unsigned" => unsigned = true,
            "zerofill" => zerofill = true,
            "signed" => {}
            other => words.push(other.to_string()),
        }
    }

    TypeSpec {
        base: words.join(" "),
        length: length.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        unsigned,
        zerofill,
    }
}

fn split_type(input: &str) -> IResult<&str, (&str, Option<&str>, &str)> {
    let (input, head) = take_till(|c| c == '(')(input)?;
    let (input, length) = opt(delimited(char('('), paren_body, char(')')))(input)?;
    let (input, tail) = rest(input)?;
    Ok((input, (head, length, tail)))
}

/// Content of the parentheses, skipping `)` inside quoted enum members.
fn paren_body(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((quoted, is_not("')")))))(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('\''),
        many0(alt((
            tag("''"),
            recognize(pair(char('\\'), anychar)),
            is_not("'\\"),
        ))),
        char('\''),
    )))(input)
}

/// Map a base type name (lowercase, without length) onto a category.
pub fn categorize(base: &str) -> TypeCategory {
    let base = base.trim().to_ascii_lowercase();
    let base = base.as_str();

    const BINARY: &[&str] = &[
        "binary", "varbinary", "blob", "tinyblob", "mediumblob", "longblob", "bytea", "raw",
        "long raw", "image",
    ];
    const SPATIAL: &[&str] = &[
        "geometry", "point", "linestring", "polygon", "multipoint", "multilinestring",
        "multipolygon", "geometrycollection", "geography", "sdo_geometry", "geo_point",
        "geo_shape",
    ];
    const FLOAT: &[&str] = &[
        "float", "double", "real", "double precision", "binary_float", "binary_double",
        "float4", "float8", "half_float", "scaled_float",
    ];
    const DECIMAL: &[&str] = &["decimal", "numeric", "number", "money", "smallmoney", "dec"];
    const INTEGER: &[&str] = &[
        "int", "integer", "tinyint", "smallint", "mediumint", "bigint", "int2", "int4", "int8",
        "serial", "bigserial", "smallserial", "long", "short", "byte", "year",
    ];
    const JSON: &[&str] = &["json", "jsonb", "object", "nested", "array"];

    if BINARY.contains(&base) {
        return TypeCategory::Binary;
    }
    if SPATIAL.contains(&base) {
        return TypeCategory::Spatial;
    }
    if base == "bit" || base.starts_with("bit ") || base == "varbit" {
        return TypeCategory::Bit;
    }
    if base == "bool" || base == "boolean" {
        return TypeCategory::Boolean;
    }
    if FLOAT.contains(&base) {
        return TypeCategory::Float;
    }
    if DECIMAL.contains(&base) {
        return TypeCategory::Decimal;
    }
    if INTEGER.contains(&base) {
        return TypeCategory::Integer;
    }
    if base == "enum" {
        return TypeCategory::Enum;
    }
    if base == "set" {
        return TypeCategory::Set;
    }
    if JSON.contains(&base) {
        return TypeCategory::Json;
    }
    if base == "uuid" || base == "uniqueidentifier" || base == "objectid" {
        return TypeCategory::Uuid;
    }
    if base.starts_with("interval") {
        return TypeCategory::Other;
    }
    if base.starts_with("datetime")
        || base.starts_with("timestamp")
        || base == "smalldatetime"
        || base == "date_nanos"
    {
        return TypeCategory::DateTime;
    }
    if base == "date" {
        return TypeCategory::Date;
    }
    if base.starts_with("time") {
        return TypeCategory::Time;
    }

    // SQLite-style affinity rules for anything not named above.
    if base.contains("int") {
        TypeCategory::Integer
    } else if base.contains("char")
        || base.contains("text")
        || base.contains("clob")
        || base == "string"
        || base == "keyword"
        || base == "xml"
        || base == "citext"
    {
        TypeCategory::Text
    } else if base.contains("blob") {
        TypeCategory::Binary
    } else if base.contains("real") || base.contains("floa") || base.contains("doub") {
        TypeCategory::Float
    } else {
        TypeCategory::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mysql_int_with_modifiers() {
        let spec = parse_type("int(10) unsigned zerofill");
        assert_eq!(
            spec,
            TypeSpec {
                base: "int".into(),
                length: Some("10".into()),
                unsigned: true,
                zerofill: true,
            }
        );
    }

    #[test]
    fn test_enum_with_paren_inside_quotes() {
        let spec = parse_type("enum('a)','b''c')");
        assert_eq!(spec.base, "enum");
        assert_eq!(spec.length.as_deref(), Some("'a)','b''c'"));
        assert_eq!(categorize(&spec.base), TypeCategory::Enum);
    }

    #[test]
    fn test_postgres_multiword_types() {
        let spec = parse_type("character varying(50)");
        assert_eq!(spec.base, "character varying");
        assert_eq!(spec.length.as_deref(), Some("50"));
        assert_eq!(categorize(&spec.base), TypeCategory::Text);

        let spec = parse_type("timestamp(6) without time zone");
        assert_eq!(spec.base, "timestamp without time zone");
        assert_eq!(categorize(&spec.base), TypeCategory::DateTime);
    }

    #[test]
    fn test_categories() {
        assert_eq!(categorize("point"), TypeCategory::Spatial);
        assert_eq!(categorize("long raw"), TypeCategory::Binary);
        assert_eq!(categorize("datetime2"), TypeCategory::DateTime);
        assert_eq!(categorize("time"), TypeCategory::Time);
        assert_eq!(categorize("unsigned big int"), TypeCategory::Integer);
        assert_eq!(categorize("nvarchar2"), TypeCategory::Text);
        assert_eq!(categorize("bit"), TypeCategory::Bit);
        assert_eq!(categorize(""), TypeCategory::Other);
    }
}
