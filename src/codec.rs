//! Identifier and value encoding bound to a live session.
//!
//! Quoting rules come from the dialect; literal escaping additionally depends
//! on session state (`NO_BACKSLASH_ESCAPES`, `standard_conforming_strings`),
//! so drivers hand out a [`Codec`] after they have read those flags.

use crate::dialect::{Backend, ScanRules, ServerInfo, SqlDialect};
use crate::model::Column;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Codec {
    backend: Backend,
    server: ServerInfo,
    backslash_escapes: bool,
}

impl Codec {
    /// Codec with the backend's default session flags.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            server: ServerInfo::default(),
            backslash_escapes: backend == Backend::MySql,
        }
    }

    pub fn with_server(mut self, server: ServerInfo) -> Self {
        self.server = server;
        self
    }

    /// Whether plain string literals treat `\` as an escape character.
    pub fn with_backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    pub fn backslash_escapes(&self) -> bool {
        self.backslash_escapes
    }

    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.backend.dialect()
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        self.dialect().quote_identifier(name)
    }

    pub fn unquote_identifier(&self, quoted: &str) -> String {
        self.dialect().unquote_identifier(quoted)
    }

    pub fn quote_literal(&self, value: &str) -> String {
        self.dialect().quote_literal(value, self.backslash_escapes)
    }

    pub fn quote_binary(&self, bytes: &[u8]) -> String {
        self.dialect().quote_binary(bytes)
    }

    /// SQL text for a value.
    pub fn quote_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.dialect().bool_literal(*b).to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Float(f) => self.quote_literal(&f.to_string()),
            Value::Text(s) => self.quote_literal(s),
            Value::Bytes(b) => self.quote_binary(b),
            Value::Json(j) => self.quote_literal(&j.to_string()),
        }
    }

    /// SQL text for a value written into `column`, wrapped in the dialect's
    /// write conversion where the column needs one.
    pub fn write_value(&self, column: Option<&Column>, value: &Value) -> String {
        let literal = self.quote_value(value);
        if matches!(value, Value::Null | Value::Bytes(_)) {
            return literal;
        }
        column
            .and_then(|c| self.dialect().convert_on_write(c, &literal))
            .unwrap_or(literal)
    }

    pub fn scan_rules(&self) -> ScanRules {
        self.dialect().scan_rules(self.backslash_escapes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_session_flags_change_literals() {
        let strict = Codec::new(Backend::MySql).with_backslash_escapes(false);
        let loose = Codec::new(Backend::MySql);
        assert_eq!(strict.quote_literal("a\\b"), "'a\\b'");
        assert_eq!(loose.quote_literal("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_quote_value() {
        let codec = Codec::new(Backend::Postgres);
        assert_eq!(codec.quote_value(&Value::Null), "NULL");
        assert_eq!(codec.quote_value(&Value::Bool(true)), "TRUE");
        assert_eq!(codec.quote_value(&Value::Int(-3)), "-3");
        assert_eq!(codec.quote_value(&Value::Text("o'k".into())), "'o''k'");
        assert_eq!(codec.quote_value(&Value::Bytes(vec![1])), "'\\x01'::bytea");
    }

    #[test]
    fn test_write_value_converts_spatial() {
        let codec = Codec::new(Backend::MySql);
        let column = Column::new("location", "point");
        assert_eq!(
            codec.write_value(Some(&column), &Value::from("POINT(1 2)")),
            "ST_GeomFromText('POINT(1 2)')"
        );
        assert_eq!(codec.write_value(Some(&column), &Value::Null), "NULL");
        assert_eq!(codec.write_value(None, &Value::from("x")), "'x'");
    }
}
