use super::{
    Backend, MutationLimit, Operator, ScanRules, ServerInfo, SqlDialect, SubLimit, UpsertStyle,
    numeric_id,
};
use crate::model::{Column, TypeCategory};

pub struct PostgresDialect;

const OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Lt,
    Operator::Gt,
    Operator::Le,
    Operator::Ge,
    Operator::Ne,
    Operator::Regexp,
    Operator::NotRegexp,
    Operator::Like,
    Operator::LikeContains,
    Operator::ILike,
    Operator::ILikeContains,
    Operator::In,
    Operator::IsNull,
    Operator::NotLike,
    Operator::NotIn,
    Operator::IsNotNull,
    Operator::Sql,
];

impl SqlDialect for PostgresDialect {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn quote_binary(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'::bytea", crate::value::hex(bytes))
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn mutation_limit(&self) -> MutationLimit {
        MutationLimit::RowIdentity {
            column: "ctid",
            sub_limit: SubLimit::Limit,
        }
    }

    fn upsert_style(&self, server: &ServerInfo) -> UpsertStyle {
        if server.version.at_least(9, 5, 0) {
            UpsertStyle::OnConflict
        } else {
            UpsertStyle::UpdateThenInsert
        }
    }

    fn operators(&self) -> &'static [Operator] {
        OPERATORS
    }

    fn regexp(&self, expr: &str, pattern: &str, negated: bool) -> Option<String> {
        let op = if negated { "!~" } else { "~" };
        Some(format!("{} {} {}", expr, op, pattern))
    }

    fn convert_on_read(&self, column: &Column, expr: &str) -> Option<String> {
        match column.category {
            TypeCategory::Spatial if column.base_type != "point" => {
                Some(format!("ST_AsText({})", expr))
            }
            _ => None,
        }
    }

    fn convert_on_write(&self, column: &Column, literal: &str) -> Option<String> {
        match column.category {
            TypeCategory::Spatial if column.base_type != "point" => {
                Some(format!("ST_GeomFromText({})", literal))
            }
            _ => None,
        }
    }

    /// Non-text columns are cast so pattern operators apply to their text form.
    fn convert_search(&self, expr: &str, column: &Column, op: Operator, _term: &str) -> String {
        if op.is_pattern() && !column.category.is_textual() {
            format!("{}::text", expr)
        } else {
            expr.to_string()
        }
    }

    fn session_id_sql(&self) -> Option<&'static str> {
        Some("SELECT pg_backend_pid()")
    }

    fn kill_sql(&self, session_id: &str) -> Option<String> {
        numeric_id(session_id).map(|id| format!("SELECT pg_cancel_backend({})", id))
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        Some("SELECT lastval()")
    }

    fn scan_rules(&self, backslash_escapes: bool) -> ScanRules {
        ScanRules {
            dollar_quotes: true,
            e_strings: true,
            backslash_escapes,
            ..ScanRules::default()
        }
    }

    fn supports_schemas(&self) -> bool {
        true
    }
}
