use std::time::Duration;

use super::{
    Backend, MutationLimit, Operator, ScanRules, ServerInfo, SqlDialect, UpsertStyle, numeric_id,
};
use crate::model::{Column, TypeCategory};

/// MySQL and MariaDB.
pub struct MySqlDialect;

const OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Lt,
    Operator::Gt,
    Operator::Le,
    Operator::Ge,
    Operator::Ne,
    Operator::Like,
    Operator::LikeContains,
    Operator::Regexp,
    Operator::In,
    Operator::FindInSet,
    Operator::IsNull,
    Operator::NotLike,
    Operator::NotRegexp,
    Operator::NotIn,
    Operator::IsNotNull,
    Operator::Sql,
];

impl SqlDialect for MySqlDialect {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('`', '`')
    }

    fn mutation_limit(&self) -> MutationLimit {
        MutationLimit::Limit
    }

    fn upsert_style(&self, _server: &ServerInfo) -> UpsertStyle {
        UpsertStyle::OnDuplicateKey
    }

    fn operators(&self) -> &'static [Operator] {
        OPERATORS
    }

    fn regexp(&self, expr: &str, pattern: &str, negated: bool) -> Option<String> {
        let op = if negated { "NOT REGEXP" } else { "REGEXP" };
        Some(format!("{} {} {}", expr, op, pattern))
    }

    fn convert_on_read(&self, column: &Column, expr: &str) -> Option<String> {
        match column.category {
            TypeCategory::Spatial => Some(format!("ST_AsText({})", expr)),
            TypeCategory::Bit => Some(format!("BIN({} + 0)", expr)),
            TypeCategory::Binary => Some(format!("HEX({})", expr)),
            _ => None,
        }
    }

    fn convert_on_write(&self, column: &Column, literal: &str) -> Option<String> {
        match column.category {
            TypeCategory::Spatial => Some(format!("ST_GeomFromText({})", literal)),
            TypeCategory::Bit => Some(format!("CONV({}, 2, 10) + 0", literal)),
            TypeCategory::Binary => Some(format!("UNHEX({})", literal)),
            _ => None,
        }
    }

    fn convert_search(&self, expr: &str, column: &Column, _op: Operator, term: &str) -> String {
        let utf8_collation = column
            .collation
            .as_deref()
            .map(|c| c.starts_with("utf8"))
            .unwrap_or(false);
        if column.category.is_textual() && !utf8_collation && !term.is_ascii() {
            format!("CONVERT({} USING utf8mb4)", expr)
        } else {
            expr.to_string()
        }
    }

    fn timeout_form(&self, server: &ServerInfo, sql: &str, timeout: Duration) -> Option<String> {
        if server.mariadb {
            if server.version.at_least(10, 1, 2) {
                let secs = timeout.as_secs_f64();
                return Some(format!("SET STATEMENT max_statement_time={} FOR {}", secs, sql));
            }
            return None;
        }
        let body = sql.trim_start();
        let starts_with_select = body
            .get(..6)
            .map(|head| head.eq_ignore_ascii_case("SELECT"))
            .unwrap_or(false);
        if !server.version.at_least(5, 7, 8) || !starts_with_select {
            return None;
        }
        let (head, tail) = body.split_at(6);
        Some(format!(
            "{} /*+ MAX_EXECUTION_TIME({}) */{}",
            head,
            timeout.as_millis(),
            tail
        ))
    }

    fn session_id_sql(&self) -> Option<&'static str> {
        Some("SELECT CONNECTION_ID()")
    }

    fn kill_sql(&self, session_id: &str) -> Option<String> {
        numeric_id(session_id).map(|id| format!("KILL QUERY {}", id))
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        Some("SELECT LAST_INSERT_ID()")
    }

    fn default_values_insert(&self, table: &str) -> Option<String> {
        Some(format!("INSERT INTO {} () VALUES ()", table))
    }

    fn scan_rules(&self, backslash_escapes: bool) -> ScanRules {
        ScanRules {
            backticks: true,
            hash_comments: true,
            dash_comment_needs_space: true,
            backslash_escapes,
            ..ScanRules::default()
        }
    }
}
