use super::{
    Backend, ExplainPlan, MutationLimit, Operator, Pagination, ScanRules, ServerInfo, SqlDialect,
    UpsertStyle, numeric_id,
};
use crate::model::{Column, TypeCategory};

/// Microsoft SQL Server.
pub struct MsSqlDialect;

const OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Lt,
    Operator::Gt,
    Operator::Le,
    Operator::Ge,
    Operator::Ne,
    Operator::Like,
    Operator::LikeContains,
    Operator::In,
    Operator::IsNull,
    Operator::NotLike,
    Operator::NotIn,
    Operator::IsNotNull,
    Operator::Sql,
];

impl SqlDialect for MsSqlDialect {
    fn backend(&self) -> Backend {
        Backend::MsSql
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('[', ']')
    }

    /// Unicode literal; T-SQL has no backslash escapes.
    fn quote_literal(&self, value: &str, _backslash_escapes: bool) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }

    fn quote_binary(&self, bytes: &[u8]) -> String {
        format!("0x{}", crate::value::hex(bytes))
    }

    fn pagination(&self) -> Pagination {
        Pagination::TopWithSkip
    }

    fn mutation_limit(&self) -> MutationLimit {
        MutationLimit::Top
    }

    fn upsert_style(&self, _server: &ServerInfo) -> UpsertStyle {
        UpsertStyle::Merge
    }

    fn operators(&self) -> &'static [Operator] {
        OPERATORS
    }

    fn convert_on_read(&self, column: &Column, expr: &str) -> Option<String> {
        match column.category {
            TypeCategory::Spatial => Some(format!("{}.STAsText()", expr)),
            _ => None,
        }
    }

    fn convert_on_write(&self, column: &Column, literal: &str) -> Option<String> {
        match column.category {
            TypeCategory::Spatial => Some(format!("{}::STGeomFromText({}, 0)", column.base_type, literal)),
            _ => None,
        }
    }

    fn convert_search(&self, expr: &str, column: &Column, op: Operator, _term: &str) -> String {
        if op.is_pattern() && !column.category.is_textual() {
            format!("CAST({} AS nvarchar(max))", expr)
        } else {
            expr.to_string()
        }
    }

    fn explain(&self, sql: &str) -> Option<ExplainPlan> {
        Some(ExplainPlan {
            setup: vec!["SET SHOWPLAN_ALL ON".to_string()],
            query: sql.to_string(),
            teardown: vec!["SET SHOWPLAN_ALL OFF".to_string()],
        })
    }

    fn session_id_sql(&self) -> Option<&'static str> {
        Some("SELECT @@SPID")
    }

    fn kill_sql(&self, session_id: &str) -> Option<String> {
        numeric_id(session_id).map(|id| format!("KILL {}", id))
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        Some("SELECT @@IDENTITY")
    }

    fn scan_rules(&self, _backslash_escapes: bool) -> ScanRules {
        ScanRules {
            brackets: true,
            ..ScanRules::default()
        }
    }

    fn supports_schemas(&self) -> bool {
        true
    }
}
