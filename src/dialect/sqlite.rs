use super::{
    Backend, ExplainPlan, MutationLimit, Operator, ScanRules, ServerInfo, SqlDialect, SubLimit,
    UpsertStyle, leading_keyword,
};

pub struct SqliteDialect;

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

impl SqlDialect for SqliteDialect {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn mutation_limit(&self) -> MutationLimit {
        MutationLimit::RowIdentity {
            column: "rowid",
            sub_limit: SubLimit::Limit,
        }
    }

    fn upsert_style(&self, _server: &ServerInfo) -> UpsertStyle {
        UpsertStyle::Replace
    }

    fn operators(&self) -> &'static [Operator] {
        OPERATORS
    }

    fn explain(&self, sql: &str) -> Option<ExplainPlan> {
        Some(ExplainPlan::single(format!("EXPLAIN QUERY PLAN {}", sql)))
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        Some("SELECT last_insert_rowid()")
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("DELETE FROM {}", table)
    }

    fn scan_rules(&self, _backslash_escapes: bool) -> ScanRules {
        ScanRules {
            backticks: true,
            brackets: true,
            ..ScanRules::default()
        }
    }

    /// ATTACH would open arbitrary files with the server's privileges.
    fn rejects_in_script(&self, sql: &str) -> Option<&'static str> {
        (leading_keyword(sql) == "ATTACH").then_some("ATTACH queries are not supported.")
    }
}
