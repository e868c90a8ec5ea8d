use super::{
    Backend, ExplainPlan, MutationLimit, Operator, Pagination, ScanRules, ServerInfo, SqlDialect,
    SubLimit, UpsertStyle,
};

pub struct OracleDialect;

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
    Operator::In,
    Operator::IsNull,
    Operator::NotLike,
    Operator::NotIn,
    Operator::IsNotNull,
    Operator::Sql,
];

impl SqlDialect for OracleDialect {
    fn backend(&self) -> Backend {
        Backend::Oracle
    }

    fn quote_binary(&self, bytes: &[u8]) -> String {
        format!("HEXTORAW('{}')", crate::value::hex(bytes))
    }

    fn pagination(&self) -> Pagination {
        Pagination::RowNum
    }

    fn mutation_limit(&self) -> MutationLimit {
        MutationLimit::RowIdentity {
            column: "ROWID",
            sub_limit: SubLimit::RowNum,
        }
    }

    fn upsert_style(&self, _server: &ServerInfo) -> UpsertStyle {
        UpsertStyle::Merge
    }

    fn operators(&self) -> &'static [Operator] {
        OPERATORS
    }

    fn regexp(&self, expr: &str, pattern: &str, negated: bool) -> Option<String> {
        let not = if negated { "NOT " } else { "" };
        Some(format!("{}REGEXP_LIKE({}, {})", not, expr, pattern))
    }

    fn explain(&self, sql: &str) -> Option<ExplainPlan> {
        Some(ExplainPlan {
            setup: vec![format!("EXPLAIN PLAN FOR {}", sql)],
            query: "SELECT * FROM TABLE(DBMS_XPLAN.DISPLAY())".to_string(),
            teardown: Vec::new(),
        })
    }

    fn session_id_sql(&self) -> Option<&'static str> {
        Some(
            "SELECT sid || ',' || serial# FROM v$session WHERE sid = SYS_CONTEXT('USERENV', 'SID')",
        )
    }

    /// Session ids come as `sid,serial#`.
    fn kill_sql(&self, session_id: &str) -> Option<String> {
        let (sid, serial) = session_id.trim().split_once(',')?;
        let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        (numeric(sid) && numeric(serial))
            .then(|| format!("ALTER SYSTEM KILL SESSION '{},{}' IMMEDIATE", sid, serial))
    }

    fn default_values_insert(&self, _table: &str) -> Option<String> {
        None
    }

    fn scan_rules(&self, _backslash_escapes: bool) -> ScanRules {
        ScanRules::default()
    }

    fn supports_schemas(&self) -> bool {
        true
    }
}
