//! Per-backend SQL dialects.
//!
//! A [`Backend`] is picked once at connect time and hands out its
//! [`SqlDialect`], which owns every syntax difference the query builder and
//! the script splitter care about.

use nom::{
    IResult,
    bytes::complete::take_while,
    character::complete::{char, digit1},
    combinator::{map_res, opt},
    sequence::preceded,
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::model::Column;

pub mod mssql;
pub mod mysql;
pub mod nosql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use mssql::MsSqlDialect;
pub use mysql::MySqlDialect;
pub use nosql::{ElasticDialect, MongoDialect};
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Backend {
    MySql,
    Postgres,
    Sqlite,
    MsSql,
    Oracle,
    MongoDb,
    Elasticsearch,
}

impl Backend {
    pub fn dialect(self) -> &'static dyn SqlDialect {
        match self {
            Backend::MySql => &MySqlDialect,
            Backend::Postgres => &PostgresDialect,
            Backend::Sqlite => &SqliteDialect,
            Backend::MsSql => &MsSqlDialect,
            Backend::Oracle => &OracleDialect,
            Backend::MongoDb => &MongoDialect,
            Backend::Elasticsearch => &ElasticDialect,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Backend::MySql => "MySQL",
            Backend::Postgres => "PostgreSQL",
            Backend::Sqlite => "SQLite",
            Backend::MsSql => "MS SQL",
            Backend::Oracle => "Oracle",
            Backend::MongoDb => "MongoDB",
            Backend::Elasticsearch => "Elasticsearch",
        }
    }

    /// Backend for a connection URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Backend::MySql),
            "postgres" | "postgresql" | "pgsql" => Some(Backend::Postgres),
            "sqlite" | "sqlite3" => Some(Backend::Sqlite),
            "mssql" | "sqlserver" => Some(Backend::MsSql),
            "oracle" | "oci" => Some(Backend::Oracle),
            "mongodb" | "mongo" => Some(Backend::MongoDb),
            "elasticsearch" | "elastic" | "es" => Some(Backend::Elasticsearch),
            _ => None,
        }
    }

    pub fn default_port(self) -> Option<u16> {
        match self {
            Backend::MySql => Some(3306),
            Backend::Postgres => Some(5432),
            Backend::Sqlite => None,
            Backend::MsSql => Some(1433),
            Backend::Oracle => Some(1521),
            Backend::MongoDb => Some(27017),
            Backend::Elasticsearch => Some(9200),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Server version triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Find the first dotted version number in a banner such as
    /// `10.5.8-MariaDB-log` or `PostgreSQL 15.2 on x86_64`.
    pub fn parse(banner: &str) -> Self {
        for (start, _) in banner.match_indices(|c: char| c.is_ascii_digit()) {
            if start > 0 && banner.as_bytes()[start - 1].is_ascii_digit() {
                continue;
            }
            if let Ok((_, version)) = version_triple(&banner[start..]) {
                return version;
            }
        }
        Self::default()
    }

    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        *self >= Self::new(major, minor, patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(input)
}

fn version_triple(input: &str) -> IResult<&str, Version> {
    let (input, major) = number(input)?;
    let (input, minor) = opt(preceded(char('.'), number))(input)?;
    let (input, patch) = opt(preceded(char('.'), number))(input)?;
    let (input, _) = take_while(|c: char| c.is_ascii_alphanumeric())(input)?;
    Ok((
        input,
        Version::new(major, minor.unwrap_or(0), patch.unwrap_or(0)),
    ))
}

/// What the connected server told us about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Raw version banner.
    pub banner: String,
    pub version: Version,
    /// MySQL protocol server is MariaDB.
    pub mariadb: bool,
}

impl ServerInfo {
    pub fn from_banner(banner: impl Into<String>) -> Self {
        let banner = banner.into();
        Self {
            version: Version::parse(&banner),
            mariadb: banner.to_ascii_lowercase().contains("mariadb"),
            banner,
        }
    }
}

/// How a result window is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT n OFFSET m`.
    LimitOffset,
    /// `SELECT TOP (n + m)` then skip `m` rows on the client.
    TopWithSkip,
    /// Nested `ROWNUM` window.
    RowNum,
    /// The driver pages natively (skip/limit, from/size).
    Native,
}

/// How a sub-select is limited to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubLimit {
    Limit,
    RowNum,
}

/// How UPDATE/DELETE touch at most one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationLimit {
    /// Trailing `LIMIT 1`.
    Limit,
    /// `UPDATE TOP (1)` / `DELETE TOP (1)`.
    Top,
    /// Filter on a pseudo-column picked by a one-row sub-select.
    RowIdentity {
        column: &'static str,
        sub_limit: SubLimit,
    },
    Unsupported,
}

/// Flavor of insert-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    OnDuplicateKey,
    OnConflict,
    Replace,
    Merge,
    /// One UPDATE per row, followed by an INSERT when nothing was updated.
    UpdateThenInsert,
}

/// Search operators offered in the select form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Like,
    /// `LIKE %%`: substring match, the term gets wrapped in `%`.
    LikeContains,
    ILike,
    ILikeContains,
    Regexp,
    NotRegexp,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    NotLike,
    FindInSet,
    /// Raw SQL appended after the column.
    Sql,
}

impl Operator {
    pub const ALL: &'static [Operator] = &[
        Operator::Eq,
        Operator::Lt,
        Operator::Gt,
        Operator::Le,
        Operator::Ge,
        Operator::Ne,
        Operator::Like,
        Operator::LikeContains,
        Operator::ILike,
        Operator::ILikeContains,
        Operator::Regexp,
        Operator::NotRegexp,
        Operator::In,
        Operator::NotIn,
        Operator::IsNull,
        Operator::IsNotNull,
        Operator::NotLike,
        Operator::FindInSet,
        Operator::Sql,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Ne => "!=",
            Operator::Like => "LIKE",
            Operator::LikeContains => "LIKE %%",
            Operator::ILike => "ILIKE",
            Operator::ILikeContains => "ILIKE %%",
            Operator::Regexp => "REGEXP",
            Operator::NotRegexp => "NOT REGEXP",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::NotLike => "NOT LIKE",
            Operator::FindInSet => "FIND_IN_SET",
            Operator::Sql => "SQL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let norm = s.split_whitespace().collect::<Vec<_>>().join(" ");
        let norm = norm.to_ascii_uppercase();
        match norm.as_str() {
            "<>" => return Some(Operator::Ne),
            "~" => return Some(Operator::Regexp),
            "!~" => return Some(Operator::NotRegexp),
            _ => {}
        }
        Operator::ALL.iter().copied().find(|op| op.as_str() == norm)
    }

    /// Operators that take no value.
    pub fn is_unary(self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    /// Operators whose value is a comma-separated list.
    pub fn takes_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// Pattern operators that compare text.
    pub fn is_pattern(self) -> bool {
        matches!(
            self,
            Operator::Like
                | Operator::LikeContains
                | Operator::ILike
                | Operator::ILikeContains
                | Operator::NotLike
                | Operator::Regexp
                | Operator::NotRegexp
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lexical rules the script splitter follows for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanRules {
    /// `` `name` `` quoting.
    pub backticks: bool,
    /// `[name]` quoting.
    pub brackets: bool,
    /// `# comment` to end of line.
    pub hash_comments: bool,
    /// `-- ` needs trailing whitespace to open a comment.
    pub dash_comment_needs_space: bool,
    /// `$tag$ ... $tag$` quoting.
    pub dollar_quotes: bool,
    /// Backslash escapes inside every string literal.
    pub backslash_escapes: bool,
    /// Backslash escapes inside `E'...'` literals.
    pub e_strings: bool,
}

/// Statements to run for EXPLAIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainPlan {
    pub setup: Vec<String>,
    pub query: String,
    pub teardown: Vec<String>,
}

impl ExplainPlan {
    pub fn single(query: String) -> Self {
        Self {
            setup: Vec::new(),
            query,
            teardown: Vec::new(),
        }
    }
}

/// Everything that varies in SQL text between backends.
pub trait SqlDialect: Send + Sync {
    fn backend(&self) -> Backend;

    /// Opening and closing identifier quote.
    fn identifier_quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Wrap an identifier, doubling embedded closing quotes.
    fn quote_identifier(&self, name: &str) -> String {
        let (open, close) = self.identifier_quotes();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(open);
        for c in name.chars() {
            out.push(c);
            if c == close {
                out.push(close);
            }
        }
        out.push(close);
        out
    }

    /// Exact inverse of [`SqlDialect::quote_identifier`]; bare names pass through.
    fn unquote_identifier(&self, quoted: &str) -> String {
        let (open, close) = self.identifier_quotes();
        let inner = quoted
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close));
        match inner {
            Some(inner) => {
                let doubled: String = [close, close].iter().collect();
                inner.replace(&doubled, &close.to_string())
            }
            None => quoted.to_string(),
        }
    }

    /// String literal. `backslash_escapes` reflects the live session mode.
    fn quote_literal(&self, value: &str, backslash_escapes: bool) -> String {
        let mut escaped = value.replace('\'', "''");
        if backslash_escapes {
            escaped = escaped.replace('\\', "\\\\");
        }
        format!("'{}'", escaped)
    }

    /// Binary literal.
    fn quote_binary(&self, bytes: &[u8]) -> String {
        format!("X'{}'", crate::value::hex(bytes))
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn pagination(&self) -> Pagination {
        Pagination::LimitOffset
    }

    fn mutation_limit(&self) -> MutationLimit {
        MutationLimit::Unsupported
    }

    fn upsert_style(&self, server: &ServerInfo) -> UpsertStyle;

    fn operators(&self) -> &'static [Operator];

    /// Render a regular-expression match, if the backend has one.
    fn regexp(&self, _expr: &str, _pattern: &str, _negated: bool) -> Option<String> {
        None
    }

    /// Expression used to read a column that cannot round-trip as text.
    fn convert_on_read(&self, _column: &Column, _expr: &str) -> Option<String> {
        None
    }

    /// Expression used to write a literal into such a column.
    fn convert_on_write(&self, _column: &Column, _literal: &str) -> Option<String> {
        None
    }

    /// Column expression used when searching it with `op` for `term`.
    fn convert_search(&self, expr: &str, _column: &Column, _op: Operator, _term: &str) -> String {
        expr.to_string()
    }

    fn explain(&self, sql: &str) -> Option<ExplainPlan> {
        Some(ExplainPlan::single(format!("EXPLAIN {}", sql)))
    }

    /// Statement rewritten to carry its own execution timeout, if the server can.
    fn timeout_form(&self, _server: &ServerInfo, _sql: &str, _timeout: Duration) -> Option<String> {
        None
    }

    /// Query returning the id other connections can use to kill this one.
    fn session_id_sql(&self) -> Option<&'static str> {
        None
    }

    fn kill_sql(&self, _session_id: &str) -> Option<String> {
        None
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        None
    }

    /// INSERT with every column defaulted.
    fn default_values_insert(&self, table: &str) -> Option<String> {
        Some(format!("INSERT INTO {} DEFAULT VALUES", table))
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", table)
    }

    fn scan_rules(&self, backslash_escapes: bool) -> ScanRules;

    /// Reason for refusing a statement inside a script.
    fn rejects_in_script(&self, _sql: &str) -> Option<&'static str> {
        None
    }

    /// Dialect has a schema level below the database.
    fn supports_schemas(&self) -> bool {
        false
    }
}

/// True when the digits-only session id is safe to splice into a kill statement.
pub(crate) fn numeric_id(id: &str) -> Option<&str> {
    let id = id.trim();
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then_some(id)
}

/// First keyword of a statement, uppercased, skipping leading comments.
pub(crate) fn leading_keyword(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map(|i| &after[i + 2..]).unwrap_or("").trim_start();
        } else if rest.starts_with("--") || rest.starts_with('#') {
            rest = rest.find('\n').map(|i| &rest[i + 1..]).unwrap_or("").trim_start();
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}
