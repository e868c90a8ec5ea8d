//! Document stores. Their drivers page and filter natively; the dialect only
//! decides which search operators the select form offers and how names print.

use super::{Backend, ExplainPlan, Operator, Pagination, ScanRules, ServerInfo, SqlDialect, UpsertStyle};

pub struct MongoDialect;

pub struct ElasticDialect;

const MONGO_OPERATORS: &[Operator] = &[
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
    Operator::NotIn,
    Operator::IsNull,
    Operator::IsNotNull,
];

const ELASTIC_OPERATORS: &[Operator] = &[
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
    Operator::IsNull,
    Operator::IsNotNull,
];

impl SqlDialect for MongoDialect {
    fn backend(&self) -> Backend {
        Backend::MongoDb
    }

    fn pagination(&self) -> Pagination {
        Pagination::Native
    }

    fn upsert_style(&self, _server: &ServerInfo) -> UpsertStyle {
        UpsertStyle::Replace
    }

    fn operators(&self) -> &'static [Operator] {
        MONGO_OPERATORS
    }

    fn explain(&self, _sql: &str) -> Option<ExplainPlan> {
        None
    }

    fn default_values_insert(&self, _table: &str) -> Option<String> {
        None
    }

    fn scan_rules(&self, _backslash_escapes: bool) -> ScanRules {
        ScanRules::default()
    }
}

impl SqlDialect for ElasticDialect {
    fn backend(&self) -> Backend {
        Backend::Elasticsearch
    }

    fn pagination(&self) -> Pagination {
        Pagination::Native
    }

    fn upsert_style(&self, _server: &ServerInfo) -> UpsertStyle {
        UpsertStyle::Replace
    }

    fn operators(&self) -> &'static [Operator] {
        ELASTIC_OPERATORS
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "true" } else { "false" }
    }

    fn explain(&self, _sql: &str) -> Option<ExplainPlan> {
        None
    }

    fn default_values_insert(&self, _table: &str) -> Option<String> {
        None
    }

    fn scan_rules(&self, backslash_escapes: bool) -> ScanRules {
        ScanRules {
            backslash_escapes,
            ..ScanRules::default()
        }
    }
}
