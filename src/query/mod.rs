//! SQL generation for the select form and row editing.
//!
//! Builders are pure: they take a [`Codec`](crate::codec::Codec) (dialect plus
//! session flags) and the table's catalog columns, and return SQL text.

mod mutate;
mod search;
mod select;

#[cfg(test)]
mod tests;

pub use mutate::{build_delete, build_insert, build_update, build_upsert};
pub use search::{accepts_term, where_clause};
pub use select::{build_count, build_select, group_by};

use serde::Serialize;

use crate::dialect::Operator;
use crate::value::Value;

/// `column = value` pair of an INSERT or UPDATE.
pub type Assignment = (String, Value);

/// One projected expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SelectItem {
    Column(String),
    /// `func(column)`; `COUNT(*)` when the column is absent.
    Aggregate { func: String, column: Option<String> },
}

impl SelectItem {
    pub fn column(name: impl Into<String>) -> Self {
        SelectItem::Column(name.into())
    }

    pub fn aggregate(func: impl Into<String>, column: Option<&str>) -> Self {
        SelectItem::Aggregate {
            func: func.into(),
            column: column.map(str::to_string),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectItem::Aggregate { .. })
    }
}

/// One search condition. Without a column it searches any column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Predicate {
    pub column: Option<String>,
    pub op: Operator,
    pub value: String,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            op,
            value: value.into(),
        }
    }

    /// Search every compatible column.
    pub fn any(op: Operator, value: impl Into<String>) -> Self {
        Self {
            column: None,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(column, Operator::Eq, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Everything the select form holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectQuery {
    pub table: String,
    /// Empty means `*`.
    pub projection: Vec<SelectItem>,
    pub predicates: Vec<Predicate>,
    pub group: Vec<String>,
    pub order: Vec<Order>,
    /// Rows per page; `None` or 0 returns everything.
    pub limit: Option<u64>,
    /// Zero-based page index.
    pub page: u64,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn select(mut self, item: SelectItem) -> Self {
        self.projection.push(item);
        self
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection
            .extend(names.into_iter().map(|n| SelectItem::Column(n.into())));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group.push(column.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    /// Effective page size; zero counts as no limit.
    pub fn page_size(&self) -> Option<u64> {
        self.limit.filter(|n| *n > 0)
    }

    /// Rows before the requested page.
    pub fn offset(&self) -> u64 {
        self.page_size().map(|n| n.saturating_mul(self.page)).unwrap_or(0)
    }
}

/// Generated SELECT plus rows the caller must skip on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltSelect {
    pub sql: String,
    pub skip: u64,
}

/// Insert-or-update as the backend can express it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertPlan {
    /// One statement covering every row.
    Single(String),
    /// Per row: an UPDATE, then the INSERT to run when it touched nothing.
    PerRow(Vec<(String, String)>),
}
