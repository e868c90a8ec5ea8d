//! Uniform, forward-only access to native result handles.

use serde::Serialize;
use serde::ser::SerializeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::Result;
use crate::value::Value;

/// Metadata of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub origin_table: Option<String>,
    pub origin_column: Option<String>,
    /// Type name as the client library reports it.
    pub type_name: String,
    pub is_binary: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin_table: None,
            origin_column: None,
            type_name: type_name.into(),
            is_binary: false,
        }
    }

    pub fn binary(mut self, is_binary: bool) -> Self {
        self.is_binary = is_binary;
        self
    }
}

/// One fetched row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(names: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value by column name; the first match wins on duplicate names.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let index = self.names.iter().position(|n| n == name)?;
        self.values.get(index)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Text of a column, `None` when missing or NULL.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::Null => None,
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            other => other.to_text(),
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Boolean-ish column (`YES`, `t`, `1`, `true`).
    pub fn flag(&self, name: &str) -> bool {
        match self.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(n)) => *n != 0,
            Some(Value::Text(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "yes" | "y" | "t" | "true" | "1"
            ),
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Forward-only, non-restartable sequence of result sets.
///
/// Column metadata is computed on first request per index. A cursor is
/// positioned on its first result set when returned.
pub trait ResultCursor {
    /// Next row of the current result set.
    fn fetch_row(&mut self) -> Result<Option<Vec<Value>>>;

    /// Columns of the current result set; 0 for statements without rows.
    fn column_count(&mut self) -> Result<usize>;

    fn describe_column(&mut self, index: usize) -> Result<Option<ColumnMeta>>;

    /// Rows affected by the current statement, once known.
    fn affected_rows(&self) -> Option<u64>;

    /// Advance to the next result set, discarding unread rows.
    fn next_result(&mut self) -> Result<bool>;

    fn column_names(&mut self) -> Result<Arc<[String]>> {
        let count = self.column_count()?;
        let mut names = Vec::with_capacity(count);
        for index in 0..count {
            let name = self
                .describe_column(index)?
                .map(|meta| meta.name)
                .unwrap_or_default();
            names.push(name);
        }
        Ok(names.into())
    }

    fn fetch_assoc(&mut self) -> Result<Option<Row>> {
        let Some(values) = self.fetch_row()? else {
            return Ok(None);
        };
        let names = self.column_names()?;
        Ok(Some(Row::new(names, values)))
    }

    /// Discard up to `n` rows; returns how many were skipped.
    fn skip(&mut self, n: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < n && self.fetch_row()?.is_some() {
            skipped += 1;
        }
        Ok(skipped)
    }
}

/// A fully materialized result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: VecDeque<Vec<Value>>,
    pub affected: Option<u64>,
}

impl ResultSet {
    pub fn rows(columns: Vec<ColumnMeta>, rows: impl IntoIterator<Item = Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter().collect(),
            affected: None,
        }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            affected: Some(count),
            ..Self::default()
        }
    }
}

/// Cursor over result sets already in memory (document stores, catalog reads).
#[derive(Debug, Default)]
pub struct BufferedCursor {
    current: ResultSet,
    pending: VecDeque<ResultSet>,
    names: Option<Arc<[String]>>,
}

impl BufferedCursor {
    pub fn new(sets: impl IntoIterator<Item = ResultSet>) -> Self {
        let mut pending: VecDeque<ResultSet> = sets.into_iter().collect();
        let current = pending.pop_front().unwrap_or_default();
        Self {
            current,
            pending,
            names: None,
        }
    }

    pub fn single(set: ResultSet) -> Self {
        Self::new([set])
    }
}

impl ResultCursor for BufferedCursor {
    fn fetch_row(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.current.rows.pop_front())
    }

    fn column_count(&mut self) -> Result<usize> {
        Ok(self.current.columns.len())
    }

    fn describe_column(&mut self, index: usize) -> Result<Option<ColumnMeta>> {
        Ok(self.current.columns.get(index).cloned())
    }

    fn affected_rows(&self) -> Option<u64> {
        self.current.affected
    }

    fn next_result(&mut self) -> Result<bool> {
        match self.pending.pop_front() {
            Some(next) => {
                self.current = next;
                self.names = None;
                Ok(true)
            }
            None => {
                self.current.rows.clear();
                Ok(false)
            }
        }
    }

    fn column_names(&mut self) -> Result<Arc<[String]>> {
        let columns = &self.current.columns;
        Ok(self
            .names
            .get_or_insert_with(|| columns.iter().map(|c| c.name.clone()).collect())
            .clone())
    }

    fn skip(&mut self, n: u64) -> Result<u64> {
        let n = (n as usize).min(self.current.rows.len());
        self.current.rows.drain(..n);
        Ok(n as u64)
    }
}

/// Stops yielding rows after `cap` of them. A cap of 0 means no cap.
pub struct RowCap<'c> {
    inner: &'c mut dyn ResultCursor,
    cap: usize,
    fetched: usize,
}

impl<'c> RowCap<'c> {
    pub fn new(inner: &'c mut dyn ResultCursor, cap: usize) -> Self {
        Self {
            inner,
            cap,
            fetched: 0,
        }
    }

    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// The cap was hit; more rows may remain unread.
    pub fn capped(&self) -> bool {
        self.cap != 0 && self.fetched >= self.cap
    }
}

impl ResultCursor for RowCap<'_> {
    fn fetch_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.capped() {
            return Ok(None);
        }
        let row = self.inner.fetch_row()?;
        if row.is_some() {
            self.fetched += 1;
        }
        Ok(row)
    }

    fn column_count(&mut self) -> Result<usize> {
        self.inner.column_count()
    }

    fn describe_column(&mut self, index: usize) -> Result<Option<ColumnMeta>> {
        self.inner.describe_column(index)
    }

    fn affected_rows(&self) -> Option<u64> {
        self.inner.affected_rows()
    }

    /// Result sets are advanced by the owner of the wrapped cursor.
    fn next_result(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn column_names(&mut self) -> Result<Arc<[String]>> {
        self.inner.column_names()
    }
}

/// Select cursor that falls back to catalog metadata.
///
/// Wire clients only learn column metadata from the first row; for an
/// empty result the expected columns come from the catalog instead.
pub struct ProjectedCursor<'a> {
    inner: Box<dyn ResultCursor + 'a>,
    table: String,
    expected: Vec<ColumnMeta>,
}

impl<'a> ProjectedCursor<'a> {
    pub fn new(inner: Box<dyn ResultCursor + 'a>, table: impl Into<String>, expected: Vec<ColumnMeta>) -> Self {
        Self {
            inner,
            table: table.into(),
            expected,
        }
    }
}

impl ResultCursor for ProjectedCursor<'_> {
    fn fetch_row(&mut self) -> Result<Option<Vec<Value>>> {
        self.inner.fetch_row()
    }

    fn column_count(&mut self) -> Result<usize> {
        match self.inner.column_count()? {
            0 => Ok(self.expected.len()),
            n => Ok(n),
        }
    }

    fn describe_column(&mut self, index: usize) -> Result<Option<ColumnMeta>> {
        if self.inner.column_count()? == 0 {
            return Ok(self.expected.get(index).cloned());
        }
        let Some(mut meta) = self.inner.describe_column(index)? else {
            return Ok(None);
        };
        if meta.origin_column.is_none() {
            if let Some(expected) = self.expected.iter().find(|e| e.name == meta.name) {
                meta.origin_table = expected.origin_table.clone().or_else(|| Some(self.table.clone()));
                meta.origin_column = expected.origin_column.clone();
                meta.is_binary |= expected.is_binary;
            }
        }
        Ok(Some(meta))
    }

    fn affected_rows(&self) -> Option<u64> {
        self.inner.affected_rows()
    }

    fn next_result(&mut self) -> Result<bool> {
        self.inner.next_result()
    }

    fn column_names(&mut self) -> Result<Arc<[String]>> {
        if self.inner.column_count()? == 0 {
            return Ok(self.expected.iter().map(|e| e.name.clone()).collect());
        }
        self.inner.column_names()
    }

    fn skip(&mut self, n: u64) -> Result<u64> {
        self.inner.skip(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn people() -> BufferedCursor {
        BufferedCursor::new([
            ResultSet::rows(
                vec![ColumnMeta::new("id", "INTEGER"), ColumnMeta::new("name", "TEXT")],
                (1..=5).map(|i| vec![Value::Int(i), Value::Text(format!("p{}", i))]),
            ),
            ResultSet::affected(3),
        ])
    }

    #[test]
    fn test_fetch_assoc_and_next_result() {
        let mut cursor = people();
        let row = cursor.fetch_assoc().unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&Value::Text("p1".into())));
        assert_eq!(row.int("id"), Some(1));

        assert!(cursor.next_result().unwrap());
        assert_eq!(cursor.column_count().unwrap(), 0);
        assert_eq!(cursor.affected_rows(), Some(3));
        assert!(!cursor.next_result().unwrap());
    }

    #[test]
    fn test_skip_and_cap() {
        let mut cursor = people();
        assert_eq!(cursor.skip(2).unwrap(), 2);

        let mut capped = RowCap::new(&mut cursor, 2);
        assert!(capped.fetch_row().unwrap().is_some());
        assert!(capped.fetch_row().unwrap().is_some());
        assert!(capped.fetch_row().unwrap().is_none());
        assert!(capped.capped());

        assert_eq!(cursor.fetch_row().unwrap().map(|r| r[0].clone()), Some(Value::Int(5)));
    }

    #[test]
    fn test_zero_cap_is_unlimited() {
        let mut cursor = people();
        let mut uncapped = RowCap::new(&mut cursor, 0);
        assert!(!uncapped.capped());
        while uncapped.fetch_row().unwrap().is_some() {}
        assert_eq!(uncapped.fetched(), 5);
        assert!(!uncapped.capped());
    }

    #[test]
    fn test_projected_cursor_falls_back_on_empty_result() {
        let empty = BufferedCursor::single(ResultSet::default());
        let expected = vec![ColumnMeta::new("id", "integer"), ColumnMeta::new("data", "blob").binary(true)];
        let mut cursor = ProjectedCursor::new(Box::new(empty), "t", expected);
        assert_eq!(cursor.column_count().unwrap(), 2);
        let meta = cursor.describe_column(1).unwrap().unwrap();
        assert_eq!(meta.name, "data");
        assert!(meta.is_binary);
        assert!(cursor.fetch_assoc().unwrap().is_none());
    }

    #[test]
    fn test_row_flags() {
        let names: Arc<[String]> = vec!["a".to_string(), "b".to_string(), "c".to_string()].into();
        let row = Row::new(names, vec![Value::from("YES"), Value::Bool(false), Value::Null]);
        assert!(row.flag("a"));
        assert!(!row.flag("b"));
        assert_eq!(row.text("c"), None);
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"a":"YES","b":false,"c":null}"#);
    }
}
