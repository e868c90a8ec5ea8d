//! Result cursor over a sqlx `fetch_many` stream.
//!
//! The stream is polled on the driver's runtime one item at a time, so rows
//! are never buffered beyond the one peeked to learn column metadata.

use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::{Column as _, Either, Row as _, TypeInfo, ValueRef};
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::cursor::{ColumnMeta, ResultCursor};
use crate::error::Result;
use crate::value::Value;

/// Per-database decoding for the sqlx backends.
pub(crate) trait SqlxBackend: sqlx::Database {
    fn decode(row: &Self::Row, index: usize) -> Result<Value>;

    fn rows_affected(result: &Self::QueryResult) -> u64;

    fn last_insert_id(_result: &Self::QueryResult) -> Option<i64> {
        None
    }

    /// Binary by type name, never by inspecting values.
    fn is_binary(type_name: &str) -> bool;
}

/// Text-protocol cell rendered with the type the server reported.
fn typed_text(type_name: &str, text: String) -> Value {
    let base = type_name
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    match base.as_str() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "INT2" | "INT4"
        | "INT8" => match text.parse() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Text(text),
        },
        "BOOL" | "BOOLEAN" => match text.as_str() {
            "t" | "true" | "1" => Value::Bool(true),
            "f" | "false" | "0" => Value::Bool(false),
            _ => Value::Text(text),
        },
        _ => Value::Text(text),
    }
}

impl SqlxBackend for sqlx::MySql {
    fn decode(row: &sqlx::mysql::MySqlRow, index: usize) -> Result<Value> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let type_name = raw.type_info().name().to_string();
        if Self::is_binary(&type_name) {
            return Ok(Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?));
        }
        let text: String = row.try_get_unchecked(index)?;
        Ok(typed_text(&type_name, text))
    }

    fn rows_affected(result: &sqlx::mysql::MySqlQueryResult) -> u64 {
        result.rows_affected()
    }

    fn last_insert_id(result: &sqlx::mysql::MySqlQueryResult) -> Option<i64> {
        i64::try_from(result.last_insert_id()).ok().filter(|id| *id > 0)
    }

    fn is_binary(type_name: &str) -> bool {
        let upper = type_name.to_ascii_uppercase();
        upper.contains("BINARY") || upper.ends_with("BLOB") || upper == "GEOMETRY" || upper == "BIT"
    }
}

impl SqlxBackend for sqlx::Postgres {
    fn decode(row: &sqlx::postgres::PgRow, index: usize) -> Result<Value> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let type_name = raw.type_info().name().to_string();
        if Self::is_binary(&type_name) {
            return Ok(Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?));
        }
        let text: String = row.try_get_unchecked(index)?;
        Ok(typed_text(&type_name, text))
    }

    fn rows_affected(result: &sqlx::postgres::PgQueryResult) -> u64 {
        result.rows_affected()
    }

    fn is_binary(type_name: &str) -> bool {
        type_name.eq_ignore_ascii_case("BYTEA")
    }
}

impl SqlxBackend for sqlx::Sqlite {
    /// SQLite values carry their own storage class.
    fn decode(row: &sqlx::sqlite::SqliteRow, index: usize) -> Result<Value> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let storage = raw.type_info().name().to_ascii_uppercase();
        let value = match storage.as_str() {
            "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => Value::Int(row.try_get_unchecked::<i64, _>(index)?),
            "REAL" | "FLOAT" | "DOUBLE" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
            "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
            _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
        };
        Ok(value)
    }

    fn rows_affected(result: &sqlx::sqlite::SqliteQueryResult) -> u64 {
        result.rows_affected()
    }

    fn last_insert_id(result: &sqlx::sqlite::SqliteQueryResult) -> Option<i64> {
        Some(result.last_insert_rowid()).filter(|id| *id > 0)
    }

    fn is_binary(type_name: &str) -> bool {
        type_name.eq_ignore_ascii_case("BLOB")
    }
}

type Item<DB> = Either<<DB as sqlx::Database>::QueryResult, <DB as sqlx::Database>::Row>;

pub(crate) struct SqlxCursor<'a, DB: SqlxBackend> {
    runtime: &'a Runtime,
    stream: BoxStream<'a, std::result::Result<Item<DB>, sqlx::Error>>,
    peeked: Option<Item<DB>>,
    /// `(name, type)` of the current set, learned from its first row.
    shape: Option<Vec<(String, String)>>,
    metas: Vec<Option<ColumnMeta>>,
    names: Option<Arc<[String]>>,
    affected: Option<u64>,
    set_done: bool,
    exhausted: bool,
    last_insert_id: &'a mut Option<i64>,
}

impl<'a, DB: SqlxBackend> SqlxCursor<'a, DB> {
    pub(crate) fn new(
        runtime: &'a Runtime,
        stream: BoxStream<'a, std::result::Result<Item<DB>, sqlx::Error>>,
        last_insert_id: &'a mut Option<i64>,
    ) -> Self {
        Self {
            runtime,
            stream,
            peeked: None,
            shape: None,
            metas: Vec::new(),
            names: None,
            affected: None,
            set_done: false,
            exhausted: false,
            last_insert_id,
        }
    }

    fn pull(&mut self) -> Result<Option<Item<DB>>> {
        if let Some(item) = self.peeked.take() {
            return Ok(Some(item));
        }
        if self.exhausted {
            return Ok(None);
        }
        match self.runtime.block_on(self.stream.next()) {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(err)) => {
                self.exhausted = true;
                Err(err.into())
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn finish_set(&mut self, result: &DB::QueryResult) {
        self.affected = Some(DB::rows_affected(result));
        if let Some(id) = DB::last_insert_id(result) {
            *self.last_insert_id = Some(id);
        }
        self.set_done = true;
    }

    fn learn_shape(&mut self, row: &DB::Row) {
        if self.shape.is_some() {
            return;
        }
        let shape: Vec<(String, String)> = row
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
            .collect();
        self.metas = vec![None; shape.len()];
        self.shape = Some(shape);
    }

    /// Peek far enough to know the current set's columns.
    fn ensure_shape(&mut self) -> Result<()> {
        if self.shape.is_some() || self.set_done {
            return Ok(());
        }
        match self.pull()? {
            Some(Either::Right(row)) => {
                self.learn_shape(&row);
                self.peeked = Some(Either::Right(row));
            }
            Some(Either::Left(result)) => self.finish_set(&result),
            None => self.set_done = true,
        }
        Ok(())
    }
}

impl<DB: SqlxBackend> ResultCursor for SqlxCursor<'_, DB> {
    fn fetch_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.set_done {
            return Ok(None);
        }
        match self.pull()? {
            Some(Either::Right(row)) => {
                self.learn_shape(&row);
                let values = (0..row.len())
                    .map(|index| DB::decode(&row, index))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(values))
            }
            Some(Either::Left(result)) => {
                self.finish_set(&result);
                Ok(None)
            }
            None => {
                self.set_done = true;
                Ok(None)
            }
        }
    }

    fn column_count(&mut self) -> Result<usize> {
        self.ensure_shape()?;
        Ok(self.shape.as_ref().map(Vec::len).unwrap_or(0))
    }

    fn describe_column(&mut self, index: usize) -> Result<Option<ColumnMeta>> {
        self.ensure_shape()?;
        let Some((name, type_name)) = self.shape.as_ref().and_then(|s| s.get(index)) else {
            return Ok(None);
        };
        let meta = self.metas[index]
            .get_or_insert_with(|| ColumnMeta::new(name.clone(), type_name.clone()).binary(DB::is_binary(type_name)));
        Ok(Some(meta.clone()))
    }

    fn affected_rows(&self) -> Option<u64> {
        self.affected
    }

    fn next_result(&mut self) -> Result<bool> {
        while self.fetch_row()?.is_some() {}
        match self.pull()? {
            None => Ok(false),
            Some(item) => {
                self.peeked = Some(item);
                self.shape = None;
                self.metas.clear();
                self.names = None;
                self.affected = None;
                self.set_done = false;
                Ok(true)
            }
        }
    }

    fn column_names(&mut self) -> Result<Arc<[String]>> {
        self.ensure_shape()?;
        if self.names.is_none() {
            let names: Arc<[String]> = self
                .shape
                .iter()
                .flatten()
                .map(|(name, _)| name.clone())
                .collect();
            self.names = Some(names);
        }
        Ok(self.names.clone().unwrap_or_else(|| Arc::from(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_typed_text() {
        assert_eq!(typed_text("BIGINT UNSIGNED", "7".into()), Value::Int(7));
        assert_eq!(
            typed_text("BIGINT UNSIGNED", "18446744073709551615".into()),
            Value::Text("18446744073709551615".into())
        );
        assert_eq!(typed_text("BOOL", "t".into()), Value::Bool(true));
        assert_eq!(typed_text("DECIMAL", "1.50".into()), Value::Text("1.50".into()));
    }

    #[test]
    fn test_binary_type_names() {
        assert!(<sqlx::MySql as SqlxBackend>::is_binary("VARBINARY"));
        assert!(<sqlx::MySql as SqlxBackend>::is_binary("MEDIUMBLOB"));
        assert!(!<sqlx::MySql as SqlxBackend>::is_binary("TEXT"));
        assert!(<sqlx::Postgres as SqlxBackend>::is_binary("BYTEA"));
        assert!(<sqlx::Sqlite as SqlxBackend>::is_binary("BLOB"));
    }
}
