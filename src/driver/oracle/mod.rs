//! Oracle over the `oracle` crate (ODPI-C). The client is synchronous.
//!
//! A "database" here is a tablespace; schemas are users.

mod catalog;

use oracle::sql_type::OracleType;
use oracle::{Connection, ResultSet};
use std::sync::Arc;

use super::{Driver, closed};
use crate::codec::Codec;
use crate::config::ConnectOptions;
use crate::cursor::{BufferedCursor, ColumnMeta, ResultCursor, ResultSet as BufferedSet};
use crate::dialect::{Backend, ServerInfo, leading_keyword};
use crate::error::{Error, Result};
use crate::model::{Column, ForeignKey, Index, Routine, Table, Trigger};
use crate::value::Value;

pub struct OracleDriver {
    conn: Option<Connection>,
    options: ConnectOptions,
    codec: Codec,
    tablespace: Option<String>,
    schema: Option<String>,
}

/// Easy Connect string: `//host:port/service`.
fn connect_string(options: &ConnectOptions) -> String {
    let service = options.database.as_deref().unwrap_or("XE");
    format!(
        "//{}:{}/{}",
        options.host,
        options.effective_port().unwrap_or(1521),
        service
    )
}

impl OracleDriver {
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        let conn = Connection::connect(
            options.user.as_deref().unwrap_or_default(),
            options.password.as_deref().unwrap_or_default(),
            connect_string(options),
        )
        .map_err(|err| Error::Connect(err.to_string()))?;
        conn.set_autocommit(true);
        let (version, _) = conn.server_version()?;

        let mut driver = Self {
            conn: Some(conn),
            options: options.clone(),
            codec: Codec::new(Backend::Oracle).with_server(ServerInfo::from_banner(version.to_string())),
            tablespace: None,
            schema: None,
        };
        match options.schema.clone() {
            Some(schema) => driver.select_schema(&schema)?,
            None => {
                driver.schema = driver
                    .fetch_value("SELECT SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA') FROM dual")?
                    .and_then(|v| v.to_text());
            }
        }
        Ok(driver)
    }

    fn schema_literal(&self) -> String {
        match &self.schema {
            Some(schema) => self.codec.quote_literal(schema),
            None => "SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA')".to_string(),
        }
    }
}

impl Driver for OracleDriver {
    fn backend(&self) -> Backend {
        Backend::Oracle
    }

    fn options(&self) -> &ConnectOptions {
        &self.options
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> Result<Box<dyn ResultCursor + 'a>> {
        tracing::debug!(sql, "execute");
        let conn = self.conn.as_ref().ok_or_else(closed)?;
        if matches!(leading_keyword(sql).as_str(), "SELECT" | "WITH") {
            let rows = conn.query(sql, &[])?;
            return Ok(Box::new(OracleCursor::new(rows)));
        }
        let statement = conn.execute(sql, &[])?;
        let affected = statement.row_count()?;
        Ok(Box::new(BufferedCursor::single(BufferedSet::affected(affected))))
    }

    fn current_database(&self) -> Option<&str> {
        self.tablespace.as_deref()
    }

    fn current_schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Tablespaces only filter the table list.
    fn select_database(&mut self, name: &str) -> Result<()> {
        self.tablespace = Some(name.to_string());
        Ok(())
    }

    fn select_schema(&mut self, name: &str) -> Result<()> {
        let sql = format!("ALTER SESSION SET CURRENT_SCHEMA = {}", self.codec.quote_identifier(name));
        self.run(&sql)?;
        self.schema = Some(name.to_string());
        Ok(())
    }

    fn databases(&mut self) -> Result<Vec<String>> {
        catalog::databases(self)
    }

    fn schemas(&mut self) -> Result<Vec<String>> {
        catalog::schemas(self)
    }

    fn tables(&mut self) -> Result<Vec<Table>> {
        catalog::tables(self)
    }

    fn columns(&mut self, table: &str) -> Result<Vec<Column>> {
        catalog::columns(self, table)
    }

    fn indexes(&mut self, table: &str) -> Result<Vec<Index>> {
        catalog::indexes(self, table)
    }

    fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>> {
        catalog::foreign_keys(self, table)
    }

    fn triggers(&mut self, table: &str) -> Result<Vec<Trigger>> {
        catalog::triggers(self, table)
    }

    fn routines(&mut self) -> Result<Vec<Routine>> {
        catalog::routines(self)
    }

    /// Oracle keeps no per-session insert id.
    fn last_insert_id(&mut self) -> Result<Option<Value>> {
        Ok(None)
    }

    fn create_database(&mut self, name: &str, _collation: Option<&str>) -> Result<()> {
        let sql = format!("CREATE TABLESPACE {}", self.codec.quote_identifier(name));
        self.run(&sql).map(|_| ())
    }

    fn drop_database(&mut self, name: &str) -> Result<()> {
        let sql = format!(
            "DROP TABLESPACE {} INCLUDING CONTENTS",
            self.codec.quote_identifier(name)
        );
        self.run(&sql).map(|_| ())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()?;
        }
        Ok(())
    }
}

fn is_binary(ty: &OracleType) -> bool {
    matches!(ty, OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB)
}

fn decode(row: &oracle::Row, index: usize, ty: &OracleType) -> Result<Value> {
    let value = match ty {
        ty if is_binary(ty) => row.get::<usize, Option<Vec<u8>>>(index)?.into(),
        OracleType::Number(_, 0) | OracleType::Int64 => match row.get::<usize, Option<i64>>(index) {
            Ok(n) => n.into(),
            // NUMBER(38) beyond i64.
            Err(_) => row.get::<usize, Option<String>>(index)?.into(),
        },
        OracleType::BinaryFloat | OracleType::BinaryDouble => row.get::<usize, Option<f64>>(index)?.into(),
        _ => row.get::<usize, Option<String>>(index)?.into(),
    };
    Ok(value)
}

/// Forward-only cursor over one query; Oracle returns one set per call.
struct OracleCursor<'a> {
    rows: ResultSet<'a, oracle::Row>,
    columns: Vec<(String, OracleType)>,
    names: Arc<[String]>,
    done: bool,
}

impl<'a> OracleCursor<'a> {
    fn new(rows: ResultSet<'a, oracle::Row>) -> Self {
        let columns: Vec<(String, OracleType)> = rows
            .column_info()
            .iter()
            .map(|info| (info.name().to_string(), info.oracle_type().clone()))
            .collect();
        let names = columns.iter().map(|(name, _)| name.clone()).collect();
        Self {
            rows,
            columns,
            names,
            done: false,
        }
    }
}

impl ResultCursor for OracleCursor<'_> {
    fn fetch_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }
        match self.rows.next() {
            Some(row) => {
                let row = row?;
                let values = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(index, (_, ty))| decode(&row, index, ty))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(values))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn column_count(&mut self) -> Result<usize> {
        Ok(self.columns.len())
    }

    fn describe_column(&mut self, index: usize) -> Result<Option<ColumnMeta>> {
        Ok(self
            .columns
            .get(index)
            .map(|(name, ty)| ColumnMeta::new(name.clone(), ty.to_string()).binary(is_binary(ty))))
    }

    fn affected_rows(&self) -> Option<u64> {
        None
    }

    fn next_result(&mut self) -> Result<bool> {
        while self.fetch_row()?.is_some() {}
        Ok(false)
    }

    fn column_names(&mut self) -> Result<Arc<[String]>> {
        Ok(self.names.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connect_string() {
        let options = ConnectOptions::new(Backend::Oracle).host("db").database("ORCLPDB1");
        assert_eq!(connect_string(&options), "//db:1521/ORCLPDB1");
    }

    #[test]
    fn test_binary_types() {
        assert!(is_binary(&OracleType::BLOB));
        assert!(is_binary(&OracleType::Raw(16)));
        assert!(!is_binary(&OracleType::Varchar2(10)));
    }
}
