//! SQLite over sqlx. The "host" is the database file path.

mod catalog;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Executor};
use std::path::Path;
use std::str::FromStr;
use tokio::runtime::Runtime;

use super::stream::SqlxCursor;
use super::{Driver, closed, connect_error, connect_within};
use crate::codec::Codec;
use crate::config::ConnectOptions;
use crate::cursor::ResultCursor;
use crate::dialect::{Backend, ServerInfo};
use crate::error::{Error, Result};
use crate::model::{Column, ForeignKey, Index, Table, Trigger};
use crate::value::Value;

const MEMORY: &str = ":memory:";

pub struct SqliteDriver {
    runtime: Runtime,
    conn: Option<SqliteConnection>,
    options: ConnectOptions,
    codec: Codec,
    path: String,
    last_insert_id: Option<i64>,
}

fn open(runtime: &Runtime, options: &ConnectOptions, path: &str, create: bool) -> Result<SqliteConnection> {
    let connect = if path == MEMORY || path.is_empty() {
        SqliteConnectOptions::from_str("sqlite::memory:").map_err(connect_error)?
    } else {
        SqliteConnectOptions::new().filename(path).create_if_missing(create)
    };
    connect_within(
        runtime,
        options.connect_timeout,
        SqliteConnection::connect_with(&connect),
        connect_error,
    )
}

impl SqliteDriver {
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        let runtime = super::runtime()?;
        let path = options.host.clone();
        let conn = open(&runtime, options, &path, false)?;
        let mut driver = Self {
            runtime,
            conn: Some(conn),
            options: options.clone(),
            codec: Codec::new(Backend::Sqlite),
            path,
            last_insert_id: None,
        };
        driver.read_version()?;
        Ok(driver)
    }

    fn read_version(&mut self) -> Result<()> {
        let banner = self
            .fetch_value("SELECT sqlite_version()")?
            .and_then(|v| v.to_text())
            .unwrap_or_default();
        self.codec = Codec::new(Backend::Sqlite).with_server(ServerInfo::from_banner(banner));
        Ok(())
    }

    /// Path of the open database file.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Driver for SqliteDriver {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn options(&self) -> &ConnectOptions {
        &self.options
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> Result<Box<dyn ResultCursor + 'a>> {
        tracing::debug!(sql, "execute");
        let conn = self.conn.as_mut().ok_or_else(closed)?;
        let stream = conn.fetch_many(sql);
        Ok(Box::new(SqlxCursor::<sqlx::Sqlite>::new(
            &self.runtime,
            stream,
            &mut self.last_insert_id,
        )))
    }

    fn current_database(&self) -> Option<&str> {
        Some(&self.path)
    }

    /// A database is a file; switching opens it in place of the current one.
    fn select_database(&mut self, name: &str) -> Result<()> {
        let conn = open(&self.runtime, &self.options, name, false)?;
        if let Some(old) = self.conn.replace(conn) {
            if let Err(err) = self.runtime.block_on(old.close()) {
                tracing::debug!(error = %err, "closing previous database");
            }
        }
        self.path = name.to_string();
        self.last_insert_id = None;
        self.read_version()
    }

    fn databases(&mut self) -> Result<Vec<String>> {
        Ok(vec![self.path.clone()])
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

    fn last_insert_id(&mut self) -> Result<Option<Value>> {
        Ok(self.last_insert_id.map(Value::Int))
    }

    fn create_database(&mut self, name: &str, _collation: Option<&str>) -> Result<()> {
        if name == MEMORY || Path::new(name).exists() {
            return Err(Error::InvalidInput(format!("File exists: {}", name)));
        }
        let conn = open(&self.runtime, &self.options, name, true)?;
        self.runtime.block_on(conn.close())?;
        Ok(())
    }

    fn drop_database(&mut self, name: &str) -> Result<()> {
        if name == self.path {
            return Err(Error::InvalidInput(format!(
                "Cannot drop the currently open database '{}'",
                name
            )));
        }
        std::fs::remove_file(name)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            self.runtime.block_on(conn.close())?;
        }
        Ok(())
    }
}
