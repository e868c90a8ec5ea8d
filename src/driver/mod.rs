//! Backend drivers.
//!
//! One [`Driver`] per backend, chosen once by [`connect`]. Drivers speak the
//! backend's native protocol through its client crate and map its catalog
//! onto [`crate::model`] entities. Async clients run on a current-thread
//! runtime owned by the driver; every network call blocks on it.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::codec::Codec;
use crate::config::ConnectOptions;
use crate::cursor::{ResultCursor, Row};
use crate::dialect::{Backend, ServerInfo};
use crate::error::{Error, Result};
use crate::model::{Column, ForeignKey, Index, Routine, Table, Trigger};
use crate::query::{Assignment, Predicate, SelectQuery};
use crate::value::Value;

pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub(crate) mod stream;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(feature = "oracle")]
pub mod oracle;

#[cfg(feature = "mongodb")]
pub mod mongo;

#[cfg(feature = "elasticsearch")]
pub mod elastic;

/// Row edit for backends that page and filter natively.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentMutation {
    Insert {
        table: String,
        values: Vec<Assignment>,
    },
    Update {
        table: String,
        values: Vec<Assignment>,
        predicates: Vec<Predicate>,
        limit_to_one: bool,
    },
    Delete {
        table: String,
        predicates: Vec<Predicate>,
        limit_to_one: bool,
    },
    Upsert {
        table: String,
        rows: Vec<Vec<Assignment>>,
        key: Vec<String>,
    },
}

/// A live connection to one backend.
pub trait Driver {
    fn backend(&self) -> Backend;

    /// Options this connection was opened with.
    fn options(&self) -> &ConnectOptions;

    /// Codec bound to the session flags read at connect time.
    fn codec(&self) -> &Codec;

    fn server_info(&self) -> &ServerInfo {
        self.codec().server()
    }

    /// Run one statement (or a batch, where the protocol allows) and stream
    /// its results.
    fn execute<'a>(&'a mut self, sql: &'a str) -> Result<Box<dyn ResultCursor + 'a>>;

    /// Run a statement and collect every row of its first result set.
    fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>> {
        let mut cursor = self.execute(sql)?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.fetch_assoc()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// First cell of the first row.
    fn fetch_value(&mut self, sql: &str) -> Result<Option<Value>> {
        let mut cursor = self.execute(sql)?;
        let value = cursor.fetch_row()?.and_then(|row| row.into_iter().next());
        Ok(value.filter(|v| !v.is_null()))
    }

    fn current_database(&self) -> Option<&str>;

    fn current_schema(&self) -> Option<&str> {
        None
    }

    fn select_database(&mut self, name: &str) -> Result<()>;

    fn select_schema(&mut self, _name: &str) -> Result<()> {
        Err(Error::unsupported(self.backend().name(), "schemas"))
    }

    fn databases(&mut self) -> Result<Vec<String>>;

    fn schemas(&mut self) -> Result<Vec<String>> {
        Err(Error::unsupported(self.backend().name(), "schemas"))
    }

    fn tables(&mut self) -> Result<Vec<Table>>;

    fn columns(&mut self, table: &str) -> Result<Vec<Column>>;

    fn indexes(&mut self, table: &str) -> Result<Vec<Index>>;

    fn foreign_keys(&mut self, _table: &str) -> Result<Vec<ForeignKey>> {
        Ok(Vec::new())
    }

    fn triggers(&mut self, _table: &str) -> Result<Vec<Trigger>> {
        Ok(Vec::new())
    }

    fn routines(&mut self) -> Result<Vec<Routine>> {
        Ok(Vec::new())
    }

    /// Id another connection can use to kill this one.
    fn session_id(&mut self) -> Result<Option<String>> {
        match self.codec().dialect().session_id_sql() {
            Some(sql) => Ok(self.fetch_value(sql)?.and_then(|v| v.to_text())),
            None => Ok(None),
        }
    }

    /// Key generated by the last INSERT on this connection.
    fn last_insert_id(&mut self) -> Result<Option<Value>> {
        let Some(sql) = self.codec().dialect().last_insert_id_sql() else {
            return Ok(None);
        };
        match self.fetch_value(sql) {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::debug!(error = %err, "no last insert id");
                Ok(None)
            }
        }
    }

    fn create_database(&mut self, name: &str, collation: Option<&str>) -> Result<()> {
        let mut sql = format!("CREATE DATABASE {}", self.codec().quote_identifier(name));
        if let Some(collation) = collation {
            sql.push_str(" COLLATE ");
            sql.push_str(collation);
        }
        self.run(&sql).map(|_| ())
    }

    fn drop_database(&mut self, name: &str) -> Result<()> {
        let sql = format!("DROP DATABASE {}", self.codec().quote_identifier(name));
        self.run(&sql).map(|_| ())
    }

    /// Run a statement for its effect; returns affected rows.
    fn run(&mut self, sql: &str) -> Result<u64> {
        let mut cursor = self.execute(sql)?;
        while cursor.fetch_row()?.is_some() {}
        Ok(cursor.affected_rows().unwrap_or(0))
    }

    /// Native select for backends without SQL pagination.
    fn select_documents<'a>(
        &'a mut self,
        _fields: &[Column],
        _query: &SelectQuery,
    ) -> Result<Box<dyn ResultCursor + 'a>> {
        Err(Error::unsupported(self.backend().name(), "document select"))
    }

    fn mutate_documents(&mut self, _fields: &[Column], _mutation: DocumentMutation) -> Result<u64> {
        Err(Error::unsupported(self.backend().name(), "document mutation"))
    }

    fn close(&mut self) -> Result<()>;
}

/// Open a connection with the driver for `options.backend`.
pub fn connect(options: &ConnectOptions) -> Result<Box<dyn Driver>> {
    tracing::debug!(backend = %options.backend, host = %options.host, "connecting");
    let driver: Box<dyn Driver> = match options.backend {
        Backend::MySql => Box::new(mysql::MySqlDriver::connect(options)?),
        Backend::Postgres => Box::new(postgres::PostgresDriver::connect(options)?),
        Backend::Sqlite => Box::new(sqlite::SqliteDriver::connect(options)?),
        #[cfg(feature = "mssql")]
        Backend::MsSql => Box::new(mssql::MsSqlDriver::connect(options)?),
        #[cfg(feature = "oracle")]
        Backend::Oracle => Box::new(oracle::OracleDriver::connect(options)?),
        #[cfg(feature = "mongodb")]
        Backend::MongoDb => Box::new(mongo::MongoDriver::connect(options)?),
        #[cfg(feature = "elasticsearch")]
        Backend::Elasticsearch => Box::new(elastic::ElasticDriver::connect(options)?),
        #[allow(unreachable_patterns)]
        other => {
            return Err(Error::Connect(format!(
                "{} support is not compiled in (enable the `{}` feature)",
                other,
                feature_name(other)
            )));
        }
    };
    tracing::info!(
        backend = %options.backend,
        host = %options.host,
        server = %driver.server_info().version,
        "connected"
    );
    Ok(driver)
}

fn feature_name(backend: Backend) -> &'static str {
    match backend {
        Backend::MsSql => "mssql",
        Backend::Oracle => "oracle",
        Backend::MongoDb => "mongodb",
        Backend::Elasticsearch => "elasticsearch",
        _ => "default",
    }
}

/// Current-thread runtime owned by one driver.
pub(crate) fn runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Block on a connect future, honoring the connect timeout.
pub(crate) fn connect_within<T, E>(
    runtime: &Runtime,
    timeout: Option<Duration>,
    future: impl Future<Output = std::result::Result<T, E>>,
    map_err: impl FnOnce(E) -> Error,
) -> Result<T> {
    let outcome = match timeout {
        Some(limit) => runtime
            .block_on(tokio::time::timeout(limit, future))
            .map_err(|_| Error::Connect(format!("Connection timed out after {}s", limit.as_secs())))?,
        None => runtime.block_on(future),
    };
    outcome.map_err(map_err)
}

/// Connect failure with the server's own wording.
pub(crate) fn connect_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) => Error::Connect(db.message().to_string()),
        other => Error::Connect(other.to_string()),
    }
}

/// Error for calls after [`Driver::close`].
pub(crate) fn closed() -> Error {
    Error::statement("Connection is closed")
}

/// Degrade a catalog read that returned nothing.
pub(crate) fn non_empty<T>(items: Vec<T>, what: &str) -> Result<Vec<T>> {
    if items.is_empty() {
        Err(Error::CatalogUnavailable(format!("no {}", what)))
    } else {
        Ok(items)
    }
}
