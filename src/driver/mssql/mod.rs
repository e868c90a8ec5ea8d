//! Microsoft SQL Server over tiberius.

mod catalog;

use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use tiberius::{AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel, FromSql, QueryItem, QueryStream};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{Driver, closed, connect_within};
use crate::codec::Codec;
use crate::config::{ConnectOptions, SslMode};
use crate::cursor::{BufferedCursor, ColumnMeta, ResultCursor, ResultSet};
use crate::dialect::{Backend, ServerInfo, leading_keyword};
use crate::error::{Error, Result};
use crate::model::{Column, ForeignKey, Index, Routine, Table, Trigger};
use crate::value::Value;

type TdsClient = Client<Compat<TcpStream>>;

pub struct MsSqlDriver {
    runtime: Runtime,
    client: Option<TdsClient>,
    options: ConnectOptions,
    codec: Codec,
    database: Option<String>,
    schema: Option<String>,
}

fn config(options: &ConnectOptions) -> Config {
    let mut config = Config::new();
    config.host(&options.host);
    config.port(options.effective_port().unwrap_or(1433));
    config.application_name("dbdeck");
    config.authentication(AuthMethod::sql_server(
        options.user.as_deref().unwrap_or("sa"),
        options.password.as_deref().unwrap_or_default(),
    ));
    if let Some(database) = &options.database {
        config.database(database);
    }
    match options.ssl.mode {
        SslMode::Disable => config.encryption(EncryptionLevel::NotSupported),
        SslMode::Prefer => {
            config.encryption(EncryptionLevel::On);
            config.trust_cert();
        }
        SslMode::Require => {
            config.encryption(EncryptionLevel::Required);
            config.trust_cert();
        }
        SslMode::VerifyCa | SslMode::VerifyFull => {
            config.encryption(EncryptionLevel::Required);
            if let Some(ca) = &options.ssl.ca {
                config.trust_cert_ca(ca.to_string_lossy());
            }
        }
    }
    config
}

async fn open(config: Config) -> tiberius::Result<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

impl MsSqlDriver {
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        let runtime = super::runtime()?;
        let client = connect_within(&runtime, options.connect_timeout, open(config(options)), |err| {
            Error::Connect(match err {
                tiberius::error::Error::Server(token) => token.message().to_string(),
                other => other.to_string(),
            })
        })?;
        let mut driver = Self {
            runtime,
            client: Some(client),
            options: options.clone(),
            codec: Codec::new(Backend::MsSql),
            database: options.database.clone(),
            schema: options.schema.clone(),
        };
        let banner = driver
            .fetch_value("SELECT CAST(SERVERPROPERTY('ProductVersion') AS nvarchar(128))")?
            .and_then(|v| v.to_text())
            .unwrap_or_default();
        driver.codec = Codec::new(Backend::MsSql).with_server(ServerInfo::from_banner(banner));
        if driver.database.is_none() {
            driver.database = driver.fetch_value("SELECT DB_NAME()")?.and_then(|v| v.to_text());
        }
        if driver.schema.is_none() {
            driver.schema = driver.fetch_value("SELECT SCHEMA_NAME()")?.and_then(|v| v.to_text());
        }
        Ok(driver)
    }

    fn schema_literal(&self) -> String {
        match &self.schema {
            Some(schema) => self.codec.quote_literal(schema),
            None => "SCHEMA_NAME()".to_string(),
        }
    }

    /// `N'[schema].[table]'` for `OBJECT_ID`.
    fn object_literal(&self, table: &str) -> String {
        let qualified = match &self.schema {
            Some(schema) => format!(
                "{}.{}",
                self.codec.quote_identifier(schema),
                self.codec.quote_identifier(table)
            ),
            None => self.codec.quote_identifier(table),
        };
        self.codec.quote_literal(&qualified)
    }
}

impl Driver for MsSqlDriver {
    fn backend(&self) -> Backend {
        Backend::MsSql
    }

    fn options(&self) -> &ConnectOptions {
        &self.options
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Row-returning batches stream; DML goes through the RPC path, the
    /// only one that reports affected counts.
    fn execute<'a>(&'a mut self, sql: &'a str) -> Result<Box<dyn ResultCursor + 'a>> {
        tracing::debug!(sql, "execute");
        let client = self.client.as_mut().ok_or_else(closed)?;
        if matches!(
            leading_keyword(sql).as_str(),
            "INSERT" | "UPDATE" | "DELETE" | "MERGE"
        ) {
            let result = self.runtime.block_on(client.execute(sql, &[]))?;
            return Ok(Box::new(BufferedCursor::single(ResultSet::affected(result.total()))));
        }
        let stream = self.runtime.block_on(client.simple_query(sql))?;
        Ok(Box::new(TdsCursor::new(&self.runtime, stream)))
    }

    fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn current_schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn select_database(&mut self, name: &str) -> Result<()> {
        let sql = format!("USE {}", self.codec.quote_identifier(name));
        self.run(&sql)?;
        self.database = Some(name.to_string());
        Ok(())
    }

    /// Schemas only qualify catalog reads; the session default is unchanged.
    fn select_schema(&mut self, name: &str) -> Result<()> {
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

    fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            self.runtime.block_on(client.close())?;
        }
        Ok(())
    }
}

fn type_name(column_type: ColumnType) -> String {
    format!("{:?}", column_type)
}

fn is_binary(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::BigBinary | ColumnType::BigVarBin | ColumnType::Image
    )
}

fn or_null<T>(value: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    value.map(f).unwrap_or(Value::Null)
}

fn decode(data: &ColumnData<'static>) -> Result<Value> {
    let value = match data {
        ColumnData::U8(v) => or_null(*v, |n| Value::Int(n.into())),
        ColumnData::I16(v) => or_null(*v, |n| Value::Int(n.into())),
        ColumnData::I32(v) => or_null(*v, |n| Value::Int(n.into())),
        ColumnData::I64(v) => or_null(*v, Value::Int),
        ColumnData::F32(v) => or_null(*v, |n| Value::Float(n.into())),
        ColumnData::F64(v) => or_null(*v, Value::Float),
        ColumnData::Bit(v) => or_null(*v, Value::Bool),
        ColumnData::String(v) => or_null(v.as_ref(), |s| Value::Text(s.to_string())),
        ColumnData::Guid(v) => or_null(*v, |g| Value::Text(g.to_string())),
        ColumnData::Binary(v) => or_null(v.as_ref(), |b| Value::Bytes(b.to_vec())),
        ColumnData::Numeric(v) => or_null(*v, |n| Value::Text(n.to_string())),
        ColumnData::Xml(v) => or_null(v.as_ref(), |x| Value::Text(x.clone().into_owned().into_string())),
        ColumnData::Date(_) => or_null(chrono::NaiveDate::from_sql(data)?, |d| Value::Text(d.to_string())),
        ColumnData::Time(_) => or_null(chrono::NaiveTime::from_sql(data)?, |t| Value::Text(t.to_string())),
        ColumnData::DateTimeOffset(_) => or_null(
            chrono::DateTime::<chrono::FixedOffset>::from_sql(data)?,
            |d| Value::Text(d.to_rfc3339()),
        ),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => or_null(
            chrono::NaiveDateTime::from_sql(data)?,
            |d| Value::Text(d.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        ),
    };
    Ok(value)
}

/// Streaming cursor over a TDS token stream.
///
/// A metadata token opens each result set, so the shape is always known
/// before the first row, even for empty sets.
struct TdsCursor<'a> {
    runtime: &'a Runtime,
    stream: Pin<Box<QueryStream<'a>>>,
    peeked: Option<QueryItem>,
    shape: Option<Vec<(String, ColumnType)>>,
    names: Option<Arc<[String]>>,
    set_done: bool,
    exhausted: bool,
}

impl<'a> TdsCursor<'a> {
    fn new(runtime: &'a Runtime, stream: QueryStream<'a>) -> Self {
        Self {
            runtime,
            stream: Box::pin(stream),
            peeked: None,
            shape: None,
            names: None,
            set_done: false,
            exhausted: false,
        }
    }

    fn pull(&mut self) -> Result<Option<QueryItem>> {
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

    fn adopt(&mut self, columns: &[tiberius::Column]) {
        self.shape = Some(
            columns
                .iter()
                .map(|c| (c.name().to_string(), c.column_type()))
                .collect(),
        );
        self.names = None;
    }

    fn ensure_shape(&mut self) -> Result<()> {
        if self.shape.is_some() || self.set_done {
            return Ok(());
        }
        match self.pull()? {
            Some(QueryItem::Metadata(meta)) => self.adopt(meta.columns()),
            Some(row) => self.peeked = Some(row),
            None => self.set_done = true,
        }
        Ok(())
    }
}

impl ResultCursor for TdsCursor<'_> {
    fn fetch_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.set_done {
            return Ok(None);
        }
        loop {
            match self.pull()? {
                Some(QueryItem::Metadata(meta)) => {
                    if self.shape.is_some() {
                        // Next result set; leave it for next_result.
                        self.peeked = Some(QueryItem::Metadata(meta));
                        self.set_done = true;
                        return Ok(None);
                    }
                    self.adopt(meta.columns());
                }
                Some(QueryItem::Row(row)) => {
                    let values = row
                        .cells()
                        .map(|(_, data)| decode(data))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Some(values));
                }
                None => {
                    self.set_done = true;
                    return Ok(None);
                }
            }
        }
    }

    fn column_count(&mut self) -> Result<usize> {
        self.ensure_shape()?;
        Ok(self.shape.as_ref().map(Vec::len).unwrap_or(0))
    }

    fn describe_column(&mut self, index: usize) -> Result<Option<ColumnMeta>> {
        self.ensure_shape()?;
        Ok(self
            .shape
            .as_ref()
            .and_then(|s| s.get(index))
            .map(|(name, ty)| ColumnMeta::new(name.clone(), type_name(*ty)).binary(is_binary(*ty))))
    }

    /// Streamed batches report no counts.
    fn affected_rows(&self) -> Option<u64> {
        None
    }

    fn next_result(&mut self) -> Result<bool> {
        while self.fetch_row()?.is_some() {}
        match self.pull()? {
            Some(QueryItem::Metadata(meta)) => {
                self.set_done = false;
                self.adopt(meta.columns());
                Ok(true)
            }
            Some(row) => {
                self.peeked = Some(row);
                self.shape = None;
                self.set_done = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn column_names(&mut self) -> Result<Arc<[String]>> {
        self.ensure_shape()?;
        if self.names.is_none() {
            let names: Arc<[String]> = self.shape.iter().flatten().map(|(n, _)| n.clone()).collect();
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
    fn test_decode_scalars() {
        assert_eq!(decode(&ColumnData::I32(Some(7))).unwrap(), Value::Int(7));
        assert_eq!(decode(&ColumnData::I32(None)).unwrap(), Value::Null);
        assert_eq!(decode(&ColumnData::Bit(Some(true))).unwrap(), Value::Bool(true));
        assert_eq!(
            decode(&ColumnData::String(Some("x".into()))).unwrap(),
            Value::Text("x".into())
        );
    }

    #[test]
    fn test_binary_types() {
        assert!(is_binary(ColumnType::BigVarBin));
        assert!(!is_binary(ColumnType::NVarchar));
    }
}
