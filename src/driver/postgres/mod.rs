//! PostgreSQL over sqlx.

mod catalog;

use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{Connection, Executor};
use tokio::runtime::Runtime;

use super::stream::SqlxCursor;
use super::{Driver, closed, connect_error, connect_within};
use crate::codec::Codec;
use crate::config::{ConnectOptions, SslMode};
use crate::cursor::ResultCursor;
use crate::dialect::{Backend, ServerInfo};
use crate::error::{Error, Result};
use crate::model::{Column, ForeignKey, Index, Routine, Table, Trigger};

pub struct PostgresDriver {
    runtime: Runtime,
    conn: Option<PgConnection>,
    options: ConnectOptions,
    codec: Codec,
    database: Option<String>,
    schema: Option<String>,
    /// PostgreSQL results carry no generated key; stays `None`.
    insert_id: Option<i64>,
}

fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

fn open(runtime: &Runtime, options: &ConnectOptions, database: Option<&str>) -> Result<PgConnection> {
    let mut connect = PgConnectOptions::new()
        .host(&options.host)
        .port(options.effective_port().unwrap_or(5432))
        .ssl_mode(ssl_mode(options.ssl.mode))
        .application_name("dbdeck");
    if let Some(user) = &options.user {
        connect = connect.username(user);
    }
    if let Some(password) = &options.password {
        connect = connect.password(password);
    }
    // Without a database the server would pick one named after the user.
    connect = connect.database(database.unwrap_or("postgres"));
    if let Some(ca) = &options.ssl.ca {
        connect = connect.ssl_root_cert(ca);
    }
    if let Some(cert) = &options.ssl.cert {
        connect = connect.ssl_client_cert(cert);
    }
    if let Some(key) = &options.ssl.key {
        connect = connect.ssl_client_key(key);
    }
    connect_within(
        runtime,
        options.connect_timeout,
        PgConnection::connect_with(&connect),
        connect_error,
    )
}

impl PostgresDriver {
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        let runtime = super::runtime()?;
        let conn = open(&runtime, options, options.database.as_deref())?;
        let mut driver = Self {
            runtime,
            conn: Some(conn),
            options: options.clone(),
            codec: Codec::new(Backend::Postgres),
            database: options.database.clone(),
            schema: None,
            insert_id: None,
        };
        driver.read_session_flags()?;
        match options.schema.clone() {
            Some(schema) => driver.select_schema(&schema)?,
            None => driver.schema = driver.fetch_value("SELECT current_schema()")?.and_then(|v| v.to_text()),
        }
        Ok(driver)
    }

    fn read_session_flags(&mut self) -> Result<()> {
        let encoding = self
            .fetch_value("SHOW client_encoding")?
            .and_then(|v| v.to_text())
            .unwrap_or_default();
        if !encoding.eq_ignore_ascii_case("UTF8") {
            tracing::debug!(%encoding, "switching client encoding to UTF8");
            self.run("SET client_encoding TO 'UTF8'")?;
        }
        let conforming = self
            .fetch_value("SHOW standard_conforming_strings")?
            .and_then(|v| v.to_text())
            .unwrap_or_else(|| "on".to_string());
        let banner = self
            .fetch_value("SHOW server_version")?
            .and_then(|v| v.to_text())
            .unwrap_or_default();
        self.codec = Codec::new(Backend::Postgres)
            .with_server(ServerInfo::from_banner(banner))
            .with_backslash_escapes(conforming.eq_ignore_ascii_case("off"));
        Ok(())
    }

    /// Schema literal for catalog filters.
    fn schema_literal(&self) -> String {
        match &self.schema {
            Some(schema) => self.codec.quote_literal(schema),
            None => "current_schema()".to_string(),
        }
    }
}

impl Driver for PostgresDriver {
    fn backend(&self) -> Backend {
        Backend::Postgres
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
        Ok(Box::new(SqlxCursor::<sqlx::Postgres>::new(
            &self.runtime,
            stream,
            &mut self.insert_id,
        )))
    }

    fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn current_schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// PostgreSQL binds a connection to one database; reconnect.
    fn select_database(&mut self, name: &str) -> Result<()> {
        let conn = open(&self.runtime, &self.options, Some(name))?;
        if let Some(old) = self.conn.replace(conn) {
            if let Err(err) = self.runtime.block_on(old.close()) {
                tracing::debug!(error = %err, "closing previous connection");
            }
        }
        self.database = Some(name.to_string());
        self.schema = None;
        self.read_session_flags()?;
        self.schema = self.fetch_value("SELECT current_schema()")?.and_then(|v| v.to_text());
        Ok(())
    }

    fn select_schema(&mut self, name: &str) -> Result<()> {
        let sql = format!("SET search_path TO {}", self.codec.quote_identifier(name));
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

    fn create_database(&mut self, name: &str, collation: Option<&str>) -> Result<()> {
        let mut sql = format!("CREATE DATABASE {}", self.codec.quote_identifier(name));
        if let Some(collation) = collation {
            let collation = self.codec.quote_literal(collation);
            sql.push_str(&format!(" LC_COLLATE {} LC_CTYPE {} TEMPLATE template0", collation, collation));
        }
        self.run(&sql).map(|_| ())
    }

    fn drop_database(&mut self, name: &str) -> Result<()> {
        if self.database.as_deref() == Some(name) {
            return Err(Error::InvalidInput(format!(
                "Cannot drop the currently open database '{}'",
                name
            )));
        }
        let sql = format!("DROP DATABASE {}", self.codec.quote_identifier(name));
        self.run(&sql).map(|_| ())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            self.runtime.block_on(conn.close())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode(SslMode::VerifyFull), PgSslMode::VerifyFull));
        assert!(matches!(ssl_mode(SslMode::Prefer), PgSslMode::Prefer));
    }
}
