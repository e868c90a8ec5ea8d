//! MySQL and MariaDB over sqlx.

mod catalog;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
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
use crate::value::Value;

const PREFERRED_CHARSET: &str = "utf8mb4";

pub struct MySqlDriver {
    runtime: Runtime,
    conn: Option<MySqlConnection>,
    options: ConnectOptions,
    codec: Codec,
    database: Option<String>,
    charset: String,
    last_insert_id: Option<i64>,
}

fn ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::Disable => MySqlSslMode::Disabled,
        SslMode::Prefer => MySqlSslMode::Preferred,
        SslMode::Require => MySqlSslMode::Required,
        SslMode::VerifyCa => MySqlSslMode::VerifyCa,
        SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
    }
}

fn is_charset_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn open(runtime: &Runtime, options: &ConnectOptions, charset: &str) -> Result<MySqlConnection> {
    let mut connect = MySqlConnectOptions::new()
        .host(&options.host)
        .port(options.effective_port().unwrap_or(3306))
        .charset(charset)
        .ssl_mode(ssl_mode(options.ssl.mode));
    if let Some(user) = &options.user {
        connect = connect.username(user);
    }
    if let Some(password) = &options.password {
        connect = connect.password(password);
    }
    if let Some(database) = &options.database {
        connect = connect.database(database);
    }
    if let Some(ca) = &options.ssl.ca {
        connect = connect.ssl_ca(ca);
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
        MySqlConnection::connect_with(&connect),
        connect_error,
    )
}

impl MySqlDriver {
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        let runtime = super::runtime()?;
        let requested = options
            .charset
            .clone()
            .unwrap_or_else(|| PREFERRED_CHARSET.to_string());
        if !is_charset_name(&requested) {
            return Err(Error::Config(format!("Bad charset name '{}'", requested)));
        }

        let (conn, charset) = match open(&runtime, options, &requested) {
            Err(Error::Connect(message))
                if requested == PREFERRED_CHARSET
                    && message.to_ascii_lowercase().contains("character set") =>
            {
                tracing::debug!(%message, "server rejected utf8mb4, retrying with utf8");
                (open(&runtime, options, "utf8")?, "utf8".to_string())
            }
            other => (other?, requested),
        };

        let mut driver = Self {
            runtime,
            conn: Some(conn),
            options: options.clone(),
            codec: Codec::new(Backend::MySql),
            database: options.database.clone(),
            charset,
            last_insert_id: None,
        };
        driver.restore_session_defaults();
        driver.negotiate_charset()?;
        driver.read_session_flags()?;
        Ok(driver)
    }

    /// The client library adjusts `time_zone` and `sql_mode` on connect;
    /// put back the server's own settings.
    fn restore_session_defaults(&mut self) {
        if let Err(err) = self.run("SET time_zone = @@GLOBAL.time_zone, sql_mode = @@GLOBAL.sql_mode") {
            tracing::debug!(error = %err, "keeping client session defaults");
        }
    }

    /// Re-apply the charset when the server silently narrowed it.
    fn negotiate_charset(&mut self) -> Result<()> {
        let accepted = self
            .fetch_value("SELECT @@character_set_client")?
            .and_then(|v| v.to_text())
            .unwrap_or_default();
        if accepted.eq_ignore_ascii_case(&self.charset) {
            return Ok(());
        }
        tracing::debug!(requested = %self.charset, %accepted, "charset narrowed, re-applying");
        let sql = format!("SET NAMES {}", self.charset);
        if let Err(err) = self.run(&sql) {
            tracing::debug!(error = %err, "keeping narrowed charset");
            self.charset = accepted;
        }
        Ok(())
    }

    fn read_session_flags(&mut self) -> Result<()> {
        let banner = self
            .fetch_value("SELECT VERSION()")?
            .and_then(|v| v.to_text())
            .unwrap_or_default();
        let sql_mode = self
            .fetch_value("SELECT @@sql_mode")?
            .and_then(|v| v.to_text())
            .unwrap_or_default();
        let backslash_escapes = !sql_mode.to_ascii_uppercase().contains("NO_BACKSLASH_ESCAPES");
        self.codec = Codec::new(Backend::MySql)
            .with_server(ServerInfo::from_banner(banner))
            .with_backslash_escapes(backslash_escapes);
        Ok(())
    }

    /// Negotiated client charset.
    pub fn charset(&self) -> &str {
        &self.charset
    }
}

impl Driver for MySqlDriver {
    fn backend(&self) -> Backend {
        Backend::MySql
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
        Ok(Box::new(SqlxCursor::<sqlx::MySql>::new(
            &self.runtime,
            stream,
            &mut self.last_insert_id,
        )))
    }

    fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn select_database(&mut self, name: &str) -> Result<()> {
        let sql = format!("USE {}", self.codec.quote_identifier(name));
        self.run(&sql)?;
        self.database = Some(name.to_string());
        Ok(())
    }

    fn databases(&mut self) -> Result<Vec<String>> {
        catalog::databases(self)
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

    fn last_insert_id(&mut self) -> Result<Option<Value>> {
        Ok(self.last_insert_id.map(Value::Int))
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
    fn test_charset_names() {
        assert!(is_charset_name("utf8mb4"));
        assert!(!is_charset_name("utf8; DROP"));
        assert!(!is_charset_name(""));
    }

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode(SslMode::VerifyFull), MySqlSslMode::VerifyIdentity));
        assert!(matches!(ssl_mode(SslMode::Disable), MySqlSslMode::Disabled));
    }
}
