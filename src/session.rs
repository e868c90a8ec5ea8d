//! The connection a request works through.
//!
//! A [`Session`] owns one [`Driver`] and layers the admin operations on top
//! of it: catalog reads that degrade to empty results, generated CRUD, and
//! script execution.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::catalog;
use crate::codec::Codec;
use crate::config::ConnectOptions;
use crate::cursor::{ColumnMeta, ProjectedCursor, ResultCursor, Row};
use crate::dialect::{Backend, Pagination, ServerInfo};
use crate::driver::{self, DocumentMutation, Driver};
use crate::error::{Error, Result};
use crate::model::{Column, ForeignKey, Index, Routine, RowIdentity, Table, Trigger, TypeCategory};
use crate::query::{
    Assignment, Predicate, SelectItem, SelectQuery, UpsertPlan, build_count, build_delete, build_insert,
    build_select, build_update, build_upsert,
};
use crate::script::{self, Report, ScriptObserver, ScriptOptions};
use crate::value::Value;

/// Where a connection is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    SchemaSelected,
    Closed,
    /// Carries the native error text.
    Error(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::SchemaSelected => f.write_str("schema selected"),
            Self::Closed => f.write_str("closed"),
            Self::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Database names shared between requests.
///
/// Clones share one slot; the last writer wins.
#[derive(Debug, Clone, Default)]
pub struct DatabaseCache {
    names: Arc<Mutex<Option<Vec<String>>>>,
}

impl DatabaseCache {
    pub fn get(&self) -> Option<Vec<String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, names: Vec<String>) {
        *self.names.lock().unwrap_or_else(PoisonError::into_inner) = Some(names);
    }

    pub fn invalidate(&self) {
        *self.names.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// One open connection plus everything the admin screens ask of it.
pub struct Session {
    driver: Box<dyn Driver>,
    state: ConnectionState,
    cache: DatabaseCache,
    /// SQL behind the cursor most recently returned by [`Session::select`].
    last_query: String,
}

impl Session {
    /// Connect with a fresh database-name cache.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let options = ConnectOptions::from_url("postgres://app@localhost/shop")?;
    /// let mut session = Session::connect(&options)?;
    /// for table in session.list_tables() {
    ///     println!("{}", table.name);
    /// }
    /// ```
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        Self::with_cache(options, DatabaseCache::default())
    }

    /// Connect sharing `cache` with other sessions.
    pub fn with_cache(options: &ConnectOptions, cache: DatabaseCache) -> Result<Self> {
        tracing::debug!(state = %ConnectionState::Connecting, backend = %options.backend, "session");
        let driver = driver::connect(options)?;
        // Drivers apply a requested schema while connecting.
        let state = if options.schema.is_some() && driver.current_schema().is_some() {
            ConnectionState::SchemaSelected
        } else {
            ConnectionState::Connected
        };
        Ok(Self {
            driver,
            state,
            cache,
            last_query: String::new(),
        })
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn backend(&self) -> Backend {
        self.driver.backend()
    }

    pub fn codec(&self) -> &Codec {
        self.driver.codec()
    }

    pub fn server_info(&self) -> &ServerInfo {
        self.driver.server_info()
    }

    pub fn options(&self) -> &ConnectOptions {
        self.driver.options()
    }

    pub fn database_cache(&self) -> &DatabaseCache {
        &self.cache
    }

    pub fn current_database(&self) -> Option<&str> {
        self.driver.current_database()
    }

    pub fn current_schema(&self) -> Option<&str> {
        self.driver.current_schema()
    }

    /// SQL generated for the last [`Session::select`].
    pub fn last_query(&self) -> &str {
        &self.last_query
    }

    pub(crate) fn driver_mut(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    /// Switch databases; PostgreSQL and SQLite reopen the connection.
    pub fn select_database(&mut self, name: &str) -> Result<()> {
        match self.driver.select_database(name) {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                if matches!(err, Error::Connect(_)) {
                    self.state = ConnectionState::Error(err.to_string());
                }
                Err(err)
            }
        }
    }

    pub fn select_schema(&mut self, name: &str) -> Result<()> {
        self.driver.select_schema(name)?;
        self.state = ConnectionState::SchemaSelected;
        Ok(())
    }

    // ===== Catalog =====

    /// Database names, served from the shared cache when filled.
    pub fn databases(&mut self) -> Vec<String> {
        if let Some(names) = self.cache.get() {
            return names;
        }
        let names = degrade(self.driver.databases(), "databases");
        if !names.is_empty() {
            self.cache.set(names.clone());
        }
        names
    }

    pub fn schemas(&mut self) -> Vec<String> {
        if !self.codec().dialect().supports_schemas() {
            return Vec::new();
        }
        degrade(self.driver.schemas(), "schemas")
    }

    pub fn list_tables(&mut self) -> Vec<Table> {
        degrade(self.driver.tables(), "tables")
    }

    pub fn table_info(&mut self, table: &str) -> Option<Table> {
        self.list_tables().into_iter().find(|t| t.name == table)
    }

    pub fn columns(&mut self, table: &str) -> Vec<Column> {
        degrade(self.driver.columns(table), "columns")
    }

    pub fn indexes(&mut self, table: &str) -> Vec<Index> {
        degrade(self.driver.indexes(table), "indexes")
    }

    pub fn foreign_keys(&mut self, table: &str) -> Vec<ForeignKey> {
        degrade(self.driver.foreign_keys(table), "foreign keys")
    }

    pub fn triggers(&mut self, table: &str) -> Vec<Trigger> {
        degrade(self.driver.triggers(table), "triggers")
    }

    pub fn routines(&mut self) -> Vec<Routine> {
        degrade(self.driver.routines(), "routines")
    }

    /// Columns the edit screens use to address a single row.
    pub fn row_identity(&mut self, table: &str) -> Option<RowIdentity> {
        let columns = self.columns(table);
        let indexes = self.indexes(table);
        catalog::row_identity(self.backend(), &columns, &indexes)
    }

    // ===== Rows =====

    fn pages_natively(&self) -> bool {
        self.codec().dialect().pagination() == Pagination::Native
    }

    /// Run the select form's query.
    ///
    /// The cursor describes the expected columns from the catalog even when
    /// no row comes back.
    pub fn select(&mut self, query: &SelectQuery) -> Result<Box<dyn ResultCursor + '_>> {
        let fields = self.columns(&query.table);
        let expected = expected_columns(&fields, query);

        if self.pages_natively() {
            self.last_query.clear();
            let inner = self.driver.select_documents(&fields, query)?;
            return Ok(Box::new(ProjectedCursor::new(inner, query.table.clone(), expected)));
        }

        let built = build_select(self.driver.codec(), &fields, query)?;
        self.last_query = built.sql;
        tracing::debug!(sql = %self.last_query, skip = built.skip, "select");
        let mut cursor = self.driver.execute(&self.last_query)?;
        if built.skip > 0 {
            cursor.skip(built.skip)?;
        }
        Ok(Box::new(ProjectedCursor::new(cursor, query.table.clone(), expected)))
    }

    pub fn insert(&mut self, table: &str, assignments: &[Assignment]) -> Result<u64> {
        let fields = self.columns(table);
        if self.pages_natively() {
            let mutation = DocumentMutation::Insert {
                table: table.to_string(),
                values: assignments.to_vec(),
            };
            return self.driver.mutate_documents(&fields, mutation);
        }
        let sql = build_insert(self.codec(), &fields, table, assignments)?;
        self.run(&sql)
    }

    pub fn update(
        &mut self,
        table: &str,
        assignments: &[Assignment],
        predicates: &[Predicate],
        limit_to_one: bool,
    ) -> Result<u64> {
        let fields = self.columns(table);
        if self.pages_natively() {
            let mutation = DocumentMutation::Update {
                table: table.to_string(),
                values: assignments.to_vec(),
                predicates: predicates.to_vec(),
                limit_to_one,
            };
            return self.driver.mutate_documents(&fields, mutation);
        }
        let sql = build_update(self.codec(), &fields, table, assignments, predicates, limit_to_one)?;
        self.run(&sql)
    }

    pub fn delete(&mut self, table: &str, predicates: &[Predicate], limit_to_one: bool) -> Result<u64> {
        let fields = self.columns(table);
        if self.pages_natively() {
            let mutation = DocumentMutation::Delete {
                table: table.to_string(),
                predicates: predicates.to_vec(),
                limit_to_one,
            };
            return self.driver.mutate_documents(&fields, mutation);
        }
        let sql = build_delete(self.codec(), &fields, table, predicates, limit_to_one)?;
        self.run(&sql)
    }

    /// Insert rows, updating those whose `key` columns already exist.
    pub fn insert_or_update(&mut self, table: &str, rows: &[Vec<Assignment>], key: &[String]) -> Result<u64> {
        let fields = self.columns(table);
        if self.pages_natively() {
            let mutation = DocumentMutation::Upsert {
                table: table.to_string(),
                rows: rows.to_vec(),
                key: key.to_vec(),
            };
            return self.driver.mutate_documents(&fields, mutation);
        }
        match build_upsert(self.codec(), &fields, table, rows, key)? {
            UpsertPlan::Single(sql) => self.run(&sql),
            UpsertPlan::PerRow(pairs) => {
                let mut affected = 0;
                for (update, insert) in pairs {
                    let touched = self.run(&update)?;
                    affected += if touched == 0 { self.run(&insert)? } else { touched };
                }
                Ok(affected)
            }
        }
    }

    pub fn last_insert_id(&mut self) -> Result<Option<Value>> {
        self.driver.last_insert_id()
    }

    /// Execution plan rows for `sql`.
    pub fn explain(&mut self, sql: &str) -> Result<Vec<Row>> {
        let plan = self
            .codec()
            .dialect()
            .explain(sql)
            .ok_or_else(|| Error::unsupported(self.backend().name(), "EXPLAIN"))?;
        for statement in &plan.setup {
            self.run(statement)?;
        }
        let rows = self.driver.fetch_all(&plan.query);
        for statement in &plan.teardown {
            if let Err(err) = self.run(statement) {
                tracing::debug!(error = %err, statement = %statement, "explain teardown failed");
            }
        }
        rows
    }

    /// Row count of `table` under `predicates`.
    ///
    /// Without predicates this is the catalog's estimate when it has one.
    pub fn approximate_row_count(&mut self, table: &str, predicates: &[Predicate]) -> Result<Option<u64>> {
        if predicates.is_empty() {
            if let Some(rows) = self.table_info(table).and_then(|t| t.rows) {
                return Ok(Some(rows));
            }
        }
        if self.pages_natively() {
            return Ok(None);
        }
        let fields = self.columns(table);
        let mut query = SelectQuery::new(table);
        query.predicates = predicates.to_vec();
        let sql = build_count(self.codec(), &fields, &query)?;
        let count = self.driver.fetch_value(&sql)?;
        Ok(count.and_then(|v| v.as_i64()).and_then(|n| u64::try_from(n).ok()))
    }

    // ===== DDL =====

    pub fn create_database(&mut self, name: &str, collation: Option<&str>) -> Result<()> {
        let result = self.driver.create_database(name, collation);
        self.cache.invalidate();
        result
    }

    /// Drop every named database, stopping at the first failure.
    pub fn drop_databases(&mut self, names: &[String]) -> Result<()> {
        let result = names.iter().try_for_each(|name| self.driver.drop_database(name));
        self.cache.invalidate();
        result
    }

    pub fn truncate_tables(&mut self, tables: &[String]) -> Result<()> {
        for table in tables {
            if self.pages_natively() {
                let mutation = DocumentMutation::Delete {
                    table: table.clone(),
                    predicates: Vec::new(),
                    limit_to_one: false,
                };
                self.driver.mutate_documents(&[], mutation)?;
            } else {
                let sql = self.codec().dialect().truncate_sql(&self.codec().quote_identifier(table));
                self.run(&sql)?;
            }
        }
        Ok(())
    }

    /// Drop tables and views, each with the statement its kind needs.
    pub fn drop_tables(&mut self, tables: &[String]) -> Result<()> {
        if self.pages_natively() {
            return Err(Error::unsupported(self.backend().name(), "DROP TABLE"));
        }
        let known = self.list_tables();
        for name in tables {
            let view = known.iter().any(|t| &t.name == name && t.kind.is_view());
            let sql = format!(
                "DROP {} {}",
                if view { "VIEW" } else { "TABLE" },
                self.codec().quote_identifier(name)
            );
            self.run(&sql)?;
        }
        Ok(())
    }

    // ===== Scripts =====

    /// Split `text` into statements and run them in order.
    pub fn run_script(
        &mut self,
        text: &str,
        options: &ScriptOptions,
        observer: &mut dyn ScriptObserver,
    ) -> Result<Report> {
        script::execute(self, text, options, observer)
    }

    fn run(&mut self, sql: &str) -> Result<u64> {
        tracing::debug!(sql = %sql, "run");
        self.driver.run(sql)
    }

    pub fn close(&mut self) -> Result<()> {
        match self.driver.close() {
            Ok(()) => {
                self.state = ConnectionState::Closed;
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Error(err.to_string());
                Err(err)
            }
        }
    }
}

/// Catalog reads never fail the caller.
fn degrade<T>(result: Result<Vec<T>>, what: &str) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(err) => {
            tracing::debug!(error = %err, what, "catalog read degraded");
            Vec::new()
        }
    }
}

fn column_meta(table: &str, field: &Column) -> ColumnMeta {
    let mut meta = ColumnMeta::new(field.name.clone(), field.raw_type.clone())
        .binary(field.category == TypeCategory::Binary);
    meta.origin_table = Some(table.to_string());
    meta.origin_column = Some(field.name.clone());
    meta
}

/// Result columns the query should produce, described from the catalog.
fn expected_columns(fields: &[Column], query: &SelectQuery) -> Vec<ColumnMeta> {
    if query.projection.is_empty() {
        return fields.iter().map(|f| column_meta(&query.table, f)).collect();
    }
    query
        .projection
        .iter()
        .map(|item| match item {
            SelectItem::Column(name) => match fields.iter().find(|f| &f.name == name) {
                Some(field) => column_meta(&query.table, field),
                None => ColumnMeta::new(name.clone(), ""),
            },
            SelectItem::Aggregate { func, column } => {
                let argument = column.as_deref().unwrap_or("*");
                ColumnMeta::new(format!("{}({})", func, argument), "")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_database_cache_is_shared() {
        let cache = DatabaseCache::default();
        let clone = cache.clone();
        assert_eq!(cache.get(), None);
        clone.set(vec!["app".into()]);
        assert_eq!(cache.get(), Some(vec!["app".to_string()]));
        cache.invalidate();
        assert_eq!(clone.get(), None);
    }

    #[test]
    fn test_expected_columns() {
        let fields = vec![Column::new("id", "int"), Column::new("data", "blob")];
        let query = SelectQuery::new("t")
            .select(SelectItem::column("data"))
            .select(SelectItem::aggregate("COUNT", None));
        let expected = expected_columns(&fields, &query);
        assert_eq!(expected.len(), 2);
        assert_eq!(expected[0].origin_table.as_deref(), Some("t"));
        assert!(expected[0].is_binary);
        assert_eq!(expected[1].name, "COUNT(*)");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::SchemaSelected.to_string(), "schema selected");
        assert_eq!(ConnectionState::Error("gone".into()).to_string(), "error: gone");
    }
}
