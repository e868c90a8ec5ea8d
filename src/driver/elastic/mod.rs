//! Elasticsearch over its REST API (`reqwest` blocking client).
//!
//! Indices act as tables and mapping properties as columns, with nested
//! objects flattened to dotted names. Raw statements are either SQL, run
//! through the `_sql` endpoint with cursor paging, or a REST call written as
//! `METHOD /path` followed by an optional JSON body on the next lines.

mod query;

use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Map, Value as Json, json};
use std::collections::VecDeque;
use std::sync::Arc;

use super::{DocumentMutation, Driver, closed};
use crate::codec::Codec;
use crate::config::{ConnectOptions, SslMode};
use crate::cursor::{BufferedCursor, ColumnMeta, ResultCursor, ResultSet};
use crate::dialect::{Backend, ServerInfo};
use crate::error::{Error, Result};
use crate::model::{Column, Index, IndexColumn, IndexKind, Table, TableKind};
use crate::query::{Assignment, Predicate, SelectItem, SelectQuery};
use crate::value::Value;

const ID: &str = "_id";

/// Rows per `_sql` page.
const FETCH_SIZE: u64 = 1000;

/// Default `max_result_window`; deeper pages need scrolling.
const MAX_WINDOW: u64 = 10_000;

pub struct ElasticDriver {
    client: Option<Client>,
    base: String,
    options: ConnectOptions,
    codec: Codec,
    database: String,
    last_insert_id: Option<Value>,
}

/// HTTP transport shared by the driver and its SQL cursor.
struct Transport<'a> {
    client: &'a Client,
    base: &'a str,
    options: &'a ConnectOptions,
}

impl Transport<'_> {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{}", self.base, path));
        match &self.options.user {
            Some(user) => request.basic_auth(user, self.options.password.as_ref()),
            None => request,
        }
    }

    /// Send a request and decode the JSON reply, turning error replies
    /// into statement errors with the server's reason.
    fn send(&self, method: Method, path: &str, body: Option<&Json>) -> Result<Json> {
        tracing::debug!(%method, path, "request");
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        let reply: Json = if text.trim().is_empty() {
            Json::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Json::String(text))
        };
        if status.is_success() {
            return Ok(reply);
        }
        let reason = reply
            .pointer("/error/reason")
            .and_then(Json::as_str)
            .map(str::to_string)
            .or_else(|| reply.pointer("/error").and_then(Json::as_str).map(str::to_string))
            .unwrap_or_else(|| reply.to_string());
        Err(Error::statement_with_code(status.as_u16().to_string(), reason))
    }
}

impl ElasticDriver {
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        let scheme = match options.ssl.mode {
            SslMode::Disable | SslMode::Prefer => "http",
            _ => "https",
        };
        let mut builder = Client::builder().danger_accept_invalid_certs(options.ssl.mode == SslMode::Require);
        if let Some(timeout) = options.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(ca) = &options.ssl.ca {
            let pem = std::fs::read(ca)?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|err| Error::Config(err.to_string()))?;
            builder = builder.add_root_certificate(certificate);
        }
        let client = builder.build().map_err(|err| Error::Connect(err.to_string()))?;
        let base = format!(
            "{}://{}:{}",
            scheme,
            options.host,
            options.effective_port().unwrap_or(9200)
        );

        let mut driver = Self {
            client: Some(client),
            base,
            options: options.clone(),
            codec: Codec::new(Backend::Elasticsearch),
            database: options.database.clone().unwrap_or_else(|| "elasticsearch".to_string()),
            last_insert_id: None,
        };
        let root = driver
            .transport()?
            .send(Method::GET, "/", None)
            .map_err(|err| Error::Connect(err.to_string()))?;
        let banner = root
            .pointer("/version/number")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();
        driver.codec = Codec::new(Backend::Elasticsearch).with_server(ServerInfo::from_banner(banner));
        Ok(driver)
    }

    fn transport(&self) -> Result<Transport<'_>> {
        Ok(Transport {
            client: self.client.as_ref().ok_or_else(closed)?,
            base: &self.base,
            options: &self.options,
        })
    }

    fn send(&self, method: Method, path: &str, body: Option<&Json>) -> Result<Json> {
        self.transport()?.send(method, path, body)
    }

    fn mapping(&self, index: &str) -> Result<Vec<(String, String)>> {
        let reply = self.send(Method::GET, &format!("/{}/_mapping", encode(index)), None)?;
        let mut fields = Vec::new();
        if let Some(indices) = reply.as_object() {
            for body in indices.values() {
                if let Some(properties) = body.pointer("/mappings/properties") {
                    flatten_properties("", properties, &mut fields);
                }
            }
        }
        Ok(fields)
    }
}

/// Percent-encode one path segment.
fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

/// Mapping properties as `(dotted.name, type)` pairs.
fn flatten_properties(prefix: &str, properties: &Json, out: &mut Vec<(String, String)>) {
    let Some(properties) = properties.as_object() else {
        return;
    };
    for (name, definition) in properties {
        let full = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        match definition.get("properties") {
            Some(nested) if definition.get("type").and_then(Json::as_str) != Some("nested") => {
                flatten_properties(&full, nested, out);
            }
            _ => {
                let ty = definition.get("type").and_then(Json::as_str).unwrap_or("object");
                out.push((full, ty.to_string()));
            }
        }
    }
}

/// Split `GET /index/_search\n{...}` into method, path and body.
fn parse_rest(statement: &str) -> Option<(Method, String, Option<Json>)> {
    let statement = statement.trim();
    let (first, rest) = statement.split_once('\n').unwrap_or((statement, ""));
    let (method, path) = first.trim().split_once(char::is_whitespace)?;
    let method = match method.to_ascii_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        "HEAD" => Method::HEAD,
        _ => return None,
    };
    let path = path.trim();
    if !path.starts_with('/') {
        return None;
    }
    let body = match rest.trim() {
        "" => None,
        text => Some(serde_json::from_str(text).ok()?),
    };
    Some((method, path.to_string(), body))
}

/// `_source` value at a dotted path.
fn source_value(source: &Json, path: &str) -> Value {
    if let Some(direct) = source.get(path) {
        return Value::from_json(direct.clone());
    }
    let mut current = source;
    for part in path.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    Value::from_json(current.clone())
}

/// Hits of a `_search` reply as rows over `names`.
fn hit_rows(reply: &Json, names: &[String]) -> Vec<Vec<Value>> {
    let empty = Vec::new();
    let hits = reply
        .pointer("/hits/hits")
        .and_then(Json::as_array)
        .unwrap_or(&empty);
    hits.iter()
        .map(|hit| {
            let source = hit.get("_source").cloned().unwrap_or(Json::Null);
            names
                .iter()
                .map(|name| match name.as_str() {
                    ID => hit.get(ID).cloned().map(Value::from_json).unwrap_or(Value::Null),
                    _ => source_value(&source, name),
                })
                .collect()
        })
        .collect()
}

/// Any JSON reply as one result set.
fn reply_set(reply: Json) -> ResultSet {
    if reply.pointer("/hits/hits").is_some() {
        let mut names = vec![ID.to_string()];
        if let Some(hits) = reply.pointer("/hits/hits").and_then(Json::as_array) {
            for hit in hits {
                if let Some(source) = hit.get("_source").and_then(Json::as_object) {
                    for key in source.keys() {
                        if !names.contains(key) {
                            names.push(key.clone());
                        }
                    }
                }
            }
        }
        let rows = hit_rows(&reply, &names);
        let columns = names.into_iter().map(|n| ColumnMeta::new(n, "json")).collect();
        return ResultSet::rows(columns, rows);
    }
    match reply {
        Json::Object(map) => {
            let columns = map.keys().map(|k| ColumnMeta::new(k.clone(), "json")).collect();
            let row = map.into_iter().map(|(_, v)| Value::from_json(v)).collect::<Vec<_>>();
            ResultSet::rows(columns, [row])
        }
        Json::Array(items) => {
            let names: Vec<String> = items
                .iter()
                .filter_map(Json::as_object)
                .flat_map(|o| o.keys().cloned())
                .fold(Vec::new(), |mut names, key| {
                    if !names.contains(&key) {
                        names.push(key);
                    }
                    names
                });
            let rows: Vec<Vec<Value>> = items
                .iter()
                .map(|item| {
                    names
                        .iter()
                        .map(|n| item.get(n).cloned().map(Value::from_json).unwrap_or(Value::Null))
                        .collect()
                })
                .collect();
            let columns = names.into_iter().map(|n| ColumnMeta::new(n, "json")).collect();
            ResultSet::rows(columns, rows)
        }
        other => ResultSet::rows(vec![ColumnMeta::new("result", "json")], [vec![Value::from_json(other)]]),
    }
}

fn source_document(values: &[Assignment]) -> Json {
    let map: Map<String, Json> = values
        .iter()
        .filter(|(name, _)| name != ID)
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    Json::Object(map)
}

/// The document id when the predicates are exactly `_id = value`.
fn single_id(predicates: &[Predicate]) -> Option<&str> {
    match predicates {
        [only] if only.column.as_deref() == Some(ID) && only.op == crate::dialect::Operator::Eq => {
            Some(only.value.as_str())
        }
        _ => None,
    }
}

/// Painless script assigning each value through params.
fn update_script(values: &[Assignment]) -> Json {
    let mut source = String::new();
    let mut params = Map::new();
    for (i, (name, value)) in values.iter().filter(|(name, _)| name != ID).enumerate() {
        source.push_str(&format!("ctx._source[params.k{i}] = params.v{i}; "));
        params.insert(format!("k{}", i), Json::String(name.clone()));
        params.insert(format!("v{}", i), value.to_json());
    }
    json!({ "source": source.trim_end(), "lang": "painless", "params": params })
}

fn count(reply: &Json, field: &str) -> u64 {
    reply.get(field).and_then(Json::as_u64).unwrap_or(0)
}

impl Driver for ElasticDriver {
    fn backend(&self) -> Backend {
        Backend::Elasticsearch
    }

    fn options(&self) -> &ConnectOptions {
        &self.options
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> Result<Box<dyn ResultCursor + 'a>> {
        tracing::debug!(sql, "execute");
        if let Some((method, path, body)) = parse_rest(sql) {
            let reply = self.send(method, &path, body.as_ref())?;
            if let Some(id) = reply.get(ID).and_then(Json::as_str) {
                self.last_insert_id = Some(Value::Text(id.to_string()));
            }
            return Ok(Box::new(BufferedCursor::single(reply_set(reply))));
        }
        let transport = self.transport()?;
        let body = json!({ "query": sql.trim().trim_end_matches(';'), "fetch_size": FETCH_SIZE });
        let reply = transport.send(Method::POST, "/_sql?format=json", Some(&body))?;
        Ok(Box::new(SqlCursor::new(transport, reply)))
    }

    fn current_database(&self) -> Option<&str> {
        Some(&self.database)
    }

    /// A cluster has a single namespace; the name is only a label.
    fn select_database(&mut self, name: &str) -> Result<()> {
        self.database = name.to_string();
        Ok(())
    }

    fn databases(&mut self) -> Result<Vec<String>> {
        Ok(vec![self.database.clone()])
    }

    fn tables(&mut self) -> Result<Vec<Table>> {
        let reply = self.send(Method::GET, "/_cat/indices?format=json&bytes=b", None)?;
        let mut tables: Vec<Table> = reply
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| {
                let name = entry.get("index")?.as_str()?;
                if name.starts_with('.') {
                    return None;
                }
                let number = |key: &str| entry.get(key).and_then(Json::as_str).and_then(|n| n.parse().ok());
                let mut table = Table::new(name, TableKind::Table);
                table.rows = number("docs.count");
                table.data_length = number("store.size");
                Some(table)
            })
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    fn columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let mut id = Column::new(ID, "keyword");
        id.primary = true;
        id.nullable = false;
        let mut columns = vec![id];
        columns.extend(self.mapping(table)?.into_iter().map(|(name, ty)| Column::new(name, ty)));
        Ok(columns)
    }

    fn indexes(&mut self, _table: &str) -> Result<Vec<Index>> {
        let mut primary = Index::new("_id", IndexKind::Primary);
        primary.columns.push(IndexColumn {
            name: ID.to_string(),
            prefix: None,
            descending: false,
        });
        Ok(vec![primary])
    }

    fn last_insert_id(&mut self) -> Result<Option<Value>> {
        Ok(self.last_insert_id.clone())
    }

    fn create_database(&mut self, name: &str, _collation: Option<&str>) -> Result<()> {
        self.send(Method::PUT, &format!("/{}", encode(name)), None).map(|_| ())
    }

    fn drop_database(&mut self, name: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("/{}", encode(name)), None).map(|_| ())
    }

    fn select_documents<'a>(
        &'a mut self,
        fields: &[Column],
        select: &SelectQuery,
    ) -> Result<Box<dyn ResultCursor + 'a>> {
        let mut names = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::Column(name) => names.push(name.clone()),
                SelectItem::Aggregate { .. } => {
                    return Err(Error::unsupported(Backend::Elasticsearch.name(), "aggregate functions"));
                }
            }
        }
        if names.is_empty() {
            names = fields.iter().map(|f| f.name.clone()).collect();
        }

        let size = select.page_size().unwrap_or(MAX_WINDOW);
        let mut body = json!({
            "from": select.offset(),
            "size": size.min(MAX_WINDOW),
            "query": query::build(fields, &select.predicates)?,
        });
        if !select.projection.is_empty() {
            let source: Vec<&String> = names.iter().filter(|n| n.as_str() != ID).collect();
            body["_source"] = json!(source);
        }
        if !select.order.is_empty() {
            let sort: Vec<Json> = select
                .order
                .iter()
                .map(|o| {
                    let direction = if o.descending { "desc" } else { "asc" };
                    json!({ o.column.as_str(): direction })
                })
                .collect();
            body["sort"] = Json::Array(sort);
        }

        let reply = self.send(Method::POST, &format!("/{}/_search", encode(&select.table)), Some(&body))?;
        let rows = hit_rows(&reply, &names);
        let columns = names
            .iter()
            .map(|name| {
                let ty = fields
                    .iter()
                    .find(|f| &f.name == name)
                    .map(|f| f.raw_type.clone())
                    .unwrap_or_else(|| "json".to_string());
                let mut meta = ColumnMeta::new(name.clone(), ty.clone()).binary(ty == "binary");
                meta.origin_table = Some(select.table.clone());
                meta.origin_column = Some(name.clone());
                meta
            })
            .collect();
        Ok(Box::new(BufferedCursor::single(ResultSet::rows(columns, rows))))
    }

    fn mutate_documents(&mut self, fields: &[Column], mutation: DocumentMutation) -> Result<u64> {
        match mutation {
            DocumentMutation::Insert { table, values } => {
                let reply = self.send(
                    Method::POST,
                    &format!("/{}/_doc?refresh=true", encode(&table)),
                    Some(&source_document(&values)),
                )?;
                self.last_insert_id = reply.get(ID).and_then(Json::as_str).map(Value::from);
                Ok(1)
            }
            DocumentMutation::Update {
                table,
                values,
                predicates,
                limit_to_one,
            } => {
                if let Some(id) = single_id(&predicates) {
                    let body = json!({ "doc": source_document(&values) });
                    let path = format!("/{}/_update/{}?refresh=true", encode(&table), encode(id));
                    let reply = self.send(Method::POST, &path, Some(&body))?;
                    return Ok(u64::from(reply.get("result").and_then(Json::as_str) == Some("updated")));
                }
                let mut body = json!({
                    "query": query::build(fields, &predicates)?,
                    "script": update_script(&values),
                });
                if limit_to_one {
                    body["max_docs"] = json!(1);
                }
                let path = format!("/{}/_update_by_query?refresh=true&conflicts=proceed", encode(&table));
                Ok(count(&self.send(Method::POST, &path, Some(&body))?, "updated"))
            }
            DocumentMutation::Delete {
                table,
                predicates,
                limit_to_one,
            } => {
                if let Some(id) = single_id(&predicates) {
                    let path = format!("/{}/_doc/{}?refresh=true", encode(&table), encode(id));
                    let reply = self.send(Method::DELETE, &path, None)?;
                    return Ok(u64::from(reply.get("result").and_then(Json::as_str) == Some("deleted")));
                }
                let mut body = json!({ "query": query::build(fields, &predicates)? });
                if limit_to_one {
                    body["max_docs"] = json!(1);
                }
                let path = format!("/{}/_delete_by_query?refresh=true&conflicts=proceed", encode(&table));
                Ok(count(&self.send(Method::POST, &path, Some(&body))?, "deleted"))
            }
            DocumentMutation::Upsert { table, rows, .. } => {
                // Indexing by id replaces the stored document.
                let mut affected = 0;
                for row in rows {
                    let id = row
                        .iter()
                        .find(|(name, _)| name == ID)
                        .and_then(|(_, value)| value.to_text());
                    let source = source_document(&row);
                    let reply = match &id {
                        Some(id) => self.send(
                            Method::PUT,
                            &format!("/{}/_doc/{}?refresh=true", encode(&table), encode(id)),
                            Some(&source),
                        )?,
                        None => self.send(Method::POST, &format!("/{}/_doc?refresh=true", encode(&table)), Some(&source))?,
                    };
                    if let Some(id) = reply.get(ID).and_then(Json::as_str) {
                        self.last_insert_id = Some(Value::from(id));
                    }
                    affected += 1;
                }
                Ok(affected)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }
}

/// Pages through an `_sql` result, closing the server cursor when done.
struct SqlCursor<'a> {
    transport: Transport<'a>,
    columns: Vec<ColumnMeta>,
    names: Arc<[String]>,
    rows: VecDeque<Vec<Value>>,
    cursor: Option<String>,
}

impl<'a> SqlCursor<'a> {
    fn new(transport: Transport<'a>, reply: Json) -> Self {
        let columns: Vec<ColumnMeta> = reply
            .get("columns")
            .and_then(Json::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|c| {
                let name = c.get("name").and_then(Json::as_str).unwrap_or_default();
                let ty = c.get("type").and_then(Json::as_str).unwrap_or("json");
                ColumnMeta::new(name, ty).binary(ty == "binary")
            })
            .collect();
        let names = columns.iter().map(|c| c.name.clone()).collect();
        let mut cursor = Self {
            transport,
            columns,
            names,
            rows: VecDeque::new(),
            cursor: None,
        };
        cursor.absorb(reply);
        cursor
    }

    fn absorb(&mut self, reply: Json) {
        self.cursor = reply.get("cursor").and_then(Json::as_str).map(str::to_string);
        if let Some(Json::Array(rows)) = reply.get("rows") {
            for row in rows {
                let values = row
                    .as_array()
                    .map(|cells| cells.iter().cloned().map(Value::from_json).collect())
                    .unwrap_or_default();
                self.rows.push_back(values);
            }
        }
    }

    fn close_cursor(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            let body = json!({ "cursor": cursor });
            if let Err(err) = self.transport.send(Method::POST, "/_sql/close", Some(&body)) {
                tracing::debug!(error = %err, "closing SQL cursor");
            }
        }
    }
}

impl ResultCursor for SqlCursor<'_> {
    fn fetch_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.rows.is_empty() {
            if let Some(cursor) = self.cursor.take() {
                let body = json!({ "cursor": cursor });
                let reply = self.transport.send(Method::POST, "/_sql?format=json", Some(&body))?;
                self.absorb(reply);
            }
        }
        Ok(self.rows.pop_front())
    }

    fn column_count(&mut self) -> Result<usize> {
        Ok(self.columns.len())
    }

    fn describe_column(&mut self, index: usize) -> Result<Option<ColumnMeta>> {
        Ok(self.columns.get(index).cloned())
    }

    fn affected_rows(&self) -> Option<u64> {
        None
    }

    fn next_result(&mut self) -> Result<bool> {
        self.rows.clear();
        self.close_cursor();
        Ok(false)
    }

    fn column_names(&mut self) -> Result<Arc<[String]>> {
        Ok(self.names.clone())
    }
}

impl Drop for SqlCursor<'_> {
    fn drop(&mut self) {
        self.close_cursor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_rest() {
        let (method, path, body) = parse_rest("GET /logs/_search\n{\"size\": 1}").unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(path, "/logs/_search");
        assert_eq!(body, Some(json!({ "size": 1 })));

        assert!(parse_rest("SELECT * FROM logs").is_none());
        assert!(parse_rest("DELETE FROM logs").is_none());
    }

    #[test]
    fn test_flatten_properties() {
        let mapping = json!({
            "user": { "properties": { "name": { "type": "keyword" }, "age": { "type": "integer" } } },
            "tags": { "type": "nested", "properties": { "v": { "type": "text" } } },
            "at": { "type": "date" }
        });
        let mut fields = Vec::new();
        flatten_properties("", &mapping, &mut fields);
        fields.sort();
        assert_eq!(
            fields,
            vec![
                ("at".to_string(), "date".to_string()),
                ("tags".to_string(), "nested".to_string()),
                ("user.age".to_string(), "integer".to_string()),
                ("user.name".to_string(), "keyword".to_string()),
            ]
        );
    }

    #[test]
    fn test_hit_rows() {
        let reply = json!({ "hits": { "hits": [
            { "_id": "a1", "_source": { "user": { "name": "ann" }, "n": 3 } }
        ] } });
        let names = vec!["_id".to_string(), "user.name".to_string(), "n".to_string(), "x".to_string()];
        assert_eq!(
            hit_rows(&reply, &names),
            vec![vec![Value::from("a1"), Value::from("ann"), Value::Int(3), Value::Null]]
        );
    }

    #[test]
    fn test_update_script_uses_params() {
        let script = update_script(&[("_id".to_string(), Value::from("x")), ("name".to_string(), Value::from("b"))]);
        assert_eq!(script["source"], "ctx._source[params.k0] = params.v0;");
        assert_eq!(script["params"]["k0"], "name");
        assert_eq!(script["params"]["v0"], "b");
    }
}
