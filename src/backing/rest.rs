use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::backing::csv::coerce_text;
use crate::backing::{Backing, BackingError, CancelToken};
use crate::query::value::Value;
use crate::schema::{Catalog, SemanticType, Table};

/// GET endpoint serving the rows of one table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestRoute {
    /// Absolute URL.
    pub url: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// JSON pointer (RFC 6901) to the array of row objects; the document
    /// root when absent.
    #[serde(default)]
    pub pointer: Option<String>,
}

impl RestRoute {
    /// Route without headers or pointer.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Adds a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the JSON pointer to the row array.
    pub fn pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }
}

/// Tables served by HTTP endpoints returning JSON objects.
///
/// Object keys map to columns through the column's `json` tag option, then
/// the field name, then the column name.
pub struct RestBacking {
    catalog: Arc<Catalog>,
    agent: ureq::Agent,
    routes: RwLock<HashMap<String, RestRoute>>,
}

impl RestBacking {
    /// Backing with no routes and a 30 second request timeout.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_timeout(catalog, Duration::from_secs(30))
    }

    /// Backing with a custom request timeout.
    pub fn with_timeout(catalog: Arc<Catalog>, timeout: Duration) -> Self {
        Self {
            catalog,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the GET route serving `table`.
    pub fn get(&self, table: &str, route: RestRoute) -> Result<(), BackingError> {
        if self.catalog.table(table).is_none() {
            return Err(BackingError::UnknownTable {
                table: table.to_owned(),
            });
        }
        if route.url.is_empty() {
            return Err(BackingError::Unsupported(format!(
                "route for '{table}' has no url"
            )));
        }
        self.routes.write().insert(table.to_owned(), route);
        Ok(())
    }

    fn fetch(&self, route: &RestRoute) -> Result<Json, BackingError> {
        let mut request = self.agent.get(&route.url);
        for (name, value) in &route.headers {
            request = request.set(name, value);
        }
        let response = request.call().map_err(|err| match err {
            ureq::Error::Status(code, _) => {
                BackingError::Http(format!("GET {} returned status {code}", route.url))
            }
            other => BackingError::Http(format!("GET {} failed: {other}", route.url)),
        })?;
        let body = response
            .into_string()
            .map_err(|err| BackingError::Http(format!("reading {} failed: {err}", route.url)))?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl Backing for RestBacking {
    fn populate(
        &self,
        table: &Table,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<Value>>, BackingError> {
        cancel.check()?;
        let Some(route) = self.routes.read().get(&table.name).cloned() else {
            warn!(table = %table.name, "backing.rest.no_route");
            return Ok(Vec::new());
        };
        let document = self.fetch(&route)?;
        cancel.check()?;
        let rows = rows_from_json(table, &document, route.pointer.as_deref())?;
        debug!(table = %table.name, url = %route.url, rows = rows.len(), "backing.rest.populate");
        Ok(rows)
    }
}

/// Maps a JSON document onto rows of `table`.
pub fn rows_from_json(
    table: &Table,
    document: &Json,
    pointer: Option<&str>,
) -> Result<Vec<Vec<Value>>, BackingError> {
    let target = match pointer {
        Some(pointer) => document.pointer(pointer).ok_or_else(|| BackingError::Decode {
            column: table.name.clone(),
            reason: format!("pointer '{pointer}' matches nothing"),
        })?,
        None => document,
    };
    let objects: Vec<&Json> = match target {
        Json::Array(items) => items.iter().collect(),
        Json::Object(_) => vec![target],
        Json::Null => Vec::new(),
        other => {
            return Err(BackingError::Decode {
                column: table.name.clone(),
                reason: format!("expected an array of objects, found {other}"),
            })
        }
    };

    let keys: Vec<(&str, &str, &str, SemanticType)> = table
        .columns
        .iter()
        .map(|column| match table.mapping(column) {
            Some(mapping) => (
                column.as_str(),
                mapping.options.get("json").map_or("", String::as_str),
                mapping.field.as_str(),
                mapping.semantic_type,
            ),
            None => (column.as_str(), "", "", SemanticType::Unknown),
        })
        .collect();

    let mut rows = Vec::with_capacity(objects.len());
    for object in objects {
        let Json::Object(map) = object else {
            continue;
        };
        let mut row = Vec::with_capacity(keys.len());
        for (column, json_key, field, ty) in &keys {
            let cell = [*json_key, *field, *column]
                .into_iter()
                .filter(|k| !k.is_empty())
                .find_map(|k| map.get(k));
            row.push(match cell {
                Some(cell) => coerce_json(column, cell, *ty)?,
                None => Value::Null,
            });
        }
        rows.push(row);
    }
    Ok(rows)
}

fn coerce_json(column: &str, cell: &Json, ty: SemanticType) -> Result<Value, BackingError> {
    let decode = |reason: String| BackingError::Decode {
        column: column.to_owned(),
        reason,
    };
    match (cell, ty) {
        (Json::Null, _) => Ok(Value::Null),
        (Json::String(text), SemanticType::Text | SemanticType::Unknown) => {
            Ok(Value::Text(text.clone()))
        }
        (Json::String(text), ty) => coerce_text(column, text, ty),
        (Json::Bool(b), SemanticType::Bool) => Ok(Value::Bool(*b)),
        (Json::Number(n), SemanticType::Integer | SemanticType::Timestamp) => {
            let v = n
                .as_i64()
                .ok_or_else(|| decode(format!("{n} is not an integer")))?;
            Ok(if ty == SemanticType::Timestamp {
                Value::Timestamp(v)
            } else {
                Value::Integer(v)
            })
        }
        (Json::Number(n), SemanticType::Real) => n
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| decode(format!("{n} is not a number"))),
        (Json::Number(n), SemanticType::Bool) => Ok(Value::Bool(n.as_i64() != Some(0))),
        (Json::Bool(_) | Json::Number(_), SemanticType::Text | SemanticType::Unknown) => {
            Ok(Value::Text(cell.to_string()))
        }
        (Json::Array(_) | Json::Object(_), SemanticType::Text | SemanticType::Unknown) => {
            Ok(Value::Text(cell.to_string()))
        }
        (other, ty) => Err(decode(format!("cannot read {other} as {ty}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableSchema;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::from_schemas([TableSchema::new("Account")
                .field("ID", SemanticType::Integer, "primary")
                .field("FirstName", SemanticType::Text, "json=firstName")
                .field("Age", SemanticType::Integer, "")
                .field("Score", SemanticType::Real, "")])
            .unwrap(),
        )
    }

    #[test]
    fn maps_objects_by_tag_field_and_column() {
        let catalog = catalog();
        let table = catalog.table("accounts").unwrap();
        let doc = serde_json::json!({
            "data": {"items": [
                {"id": 1, "firstName": "John", "Age": 18, "score": 1.5},
                {"id": 2, "firstName": "Jane", "age": "21"}
            ]}
        });
        let rows = rows_from_json(table, &doc, Some("/data/items")).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![1.into(), "John".into(), 18.into(), 1.5.into()],
                vec![2.into(), "Jane".into(), 21.into(), Value::Null],
            ]
        );
    }

    #[test]
    fn rejects_bad_documents() {
        let catalog = catalog();
        let table = catalog.table("accounts").unwrap();
        let err = rows_from_json(table, &serde_json::json!(3), None).unwrap_err();
        assert_eq!(err.code(), "Decode");
        let err = rows_from_json(table, &serde_json::json!([]), Some("/missing")).unwrap_err();
        assert_eq!(err.code(), "Decode");
        let err =
            rows_from_json(table, &serde_json::json!([{"age": true}]), None).unwrap_err();
        assert_eq!(err.code(), "Decode");
    }

    #[test]
    fn unknown_tables_and_empty_urls_are_rejected() {
        let backing = RestBacking::new(catalog());
        assert_eq!(
            backing.get("people", RestRoute::new("http://x")).unwrap_err().code(),
            "UnknownTable"
        );
        assert_eq!(
            backing.get("accounts", RestRoute::new("")).unwrap_err().code(),
            "Unsupported"
        );
    }

    #[test]
    fn populates_over_http() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_lowercase();
            assert!(request.contains("x-token: secret"));
            let body = r#"[{"id":7,"firstName":"Ada","age":36}]"#;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
        });

        let catalog = catalog();
        let backing = RestBacking::new(Arc::clone(&catalog));
        backing
            .get(
                "accounts",
                RestRoute::new(format!("http://{addr}/accounts")).header("X-Token", "secret"),
            )
            .unwrap();
        let table = catalog.table("accounts").unwrap();
        let rows = backing.populate(table, &CancelToken::new()).unwrap();
        server.join().unwrap();
        assert_eq!(rows, vec![vec![7.into(), "Ada".into(), 36.into(), Value::Null]]);
    }
}
