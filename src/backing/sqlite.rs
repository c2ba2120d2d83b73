use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;

use crate::backing::{Backing, BackingError, CancelToken};
use crate::query::result::{ResultRow, ResultRows, ResultValue};
use crate::query::value::{parse_timestamp, Value};
use crate::schema::{ddl, Catalog, SemanticType, Table};

/// How statements reach the database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SqliteMode {
    /// Whole tables are read and the engine runs the pipeline.
    #[default]
    Populate,
    /// The validated statement text is executed by SQLite itself.
    PassThrough,
}

/// SQLite-backed tables.
pub struct SqliteBacking {
    conn: Mutex<Connection>,
    mode: SqliteMode,
}

impl SqliteBacking {
    /// Wraps an open connection.
    pub fn from_connection(conn: Connection, mode: SqliteMode) -> Self {
        Self {
            conn: Mutex::new(conn),
            mode,
        }
    }

    /// Opens (or creates) a database file.
    pub fn open(path: &Path, mode: SqliteMode) -> Result<Self, BackingError> {
        Ok(Self::from_connection(Connection::open(path)?, mode))
    }

    /// Private in-memory database.
    pub fn open_in_memory(mode: SqliteMode) -> Result<Self, BackingError> {
        Ok(Self::from_connection(Connection::open_in_memory()?, mode))
    }

    /// Configured mode.
    pub fn mode(&self) -> SqliteMode {
        self.mode
    }

    /// Runs statements that return no rows, such as fixtures.
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackingError> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Creates every catalog table that does not exist yet.
    pub fn create_schema(&self, catalog: &Catalog) -> Result<(), BackingError> {
        let conn = self.conn.lock();
        for table in catalog.tables() {
            let ddl = ddl::render_table(table).replacen(
                "CREATE TABLE ",
                "CREATE TABLE IF NOT EXISTS ",
                1,
            );
            conn.execute_batch(&ddl)?;
        }
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn decode_typed(column: &str, raw: ValueRef<'_>, ty: SemanticType) -> Result<Value, BackingError> {
    let value = match (raw, ty) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(v), SemanticType::Bool) => Value::Bool(v != 0),
        (ValueRef::Integer(v), SemanticType::Timestamp) => Value::Timestamp(v),
        (ValueRef::Integer(v), SemanticType::Real) => Value::Float(v as f64),
        (ValueRef::Text(bytes), SemanticType::Timestamp) => {
            let text = String::from_utf8_lossy(bytes);
            parse_timestamp(&text)
                .map(Value::Timestamp)
                .ok_or_else(|| BackingError::Decode {
                    column: column.to_owned(),
                    reason: format!("'{text}' is not a timestamp"),
                })?
        }
        (raw, _) => decode_untyped(column, raw)?,
    };
    Ok(value)
}

fn decode_untyped(column: &str, raw: ValueRef<'_>) -> Result<Value, BackingError> {
    match raw {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(v) => Ok(Value::Integer(v)),
        ValueRef::Real(v) => Ok(Value::Float(v)),
        ValueRef::Text(bytes) => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(BackingError::Decode {
            column: column.to_owned(),
            reason: "blob values are not supported".into(),
        }),
    }
}

impl Backing for SqliteBacking {
    fn populate(
        &self,
        table: &Table,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<Value>>, BackingError> {
        cancel.check()?;
        let columns = table
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {columns} FROM {}", quote_ident(&table.name));
        debug!(table = %table.name, sql = %sql, "backing.sqlite.query");
        let types: Vec<SemanticType> = table
            .columns
            .iter()
            .map(|c| {
                table
                    .mapping(c)
                    .map(|m| m.semantic_type)
                    .unwrap_or(SemanticType::Unknown)
            })
            .collect();

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            cancel.check()?;
            let mut values = Vec::with_capacity(types.len());
            for (idx, ty) in types.iter().enumerate() {
                values.push(decode_typed(&table.columns[idx], row.get_ref(idx)?, *ty)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    fn pass_through(&self) -> bool {
        self.mode == SqliteMode::PassThrough
    }

    fn execute_raw(&self, sql: &str, cancel: &CancelToken) -> Result<ResultRows, BackingError> {
        cancel.check()?;
        debug!(sql = %sql, "backing.sqlite.query");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            let changed = stmt.execute([])?;
            debug!(changed, "backing.sqlite.executed");
            return Ok(ResultRows::default());
        }
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            cancel.check()?;
            let mut values = Vec::with_capacity(names.len());
            for (idx, name) in names.iter().enumerate() {
                values.push(ResultValue {
                    name: name.clone(),
                    value: decode_untyped(name, row.get_ref(idx)?)?,
                });
            }
            out.push(ResultRow(values));
        }
        Ok(ResultRows(out))
    }
}
