use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::backing::{csv, Backing, BackingError, CancelToken};
use crate::query::value::Value;
use crate::schema::{Catalog, Record, Table};

/// In-memory rows keyed by table name.
///
/// Rows are stored already projected onto the declared columns, so omitted
/// fields never reach a query. Data can be appended while an engine holds
/// the backing.
pub struct MemoryBacking {
    catalog: Arc<Catalog>,
    tables: RwLock<HashMap<String, Vec<Vec<Value>>>>,
}

impl MemoryBacking {
    /// Empty backing for the tables of `catalog`.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn table(&self, name: &str) -> Result<&Arc<Table>, BackingError> {
        self.catalog
            .table(name)
            .ok_or_else(|| BackingError::UnknownTable {
                table: name.to_owned(),
            })
    }

    /// Appends records of a registered type.
    pub fn insert_records<'a, R, I>(&self, records: I) -> Result<usize, BackingError>
    where
        R: Record + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let table = self.table(&R::schema().table_name())?;
        let indices = table.field_indices();
        let rows: Vec<Vec<Value>> = records
            .into_iter()
            .map(|record| {
                let values = record.values();
                indices
                    .iter()
                    .map(|idx| values.get(*idx).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        let count = rows.len();
        self.tables
            .write()
            .entry(table.name.clone())
            .or_default()
            .extend(rows);
        Ok(count)
    }

    /// Appends rows already in declared column order.
    pub fn insert_rows(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<usize, BackingError> {
        let table = self.table(table)?;
        let expected = table.columns.len();
        if let Some(bad) = rows.iter().find(|row| row.len() != expected) {
            return Err(BackingError::RowWidth {
                table: table.name.clone(),
                expected,
                found: bad.len(),
            });
        }
        let count = rows.len();
        self.tables
            .write()
            .entry(table.name.clone())
            .or_default()
            .extend(rows);
        Ok(count)
    }

    /// Appends rows parsed from CSV text.
    pub fn load_csv_reader<R: Read>(&self, table: &str, reader: R) -> Result<usize, BackingError> {
        let declared = self.table(table)?;
        let rows = csv::read_rows(declared, reader)?;
        self.insert_rows(table, rows)
    }

    /// Appends rows from a CSV file with a header row.
    pub fn load_csv(&self, table: &str, path: &Path) -> Result<usize, BackingError> {
        let file = File::open(path).map_err(|source| BackingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let count = self.load_csv_reader(table, file)?;
        debug!(table, path = %path.display(), rows = count, "backing.memory.csv_loaded");
        Ok(count)
    }

    /// Number of rows stored for `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }
}

impl Backing for MemoryBacking {
    fn populate(
        &self,
        table: &Table,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<Value>>, BackingError> {
        cancel.check()?;
        let rows = self
            .tables
            .read()
            .get(&table.name)
            .cloned()
            .unwrap_or_default();
        debug!(table = %table.name, rows = rows.len(), "backing.memory.populate");
        Ok(rows)
    }
}
