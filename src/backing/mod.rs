#![forbid(unsafe_code)]

//! Data-source adapters that supply rows for declared tables.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::query::result::ResultRows;
use crate::query::value::Value;
use crate::schema::Table;

/// Text to value coercion shared by the CSV and REST loaders.
pub mod csv;
/// In-memory collections.
pub mod memory;
/// HTTP/JSON routes.
pub mod rest;
/// SQLite database, populate or pass-through.
pub mod sqlite;

pub use memory::MemoryBacking;
pub use rest::{RestBacking, RestRoute};
pub use sqlite::{SqliteBacking, SqliteMode};

/// Cooperative cancellation flag shared between a caller and a running query.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`CancelToken::cancel`] has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`BackingError::Cancelled`] when cancelled.
    pub fn check(&self) -> Result<(), BackingError> {
        if self.is_cancelled() {
            return Err(BackingError::Cancelled);
        }
        Ok(())
    }
}

/// Failures raised by adapters.
#[derive(Debug, Error)]
pub enum BackingError {
    /// The cancel token fired before or during I/O.
    #[error("cancelled")]
    Cancelled,
    /// The adapter has no data for the table.
    #[error("no data source for table '{table}'")]
    UnknownTable {
        /// Table name.
        table: String,
    },
    /// A row did not carry one value per declared column.
    #[error("table '{table}' row has {found} values, expected {expected}")]
    RowWidth {
        /// Table name.
        table: String,
        /// Declared column count.
        expected: usize,
        /// Values supplied.
        found: usize,
    },
    /// Operation the adapter does not implement.
    #[error("unsupported by this backing: {0}")]
    Unsupported(String),
    /// Reading a data file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Malformed CSV input.
    #[error("csv: {0}")]
    Csv(#[from] ::csv::Error),
    /// SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// HTTP transport or status failure.
    #[error("http: {0}")]
    Http(String),
    /// Malformed JSON payload.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// A cell could not be converted to the column's type.
    #[error("cannot decode column '{column}': {reason}")]
    Decode {
        /// Column name.
        column: String,
        /// What went wrong.
        reason: String,
    },
}

impl BackingError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BackingError::Cancelled => "Cancelled",
            BackingError::UnknownTable { .. } => "UnknownTable",
            BackingError::RowWidth { .. } => "RowWidth",
            BackingError::Unsupported(_) => "Unsupported",
            BackingError::Io { .. } => "Io",
            BackingError::Csv(_) => "Csv",
            BackingError::Sqlite(_) => "Sqlite",
            BackingError::Http(_) => "Http",
            BackingError::Json(_) => "Json",
            BackingError::Decode { .. } => "Decode",
        }
    }
}

/// A source of rows for declared tables.
///
/// `populate` returns every row of `table`, one value per declared column in
/// declared order. Pass-through backings instead run the validated statement
/// text themselves through `execute_raw`.
pub trait Backing: Send + Sync {
    /// Returns every row of `table`.
    fn populate(&self, table: &Table, cancel: &CancelToken)
        -> Result<Vec<Vec<Value>>, BackingError>;

    /// True when statements should be handed to [`Backing::execute_raw`].
    fn pass_through(&self) -> bool {
        false
    }

    /// Executes statement text directly.
    fn execute_raw(&self, sql: &str, cancel: &CancelToken) -> Result<ResultRows, BackingError> {
        let _ = (sql, cancel);
        Err(BackingError::Unsupported("raw statement execution".into()))
    }
}

impl<B: Backing + ?Sized> Backing for Arc<B> {
    fn populate(
        &self,
        table: &Table,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<Value>>, BackingError> {
        (**self).populate(table, cancel)
    }

    fn pass_through(&self) -> bool {
        (**self).pass_through()
    }

    fn execute_raw(&self, sql: &str, cancel: &CancelToken) -> Result<ResultRows, BackingError> {
        (**self).execute_raw(sql, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check().unwrap_err().code(), "Cancelled");
    }
}
