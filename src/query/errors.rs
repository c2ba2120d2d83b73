#![forbid(unsafe_code)]
#![allow(missing_docs)]

use thiserror::Error;

use crate::backing::BackingError;
use crate::schema::permissions::StatementKind;

/// Structured errors emitted while validating or executing a statement.
///
/// Validation failures abort before any backing I/O; execution failures
/// abort the query without partial rows.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The statement kind is not enabled in the permission set.
    #[error("{kind} statements are not allowed")]
    PermissionDenied { kind: StatementKind },
    /// Referenced table (or alias) is not declared.
    #[error("unknown table '{table}'")]
    UnknownTable { table: String },
    /// Referenced column does not exist on the table it resolves to.
    #[error("unknown column '{column}' for table '{table}'")]
    UnknownColumn { column: String, table: String },
    /// Function-call syntax naming no registered aggregate.
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    /// `LIMIT` / `OFFSET` was not a non-negative integer literal.
    #[error("invalid LIMIT/OFFSET literal '{literal}'")]
    InvalidLimit { literal: String },
    /// `avg` over an empty row set.
    #[error("division by zero in {function}()")]
    DivisionByZero { function: &'static str },
    /// Syntax the engine cannot interpret.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),
    /// Failure reported by the data-source adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] BackingError),
    /// The caller cancelled the query.
    #[error("query cancelled")]
    Cancelled,
}

impl QueryError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::PermissionDenied { .. } => "PermissionDenied",
            QueryError::UnknownTable { .. } => "UnknownTable",
            QueryError::UnknownColumn { .. } => "UnknownColumn",
            QueryError::UnknownFunction { .. } => "UnknownFunction",
            QueryError::InvalidLimit { .. } => "InvalidLimit",
            QueryError::DivisionByZero { .. } => "DivisionByZero",
            QueryError::UnsupportedExpression(_) => "UnsupportedExpression",
            QueryError::Adapter(BackingError::Cancelled) => "Cancelled",
            QueryError::Adapter(_) => "AdapterError",
            QueryError::Cancelled => "Cancelled",
        }
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        QueryError::UnsupportedExpression(what.into())
    }
}
