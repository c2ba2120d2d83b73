//! Crate-wide error type wrapping each layer's failures.

use thiserror::Error;

use crate::backing::BackingError;
use crate::query::errors::QueryError;
use crate::schema::SchemaError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level failure surfaced by [`crate::Engine`].
#[derive(Debug, Error)]
pub enum Error {
    /// Statement text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// Validation or execution failure.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Catalog construction failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A query reached the engine before any backing was installed.
    #[error("no backing store configured")]
    NoBacking,
}

impl Error {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(_) => "Parse",
            Error::Query(err) => err.code(),
            Error::Schema(err) => err.code(),
            Error::NoBacking => "NoBacking",
        }
    }
}

impl From<BackingError> for Error {
    fn from(err: BackingError) -> Self {
        Error::Query(QueryError::Adapter(err))
    }
}
