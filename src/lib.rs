//! Embeddable federated SQL layer.
//!
//! Record schemas are declared once into a [`schema::Catalog`]; SELECT
//! statements are then validated, resolved against a pluggable
//! [`backing::Backing`] and evaluated by a small relational interpreter.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backing;
pub mod engine;
pub mod error;
pub mod query;
pub mod schema;

pub use backing::{Backing, BackingError, CancelToken};
pub use engine::{CommandOutput, Engine};
pub use error::{Error, Result};
pub use query::result::{ResultRow, ResultRows, ResultValue};
pub use query::value::Value;
pub use schema::permissions::Permissions;
pub use schema::{Catalog, Record, SemanticType, Table, TableSchema};
