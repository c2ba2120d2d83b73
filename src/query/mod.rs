#![forbid(unsafe_code)]

//! Query pipeline: SQL translation, validation, and execution over
//! intermediate tables resolved through a backing.

/// Closed set of aggregate functions.
pub mod aggregate;

/// Internal statement and expression tree.
pub mod ast;

/// Structured query errors.
pub mod errors;

/// Plan executor: filter, order, limit, project, aggregate.
pub mod executor;

/// Materialised relations and predicate evaluation.
pub mod intermediate;

/// Nested-loop join resolution.
pub mod join;

/// Explicit query plan produced by the validator.
pub mod plan;

/// Per-stage execution timings.
///
/// Collects timing and count statistics when `FEDQL_PROFILE` is set.
pub mod profile;

/// Named result rows.
pub mod result;

/// Translation from the `sqlparser` tree.
pub mod sql;

/// Permission, catalog and aggregate checks.
pub mod validator;

/// Tagged values and coercions.
pub mod value;

pub use errors::QueryError;
pub use executor::Executor;
pub use validator::{validate, Validated};
