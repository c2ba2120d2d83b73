//! Explicit query plan handed from the validator to the executor.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::query::aggregate::AggregateDescriptor;
use crate::query::ast::{ColumnRef, Expr, OrderTerm};
use crate::schema::Table;

/// Per-query alias map (alias → canonical table name).
///
/// Lives only as long as the query; the shared catalog is never written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AliasScope {
    aliases: BTreeMap<String, String>,
    tables: Vec<String>,
}

impl AliasScope {
    pub(crate) fn add_table(&mut self, name: &str) {
        self.tables.push(name.to_owned());
    }

    pub(crate) fn add_alias(&mut self, alias: &str, table: &str) {
        self.aliases.insert(alias.to_owned(), table.to_owned());
    }

    /// Canonical table for a table name or alias used in this query.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some(table) = self.aliases.get(name) {
            return Some(table);
        }
        self.tables
            .iter()
            .find(|t| t.as_str() == name)
            .map(String::as_str)
    }

    /// True when `name` is already bound as a table or alias.
    pub fn is_bound(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Tables in `FROM` order.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Alias bindings.
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }
}

/// A resolved table reference.
#[derive(Clone, Debug)]
pub struct TablePlan {
    /// Declared table.
    pub table: Arc<Table>,
    /// Alias used in the query.
    pub alias: Option<String>,
}

/// One join step: the accumulated left side joined with `table`.
#[derive(Clone, Debug)]
pub struct JoinStep {
    /// Right-hand table.
    pub table: TablePlan,
    /// Validated comparison between two column references.
    pub on: Expr,
}

/// Where rows come from.
#[derive(Clone, Debug)]
pub enum SourcePlan {
    /// A single table.
    Table(TablePlan),
    /// Pairwise left-to-right joins.
    Join {
        /// Leftmost table.
        first: TablePlan,
        /// Remaining tables in order.
        steps: Vec<JoinStep>,
    },
}

/// Column selector of one result item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// `*` (also the rewritten argument of `count(*)`).
    Wildcard,
    /// `table.*`
    QualifiedWildcard(String),
    /// A single column.
    Column(ColumnRef),
}

/// One result column after aggregate rewriting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionItem {
    /// What to project.
    pub selector: Selector,
    /// `AS` label.
    pub label: Option<String>,
}

/// Validated SELECT.
#[derive(Clone, Debug)]
pub struct QueryPlan {
    /// Row source.
    pub source: SourcePlan,
    /// `WHERE`
    pub filter: Option<Expr>,
    /// `ORDER BY`
    pub order_by: Vec<OrderTerm>,
    /// Raw `LIMIT`
    pub limit: Option<Expr>,
    /// Raw `OFFSET`
    pub offset: Option<Expr>,
    /// Result columns.
    pub projection: Vec<ProjectionItem>,
    /// Aggregates recorded during validation.
    pub aggregates: Vec<AggregateDescriptor>,
    /// Alias bindings.
    pub scope: AliasScope,
}
