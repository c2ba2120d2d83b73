//! Materialised relation used during resolution, and the predicate
//! evaluator that filters it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::Regex;

use crate::query::ast::{BinaryOp, ColumnRef, Expr};
use crate::query::errors::QueryError;
use crate::query::value::Value;
use crate::schema::Table;

/// A column-named relation.
///
/// Every row holds exactly `columns.len()` values.
#[derive(Clone, Debug, PartialEq)]
pub struct IntermediateTable {
    /// Declared table the rows came from; `None` for join results.
    pub source: Option<Arc<Table>>,
    /// Alias → canonical table name.
    pub aliases: BTreeMap<String, String>,
    /// Display names, qualified (`table.column`) after a join.
    pub columns: Vec<String>,
    /// Row values.
    pub rows: Vec<Vec<Value>>,
}

impl IntermediateTable {
    /// Relation over one declared table, columns in declared order.
    pub fn from_source(table: Arc<Table>, alias: Option<&str>, rows: Vec<Vec<Value>>) -> Self {
        let mut aliases = BTreeMap::new();
        if let Some(alias) = alias {
            aliases.insert(alias.to_owned(), table.name.clone());
        }
        Self {
            columns: table.columns.clone(),
            source: Some(table),
            aliases,
            rows,
        }
    }

    /// Table names and aliases this relation answers to.
    pub fn known_tables(&self) -> BTreeSet<&str> {
        let mut known: BTreeSet<&str> = BTreeSet::new();
        if let Some(source) = &self.source {
            known.insert(&source.name);
        }
        for (alias, table) in &self.aliases {
            known.insert(alias);
            known.insert(table);
        }
        for column in &self.columns {
            if let Some((qualifier, _)) = column.split_once('.') {
                known.insert(qualifier);
            }
        }
        known
    }

    /// Resolves a column reference to an index.
    ///
    /// Qualified references try the exact `table.column` name, then the
    /// alias-expanded name, then the bare name when the qualifier names this
    /// relation's own source. Bare references try the exact name, then the
    /// name qualified by the first column's table, then a unique
    /// `*.name` suffix match.
    pub fn resolve_column(&self, column: &ColumnRef) -> Option<usize> {
        let position = |name: &str| self.columns.iter().position(|c| c == name);
        let name = column.name.as_str();
        match column.qualifier.as_deref() {
            Some(qualifier) => {
                if let Some(idx) = position(&format!("{qualifier}.{name}")) {
                    return Some(idx);
                }
                let canonical = self.aliases.get(qualifier).map(String::as_str);
                if let Some(canonical) = canonical {
                    if let Some(idx) = position(&format!("{canonical}.{name}")) {
                        return Some(idx);
                    }
                }
                let source = self.source.as_ref()?;
                if source.name == qualifier || canonical == Some(source.name.as_str()) {
                    return position(name);
                }
                None
            }
            None => {
                if let Some(idx) = position(name) {
                    return Some(idx);
                }
                let first_table = self.columns.first()?.split_once('.').map(|(t, _)| t)?;
                if let Some(idx) = position(&format!("{first_table}.{name}")) {
                    return Some(idx);
                }
                let suffix = format!(".{name}");
                let mut matches = self
                    .columns
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.ends_with(&suffix));
                match (matches.next(), matches.next()) {
                    (Some((idx, _)), None) => Some(idx),
                    _ => None,
                }
            }
        }
    }

    /// Evaluates `expr` against one row.
    ///
    /// Unresolvable column references evaluate to Null.
    pub fn evaluate(&self, expr: &Expr, row: &[Value]) -> Result<Value, QueryError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Column(column) => Ok(self
                .resolve_column(column)
                .and_then(|idx| row.get(idx))
                .cloned()
                .unwrap_or(Value::Null)),
            Expr::Binary { op, left, right } => {
                let left = self.evaluate(left, row)?;
                let right = self.evaluate(right, row)?;
                apply_binary(*op, &left, &right)
            }
            Expr::Not(inner) => match self.evaluate(inner, row)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(QueryError::unsupported(format!(
                    "NOT applied to {} value",
                    other.kind()
                ))),
            },
            Expr::IsNull { expr, negated } => {
                let value = self.evaluate(expr, row)?;
                Ok(Value::Bool(value.is_null() != *negated))
            }
            Expr::Call { name, .. } => Err(QueryError::unsupported(format!(
                "call to '{name}' outside the result columns"
            ))),
        }
    }

    /// Keeps the rows for which `predicate` evaluates to `true`.
    ///
    /// `None` is the identity.
    pub fn filter(self, predicate: Option<&Expr>) -> Result<Self, QueryError> {
        let Some(predicate) = predicate else {
            return Ok(self);
        };
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            if self.evaluate(predicate, row)? == Value::Bool(true) {
                kept.push(row.clone());
            }
        }
        Ok(Self {
            source: self.source,
            aliases: self.aliases,
            columns: self.columns,
            rows: kept,
        })
    }
}

/// Applies a binary operator to two evaluated operands.
pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, QueryError> {
    let result = match op {
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => {
                if op == BinaryOp::And {
                    *a && *b
                } else {
                    *a || *b
                }
            }
            _ => {
                return Err(QueryError::unsupported(format!(
                    "{op:?} over {} and {} values",
                    left.kind(),
                    right.kind()
                )))
            }
        },
        BinaryOp::Like | BinaryOp::NotLike => like(left, right, op == BinaryOp::NotLike),
        _ => compare(op, left, right),
    };
    Ok(Value::Bool(result))
}

/// Comparison semantics shared by predicates and join matching.
///
/// Equality is structural. Ordering comparisons need both sides to coerce to
/// an integer and are `false` otherwise.
pub fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::Eq => left == right,
        BinaryOp::NotEq => left != right,
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let (Some(a), Some(b)) = (left.as_integer(), right.as_integer()) else {
                return false;
            };
            match op {
                BinaryOp::Lt => a < b,
                BinaryOp::LtEq => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }
        }
        _ => false,
    }
}

/// `%` matches any run of characters and the pattern may match anywhere in
/// the text. A pattern that fails to compile, or a Null operand, never
/// matches under either polarity.
fn like(text: &Value, pattern: &Value, negated: bool) -> bool {
    let (Some(text), Some(pattern)) = (text.text_form(), pattern.text_form()) else {
        return false;
    };
    let Ok(regex) = Regex::new(&pattern.replace('%', ".*")) else {
        return false;
    };
    regex.is_match(&text) != negated
}
