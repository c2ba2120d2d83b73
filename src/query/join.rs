//! Nested-loop join of two resolved relations.

use tracing::{debug, warn};

use crate::query::ast::{BinaryOp, ColumnRef, Expr};
use crate::query::intermediate::IntermediateTable;
use crate::query::value::Value;

/// Joins `left` with `right` on a comparison between two column references.
///
/// Operands are bound to a side by their table or alias; when the textual
/// order is reversed the operator is swapped. Rows match on equality of the
/// bound values whatever the operator. An ON clause that cannot be bound
/// produces no rows. Every output column is qualified by its table.
pub fn join(left: IntermediateTable, right: IntermediateTable, on: &Expr) -> IntermediateTable {
    let mut aliases = left.aliases.clone();
    aliases.extend(right.aliases.clone());
    let Some((left_idx, op, right_idx)) = bind(&left, &right, on) else {
        warn!(on = %on, "query.join.unbound");
        return IntermediateTable {
            source: None,
            aliases,
            columns: Vec::new(),
            rows: Vec::new(),
        };
    };

    let left_names = qualified_names(&left);
    let right_names = qualified_names(&right);
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<Value>> = Vec::new();
    for left_row in &left.rows {
        let Some(left_value) = left_row.get(left_idx) else {
            continue;
        };
        for right_row in &right.rows {
            let Some(right_value) = right_row.get(right_idx) else {
                continue;
            };
            if left_value != right_value {
                continue;
            }
            if columns.is_empty() {
                columns = left_names.iter().chain(&right_names).cloned().collect();
            }
            rows.push(left_row.iter().chain(right_row).cloned().collect());
        }
    }
    debug!(
        op = ?op,
        left = left.rows.len(),
        right = right.rows.len(),
        matched = rows.len(),
        "query.join.resolved"
    );
    IntermediateTable {
        source: None,
        aliases,
        columns,
        rows,
    }
}

fn bind(
    left: &IntermediateTable,
    right: &IntermediateTable,
    on: &Expr,
) -> Option<(usize, BinaryOp, usize)> {
    let Expr::Binary { op, left: a, right: b } = on else {
        return None;
    };
    if !op.is_comparison() {
        return None;
    }
    let (Expr::Column(a), Expr::Column(b)) = (a.as_ref(), b.as_ref()) else {
        return None;
    };
    if let (Some(l), Some(r)) = (bind_side(left, a), bind_side(right, b)) {
        return Some((l, *op, r));
    }
    if let (Some(l), Some(r)) = (bind_side(left, b), bind_side(right, a)) {
        return Some((l, op.swapped(), r));
    }
    None
}

fn bind_side(side: &IntermediateTable, column: &ColumnRef) -> Option<usize> {
    if let Some(qualifier) = column.qualifier.as_deref() {
        if !side.known_tables().contains(qualifier) {
            return None;
        }
    }
    side.resolve_column(column)
}

fn qualified_names(side: &IntermediateTable) -> Vec<String> {
    match &side.source {
        Some(source) => side
            .columns
            .iter()
            .map(|c| format!("{}.{c}", source.name))
            .collect(),
        None => side.columns.clone(),
    }
}
