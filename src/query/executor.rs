//! Query executor: resolves the plan's sources through a backing, then runs
//! filter, order, offset/limit, projection and aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::backing::{Backing, BackingError, CancelToken};
use crate::query::aggregate::AggregateDescriptor;
use crate::query::ast::Expr;
use crate::query::errors::QueryError;
use crate::query::intermediate::IntermediateTable;
use crate::query::join::join;
use crate::query::plan::{ProjectionItem, QueryPlan, Selector, SourcePlan, TablePlan};
use crate::query::profile::{
    profile_timer as query_profile_timer, record_profile_timer as record_query_profile_timer,
    QueryProfileKind,
};
use crate::query::result::{ResultRow, ResultRows, ResultValue};
use crate::query::value::Value;

/// Runs validated plans against a backing.
pub struct Executor<'a> {
    backing: &'a dyn Backing,
    cancel: &'a CancelToken,
}

/// One projected result position.
struct Slot {
    index: Option<usize>,
    name: String,
}

impl<'a> Executor<'a> {
    /// Executor reading rows from `backing`.
    pub fn new(backing: &'a dyn Backing, cancel: &'a CancelToken) -> Self {
        Self { backing, cancel }
    }

    fn check_cancel(&self) -> Result<(), QueryError> {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        Ok(())
    }

    /// Executes `plan` and materialises every result row.
    pub fn execute(&self, plan: &QueryPlan) -> Result<ResultRows, QueryError> {
        let limit = parse_limit(plan.limit.as_ref())?;
        let offset = parse_limit(plan.offset.as_ref())?;

        let relation = self.resolve_source(&plan.source)?;
        self.check_cancel()?;

        let filter_timer = query_profile_timer();
        let mut relation = relation.filter(plan.filter.as_ref())?;
        record_query_profile_timer(QueryProfileKind::Filter, filter_timer);
        self.check_cancel()?;

        if relation.rows.is_empty() && plan.aggregates.is_empty() {
            debug!("query.execute.empty");
            return Ok(ResultRows::default());
        }

        if !plan.order_by.is_empty() && !relation.rows.is_empty() {
            let sort_timer = query_profile_timer();
            let keys = plan
                .order_by
                .iter()
                .map(|term| match &term.expr {
                    Expr::Column(column) => relation
                        .resolve_column(column)
                        .map(|idx| (idx, term.descending))
                        .ok_or_else(|| unknown_column(&relation, &column.to_string())),
                    other => Err(QueryError::unsupported(format!(
                        "ORDER BY expression '{other}'"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            relation.rows.sort_by(|a, b| {
                for &(idx, descending) in &keys {
                    let ordering = a[idx].order_cmp(&b[idx]);
                    let ordering = if descending {
                        ordering.reverse()
                    } else {
                        ordering
                    };
                    if ordering.is_ne() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
            record_query_profile_timer(QueryProfileKind::Sort, sort_timer);
            self.check_cancel()?;
        }

        if let Some(offset) = offset {
            let skip = offset.min(relation.rows.len());
            relation.rows.drain(..skip);
        }
        if let Some(limit) = limit {
            relation.rows.truncate(limit);
        }

        let project_timer = query_profile_timer();
        let (slots, offsets) = project_slots(&relation, plan)?;
        let identity = slots.len() == relation.columns.len()
            && slots
                .iter()
                .enumerate()
                .all(|(pos, slot)| slot.index == Some(pos));
        let rows = if identity {
            relation.rows
        } else {
            relation
                .rows
                .iter()
                .map(|row| {
                    slots
                        .iter()
                        .map(|slot| {
                            slot.index
                                .and_then(|idx| row.get(idx))
                                .cloned()
                                .unwrap_or(Value::Null)
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        record_query_profile_timer(QueryProfileKind::Project, project_timer);
        self.check_cancel()?;

        let mut names: Vec<String> = slots.into_iter().map(|slot| slot.name).collect();
        if plan.aggregates.is_empty() {
            return Ok(named_rows(&names, rows));
        }

        let aggregate_timer = query_profile_timer();
        let carrier = rows
            .last()
            .cloned()
            .unwrap_or_else(|| vec![Value::Null; names.len()]);
        let mut composite = carrier.clone();
        for (descriptor, offset) in plan.aggregates.iter().zip(&offsets) {
            let out = descriptor.function.apply(*offset, &rows, &carrier)?;
            if let (Some(slot), Some(value)) = (composite.get_mut(*offset), out.get(*offset)) {
                *slot = value.clone();
            }
            if let Some(name) = names.get_mut(*offset) {
                let label = plan
                    .projection
                    .get(descriptor.result_position)
                    .and_then(|item| item.label.clone());
                *name = label.unwrap_or_else(|| descriptor.function.output_name().to_owned());
            }
        }
        record_query_profile_timer(QueryProfileKind::Aggregate, aggregate_timer);
        debug!(
            rows = rows.len(),
            aggregates = plan.aggregates.len(),
            "query.execute.aggregated"
        );
        Ok(named_rows(&names, vec![composite]))
    }

    fn resolve_source(&self, source: &SourcePlan) -> Result<IntermediateTable, QueryError> {
        match source {
            SourcePlan::Table(table) => self.resolve_table(table),
            SourcePlan::Join { first, steps } => {
                let mut left = self.resolve_table(first)?;
                for step in steps {
                    let right = self.resolve_table(&step.table)?;
                    self.check_cancel()?;
                    let join_timer = query_profile_timer();
                    left = join(left, right, &step.on);
                    record_query_profile_timer(QueryProfileKind::Join, join_timer);
                }
                Ok(left)
            }
        }
    }

    /// Table Resolver: asks the backing for every row of one declared table.
    fn resolve_table(&self, plan: &TablePlan) -> Result<IntermediateTable, QueryError> {
        self.check_cancel()?;
        let timer = query_profile_timer();
        let rows = self.backing.populate(&plan.table, self.cancel)?;
        record_query_profile_timer(QueryProfileKind::Resolve, timer);
        let expected = plan.table.columns.len();
        if let Some(bad) = rows.iter().find(|row| row.len() != expected) {
            return Err(BackingError::RowWidth {
                table: plan.table.name.clone(),
                expected,
                found: bad.len(),
            }
            .into());
        }
        debug!(table = %plan.table.name, rows = rows.len(), "query.resolve.table");
        Ok(IntermediateTable::from_source(
            Arc::clone(&plan.table),
            plan.alias.as_deref(),
            rows,
        ))
    }
}

/// Reads a LIMIT/OFFSET expression; only non-negative integer literals pass.
fn parse_limit(expr: Option<&Expr>) -> Result<Option<usize>, QueryError> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    match expr {
        Expr::Literal(Value::Integer(n)) if *n >= 0 => usize::try_from(*n)
            .map(Some)
            .map_err(|_| QueryError::InvalidLimit {
                literal: expr.to_string(),
            }),
        other => Err(QueryError::InvalidLimit {
            literal: other.to_string(),
        }),
    }
}

fn unknown_column(relation: &IntermediateTable, column: &str) -> QueryError {
    let table = match &relation.source {
        Some(source) => source.name.clone(),
        None => relation
            .known_tables()
            .into_iter()
            .collect::<Vec<_>>()
            .join(", "),
    };
    QueryError::UnknownColumn {
        column: column.to_owned(),
        table,
    }
}

/// Resolves every result item to source positions and returns, for each
/// aggregate, the projected offset its value occupies.
fn project_slots(
    relation: &IntermediateTable,
    plan: &QueryPlan,
) -> Result<(Vec<Slot>, Vec<usize>), QueryError> {
    let aggregate_at: BTreeMap<usize, &AggregateDescriptor> = plan
        .aggregates
        .iter()
        .map(|d| (d.result_position, d))
        .collect();
    // A relation without columns is an unmatched join; there is nothing to
    // resolve against, so every position projects Null.
    let columnless = relation.columns.is_empty();

    let mut slots = Vec::new();
    let mut item_offsets = Vec::with_capacity(plan.projection.len());
    for (position, ProjectionItem { selector, label }) in plan.projection.iter().enumerate() {
        item_offsets.push(slots.len());
        let aggregated = aggregate_at.contains_key(&position);
        match selector {
            Selector::Wildcard if aggregated => {
                slots.push(Slot {
                    index: (!columnless).then_some(0),
                    name: relation.columns.first().cloned().unwrap_or_default(),
                });
            }
            Selector::Wildcard => {
                slots.extend(relation.columns.iter().enumerate().map(|(idx, name)| Slot {
                    index: Some(idx),
                    name: name.clone(),
                }));
            }
            Selector::QualifiedWildcard(table) => {
                let canonical = plan.scope.resolve(table).unwrap_or(table.as_str());
                let own_source = relation
                    .source
                    .as_ref()
                    .is_some_and(|source| source.name == canonical);
                let prefix = format!("{canonical}.");
                slots.extend(
                    relation
                        .columns
                        .iter()
                        .enumerate()
                        .filter(|(_, name)| own_source || name.starts_with(&prefix))
                        .map(|(idx, name)| Slot {
                            index: Some(idx),
                            name: name.clone(),
                        }),
                );
            }
            Selector::Column(column) => {
                let index = match relation.resolve_column(column) {
                    Some(idx) => Some(idx),
                    None if columnless => None,
                    None => return Err(unknown_column(relation, &column.to_string())),
                };
                let name = match (label, index) {
                    (Some(label), _) => label.clone(),
                    (None, Some(idx)) => relation.columns[idx].clone(),
                    (None, None) => column.to_string(),
                };
                slots.push(Slot { index, name });
            }
        }
    }
    let offsets = plan
        .aggregates
        .iter()
        .map(|d| item_offsets.get(d.result_position).copied().unwrap_or(0))
        .collect();
    Ok((slots, offsets))
}

fn named_rows(names: &[String], rows: Vec<Vec<Value>>) -> ResultRows {
    ResultRows(
        rows.into_iter()
            .map(|row| {
                ResultRow(
                    names
                        .iter()
                        .zip(row)
                        .map(|(name, value)| ResultValue {
                            name: name.clone(),
                            value,
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}
