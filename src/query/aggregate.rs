//! Aggregate registry: a closed set of functions over a projected row set.

use std::cmp::Ordering;
use std::fmt;

use crate::query::ast::ColumnRef;
use crate::query::errors::QueryError;
use crate::query::value::Value;

/// Registered aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// Row count.
    Count,
    /// Sum, Null when nothing numeric was seen.
    Sum,
    /// Sum, `0.0` when nothing numeric was seen.
    Total,
    /// Arithmetic mean.
    Avg,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
}

impl AggregateFunction {
    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "total" => Some(AggregateFunction::Total),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    /// Name given to the output value.
    pub fn output_name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Total => "total",
            AggregateFunction::Avg => "average",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    /// Evaluates the function over `rows`, reading column `offset`.
    ///
    /// Returns one full-width row. `carrier` supplies every other position,
    /// except for min/max which return the whole row holding the extremum.
    pub fn apply(
        self,
        offset: usize,
        rows: &[Vec<Value>],
        carrier: &[Value],
    ) -> Result<Vec<Value>, QueryError> {
        let cell = |row: &Vec<Value>| row.get(offset).cloned().unwrap_or(Value::Null);
        let with_value = |value: Value| {
            let mut out = carrier.to_vec();
            if let Some(slot) = out.get_mut(offset) {
                *slot = value;
            }
            out
        };
        match self {
            AggregateFunction::Count => {
                let count = i64::try_from(rows.len()).unwrap_or(i64::MAX);
                Ok(with_value(Value::Integer(count)))
            }
            AggregateFunction::Sum | AggregateFunction::Total => {
                let sum = rows.iter().map(cell).fold(None, accumulate);
                let value = match (sum, self) {
                    (Some(v), _) => v,
                    (None, AggregateFunction::Total) => Value::Float(0.0),
                    (None, _) => Value::Null,
                };
                Ok(with_value(value))
            }
            AggregateFunction::Avg => {
                if rows.is_empty() {
                    return Err(QueryError::DivisionByZero { function: "avg" });
                }
                let sum: f64 = rows
                    .iter()
                    .map(|row| match row.get(offset) {
                        Some(Value::Integer(v)) => *v as f64,
                        Some(Value::Float(v)) => *v,
                        _ => 0.0,
                    })
                    .sum();
                Ok(with_value(Value::Float(sum / rows.len() as f64)))
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                let wanted = if self == AggregateFunction::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let mut best: Option<&Vec<Value>> = None;
                for row in rows {
                    let Some(candidate) = row.get(offset) else {
                        continue;
                    };
                    let better = match best.and_then(|b| b.get(offset)) {
                        None => candidate.extremum_cmp(candidate).is_some(),
                        Some(current) => candidate.extremum_cmp(current) == Some(wanted),
                    };
                    if better {
                        best = Some(row);
                    }
                }
                Ok(best.cloned().unwrap_or_else(|| with_value(Value::Null)))
            }
        }
    }
}

/// Sum accumulation: the first numeric kind seen fixes the accumulator;
/// values of any other kind are skipped.
fn accumulate(acc: Option<Value>, value: Value) -> Option<Value> {
    match (acc, value) {
        (None, v @ (Value::Integer(_) | Value::Float(_))) => Some(v),
        (Some(Value::Integer(a)), Value::Integer(b)) => Some(Value::Integer(a.saturating_add(b))),
        (Some(Value::Float(a)), Value::Float(b)) => Some(Value::Float(a + b)),
        (acc, _) => acc,
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Total => "total",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        })
    }
}

/// Aggregate recorded by the validator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateDescriptor {
    /// Underlying column; `None` stands for `*`.
    pub column: Option<ColumnRef>,
    /// Ordinal of the result column the aggregate occupies.
    pub result_position: usize,
    /// Function to apply.
    pub function: AggregateFunction,
}
