use std::io::Read;

use crate::backing::BackingError;
use crate::query::value::{parse_timestamp, Value};
use crate::schema::{SemanticType, Table};

/// Converts a text cell to a value of `ty`. An empty cell is Null.
pub fn coerce_text(column: &str, text: &str, ty: SemanticType) -> Result<Value, BackingError> {
    if text.is_empty() {
        return Ok(Value::Null);
    }
    let decode = |reason: String| BackingError::Decode {
        column: column.to_owned(),
        reason,
    };
    match ty {
        SemanticType::Text | SemanticType::Unknown => Ok(Value::Text(text.to_owned())),
        SemanticType::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|err| decode(format!("'{text}' is not an integer: {err}"))),
        SemanticType::Real => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|err| decode(format!("'{text}' is not a number: {err}"))),
        SemanticType::Bool => match text.trim() {
            "TRUE" | "true" | "1" => Ok(Value::Bool(true)),
            "FALSE" | "false" | "0" => Ok(Value::Bool(false)),
            other => Err(decode(format!("'{other}' is not a boolean"))),
        },
        SemanticType::Timestamp => parse_timestamp(text)
            .map(Value::Timestamp)
            .ok_or_else(|| decode(format!("'{text}' is not a timestamp"))),
    }
}

/// Reads CSV records for `table`.
///
/// The header row names columns, by column name or by field name; declared
/// columns missing from the header are Null and extra header columns are
/// ignored.
pub fn read_rows<R: Read>(table: &Table, reader: R) -> Result<Vec<Vec<Value>>, BackingError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(::csv::Trim::Headers)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let positions: Vec<Option<usize>> = table
        .columns
        .iter()
        .map(|column| {
            let field = table.mapping(column).map(|m| m.field.as_str());
            headers
                .iter()
                .position(|h| h == column || Some(h) == field)
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Vec::with_capacity(table.columns.len());
        for (column, position) in table.columns.iter().zip(&positions) {
            let ty = table
                .mapping(column)
                .map(|m| m.semantic_type)
                .unwrap_or(SemanticType::Unknown);
            let cell = position.and_then(|idx| record.get(idx)).unwrap_or("");
            row.push(coerce_text(column, cell, ty)?);
        }
        rows.push(row);
    }
    Ok(rows)
}
