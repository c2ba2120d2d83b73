//! Named result rows returned to callers.

use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::query::value::Value;

/// One named value of a result row.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultValue {
    /// Column name, qualified for join results; aggregates use the function's
    /// output name.
    pub name: String,
    /// Cell value.
    pub value: Value,
}

impl ResultValue {
    /// Builds a named value.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered sequence of named values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultRow(pub Vec<ResultValue>);

impl ResultRow {
    /// First value named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|v| v.name == name).map(|v| &v.value)
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|v| v.name.as_str())
    }

    /// Values in order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|v| &v.value)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the row has no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Values joined by `|`.
impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, value) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", value.value)?;
        }
        Ok(())
    }
}

/// Serialized as a JSON object; a repeated name keeps its first value.
impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seen = std::collections::HashSet::new();
        let mut map = serializer.serialize_map(None)?;
        for value in &self.0 {
            if seen.insert(value.name.as_str()) {
                map.serialize_entry(&value.name, &value.value.to_json())?;
            }
        }
        map.end()
    }
}

/// Rows produced by one statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultRows(pub Vec<ResultRow>);

impl ResultRows {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no rows were produced.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.0.iter()
    }

    /// Column names of the first row.
    pub fn columns(&self) -> Vec<String> {
        self.0
            .first()
            .map(|row| row.names().map(str::to_owned).collect())
            .unwrap_or_default()
    }
}

impl IntoIterator for ResultRows {
    type Item = ResultRow;
    type IntoIter = std::vec::IntoIter<ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultRows {
    type Item = &'a ResultRow;
    type IntoIter = std::slice::Iter<'a, ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One row per line.
impl fmt::Display for ResultRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, row) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{row}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> ResultRows {
        ResultRows(vec![
            ResultRow(vec![
                ResultValue::new("first_name", "Jane"),
                ResultValue::new("age", 21i64),
                ResultValue::new("email", Value::Null),
            ]),
            ResultRow(vec![ResultValue::new("average", 27.0)]),
        ])
    }

    #[test]
    fn text_rendering() {
        assert_eq!(rows().to_string(), "Jane|21|\n27.000000");
    }

    #[test]
    fn json_rendering() {
        let json = serde_json::to_value(rows()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"first_name": "Jane", "age": 21, "email": null},
                {"average": 27.0}
            ])
        );
    }

    #[test]
    fn lookup_by_name() {
        let rows = rows();
        assert_eq!(rows.0[0].get("age"), Some(&Value::Integer(21)));
        assert_eq!(rows.0[0].get("missing"), None);
        assert_eq!(rows.columns(), vec!["first_name", "age", "email"]);
    }
}
