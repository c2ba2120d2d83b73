//! Statically declared record descriptors.

use super::SemanticType;
use crate::query::value::Value;

/// One declared field of a record type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as written on the record type (`FirstName`).
    pub name: String,
    /// Semantic kind of the field's values.
    pub ty: SemanticType,
    /// Raw tag text (`primary`, `-`, `comment='...'`).
    pub tag: String,
}

/// Descriptor for one record type, built once at registration time.
///
/// ```
/// use fedql::{SemanticType, TableSchema};
///
/// let schema = TableSchema::new("Account")
///     .field("ID", SemanticType::Integer, "primary")
///     .field("Email", SemanticType::Text, "comment='Not validated'");
/// assert_eq!(schema.table_name(), "accounts");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    /// Record type name (`Account`).
    pub type_name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldSpec>,
    /// Nested collections of other record types.
    pub related: Vec<TableSchema>,
}

impl TableSchema {
    /// Starts a descriptor for `type_name`.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
            related: Vec::new(),
        }
    }

    /// Appends a field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        ty: SemanticType,
        tag: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            ty,
            tag: tag.into(),
        });
        self
    }

    /// Declares a nested collection of `related` records; the related type is
    /// registered as its own table alongside this one.
    pub fn has_many(mut self, related: TableSchema) -> Self {
        self.related.push(related);
        self
    }

    /// Table name derived from the type name.
    pub fn table_name(&self) -> String {
        super::naming::table_name(&self.type_name)
    }
}

/// A type whose values can be stored in a table.
///
/// `values` returns one value per declared field in declaration order,
/// omitted fields included; the catalog decides what becomes a column.
pub trait Record {
    /// Schema descriptor for the type.
    fn schema() -> TableSchema;
    /// Field values in declaration order.
    fn values(&self) -> Vec<Value>;
}
