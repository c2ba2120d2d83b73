#![forbid(unsafe_code)]

//! Schema catalog: declared tables, their column metadata and inferred
//! foreign keys. Built once and shared read-only across queries.

pub mod ddl;
pub mod naming;
pub mod permissions;
pub mod record;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use record::{FieldSpec, Record, TableSchema};

/// Semantic kind of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integer.
    Integer,
    /// Boolean.
    Bool,
    /// 64-bit float.
    Real,
    /// Seconds since the Unix epoch.
    Timestamp,
    /// Anything the catalog cannot describe.
    Unknown,
}

impl SemanticType {
    /// SQLite storage class used for DDL rendering.
    pub fn sql_type(self) -> &'static str {
        match self {
            SemanticType::Text => "TEXT",
            SemanticType::Integer | SemanticType::Bool => "INTEGER",
            SemanticType::Real => "REAL",
            SemanticType::Timestamp => "TIMESTAMP",
            SemanticType::Unknown => "ANY",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Text => "text",
            SemanticType::Integer => "integer",
            SemanticType::Bool => "bool",
            SemanticType::Real => "real",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How a column maps back to its record field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Field name on the record type.
    pub field: String,
    /// Position of the field in [`Record::values`].
    pub field_index: usize,
    /// Semantic kind.
    pub semantic_type: SemanticType,
    /// Primary key flag.
    pub primary: bool,
    /// Free-form description.
    pub comment: Option<String>,
    /// Source specific addressing metadata from the tag.
    pub options: BTreeMap<String, String>,
}

/// Target of an inferred foreign key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced table.
    pub table: String,
    /// Referenced primary key column.
    pub column: String,
}

/// A declared table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    /// `snake_case`, pluralized name.
    pub name: String,
    /// Record type the table was derived from.
    pub type_name: String,
    /// Columns in declaration order.
    pub columns: Vec<String>,
    /// Column name to mapping.
    pub column_mappings: HashMap<String, ColumnMapping>,
    /// Column name to referenced table.
    pub foreign_keys: BTreeMap<String, ForeignKey>,
}

impl Table {
    /// Mapping for `column`, if declared.
    pub fn mapping(&self, column: &str) -> Option<&ColumnMapping> {
        self.column_mappings.get(column)
    }

    /// True when `column` is declared.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_mappings.contains_key(column)
    }

    /// Primary key column, if any.
    pub fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| self.column_mappings.get(*c).is_some_and(|m| m.primary))
            .map(String::as_str)
    }

    /// Field positions backing each column, in column order.
    pub fn field_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .filter_map(|c| self.column_mappings.get(c).map(|m| m.field_index))
            .collect()
    }

    fn from_schema(schema: &TableSchema) -> Result<Self, SchemaError> {
        let name = schema.table_name();
        let mut columns = Vec::with_capacity(schema.fields.len());
        let mut column_mappings = HashMap::with_capacity(schema.fields.len());
        let mut primary_seen = false;
        for (field_index, field) in schema.fields.iter().enumerate() {
            let tag = naming::parse_tag(&field.name, &field.tag)?;
            if tag.omit {
                continue;
            }
            let column = naming::snake_case(&field.name);
            if tag.primary {
                if primary_seen {
                    return Err(SchemaError::MultiplePrimaryKeys { table: name });
                }
                primary_seen = true;
            }
            if column_mappings.contains_key(&column) {
                return Err(SchemaError::DuplicateColumn {
                    table: name,
                    column,
                });
            }
            column_mappings.insert(
                column.clone(),
                ColumnMapping {
                    field: field.name.clone(),
                    field_index,
                    semantic_type: field.ty,
                    primary: tag.primary,
                    comment: tag.comment,
                    options: tag.options,
                },
            );
            columns.push(column);
        }
        if columns.is_empty() {
            return Err(SchemaError::EmptyTable { table: name });
        }
        Ok(Self {
            name,
            type_name: schema.type_name.clone(),
            columns,
            column_mappings,
            foreign_keys: BTreeMap::new(),
        })
    }
}

/// Failures while building a [`Catalog`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Two record types produced the same table name.
    #[error("table '{table}' declared more than once")]
    DuplicateTable {
        /// Offending table.
        table: String,
    },
    /// Two fields produced the same column name.
    #[error("column '{column}' declared more than once on table '{table}'")]
    DuplicateColumn {
        /// Owning table.
        table: String,
        /// Offending column.
        column: String,
    },
    /// Every field was omitted or none were declared.
    #[error("table '{table}' has no columns")]
    EmptyTable {
        /// Offending table.
        table: String,
    },
    /// Tag text could not be parsed.
    #[error("invalid tag '{tag}' on field '{field}'")]
    InvalidTag {
        /// Field carrying the tag.
        field: String,
        /// Raw tag text.
        tag: String,
    },
    /// More than one field was tagged `primary`.
    #[error("table '{table}' declares more than one primary key")]
    MultiplePrimaryKeys {
        /// Offending table.
        table: String,
    },
}

impl SchemaError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::DuplicateTable { .. } => "DuplicateTable",
            SchemaError::DuplicateColumn { .. } => "DuplicateColumn",
            SchemaError::EmptyTable { .. } => "EmptyTable",
            SchemaError::InvalidTag { .. } => "InvalidTag",
            SchemaError::MultiplePrimaryKeys { .. } => "MultiplePrimaryKeys",
        }
    }
}

/// Immutable set of declared tables keyed by name.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    tables: BTreeMap<String, Arc<Table>>,
}

impl Catalog {
    /// Starts an empty builder.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Builds a catalog from explicit descriptors.
    pub fn from_schemas<I>(schemas: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = TableSchema>,
    {
        schemas
            .into_iter()
            .fold(Self::builder(), CatalogBuilder::schema)
            .build()
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.get(name)
    }

    /// Tables ordered by name.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.values()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when no tables are declared.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Collects record descriptors before the catalog is frozen.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    schemas: Vec<TableSchema>,
}

impl CatalogBuilder {
    /// Registers a [`Record`] type.
    pub fn register<R: Record>(self) -> Self {
        self.schema(R::schema())
    }

    /// Registers an explicit descriptor.
    pub fn schema(mut self, schema: TableSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Freezes the catalog and infers foreign keys.
    pub fn build(self) -> Result<Catalog, SchemaError> {
        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        for schema in &self.schemas {
            let table = Table::from_schema(schema)?;
            if tables.contains_key(&table.name) {
                return Err(SchemaError::DuplicateTable { table: table.name });
            }
            tables.insert(table.name.clone(), table);
        }
        // Nested collections register their record type once, even when the
        // same type is reachable from several parents.
        let mut pending: Vec<&TableSchema> =
            self.schemas.iter().flat_map(|s| s.related.iter()).collect();
        while let Some(schema) = pending.pop() {
            pending.extend(schema.related.iter());
            if tables.contains_key(&schema.table_name()) {
                continue;
            }
            let table = Table::from_schema(schema)?;
            tables.insert(table.name.clone(), table);
        }
        infer_foreign_keys(&mut tables);
        debug!(tables = tables.len(), "schema.catalog.built");
        Ok(Catalog {
            tables: tables
                .into_iter()
                .map(|(name, table)| (name, Arc::new(table)))
                .collect(),
        })
    }
}

/// `<related>_id` integer columns referencing a table named after `related`
/// whose primary key has the same type.
fn infer_foreign_keys(tables: &mut BTreeMap<String, Table>) {
    let primary_keys: HashMap<String, (String, SemanticType)> = tables
        .values()
        .filter_map(|t| {
            let pk = t.primary_key()?;
            let ty = t.mapping(pk)?.semantic_type;
            Some((t.name.clone(), (pk.to_owned(), ty)))
        })
        .collect();
    for table in tables.values_mut() {
        for column in &table.columns {
            let Some(mapping) = table.column_mappings.get(column) else {
                continue;
            };
            if mapping.semantic_type != SemanticType::Integer {
                continue;
            }
            let Some(related) = column.strip_suffix("_id").filter(|r| !r.is_empty()) else {
                continue;
            };
            let target = naming::table_name(related);
            if let Some((pk, pk_type)) = primary_keys.get(&target) {
                if *pk_type == mapping.semantic_type {
                    table.foreign_keys.insert(
                        column.clone(),
                        ForeignKey {
                            table: target,
                            column: pk.clone(),
                        },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> TableSchema {
        TableSchema::new("Account")
            .field("ID", SemanticType::Integer, "primary")
            .field("FirstName", SemanticType::Text, "")
            .field("OrganizationID", SemanticType::Integer, "")
            .field("Internal", SemanticType::Bool, "-")
    }

    fn organization() -> TableSchema {
        TableSchema::new("Organization")
            .field("ID", SemanticType::Integer, "primary")
            .field("Name", SemanticType::Text, "")
    }

    #[test]
    fn omitted_fields_are_not_columns() {
        let catalog = Catalog::from_schemas([account()]).unwrap();
        let table = catalog.table("accounts").unwrap();
        assert_eq!(table.columns, vec!["id", "first_name", "organization_id"]);
        assert_eq!(table.field_indices(), vec![0, 1, 2]);
        assert_eq!(table.primary_key(), Some("id"));
    }

    #[test]
    fn foreign_keys_follow_naming_convention() {
        let catalog = Catalog::from_schemas([account(), organization()]).unwrap();
        let accounts = catalog.table("accounts").unwrap();
        assert_eq!(
            accounts.foreign_keys.get("organization_id"),
            Some(&ForeignKey {
                table: "organizations".into(),
                column: "id".into(),
            })
        );
    }

    #[test]
    fn foreign_key_requires_matching_primary_key_type() {
        let org = TableSchema::new("Organization")
            .field("ID", SemanticType::Text, "primary")
            .field("Name", SemanticType::Text, "");
        let catalog = Catalog::from_schemas([account(), org]).unwrap();
        assert!(catalog.table("accounts").unwrap().foreign_keys.is_empty());
    }

    #[test]
    fn nested_collections_register_related_tables() {
        let catalog = Catalog::builder()
            .schema(organization().has_many(account()))
            .schema(account().has_many(TableSchema::new("Note").field(
                "Body",
                SemanticType::Text,
                "",
            )))
            .build()
            .unwrap();
        let names: Vec<&str> = catalog.tables().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["accounts", "notes", "organizations"]);
    }

    #[test]
    fn construction_errors() {
        let err = Catalog::from_schemas([account(), account()]).unwrap_err();
        assert_eq!(err.code(), "DuplicateTable");

        let dup = TableSchema::new("Thing")
            .field("Name", SemanticType::Text, "")
            .field("name", SemanticType::Text, "");
        assert_eq!(
            Catalog::from_schemas([dup]).unwrap_err().code(),
            "DuplicateColumn"
        );

        let empty = TableSchema::new("Ghost").field("Hidden", SemanticType::Text, "-");
        assert_eq!(
            Catalog::from_schemas([empty]).unwrap_err().code(),
            "EmptyTable"
        );

        let two_pk = TableSchema::new("Pair")
            .field("A", SemanticType::Integer, "primary")
            .field("B", SemanticType::Integer, "primary");
        assert_eq!(
            Catalog::from_schemas([two_pk]).unwrap_err().code(),
            "MultiplePrimaryKeys"
        );
    }
}
