//! Pre-execution pass: permission gate, catalog checks and aggregate
//! rewriting. Produces an explicit [`QueryPlan`] without touching any
//! backing store.

use std::sync::Arc;

use tracing::debug;

use crate::query::aggregate::{AggregateDescriptor, AggregateFunction};
use crate::query::ast::{CallArg, ColumnRef, Expr, Select, SelectItem, Statement, TableRef};
use crate::query::errors::QueryError;
use crate::query::plan::{
    AliasScope, JoinStep, ProjectionItem, QueryPlan, Selector, SourcePlan, TablePlan,
};
use crate::schema::permissions::{Permissions, StatementKind};
use crate::schema::{Catalog, Table};

/// Outcome of validation.
#[derive(Clone, Debug)]
pub enum Validated {
    /// A SELECT ready for the executor.
    Query(QueryPlan),
    /// A data-modifying statement; only executable by pass-through backings.
    Mutation {
        /// Statement kind.
        kind: StatementKind,
        /// Target table.
        table: String,
    },
}

/// Validates `statement` against `catalog` under `permissions`.
pub fn validate(
    statement: &Statement,
    catalog: &Catalog,
    permissions: Permissions,
) -> Result<Validated, QueryError> {
    let kind = statement.kind();
    if !permissions.allows(kind) {
        return Err(QueryError::PermissionDenied { kind });
    }
    match statement {
        Statement::Select(select) => {
            let plan = Validator::new(catalog).select(select)?;
            debug!(
                tables = plan.scope.tables().len(),
                aggregates = plan.aggregates.len(),
                "query.validate.completed"
            );
            Ok(Validated::Query(plan))
        }
        Statement::Insert { table } | Statement::Update { table } | Statement::Delete { table } => {
            if catalog.table(table).is_none() {
                return Err(QueryError::UnknownTable {
                    table: table.clone(),
                });
            }
            Ok(Validated::Mutation {
                kind,
                table: table.clone(),
            })
        }
    }
}

struct Validator<'a> {
    catalog: &'a Catalog,
    scope: AliasScope,
    tables: Vec<Arc<Table>>,
}

impl<'a> Validator<'a> {
    fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            scope: AliasScope::default(),
            tables: Vec::new(),
        }
    }

    fn select(mut self, select: &Select) -> Result<QueryPlan, QueryError> {
        let first = self.bind_table(&select.from.base)?;
        let mut steps = Vec::with_capacity(select.from.joins.len());
        for join in &select.from.joins {
            steps.push((self.bind_table(&join.table)?, &join.on));
        }
        // ON clauses may only be checked once every table is in scope.
        let steps = steps
            .into_iter()
            .map(|(table, on)| {
                self.check_join_predicate(on)?;
                Ok(JoinStep {
                    table,
                    on: on.clone(),
                })
            })
            .collect::<Result<Vec<_>, QueryError>>()?;

        if let Some(filter) = &select.selection {
            self.check_expr(filter)?;
        }
        for term in &select.order_by {
            match &term.expr {
                Expr::Column(column) => self.check_column(column)?,
                other => {
                    return Err(QueryError::unsupported(format!(
                        "ORDER BY expression '{other}'"
                    )))
                }
            }
        }

        let mut projection = Vec::with_capacity(select.projection.len());
        let mut aggregates = Vec::new();
        for (position, item) in select.projection.iter().enumerate() {
            let (selector, label) = match item {
                SelectItem::Wildcard => (Selector::Wildcard, None),
                SelectItem::QualifiedWildcard(table) => {
                    if !self.scope.is_bound(table) {
                        return Err(QueryError::UnknownTable {
                            table: table.clone(),
                        });
                    }
                    (Selector::QualifiedWildcard(table.clone()), None)
                }
                SelectItem::Expr { expr, alias } => {
                    let selector = match expr {
                        Expr::Column(column) => {
                            self.check_column(column)?;
                            Selector::Column(column.clone())
                        }
                        Expr::Call { name, arg } => {
                            let function = AggregateFunction::from_name(name).ok_or_else(|| {
                                QueryError::UnknownFunction { name: name.clone() }
                            })?;
                            let column = match arg {
                                CallArg::Star => None,
                                CallArg::Expr(inner) => match inner.as_ref() {
                                    Expr::Column(column) => {
                                        self.check_column(column)?;
                                        Some(column.clone())
                                    }
                                    other => {
                                        return Err(QueryError::unsupported(format!(
                                            "argument '{other}' to {function}()"
                                        )))
                                    }
                                },
                            };
                            let selector = match &column {
                                Some(column) => Selector::Column(column.clone()),
                                None => Selector::Wildcard,
                            };
                            aggregates.push(AggregateDescriptor {
                                column,
                                result_position: position,
                                function,
                            });
                            selector
                        }
                        other => {
                            return Err(QueryError::unsupported(format!(
                                "result column '{other}'"
                            )))
                        }
                    };
                    (selector, alias.clone())
                }
            };
            projection.push(ProjectionItem { selector, label });
        }

        let source = if steps.is_empty() {
            SourcePlan::Table(first)
        } else {
            SourcePlan::Join { first, steps }
        };
        Ok(QueryPlan {
            source,
            filter: select.selection.clone(),
            order_by: select.order_by.clone(),
            limit: select.limit.clone(),
            offset: select.offset.clone(),
            projection,
            aggregates,
            scope: self.scope,
        })
    }

    fn bind_table(&mut self, table: &TableRef) -> Result<TablePlan, QueryError> {
        let declared = self
            .catalog
            .table(&table.name)
            .ok_or_else(|| QueryError::UnknownTable {
                table: table.name.clone(),
            })?;
        if self.scope.tables().contains(&table.name) {
            return Err(QueryError::unsupported(format!(
                "table '{}' joined more than once",
                table.name
            )));
        }
        if let Some(alias) = &table.alias {
            if self.scope.is_bound(alias) || alias == &table.name {
                return Err(QueryError::unsupported(format!(
                    "alias '{alias}' collides with another table or alias"
                )));
            }
        }
        if self.scope.is_bound(&table.name) {
            return Err(QueryError::unsupported(format!(
                "table '{}' shadows an alias",
                table.name
            )));
        }
        self.scope.add_table(&table.name);
        if let Some(alias) = &table.alias {
            self.scope.add_alias(alias, &table.name);
        }
        self.tables.push(Arc::clone(declared));
        Ok(TablePlan {
            table: Arc::clone(declared),
            alias: table.alias.clone(),
        })
    }

    fn check_join_predicate(&self, on: &Expr) -> Result<(), QueryError> {
        match on {
            Expr::Binary { op, left, right } if op.is_comparison() => {
                match (left.as_ref(), right.as_ref()) {
                    (Expr::Column(a), Expr::Column(b)) => {
                        self.check_column(a)?;
                        self.check_column(b)
                    }
                    _ => Err(QueryError::unsupported(format!(
                        "join predicate '{on}' must compare two columns"
                    ))),
                }
            }
            _ => Err(QueryError::unsupported(format!(
                "join predicate '{on}' must be a single comparison"
            ))),
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<(), QueryError> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Column(column) => self.check_column(column),
            Expr::Binary { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Not(inner) | Expr::IsNull { expr: inner, .. } => self.check_expr(inner),
            Expr::Call { name, .. } => Err(QueryError::unsupported(format!(
                "call to '{name}' outside the result columns"
            ))),
        }
    }

    fn check_column(&self, column: &ColumnRef) -> Result<(), QueryError> {
        match column.qualifier.as_deref() {
            Some(qualifier) => {
                let table_name =
                    self.scope
                        .resolve(qualifier)
                        .ok_or_else(|| QueryError::UnknownTable {
                            table: qualifier.to_owned(),
                        })?;
                let table = self.tables.iter().find(|t| t.name == table_name);
                match table {
                    Some(table) if table.has_column(&column.name) => Ok(()),
                    _ => Err(QueryError::UnknownColumn {
                        column: column.name.clone(),
                        table: table_name.to_owned(),
                    }),
                }
            }
            None => {
                if self.tables.iter().any(|t| t.has_column(&column.name)) {
                    Ok(())
                } else {
                    Err(QueryError::UnknownColumn {
                        column: column.name.clone(),
                        table: self.scope.tables().join(", "),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::sql::{parse_statement, translate};
    use crate::schema::{SemanticType, TableSchema};

    fn catalog() -> Catalog {
        Catalog::from_schemas([
            TableSchema::new("Account")
                .field("ID", SemanticType::Integer, "primary")
                .field("FirstName", SemanticType::Text, "")
                .field("Age", SemanticType::Integer, "")
                .field("OrganizationID", SemanticType::Integer, "")
                .field("Internal", SemanticType::Bool, "-"),
            TableSchema::new("Organization")
                .field("ID", SemanticType::Integer, "primary")
                .field("Name", SemanticType::Text, ""),
        ])
        .unwrap()
    }

    fn check(sql: &str, permissions: Permissions) -> Result<Validated, QueryError> {
        let statement = translate(&parse_statement(sql).unwrap()).unwrap();
        validate(&statement, &catalog(), permissions)
    }

    fn plan(sql: &str) -> QueryPlan {
        match check(sql, Permissions::SELECT).unwrap() {
            Validated::Query(plan) => plan,
            other => panic!("expected a query plan, got {other:?}"),
        }
    }

    fn code(sql: &str) -> &'static str {
        check(sql, Permissions::ALL).unwrap_err().code()
    }

    #[test]
    fn permissions_are_checked_first() {
        let err = check("select * from missing", Permissions::NONE).unwrap_err();
        assert_eq!(err.code(), "PermissionDenied");
        let err = check("delete from accounts", Permissions::SELECT).unwrap_err();
        assert!(matches!(
            err,
            QueryError::PermissionDenied {
                kind: StatementKind::Delete
            }
        ));
        assert!(matches!(
            check("delete from accounts", Permissions::DELETE).unwrap(),
            Validated::Mutation {
                kind: StatementKind::Delete,
                ..
            }
        ));
    }

    #[test]
    fn unknown_names() {
        assert_eq!(code("select * from people"), "UnknownTable");
        assert_eq!(code("select internal from accounts"), "UnknownColumn");
        assert_eq!(code("select x.age from accounts"), "UnknownTable");
        assert_eq!(code("select median(age) from accounts"), "UnknownFunction");
        assert_eq!(
            code("select * from accounts where missing = 1"),
            "UnknownColumn"
        );
        assert_eq!(code("select * from accounts order by missing"), "UnknownColumn");
    }

    #[test]
    fn aggregates_are_rewritten() {
        let plan = plan("select first_name, count(*), AVG(a.age) from accounts a");
        assert_eq!(
            plan.projection
                .iter()
                .map(|p| p.selector.clone())
                .collect::<Vec<_>>(),
            vec![
                Selector::Column(ColumnRef::bare("first_name")),
                Selector::Wildcard,
                Selector::Column(ColumnRef::qualified("a", "age")),
            ]
        );
        assert_eq!(
            plan.aggregates,
            vec![
                AggregateDescriptor {
                    column: None,
                    result_position: 1,
                    function: AggregateFunction::Count,
                },
                AggregateDescriptor {
                    column: Some(ColumnRef::qualified("a", "age")),
                    result_position: 2,
                    function: AggregateFunction::Avg,
                },
            ]
        );
        assert_eq!(plan.scope.resolve("a"), Some("accounts"));
    }

    #[test]
    fn join_plans() {
        let plan = plan(
            "select * from accounts join organizations o on accounts.organization_id = o.id",
        );
        let SourcePlan::Join { first, steps } = plan.source else {
            panic!("expected a join");
        };
        assert_eq!(first.table.name, "accounts");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].table.alias.as_deref(), Some("o"));
    }

    #[test]
    fn unsupported_shapes() {
        assert_eq!(code("select 1 from accounts"), "UnsupportedExpression");
        assert_eq!(code("select sum(age > 1) from accounts"), "UnsupportedExpression");
        assert_eq!(
            code("select * from accounts a join organizations a on a.id = a.id"),
            "UnsupportedExpression"
        );
        assert_eq!(
            code("select * from accounts join accounts on accounts.id = accounts.id"),
            "UnsupportedExpression"
        );
        assert_eq!(
            code("select * from accounts join organizations on accounts.age > 1"),
            "UnsupportedExpression"
        );
        assert_eq!(
            code("select * from accounts where count(*) > 1"),
            "UnsupportedExpression"
        );
    }

    #[test]
    fn catalog_is_not_mutated_by_aliases() {
        let catalog = catalog();
        let statement = translate(&parse_statement("select a.age from accounts a").unwrap()).unwrap();
        validate(&statement, &catalog, Permissions::SELECT).unwrap();
        assert!(catalog.table("a").is_none());
        assert_eq!(catalog.len(), 2);
    }
}
