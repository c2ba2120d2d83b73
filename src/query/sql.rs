//! Translation from the `sqlparser` statement tree into [`ast::Statement`].
//!
//! The translation is a plain recursive descent; anything outside the
//! supported dialect is rejected with `UnsupportedExpression`.

use sqlparser::ast::{
    BinaryOperator, Expr as SqlExpr, FromTable, Function, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Ident, JoinConstraint, JoinOperator, LimitClause, ObjectName,
    ObjectNamePart, OrderByKind, Query, SelectItem as SqlSelectItem,
    SelectItemQualifiedWildcardKind, SetExpr, Statement as SqlStatement, TableFactor,
    TableObject, TableWithJoins, UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::Error;
use crate::query::ast::{
    BinaryOp, CallArg, ColumnRef, Expr, FromClause, Join, OrderTerm, Select, SelectItem,
    Statement, TableRef,
};
use crate::query::errors::QueryError;
use crate::query::value::Value;
use crate::schema::Catalog;

type Result<T> = std::result::Result<T, QueryError>;

/// Parses exactly one statement.
pub fn parse_statement(sql: &str) -> std::result::Result<SqlStatement, Error> {
    let mut statements =
        Parser::parse_sql(&GenericDialect {}, sql).map_err(|err| Error::Parse(err.to_string()))?;
    match statements.len() {
        0 => Err(Error::Parse("empty statement".into())),
        1 => Ok(statements.remove(0)),
        n => Err(QueryError::unsupported(format!("{n} statements in one request")).into()),
    }
}

/// Translates a parsed statement.
pub fn translate(statement: &SqlStatement) -> Result<Statement> {
    match statement {
        SqlStatement::Query(query) => Ok(Statement::Select(translate_query(query)?)),
        SqlStatement::Insert(insert) => match &insert.table {
            TableObject::TableName(name) => Ok(Statement::Insert {
                table: object_name(name)?,
            }),
            _ => Err(QueryError::unsupported("INSERT into a table function")),
        },
        SqlStatement::Update { table, .. } => Ok(Statement::Update {
            table: relation_name(table)?,
        }),
        SqlStatement::Delete(delete) => {
            let tables = match &delete.from {
                FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
            };
            match tables.as_slice() {
                [table] => Ok(Statement::Delete {
                    table: relation_name(table)?,
                }),
                _ => Err(QueryError::unsupported("DELETE from more than one table")),
            }
        }
        other => Err(QueryError::unsupported(first_keyword(other))),
    }
}

fn first_keyword(statement: &SqlStatement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
        + " statements"
}

fn translate_query(query: &Query) -> Result<Select> {
    if query.with.is_some() {
        return Err(QueryError::unsupported("WITH clauses"));
    }
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(QueryError::unsupported("set operations and subqueries"));
    };
    if select.distinct.is_some() {
        return Err(QueryError::unsupported("DISTINCT"));
    }
    match &select.group_by {
        GroupByExpr::Expressions(exprs, modifiers) if exprs.is_empty() && modifiers.is_empty() => {}
        _ => return Err(QueryError::unsupported("GROUP BY")),
    }
    if select.having.is_some() {
        return Err(QueryError::unsupported("HAVING"));
    }

    let from = match select.from.as_slice() {
        [table] => translate_from(table)?,
        [] => return Err(QueryError::unsupported("SELECT without FROM")),
        _ => return Err(QueryError::unsupported("comma joins")),
    };

    let projection = select
        .projection
        .iter()
        .map(translate_select_item)
        .collect::<Result<Vec<_>>>()?;
    let selection = select.selection.as_ref().map(translate_expr).transpose()?;

    let mut order_by = Vec::new();
    if let Some(clause) = &query.order_by {
        let OrderByKind::Expressions(exprs) = &clause.kind else {
            return Err(QueryError::unsupported("ORDER BY ALL"));
        };
        for term in exprs {
            order_by.push(OrderTerm {
                expr: translate_expr(&term.expr)?,
                descending: term.options.asc == Some(false),
            });
        }
    }

    let (limit, offset) = match &query.limit_clause {
        None => (None, None),
        Some(LimitClause::LimitOffset {
            limit,
            offset,
            limit_by,
        }) => {
            if !limit_by.is_empty() {
                return Err(QueryError::unsupported("LIMIT BY"));
            }
            (
                limit.as_ref().map(translate_expr).transpose()?,
                offset.as_ref().map(|o| translate_expr(&o.value)).transpose()?,
            )
        }
        Some(LimitClause::OffsetCommaLimit { offset, limit }) => {
            (Some(translate_expr(limit)?), Some(translate_expr(offset)?))
        }
    };

    Ok(Select {
        projection,
        from,
        selection,
        order_by,
        limit,
        offset,
    })
}

fn translate_from(table: &TableWithJoins) -> Result<FromClause> {
    let base = table_ref(&table.relation)?;
    let mut joins = Vec::with_capacity(table.joins.len());
    for join in &table.joins {
        let constraint = match &join.join_operator {
            JoinOperator::Join(constraint) | JoinOperator::Inner(constraint) => constraint,
            _ => return Err(QueryError::unsupported("outer and cross joins")),
        };
        let JoinConstraint::On(on) = constraint else {
            return Err(QueryError::unsupported("joins without an ON predicate"));
        };
        joins.push(Join {
            table: table_ref(&join.relation)?,
            on: translate_expr(on)?,
        });
    }
    Ok(FromClause { base, joins })
}

fn table_ref(factor: &TableFactor) -> Result<TableRef> {
    let TableFactor::Table { name, alias, .. } = factor else {
        return Err(QueryError::unsupported("derived tables and table functions"));
    };
    Ok(TableRef {
        name: object_name(name)?,
        alias: alias.as_ref().map(|a| a.name.value.clone()),
    })
}

fn relation_name(table: &TableWithJoins) -> Result<String> {
    Ok(table_ref(&table.relation)?.name)
}

fn object_name(name: &ObjectName) -> Result<String> {
    match name.0.last() {
        Some(ObjectNamePart::Identifier(ident)) => Ok(ident.value.clone()),
        _ => Err(QueryError::unsupported(format!("object name '{name}'"))),
    }
}

fn translate_select_item(item: &SqlSelectItem) -> Result<SelectItem> {
    match item {
        SqlSelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
        SqlSelectItem::QualifiedWildcard(SelectItemQualifiedWildcardKind::ObjectName(name), _) => {
            Ok(SelectItem::QualifiedWildcard(object_name(name)?))
        }
        SqlSelectItem::QualifiedWildcard(..) => {
            Err(QueryError::unsupported("expression wildcards"))
        }
        SqlSelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
            expr: translate_expr(expr)?,
            alias: None,
        }),
        SqlSelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
            expr: translate_expr(expr)?,
            alias: Some(alias.value.clone()),
        }),
    }
}

fn translate_expr(expr: &SqlExpr) -> Result<Expr> {
    match expr {
        SqlExpr::Identifier(ident) => Ok(Expr::Column(ColumnRef::bare(ident.value.clone()))),
        SqlExpr::CompoundIdentifier(idents) => match idents.as_slice() {
            [table, column] => Ok(Expr::Column(ColumnRef::qualified(
                table.value.clone(),
                column.value.clone(),
            ))),
            _ => Err(QueryError::unsupported(format!("identifier '{expr}'"))),
        },
        SqlExpr::Value(value) => translate_value(&value.value).map(Expr::Literal),
        SqlExpr::Nested(inner) => translate_expr(inner),
        SqlExpr::UnaryOp { op, expr: inner } => match op {
            UnaryOperator::Not => Ok(Expr::Not(Box::new(translate_expr(inner)?))),
            UnaryOperator::Plus => translate_expr(inner),
            UnaryOperator::Minus => match translate_expr(inner)? {
                Expr::Literal(Value::Integer(v)) => Ok(Expr::Literal(Value::Integer(-v))),
                Expr::Literal(Value::Float(v)) => Ok(Expr::Literal(Value::Float(-v))),
                _ => Err(QueryError::unsupported(format!("negation of '{inner}'"))),
            },
            _ => Err(QueryError::unsupported(format!("operator in '{expr}'"))),
        },
        SqlExpr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::And => BinaryOp::And,
                BinaryOperator::Or => BinaryOp::Or,
                BinaryOperator::Eq => BinaryOp::Eq,
                BinaryOperator::NotEq => BinaryOp::NotEq,
                BinaryOperator::Lt => BinaryOp::Lt,
                BinaryOperator::LtEq => BinaryOp::LtEq,
                BinaryOperator::Gt => BinaryOp::Gt,
                BinaryOperator::GtEq => BinaryOp::GtEq,
                other => return Err(QueryError::unsupported(format!("operator '{other}'"))),
            };
            Ok(Expr::binary(op, translate_expr(left)?, translate_expr(right)?))
        }
        SqlExpr::Like {
            negated,
            expr: inner,
            pattern,
            ..
        } => {
            let op = if *negated {
                BinaryOp::NotLike
            } else {
                BinaryOp::Like
            };
            Ok(Expr::binary(op, translate_expr(inner)?, translate_expr(pattern)?))
        }
        SqlExpr::IsNull(inner) => Ok(Expr::IsNull {
            expr: Box::new(translate_expr(inner)?),
            negated: false,
        }),
        SqlExpr::IsNotNull(inner) => Ok(Expr::IsNull {
            expr: Box::new(translate_expr(inner)?),
            negated: true,
        }),
        SqlExpr::Function(fun) => translate_call(fun),
        other => Err(QueryError::unsupported(format!("'{other}'"))),
    }
}

fn translate_value(value: &SqlValue) -> Result<Value> {
    match value {
        SqlValue::Number(raw, _) => {
            if !(raw.contains('.') || raw.contains('e') || raw.contains('E')) {
                if let Ok(v) = raw.parse::<i64>() {
                    return Ok(Value::Integer(v));
                }
            }
            raw.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| QueryError::unsupported(format!("numeric literal '{raw}'")))
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Value::Text(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(Value::Bool(*b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(QueryError::unsupported(format!("literal {other}"))),
    }
}

fn translate_call(fun: &Function) -> Result<Expr> {
    if fun.over.is_some() || fun.filter.is_some() {
        return Err(QueryError::unsupported("window and filtered aggregates"));
    }
    let name = object_name(&fun.name)?;
    let FunctionArguments::List(list) = &fun.args else {
        return Err(QueryError::unsupported(format!("call '{name}' without arguments")));
    };
    if list.duplicate_treatment.is_some() {
        return Err(QueryError::unsupported("DISTINCT aggregates"));
    }
    let arg = match list.args.as_slice() {
        [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)] => CallArg::Star,
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))] => {
            CallArg::Expr(Box::new(translate_expr(expr)?))
        }
        [_] => return Err(QueryError::unsupported(format!("argument to '{name}'"))),
        args => {
            return Err(QueryError::unsupported(format!(
                "'{name}' called with {} arguments",
                args.len()
            )))
        }
    };
    Ok(Expr::Call { name, arg })
}

/// Expands `*` and `table.*` result columns of a pass-through SELECT into the
/// declared column lists so omitted fields stay hidden from the backend.
///
/// Joined queries get every expanded column qualified by its table (or
/// alias). Aggregate arguments such as `count(*)` are left alone.
pub fn expand_wildcards(statement: &mut SqlStatement, catalog: &Catalog) -> Result<()> {
    let SqlStatement::Query(query) = statement else {
        return Ok(());
    };
    let SetExpr::Select(select) = query.body.as_mut() else {
        return Ok(());
    };

    let mut sources: Vec<(String, String)> = Vec::new();
    for table in &select.from {
        let base = table_ref(&table.relation)?;
        sources.push(qualified_source(base));
        for join in &table.joins {
            sources.push(qualified_source(table_ref(&join.relation)?));
        }
    }
    let qualify = sources.len() > 1;

    let mut expanded = Vec::with_capacity(select.projection.len());
    for item in select.projection.drain(..) {
        let targets: Vec<&(String, String)> = match &item {
            SqlSelectItem::Wildcard(_) => sources.iter().collect(),
            SqlSelectItem::QualifiedWildcard(SelectItemQualifiedWildcardKind::ObjectName(n), _) => {
                let qualifier = object_name(n)?;
                sources
                    .iter()
                    .filter(|(table, label)| *table == qualifier || *label == qualifier)
                    .collect()
            }
            _ => {
                expanded.push(item);
                continue;
            }
        };
        for (table, label) in targets {
            let declared = catalog.table(table).ok_or_else(|| QueryError::UnknownTable {
                table: table.clone(),
            })?;
            for column in &declared.columns {
                let expr = if qualify {
                    SqlExpr::CompoundIdentifier(vec![Ident::new(label), Ident::new(column)])
                } else {
                    SqlExpr::Identifier(Ident::new(column))
                };
                expanded.push(SqlSelectItem::UnnamedExpr(expr));
            }
        }
    }
    select.projection = expanded;
    Ok(())
}

fn qualified_source(table: TableRef) -> (String, String) {
    let label = table.alias.clone().unwrap_or_else(|| table.name.clone());
    (table.name, label)
}
