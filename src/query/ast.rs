//! Internal statement tree produced from parsed SQL.

use std::fmt;

use crate::query::value::Value;
use crate::schema::permissions::StatementKind;

/// A translated statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// `SELECT ...`
    Select(Select),
    /// `INSERT INTO <table> ...`
    Insert {
        /// Target table.
        table: String,
    },
    /// `UPDATE <table> ...`
    Update {
        /// Target table.
        table: String,
    },
    /// `DELETE FROM <table> ...`
    Delete {
        /// Target table.
        table: String,
    },
}

impl Statement {
    /// Permission bucket for the statement.
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Select(_) => StatementKind::Select,
            Statement::Insert { .. } => StatementKind::Insert,
            Statement::Update { .. } => StatementKind::Update,
            Statement::Delete { .. } => StatementKind::Delete,
        }
    }
}

/// `SELECT` body.
#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    /// Result columns in declared order.
    pub projection: Vec<SelectItem>,
    /// Table and joins.
    pub from: FromClause,
    /// `WHERE` predicate.
    pub selection: Option<Expr>,
    /// `ORDER BY` terms.
    pub order_by: Vec<OrderTerm>,
    /// Raw `LIMIT` expression.
    pub limit: Option<Expr>,
    /// Raw `OFFSET` expression.
    pub offset: Option<Expr>,
}

/// One result column.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `table.*`
    QualifiedWildcard(String),
    /// Any other expression, optionally labelled with `AS`.
    Expr {
        /// Result expression.
        expr: Expr,
        /// `AS` label.
        alias: Option<String>,
    },
}

/// `FROM` clause.
#[derive(Clone, Debug, PartialEq)]
pub struct FromClause {
    /// First table.
    pub base: TableRef,
    /// Inner joins, left to right.
    pub joins: Vec<Join>,
}

/// Table reference with an optional alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRef {
    /// Declared table name.
    pub name: String,
    /// Query-local alias.
    pub alias: Option<String>,
}

/// `JOIN <table> ON <expr>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    /// Joined table.
    pub table: TableRef,
    /// Join predicate.
    pub on: Expr,
}

/// One `ORDER BY` term.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderTerm {
    /// Sort key.
    pub expr: Expr,
    /// `DESC`
    pub descending: bool,
}

/// Column reference, optionally qualified by a table name or alias.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Table name or alias.
    pub qualifier: Option<String>,
    /// Column name.
    pub name: String,
}

impl ColumnRef {
    /// Unqualified reference.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Qualified reference.
    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Binary operators understood by the evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `=`
    Eq,
    /// `!=` / `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
}

impl BinaryOp {
    /// Operator to use once the operands trade places: `a < b` is `b > a`.
    pub fn swapped(self) -> Self {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => other,
        }
    }

    /// True for `= != < <= > >=`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
        }
    }
}

/// Function call argument.
#[derive(Clone, Debug, PartialEq)]
pub enum CallArg {
    /// `*`
    Star,
    /// Single expression argument.
    Expr(Box<Expr>),
}

/// Expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Constant.
    Literal(Value),
    /// Column reference.
    Column(ColumnRef),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `NOT expr`
    Not(Box<Expr>),
    /// `expr IS [NOT] NULL`
    IsNull {
        /// Tested expression.
        expr: Box<Expr>,
        /// `IS NOT NULL`
        negated: bool,
    },
    /// `name(arg)`
    Call {
        /// Function name as written.
        name: String,
        /// Single argument.
        arg: CallArg,
    },
}

impl Expr {
    /// Builds a binary node.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Column node for `name`.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::bare(name))
    }

    /// Literal node.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Text(s)) => write!(f, "'{s}'"),
            Expr::Literal(Value::Null) => f.write_str("NULL"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Binary { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Expr::Call { name, arg } => match arg {
                CallArg::Star => write!(f, "{name}(*)"),
                CallArg::Expr(e) => write!(f, "{name}({e})"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapping_flips_direction_only() {
        assert_eq!(BinaryOp::Lt.swapped(), BinaryOp::Gt);
        assert_eq!(BinaryOp::Gt.swapped(), BinaryOp::Lt);
        assert_eq!(BinaryOp::LtEq.swapped(), BinaryOp::GtEq);
        assert_eq!(BinaryOp::GtEq.swapped(), BinaryOp::LtEq);
        assert_eq!(BinaryOp::Eq.swapped(), BinaryOp::Eq);
        assert_eq!(BinaryOp::NotEq.swapped(), BinaryOp::NotEq);
    }

    #[test]
    fn display_is_sql_like() {
        let expr = Expr::binary(
            BinaryOp::And,
            Expr::binary(BinaryOp::Gt, Expr::column("age"), Expr::literal(18i64)),
            Expr::IsNull {
                expr: Box::new(Expr::Column(ColumnRef::qualified("a", "email"))),
                negated: true,
            },
        );
        assert_eq!(expr.to_string(), "age > 18 AND a.email IS NOT NULL");
    }
}
