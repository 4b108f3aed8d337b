//! Parse tree for queries
//!
//! Nodes are plain immutable data. `Display` on expressions produces the
//! canonical text used as the default name of a projected field, e.g.
//! `Sum(Population)` or `a.Name`.

use std::fmt;

// ============================================================================
// Literals and Operators
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Like => "like",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// `Name` or `alias.Name`
    Column {
        alias: Option<String>,
        name: String,
    },
    /// `Method(args)` or `alias.Method(args)`
    Call {
        alias: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// `expr IN (a, b, ...)`
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
    },
    Parens(Box<Expr>),
}

impl Expr {
    pub fn column(name: &str) -> Self {
        Expr::Column {
            alias: None,
            name: name.to_string(),
        }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            alias: None,
            name: name.to_string(),
            args,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Real(r) => write!(f, "{:?}", r),
            Literal::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Column { alias: Some(a), name } => write!(f, "{}.{}", a, name),
            Expr::Column { alias: None, name } => f.write_str(name),
            Expr::Call { alias, name, args } => {
                if let Some(a) = alias {
                    write!(f, "{}.", a)?;
                }
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::Unary { op: UnaryOp::Neg, expr } => write!(f, "-{}", expr),
            Expr::Unary { op: UnaryOp::Not, expr } => write!(f, "not {}", expr),
            Expr::In { expr, list } => {
                write!(f, "{} in (", expr)?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Expr::Parens(inner) => write!(f, "({})", inner),
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`: every column of every source
    Star,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    /// `#schema.method(args) alias`
    Schema {
        schema: String,
        method: String,
        args: Vec<Literal>,
        alias: Option<String>,
    },
    /// `name alias`, a CTE defined earlier in the statement
    Named { name: String, alias: Option<String> },
    /// `left JOIN right ON condition`
    Join {
        left: Box<FromSource>,
        right: Box<FromSource>,
        on: Expr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub keys: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub fields: Vec<SelectItem>,
    pub from: FromSource,
    pub where_clause: Option<Expr>,
    pub group_by: Option<GroupBy>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Except,
    Intersect,
}

impl SetOperator {
    /// Name used when naming the combining procedure
    pub fn name(self) -> &'static str {
        match self {
            SetOperator::Union => "Union",
            SetOperator::UnionAll => "UnionAll",
            SetOperator::Except => "Except",
            SetOperator::Intersect => "Intersect",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    Query(Box<Query>),
    /// `left OP (key, ...) right`
    Operation {
        op: SetOperator,
        keys: Vec<String>,
        left: Box<SetExpr>,
        right: Box<SetExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub body: SetExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryStatement {
    pub ctes: Vec<Cte>,
    pub body: SetExpr,
}

/// `DESC #schema.method(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct Describe {
    pub schema: String,
    pub method: String,
    pub args: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(QueryStatement),
    Desc(Describe),
}

impl Statement {
    pub fn as_query(&self) -> Option<&QueryStatement> {
        match self {
            Statement::Query(query) => Some(query),
            Statement::Desc(_) => None,
        }
    }
}

/// One or more statements separated by `;`
#[derive(Debug, Clone, PartialEq)]
pub struct Root {
    pub statements: Vec<Statement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_text() {
        let expr = Expr::binary(
            BinaryOp::Gt,
            Expr::call("Sum", vec![Expr::column("Population")]),
            Expr::Literal(Literal::Integer(1000)),
        );
        assert_eq!(expr.to_string(), "Sum(Population) > 1000");
    }

    #[test]
    fn test_qualified_text() {
        let expr = Expr::Call {
            alias: Some("a".into()),
            name: "ToUpper".into(),
            args: vec![Expr::Column {
                alias: Some("a".into()),
                name: "City".into(),
            }],
        };
        assert_eq!(expr.to_string(), "a.ToUpper(a.City)");
    }

    #[test]
    fn test_in_list_text() {
        let expr = Expr::In {
            expr: Box::new(Expr::column("Country")),
            list: vec![
                Expr::Literal(Literal::Text("Poland".into())),
                Expr::Literal(Literal::Text("Germany".into())),
            ],
        };
        assert_eq!(expr.to_string(), "Country in ('Poland', 'Germany')");
    }

    #[test]
    fn test_literal_text() {
        assert_eq!(Literal::Text("it's".into()).to_string(), "'it''s'");
        assert_eq!(Literal::Real(2.0).to_string(), "2.0");
    }
}
