//! Arithmetic expressions of derived attributes.
//!
//! An attribute may be computed from other attributes, for example
//! `price * quantity` or `round(amount / 100, 2)`. The expression text is a
//! SQL expression; it is parsed once with sqlparser and converted into the
//! small [`AttributeExpr`] tree. Identifiers become variables that refer to
//! other attributes by their reference.

use std::collections::BTreeSet;

use sqlparser::ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{QueryError, QueryResult};
use crate::sql::expr::{func, lit_bool, lit_float, lit_int, lit_null, lit_str, Expr, ExprExt};
use crate::sql::BinaryOperator;

/// Functions an attribute expression may call.
pub const EXPRESSION_FUNCTIONS: &[&str] = &[
    // String
    "lower", "upper", "left", "right", "substr", "lpad", "rpad", "replace", "concat", "repeat",
    "position", "trim", "length",
    // Math
    "abs", "round", "trunc", "floor", "ceil", "mod", "sign", "power", "exp", "ln", "log",
    "sqrt",
    // Conditionals
    "coalesce", "nullif",
    // Aggregates
    "sum", "count", "min", "max", "avg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
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
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Concat,
}

impl BinaryOp {
    fn sql_operator(self) -> BinaryOperator {
        match self {
            BinaryOp::Add => BinaryOperator::Plus,
            BinaryOp::Sub => BinaryOperator::Minus,
            BinaryOp::Mul => BinaryOperator::Mul,
            BinaryOp::Div => BinaryOperator::Div,
            BinaryOp::Mod => BinaryOperator::Mod,
            BinaryOp::Eq => BinaryOperator::Eq,
            BinaryOp::Ne => BinaryOperator::Ne,
            BinaryOp::Lt => BinaryOperator::Lt,
            BinaryOp::Lte => BinaryOperator::Lte,
            BinaryOp::Gt => BinaryOperator::Gt,
            BinaryOp::Gte => BinaryOperator::Gte,
            BinaryOp::And => BinaryOperator::And,
            BinaryOp::Or => BinaryOperator::Or,
            BinaryOp::Concat => BinaryOperator::Concat,
        }
    }
}

/// Parsed attribute expression.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeExpr {
    /// Reference to another attribute.
    Variable(String),
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
    Unary {
        op: UnaryOp,
        operand: Box<AttributeExpr>,
    },
    Binary {
        left: Box<AttributeExpr>,
        op: BinaryOp,
        right: Box<AttributeExpr>,
    },
    Function {
        name: String,
        args: Vec<AttributeExpr>,
    },
}

impl AttributeExpr {
    /// Parse expression text.
    pub fn parse(text: &str) -> QueryResult<Self> {
        let sql = format!("SELECT {}", text);
        let statements = Parser::parse_sql(&GenericDialect {}, &sql)
            .map_err(|e| QueryError::Expression(format!("can not parse '{}': {}", text, e)))?;

        let expr = match statements.as_slice() {
            [ast::Statement::Query(query)] => match query.body.as_ref() {
                ast::SetExpr::Select(select)
                    if select.from.is_empty() && select.selection.is_none() =>
                {
                    match select.projection.as_slice() {
                        [ast::SelectItem::UnnamedExpr(expr)] => Some(expr),
                        _ => None,
                    }
                }
                _ => None,
            },
            _ => None,
        };

        match expr {
            Some(expr) => convert(expr, text),
            None => Err(QueryError::Expression(format!(
                "'{}' is not a single expression",
                text
            ))),
        }
    }

    /// Names of all variables the expression refers to.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            AttributeExpr::Variable(name) => {
                names.insert(name.clone());
            }
            AttributeExpr::Unary { operand, .. } => operand.collect_variables(names),
            AttributeExpr::Binary { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            AttributeExpr::Function { args, .. } => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
            _ => {}
        }
    }

    /// Compile into a SQL expression. `resolve` supplies the compiled
    /// expression for every variable.
    pub fn compile<F>(&self, resolve: &mut F) -> QueryResult<Expr>
    where
        F: FnMut(&str) -> QueryResult<Expr>,
    {
        Ok(match self {
            AttributeExpr::Variable(name) => resolve(name)?,
            AttributeExpr::Integer(n) => lit_int(*n),
            AttributeExpr::Float(f) => lit_float(*f),
            AttributeExpr::String(s) => lit_str(s),
            AttributeExpr::Bool(b) => lit_bool(*b),
            AttributeExpr::Null => lit_null(),
            AttributeExpr::Unary { op, operand } => {
                let operand = operand.compile(resolve)?;
                match op {
                    UnaryOp::Neg => operand.neg(),
                    UnaryOp::Not => operand.not(),
                }
            }
            AttributeExpr::Binary { left, op, right } => {
                let left = left.compile(resolve)?;
                let right = right.compile(resolve)?;
                left.binary(op.sql_operator(), right)
            }
            AttributeExpr::Function { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.compile(resolve))
                    .collect::<QueryResult<Vec<_>>>()?;
                func(name, args)
            }
        })
    }
}

fn convert(expr: &ast::Expr, text: &str) -> QueryResult<AttributeExpr> {
    let unsupported = |what: &str| {
        QueryError::Expression(format!("unsupported {} in expression '{}'", what, text))
    };

    Ok(match expr {
        ast::Expr::Identifier(ident) => AttributeExpr::Variable(ident.value.clone()),
        ast::Expr::CompoundIdentifier(parts) => AttributeExpr::Variable(
            parts
                .iter()
                .map(|part| part.value.as_str())
                .collect::<Vec<_>>()
                .join("."),
        ),
        ast::Expr::Value(value) => match value {
            ast::Value::Number(n, _) => match n.parse::<i64>() {
                Ok(i) => AttributeExpr::Integer(i),
                Err(_) => AttributeExpr::Float(
                    n.parse::<f64>()
                        .map_err(|_| unsupported(&format!("number '{}'", n)))?,
                ),
            },
            ast::Value::SingleQuotedString(s) => AttributeExpr::String(s.clone()),
            ast::Value::Boolean(b) => AttributeExpr::Bool(*b),
            ast::Value::Null => AttributeExpr::Null,
            other => return Err(unsupported(&format!("value {}", other))),
        },
        ast::Expr::Nested(inner) => convert(inner, text)?,
        ast::Expr::UnaryOp { op, expr } => {
            let operand = convert(expr, text)?;
            match op {
                ast::UnaryOperator::Plus => operand,
                ast::UnaryOperator::Minus => AttributeExpr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                ast::UnaryOperator::Not => AttributeExpr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                other => return Err(unsupported(&format!("operator {}", other))),
            }
        }
        ast::Expr::BinaryOp { left, op, right } => {
            let op = match op {
                ast::BinaryOperator::Plus => BinaryOp::Add,
                ast::BinaryOperator::Minus => BinaryOp::Sub,
                ast::BinaryOperator::Multiply => BinaryOp::Mul,
                ast::BinaryOperator::Divide => BinaryOp::Div,
                ast::BinaryOperator::Modulo => BinaryOp::Mod,
                ast::BinaryOperator::Eq => BinaryOp::Eq,
                ast::BinaryOperator::NotEq => BinaryOp::Ne,
                ast::BinaryOperator::Lt => BinaryOp::Lt,
                ast::BinaryOperator::LtEq => BinaryOp::Lte,
                ast::BinaryOperator::Gt => BinaryOp::Gt,
                ast::BinaryOperator::GtEq => BinaryOp::Gte,
                ast::BinaryOperator::And => BinaryOp::And,
                ast::BinaryOperator::Or => BinaryOp::Or,
                ast::BinaryOperator::StringConcat => BinaryOp::Concat,
                other => return Err(unsupported(&format!("operator {}", other))),
            };
            AttributeExpr::Binary {
                left: Box::new(convert(left, text)?),
                op,
                right: Box::new(convert(right, text)?),
            }
        }
        ast::Expr::Function(function) => {
            let name = function.name.to_string().to_lowercase();
            if !EXPRESSION_FUNCTIONS.contains(&name.as_str()) {
                return Err(QueryError::Expression(format!(
                    "unknown function '{}' in expression '{}'",
                    name, text
                )));
            }
            let args = match &function.args {
                ast::FunctionArguments::None => Vec::new(),
                ast::FunctionArguments::List(list) => list
                    .args
                    .iter()
                    .map(|arg| match arg {
                        ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(e)) => {
                            convert(e, text)
                        }
                        _ => Err(unsupported("function argument")),
                    })
                    .collect::<QueryResult<Vec<_>>>()?,
                _ => return Err(unsupported("subquery")),
            };
            AttributeExpr::Function { name, args }
        }
        _ => return Err(unsupported("construct")),
    })
}
