//! SQL generation.
//!
//! A small typed SQL builder that renders aggregation statements for several
//! dialects:
//!
//! - [`query`] - SELECT builder with nested FROM join trees
//! - [`expr`] - expression AST and builder DSL
//! - [`token`] - token types for SQL generation
//! - [`dialect`] - dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

#[cfg(test)]
pub mod test_utils;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    and_all, avg, case_when, coalesce, col, count, count_distinct, count_star, extract, func,
    lit_bool, lit_float, lit_int, lit_null, lit_str, max, min, or_all, qualified_col, star, sum,
    table_col, BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{
    FromItem, JoinType, LimitOffset, NullsOrder, OrderByExpr, Query, SelectExpr, SortDir, TableRef,
};
pub use token::{Token, TokenStream};
