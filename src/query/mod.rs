//! Query language: predicate AST, text parser, and evaluator.

pub mod ast;
pub mod eval;
pub mod parser;

pub use ast::{
    q_and, q_eq, q_gt, q_gte, q_lt, q_lte, q_neq, q_or, q_text, CompareOp, LogicalOp, QueryExpr,
    QueryLiteral, QueryOrdering,
};
pub use eval::matches;
pub use parser::parse_query;
