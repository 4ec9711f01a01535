//! Predicate tree carried by QueryData requests.
//!
//! A query is either a single field comparison or a compound node joining
//! two subtrees with `and`/`or`. The tree is part of the wire contract:
//! clients build it (directly or through the text parser) and the server
//! evaluates it against Json-table documents.

use serde::{Deserialize, Serialize};

/// Logical connective of a compound node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

/// Comparison operator of a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    TextSearch,
}

/// How a comparison interprets its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrdering {
    Lexicographic,
    RealNumbers,
    FullText,
}

/// A literal in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryLiteral {
    Int(i64),
    Float(f64),
    Str(String),
}

impl QueryLiteral {
    /// The ordering a literal of this type implies.
    pub fn inferred_ordering(&self, op: CompareOp) -> QueryOrdering {
        match (self, op) {
            (QueryLiteral::Str(_), CompareOp::TextSearch) => QueryOrdering::FullText,
            (QueryLiteral::Str(_), _) => QueryOrdering::Lexicographic,
            _ => QueryOrdering::RealNumbers,
        }
    }
}

/// A predicate over the documents of a Json table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryExpr {
    Compound {
        op: LogicalOp,
        left: Box<QueryExpr>,
        right: Box<QueryExpr>,
    },
    Comparison {
        op: CompareOp,
        field: String,
        value: QueryLiteral,
        ordering: QueryOrdering,
    },
}

impl QueryExpr {
    pub fn comparison(op: CompareOp, field: &str, value: QueryLiteral) -> Self {
        let ordering = value.inferred_ordering(op);
        QueryExpr::Comparison {
            op,
            field: field.to_string(),
            value,
            ordering,
        }
    }
}

/// Builder helpers mirroring the comparison operators.
pub fn q_eq(field: &str, value: QueryLiteral) -> QueryExpr {
    QueryExpr::comparison(CompareOp::Eq, field, value)
}

pub fn q_neq(field: &str, value: QueryLiteral) -> QueryExpr {
    QueryExpr::comparison(CompareOp::NotEq, field, value)
}

pub fn q_gt(field: &str, value: QueryLiteral) -> QueryExpr {
    QueryExpr::comparison(CompareOp::Gt, field, value)
}

pub fn q_gte(field: &str, value: QueryLiteral) -> QueryExpr {
    QueryExpr::comparison(CompareOp::Gte, field, value)
}

pub fn q_lt(field: &str, value: QueryLiteral) -> QueryExpr {
    QueryExpr::comparison(CompareOp::Lt, field, value)
}

pub fn q_lte(field: &str, value: QueryLiteral) -> QueryExpr {
    QueryExpr::comparison(CompareOp::Lte, field, value)
}

pub fn q_text(field: &str, needle: &str) -> QueryExpr {
    QueryExpr::comparison(
        CompareOp::TextSearch,
        field,
        QueryLiteral::Str(needle.to_string()),
    )
}

pub fn q_and(left: QueryExpr, right: QueryExpr) -> QueryExpr {
    QueryExpr::Compound {
        op: LogicalOp::And,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn q_or(left: QueryExpr, right: QueryExpr) -> QueryExpr {
    QueryExpr::Compound {
        op: LogicalOp::Or,
        left: Box::new(left),
        right: Box::new(right),
    }
}
