//! Predicate evaluation against Json-table documents.

use crate::query::ast::{CompareOp, LogicalOp, QueryExpr, QueryLiteral, QueryOrdering};
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluate a predicate tree against one document.
///
/// A comparison on a missing field is false; so is a numeric comparison on
/// a field that cannot be coerced to a number.
pub fn matches(expr: &QueryExpr, doc: &Value) -> bool {
    match expr {
        QueryExpr::Compound { op, left, right } => match op {
            LogicalOp::And => matches(left, doc) && matches(right, doc),
            LogicalOp::Or => matches(left, doc) || matches(right, doc),
        },
        QueryExpr::Comparison {
            op,
            field,
            value,
            ordering,
        } => {
            let Some(field_value) = doc.get(field) else {
                return false;
            };
            match ordering {
                QueryOrdering::RealNumbers => compare_numeric(field_value, value)
                    .map(|cmp| apply_op(*op, cmp))
                    .unwrap_or(false),
                QueryOrdering::Lexicographic => compare_lexicographic(field_value, value)
                    .map(|cmp| apply_op(*op, cmp))
                    .unwrap_or(false),
                QueryOrdering::FullText => text_search(field_value, value),
            }
        }
    }
}

fn apply_op(op: CompareOp, cmp: Ordering) -> bool {
    match op {
        CompareOp::Eq => cmp == Ordering::Equal,
        CompareOp::NotEq => cmp != Ordering::Equal,
        CompareOp::Gt => cmp == Ordering::Greater,
        CompareOp::Gte => cmp != Ordering::Less,
        CompareOp::Lt => cmp == Ordering::Less,
        CompareOp::Lte => cmp != Ordering::Greater,
        // TextSearch never reaches apply_op
        CompareOp::TextSearch => false,
    }
}

/// Coerce a document field to f64: JSON numbers directly, numeric strings
/// by parsing.
fn field_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn literal_as_f64(literal: &QueryLiteral) -> Option<f64> {
    match literal {
        QueryLiteral::Int(i) => Some(*i as f64),
        QueryLiteral::Float(f) => Some(*f),
        QueryLiteral::Str(s) => s.trim().parse::<f64>().ok(),
    }
}

fn compare_numeric(field_value: &Value, literal: &QueryLiteral) -> Option<Ordering> {
    let lhs = field_as_f64(field_value)?;
    let rhs = literal_as_f64(literal)?;
    lhs.partial_cmp(&rhs)
}

fn field_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compare_lexicographic(field_value: &Value, literal: &QueryLiteral) -> Option<Ordering> {
    let lhs = field_as_string(field_value)?;
    let rhs = match literal {
        QueryLiteral::Str(s) => s.clone(),
        QueryLiteral::Int(i) => i.to_string(),
        QueryLiteral::Float(f) => f.to_string(),
    };
    Some(lhs.cmp(&rhs))
}

/// Whitespace-tokenized, case-insensitive containment: every token of the
/// needle must appear among the document field's tokens.
fn text_search(field_value: &Value, literal: &QueryLiteral) -> bool {
    let QueryLiteral::Str(needle) = literal else {
        return false;
    };
    let Some(haystack) = field_as_string(field_value) else {
        return false;
    };
    let tokens: Vec<String> = haystack
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    needle
        .split_whitespace()
        .all(|n| tokens.iter().any(|t| t == &n.to_lowercase()))
}
