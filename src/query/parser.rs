//! Parser for the text form of the query language.
//!
//! Converts strings like `age >= 21 and (city = "berlin" or bio ~ "rust")`
//! into the `QueryExpr` tree. Conjunctions fold left-associatively. Used by
//! the CLI's `query` command; the server only ever sees the tree.

use crate::error::{StrataDbError, StrataDbResult};
use crate::query::ast::{q_and, q_or, CompareOp, QueryExpr, QueryLiteral};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "query/grammar.pest"]
pub struct QueryParser;

/// Parse a textual query into a predicate tree.
pub fn parse_query(input: &str) -> StrataDbResult<QueryExpr> {
    let mut pairs = QueryParser::parse(Rule::complete_query, input)
        .map_err(|e| StrataDbError::InvalidArgument(format!("Query parse error: {}", e)))?;
    let expr_pair = pairs
        .next()
        .ok_or_else(|| StrataDbError::InvalidArgument("Empty query".to_string()))?;
    build_expr(expr_pair)
}

fn build_expr(pair: Pair<Rule>) -> StrataDbResult<QueryExpr> {
    match pair.as_rule() {
        Rule::expr => {
            let mut inner = pair.into_inner();
            let first = inner
                .next()
                .ok_or_else(|| StrataDbError::InvalidArgument("Empty expression".to_string()))?;
            let mut expr = build_expr(first)?;
            // Remaining pairs alternate: logical_op, clause, logical_op, clause...
            while let Some(op_pair) = inner.next() {
                let clause_pair = inner.next().ok_or_else(|| {
                    StrataDbError::InvalidArgument("Dangling logical operator".to_string())
                })?;
                let rhs = build_expr(clause_pair)?;
                expr = match op_pair.as_str() {
                    "and" => q_and(expr, rhs),
                    _ => q_or(expr, rhs),
                };
            }
            Ok(expr)
        }
        Rule::clause => {
            let inner = pair.into_inner().next().ok_or_else(|| {
                StrataDbError::InvalidArgument("Empty clause".to_string())
            })?;
            build_expr(inner)
        }
        Rule::comparison => build_comparison(pair),
        other => Err(StrataDbError::InvalidArgument(format!(
            "Unexpected parse node: {:?}",
            other
        ))),
    }
}

fn build_comparison(pair: Pair<Rule>) -> StrataDbResult<QueryExpr> {
    let mut inner = pair.into_inner();
    let field = inner
        .next()
        .ok_or_else(|| StrataDbError::InvalidArgument("Missing field".to_string()))?
        .as_str()
        .to_string();
    let op_str = inner
        .next()
        .ok_or_else(|| StrataDbError::InvalidArgument("Missing operator".to_string()))?
        .as_str()
        .to_string();
    let literal_pair = inner
        .next()
        .ok_or_else(|| StrataDbError::InvalidArgument("Missing literal".to_string()))?;
    let value = build_literal(literal_pair)?;

    let op = match op_str.as_str() {
        "=" => CompareOp::Eq,
        "!=" | "not" => CompareOp::NotEq,
        ">" => CompareOp::Gt,
        ">=" => CompareOp::Gte,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::Lte,
        "~" => CompareOp::TextSearch,
        other => {
            return Err(StrataDbError::InvalidArgument(format!(
                "Unknown operator: {}",
                other
            )))
        }
    };

    // Range operators need numbers; text search needs a string.
    match op {
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => {
            if matches!(value, QueryLiteral::Str(_)) {
                return Err(StrataDbError::InvalidArgument(format!(
                    "Operator {} requires a numeric literal",
                    op_str
                )));
            }
        }
        CompareOp::TextSearch => {
            if !matches!(value, QueryLiteral::Str(_)) {
                return Err(StrataDbError::InvalidArgument(
                    "Operator ~ requires a string literal".to_string(),
                ));
            }
        }
        _ => {}
    }

    Ok(QueryExpr::comparison(op, &field, value))
}

fn build_literal(pair: Pair<Rule>) -> StrataDbResult<QueryLiteral> {
    match pair.as_rule() {
        Rule::string => {
            let raw = pair.as_str();
            // Strip the surrounding quotes
            Ok(QueryLiteral::Str(raw[1..raw.len() - 1].to_string()))
        }
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(QueryLiteral::Float)
            .map_err(|e| StrataDbError::InvalidArgument(format!("Bad float literal: {}", e))),
        Rule::int => pair
            .as_str()
            .parse::<i64>()
            .map(QueryLiteral::Int)
            .map_err(|e| StrataDbError::InvalidArgument(format!("Bad integer literal: {}", e))),
        other => Err(StrataDbError::InvalidArgument(format!(
            "Unexpected literal node: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{q_eq, q_gt, q_text, QueryLiteral};

    #[test]
    fn parses_single_comparison() {
        let expr = parse_query("age = 30").unwrap();
        assert_eq!(expr, q_eq("age", QueryLiteral::Int(30)));
    }

    #[test]
    fn parses_nested_expression() {
        let expr = parse_query("a = 1 and (b > 2.5 or c ~ \"x y\")").unwrap();
        let expected = q_and(
            q_eq("a", QueryLiteral::Int(1)),
            q_or(q_gt("b", QueryLiteral::Float(2.5)), q_text("c", "x y")),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn folds_left_associatively() {
        let expr = parse_query("a = 1 and b = 2 or c = 3").unwrap();
        let expected = q_or(
            q_and(q_eq("a", QueryLiteral::Int(1)), q_eq("b", QueryLiteral::Int(2))),
            q_eq("c", QueryLiteral::Int(3)),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn not_is_an_alias_for_neq() {
        let expr = parse_query("a not 5").unwrap();
        let expected = parse_query("a != 5").unwrap();
        assert_eq!(expr, expected);
    }

    #[test]
    fn rejects_bad_operand_types() {
        assert!(parse_query("a > \"text\"").is_err());
        assert!(parse_query("a ~ 5").is_err());
        assert!(parse_query("a =").is_err());
    }
}
