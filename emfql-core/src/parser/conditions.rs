//! Boolean condition chains and atomic comparisons.

use super::{expressions::parse_operand, scan_top_level, word_at};
use crate::ast::{CompareOp, Condition, ConditionExpression, Connective};
use crate::error::{EmfError, EmfResult};

/// Parse `cond (AND|OR cond)*`. Empty text is the always-true expression.
///
/// Connectives are whole words outside literals and parentheses, so `brand` and
/// `'north or south'` never split.
pub fn parse_condition_expression(
    text: &str,
    grouping_vars: &[String],
) -> EmfResult<ConditionExpression> {
    let mut expr = ConditionExpression::new();
    if text.trim().is_empty() {
        return Ok(expr);
    }

    let (pieces, connectives) = split_connectives(text);
    let mut connectives = connectives.into_iter();
    for (i, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            return Err(EmfError::parse(format!(
                "Missing condition around AND/OR in '{}'",
                text.trim()
            )));
        }
        let condition = parse_single_condition(piece, grouping_vars)?;
        let connective = if i == 0 {
            Connective::And
        } else {
            connectives.next().unwrap_or(Connective::And)
        };
        expr.push(connective, condition);
    }

    Ok(expr)
}

fn split_connectives(text: &str) -> (Vec<&str>, Vec<Connective>) {
    let mut pieces = Vec::new();
    let mut connectives = Vec::new();
    let mut start = 0;
    let mut skip_until = 0;

    for sc in scan_top_level(text) {
        if sc.index < skip_until || !sc.top_level {
            continue;
        }
        let found = if word_at(text, sc.index, "and") {
            Some((Connective::And, 3))
        } else if word_at(text, sc.index, "or") {
            Some((Connective::Or, 2))
        } else {
            None
        };
        if let Some((connective, len)) = found {
            pieces.push(text[start..sc.index].trim());
            connectives.push(connective);
            start = sc.index + len;
            skip_until = start;
        }
    }
    pieces.push(text[start..].trim());

    (pieces, connectives)
}

/// Parse one comparison, optionally prefixed with NOT.
pub fn parse_single_condition(text: &str, grouping_vars: &[String]) -> EmfResult<Condition> {
    let mut text = text.trim();
    let mut negated = false;

    while let Some(rest) = strip_not(text) {
        negated = !negated;
        text = rest;
    }

    if let Some(inner) = strip_enclosing_parens(text) {
        let (pieces, _) = split_connectives(inner);
        if pieces.len() > 1 {
            return Err(EmfError::parse(format!(
                "Parenthesized AND/OR groups are not supported: '{}'",
                text
            )));
        }
        let condition = parse_single_condition(inner, grouping_vars)?;
        return Ok(if negated { condition.negate() } else { condition });
    }

    let (index, symbol, op) = find_operator(text)
        .ok_or_else(|| EmfError::parse(format!("Invalid condition (no comparison operator): '{}'", text)))?;

    let left = text[..index].trim();
    let right = text[index + symbol.len()..].trim();
    if left.is_empty() || right.is_empty() {
        return Err(EmfError::parse(format!(
            "Comparison '{}' is missing an operand in '{}'",
            symbol, text
        )));
    }

    let condition = Condition {
        left: parse_operand(left, grouping_vars)?,
        op,
        right: parse_operand(right, grouping_vars)?,
        negated,
    };
    Ok(condition)
}

fn strip_not(text: &str) -> Option<&str> {
    if !word_at(text, 0, "not") {
        return None;
    }
    let rest = &text[3..];
    Some(rest.trim_start())
}

/// `(...)` when the opening parenthesis closes at the very end.
fn strip_enclosing_parens(text: &str) -> Option<&str> {
    if !text.starts_with('(') || !text.ends_with(')') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_literal = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => {
                depth -= 1;
                if depth == 0 {
                    return (i == text.len() - 1).then(|| text[1..i].trim());
                }
            }
            _ => {}
        }
    }
    None
}

/// First operator in detection order found at top level.
fn find_operator(text: &str) -> Option<(usize, &'static str, CompareOp)> {
    let scanned = scan_top_level(text);
    CompareOp::SCAN_ORDER.iter().find_map(|(symbol, op)| {
        scanned
            .iter()
            .filter(|sc| sc.top_level)
            .find(|sc| text[sc.index..].starts_with(symbol))
            .map(|sc| (sc.index, *symbol, *op))
    })
}
