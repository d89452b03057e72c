//! Structural and cross-reference checks on a parsed `EmfQuery`.
//!
//! Completeness checks run first, in clause order, so a query lacking several clauses
//! reports the earliest one. Reference checks follow.

use tracing::debug;

use crate::ast::{ConditionExpression, EmfQuery, Expression};
use crate::error::{EmfError, EmfResult};

/// Reject incomplete or inconsistent queries before Phi conversion.
pub fn validate(query: &EmfQuery) -> EmfResult<()> {
    check_complete(query)?;
    check_references(query)?;
    debug!(table = %query.from_table, "query validated");
    Ok(())
}

fn check_complete(query: &EmfQuery) -> EmfResult<()> {
    if query.from_table.trim().is_empty() {
        return Err(EmfError::validation("FROM clause is required"));
    }
    if query.select.is_empty() {
        return Err(EmfError::validation("SELECT clause is required"));
    }
    if query.grouping_attributes.is_empty() {
        return Err(EmfError::validation("GROUP BY clause is required"));
    }
    if query.grouping_variables.is_empty() {
        return Err(EmfError::validation(
            "GROUP BY must declare at least one grouping variable after ';' or ':'",
        ));
    }
    if query.aggregates.is_empty() {
        return Err(EmfError::validation(
            "at least one aggregate function is required",
        ));
    }
    if query.such_that.is_empty() {
        return Err(EmfError::validation("SUCH THAT clause is required"));
    }
    Ok(())
}

fn check_references(query: &EmfQuery) -> EmfResult<()> {
    let declared = |var: &str| query.grouping_variables.iter().any(|v| v == var);
    let is_grouping_attr = |col: &str| query.grouping_attributes.iter().any(|a| a == col);

    for agg in &query.aggregates {
        if !declared(agg.grouping_var.as_str()) {
            return Err(EmfError::validation(format!(
                "{} uses undeclared grouping variable '{}'",
                agg, agg.grouping_var
            )));
        }
    }
    for var in query.such_that.keys() {
        if !declared(var.as_str()) {
            return Err(EmfError::validation(format!(
                "SUCH THAT names undeclared grouping variable '{}'",
                var
            )));
        }
    }
    for var in &query.grouping_variables {
        if !query.such_that.contains_key(var) {
            return Err(EmfError::validation(format!(
                "grouping variable '{}' has no SUCH THAT entry",
                var
            )));
        }
    }

    for expr in query.where_conditions.expressions() {
        if let Some(agg) = expr.aggregates().first() {
            return Err(EmfError::validation(format!(
                "WHERE cannot reference aggregate {}",
                agg
            )));
        }
        if let Some((var, attr)) = expr.var_attrs().first() {
            return Err(EmfError::validation(format!(
                "WHERE cannot reference grouping variable attribute {}.{}",
                var, attr
            )));
        }
        reject_count_star(expr, "WHERE")?;
    }

    for var in &query.grouping_variables {
        let Some(sigma) = query.such_that.get(var) else {
            continue;
        };
        for expr in sigma.expressions() {
            let foreign = expr
                .var_attrs()
                .into_iter()
                .find(|(v, _)| *v != var.as_str());
            if let Some((other, attr)) = foreign {
                return Err(EmfError::validation(format!(
                    "SUCH THAT for '{}' reads {}.{}; a grouping variable may only read its own rows",
                    var, other, attr
                )));
            }
            if let Some(col) = expr.columns().into_iter().find(|c| !is_grouping_attr(*c)) {
                return Err(EmfError::validation(format!(
                    "'{}' in SUCH THAT for '{}' is not a grouping attribute; use {}.{}",
                    col, var, var, col
                )));
            }
            reject_count_star(expr, "SUCH THAT")?;
        }
    }

    let select_exprs = query.select.iter().map(|item| &item.expr);
    check_group_level(select_exprs, "SELECT", &is_grouping_attr)?;
    check_group_level(query.having.expressions(), "HAVING", &is_grouping_attr)?;

    Ok(())
}

/// SELECT and HAVING see one group: grouping attributes and aggregates only.
fn check_group_level<'a>(
    exprs: impl Iterator<Item = &'a Expression>,
    clause: &str,
    is_grouping_attr: &dyn Fn(&str) -> bool,
) -> EmfResult<()> {
    for expr in exprs {
        if let Some((var, attr)) = expr.var_attrs().first() {
            return Err(EmfError::validation(format!(
                "{} cannot reference row attribute {}.{}; aggregate it instead",
                clause, var, attr
            )));
        }
        if let Some(col) = expr.columns().into_iter().find(|c| !is_grouping_attr(*c)) {
            return Err(EmfError::validation(format!(
                "'{}' in {} is neither a grouping attribute nor an aggregate",
                col, clause
            )));
        }
    }
    Ok(())
}

fn reject_count_star(expr: &Expression, clause: &str) -> EmfResult<()> {
    let mut found = false;
    expr.walk(&mut |e| found |= matches!(e, Expression::CountStar));
    if found {
        return Err(EmfError::validation(format!(
            "count(*) is not allowed in {}; use count(<var>.*)",
            clause
        )));
    }
    Ok(())
}

/// True when the chain mentions no bare grouping attribute, so the variable ranges over
/// the rows of its own group.
pub fn is_uncorrelated(sigma: &ConditionExpression) -> bool {
    sigma.expressions().all(|e| e.columns().is_empty())
}
