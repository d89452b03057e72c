//! Evaluation of bound expressions and predicate chains.
//!
//! NULL propagates through arithmetic, and any comparison whose operands are NULL or of
//! unordered kinds is false, with or without NOT. The implicit `var.g = g` correlation is
//! the exception: it compares grouping keys, where NULL equals NULL.

use std::cmp::Ordering;

use crate::ast::{ArithmeticOp, CompareOp, Connective};
use crate::error::{EmfError, EmfResult};
use crate::planner::{BoundCondition, BoundExpr, BoundPredicate};
use crate::value::{compare_values, KeyPart, Row, Value};

use super::mf_structure::GroupRecord;

/// What names resolve against: the scanned row, the group under test, or both.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext<'a> {
    pub row: Option<&'a Row>,
    pub group: Option<&'a GroupRecord>,
}

impl<'a> EvalContext<'a> {
    pub fn row(row: &'a Row) -> Self {
        Self {
            row: Some(row),
            group: None,
        }
    }

    pub fn group(group: &'a GroupRecord) -> Self {
        Self {
            row: None,
            group: Some(group),
        }
    }

    pub fn row_in_group(row: &'a Row, group: &'a GroupRecord) -> Self {
        Self {
            row: Some(row),
            group: Some(group),
        }
    }

    fn require_group(&self, what: &str) -> EmfResult<&'a GroupRecord> {
        self.group
            .ok_or_else(|| EmfError::Execution(format!("{} evaluated without a group", what)))
    }
}

pub fn evaluate(expr: &BoundExpr, ctx: &EvalContext<'_>) -> EmfResult<Value> {
    match expr {
        BoundExpr::Literal(value) => Ok(value.clone()),
        BoundExpr::RowColumn(name) => {
            let row = ctx
                .row
                .ok_or_else(|| EmfError::Execution(format!("column '{}' read without a row", name)))?;
            Ok(row.get(name).cloned().unwrap_or(Value::Null))
        }
        BoundExpr::GroupAttr(i) => {
            let group = ctx.require_group("grouping attribute")?;
            group
                .grouping_values
                .get(*i)
                .cloned()
                .ok_or_else(|| EmfError::Execution(format!("no grouping attribute #{}", i)))
        }
        BoundExpr::Aggregate(slot) => {
            let group = ctx.require_group("aggregate")?;
            group
                .aggregates
                .get(*slot)
                .map(|state| state.value())
                .ok_or_else(|| EmfError::Execution(format!("no aggregate slot #{}", slot)))
        }
        BoundExpr::RowsSeen => Ok(Value::Int(ctx.require_group("count(*)")?.rows_seen)),
        BoundExpr::Negate(inner) => negate(evaluate(inner, ctx)?),
        BoundExpr::Binary { left, op, right } => {
            arithmetic(evaluate(left, ctx)?, *op, evaluate(right, ctx)?)
        }
    }
}

fn negate(value: Value) -> EmfResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EmfError::Execution(format!("integer overflow negating {}", i))),
        Value::Real(r) => Ok(Value::Real(-r)),
        other => Err(EmfError::Execution(format!(
            "cannot negate {} value '{}'",
            other.type_name(),
            other
        ))),
    }
}

/// Int with int stays int except for division, which always widens to real.
/// Division by zero is NULL.
pub fn arithmetic(left: Value, op: ArithmeticOp, right: Value) -> EmfResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    if let (Value::Int(a), Value::Int(b), false) = (&left, &right, op == ArithmeticOp::Div) {
        let result = match op {
            ArithmeticOp::Add => a.checked_add(*b),
            ArithmeticOp::Sub => a.checked_sub(*b),
            _ => a.checked_mul(*b),
        };
        return result.map(Value::Int).ok_or_else(|| {
            EmfError::Execution(format!("integer overflow in {} {} {}", a, op.symbol(), b))
        });
    }

    let (a, b) = match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(EmfError::Execution(format!(
                "cannot apply '{}' to {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(match op {
        ArithmeticOp::Add => Value::Real(a + b),
        ArithmeticOp::Sub => Value::Real(a - b),
        ArithmeticOp::Mul => Value::Real(a * b),
        ArithmeticOp::Div if b == 0.0 => Value::Null,
        ArithmeticOp::Div => Value::Real(a / b),
    })
}

pub fn eval_condition(condition: &BoundCondition, ctx: &EvalContext<'_>) -> EmfResult<bool> {
    let left = evaluate(&condition.left, ctx)?;
    let right = evaluate(&condition.right, ctx)?;
    if condition.key_match {
        return Ok((KeyPart::from(&left) == KeyPart::from(&right)) != condition.negated);
    }
    let Some(ordering) = compare_values(&left, &right) else {
        return Ok(false);
    };
    let holds = match condition.op {
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
    };
    Ok(holds != condition.negated)
}

/// Fold the chain left to right: `a AND b OR c` is `(a AND b) OR c`.
pub fn eval_predicate(predicate: &BoundPredicate, ctx: &EvalContext<'_>) -> EmfResult<bool> {
    let mut conditions = predicate.conditions.iter();
    let Some(first) = conditions.next() else {
        return Ok(true);
    };
    let mut result = eval_condition(first, ctx)?;
    for (condition, connective) in conditions.zip(predicate.connectives.iter()) {
        result = match connective {
            Connective::And => result && eval_condition(condition, ctx)?,
            Connective::Or => result || eval_condition(condition, ctx)?,
        };
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(v: Value) -> BoundExpr {
        BoundExpr::Literal(v)
    }

    fn cond(left: Value, op: CompareOp, right: Value) -> BoundCondition {
        BoundCondition {
            left: lit(left),
            op,
            right: lit(right),
            negated: false,
            key_match: false,
        }
    }

    fn chain(conditions: Vec<BoundCondition>, connectives: Vec<Connective>) -> BoundPredicate {
        BoundPredicate {
            conditions,
            connectives,
        }
    }

    #[test]
    fn test_division_widens_to_real() {
        assert_eq!(
            arithmetic(Value::Int(7), ArithmeticOp::Div, Value::Int(2)).unwrap(),
            Value::Real(3.5)
        );
        assert_eq!(
            arithmetic(Value::Int(7), ArithmeticOp::Add, Value::Int(2)).unwrap(),
            Value::Int(9)
        );
        assert_eq!(
            arithmetic(Value::Int(2), ArithmeticOp::Mul, Value::Real(1.5)).unwrap(),
            Value::Real(3.0)
        );
    }

    #[test]
    fn test_division_by_zero_is_null() {
        assert_eq!(
            arithmetic(Value::Int(1), ArithmeticOp::Div, Value::Int(0)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_null_propagates() {
        assert_eq!(
            arithmetic(Value::Null, ArithmeticOp::Add, Value::Int(1)).unwrap(),
            Value::Null
        );
        assert_eq!(negate(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let err = arithmetic(Value::Int(i64::MAX), ArithmeticOp::Add, Value::Int(1)).unwrap_err();
        assert!(matches!(err, EmfError::Execution(_)));
    }

    #[test]
    fn test_null_comparison_is_false_even_negated() {
        let ctx = EvalContext::default();
        let mut c = cond(Value::Null, CompareOp::Eq, Value::Int(1));
        assert!(!eval_condition(&c, &ctx).unwrap());
        c.negated = true;
        assert!(!eval_condition(&c, &ctx).unwrap());
    }

    #[test]
    fn test_key_match_pairs_nulls() {
        let ctx = EvalContext::default();
        let mut c = cond(Value::Null, CompareOp::Eq, Value::Null);
        assert!(!eval_condition(&c, &ctx).unwrap());
        c.key_match = true;
        assert!(eval_condition(&c, &ctx).unwrap());

        let c = BoundCondition {
            key_match: true,
            ..cond(Value::Null, CompareOp::Eq, Value::Str("A".into()))
        };
        assert!(!eval_condition(&c, &ctx).unwrap());
    }

    #[test]
    fn test_mixed_kinds_are_unordered() {
        let ctx = EvalContext::default();
        let c = cond(Value::Str("a".into()), CompareOp::Ne, Value::Int(1));
        assert!(!eval_condition(&c, &ctx).unwrap());
    }

    #[test]
    fn test_chain_is_left_to_right() {
        let ctx = EvalContext::default();
        let t = || cond(Value::Int(1), CompareOp::Eq, Value::Int(1));
        let f = || cond(Value::Int(1), CompareOp::Eq, Value::Int(2));

        // true OR false AND false: left to right gives (true OR false) AND false = false,
        // where AND-before-OR precedence would give true.
        let p = chain(vec![t(), f(), f()], vec![Connective::Or, Connective::And]);
        assert!(!eval_predicate(&p, &ctx).unwrap());

        // false AND true OR true = true
        let p = chain(vec![f(), t(), t()], vec![Connective::And, Connective::Or]);
        assert!(eval_predicate(&p, &ctx).unwrap());
    }

    #[test]
    fn test_empty_predicate_is_true() {
        assert!(eval_predicate(&BoundPredicate::default(), &EvalContext::default()).unwrap());
    }

    #[test]
    fn test_row_columns() {
        let row = Row::new().with("quant", Value::Int(5));
        let ctx = EvalContext::row(&row);
        let c = BoundCondition {
            left: BoundExpr::RowColumn("quant".into()),
            op: CompareOp::Gt,
            right: lit(Value::Int(3)),
            negated: false,
            key_match: false,
        };
        assert!(eval_condition(&c, &ctx).unwrap());
        assert_eq!(
            evaluate(&BoundExpr::RowColumn("missing".into()), &ctx).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_group_reference_without_group() {
        let err = evaluate(&BoundExpr::Aggregate(0), &EvalContext::default()).unwrap_err();
        assert!(matches!(err, EmfError::Execution(_)));
    }
}
