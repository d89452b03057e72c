//! Name resolution and static typing of operand expressions.

use super::types::{BoundCondition, BoundExpr, BoundPredicate};
use super::PlanCompiler;
use crate::ast::{ArithmeticOp, CompareOp, Condition, ConditionExpression, Expression};
use crate::error::{EmfError, EmfResult};
use crate::value::{parse_date, ColumnType, Value};

/// Where an expression is evaluated, which decides what its names resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope<'s> {
    /// σ0: one base-table row, no group.
    Row,
    /// σi: a row of the variable's scan tested against one group.
    Variable(&'s str),
    /// HAVING and the projection list: one group.
    Group,
}

impl Scope<'_> {
    fn describe(&self) -> String {
        match self {
            Scope::Row => "WHERE".to_string(),
            Scope::Variable(var) => format!("SUCH THAT for '{}'", var),
            Scope::Group => "SELECT/HAVING".to_string(),
        }
    }
}

impl<'a> PlanCompiler<'a> {
    pub(super) fn bind_predicate(
        &self,
        expr: &ConditionExpression,
        scope: Scope<'_>,
    ) -> EmfResult<BoundPredicate> {
        let conditions = expr
            .conditions()
            .iter()
            .map(|c| self.bind_condition(c, scope))
            .collect::<EmfResult<Vec<_>>>()?;
        Ok(BoundPredicate {
            conditions,
            connectives: expr.connectives().to_vec(),
        })
    }

    fn bind_condition(&self, condition: &Condition, scope: Scope<'_>) -> EmfResult<BoundCondition> {
        let left = self.bind_expr(&condition.left, scope)?;
        let right = self.bind_expr(&condition.right, scope)?;
        let (left, right) = self.unify_operands(left, right, condition)?;
        Ok(BoundCondition {
            left,
            op: condition.op,
            right,
            negated: condition.negated,
            key_match: false,
        })
    }

    /// `var.g = g` for every grouping attribute: the variable ranges over its group's rows,
    /// NULL keys included.
    pub(super) fn implicit_correlation(&self) -> Vec<BoundCondition> {
        self.schema
            .grouping
            .iter()
            .enumerate()
            .map(|(i, field)| BoundCondition {
                left: BoundExpr::RowColumn(field.name.clone()),
                op: CompareOp::Eq,
                right: BoundExpr::GroupAttr(i),
                negated: false,
                key_match: true,
            })
            .collect()
    }

    pub(super) fn bind_expr(&self, expr: &Expression, scope: Scope<'_>) -> EmfResult<BoundExpr> {
        match expr {
            Expression::Literal(value) => Ok(BoundExpr::Literal(value.clone())),
            Expression::Column(name) => match scope {
                Scope::Row => {
                    self.require_column(name)?;
                    Ok(BoundExpr::RowColumn(name.clone()))
                }
                Scope::Variable(_) | Scope::Group => self
                    .schema
                    .grouping_index(name)
                    .map(BoundExpr::GroupAttr)
                    .ok_or_else(|| {
                        EmfError::plan(format!(
                            "'{}' in {} is not a grouping attribute",
                            name,
                            scope.describe()
                        ))
                    }),
            },
            Expression::VarAttr { var, attr } => match scope {
                Scope::Variable(own) if own == var.as_str() => {
                    self.require_column(attr)?;
                    Ok(BoundExpr::RowColumn(attr.clone()))
                }
                _ => Err(EmfError::plan(format!(
                    "{}.{} cannot be read in {}",
                    var,
                    attr,
                    scope.describe()
                ))),
            },
            Expression::Aggregate(agg) => {
                if scope == Scope::Row {
                    return Err(EmfError::plan(format!(
                        "aggregate {} cannot be used in WHERE",
                        agg
                    )));
                }
                self.schema
                    .slot_of(agg)
                    .map(BoundExpr::Aggregate)
                    .ok_or_else(|| {
                        EmfError::plan(format!("aggregate {} is not registered in F", agg))
                    })
            }
            Expression::CountStar => match scope {
                Scope::Group => Ok(BoundExpr::RowsSeen),
                _ => Err(EmfError::plan(format!(
                    "count(*) cannot be used in {}",
                    scope.describe()
                ))),
            },
            Expression::Negate(inner) => {
                let inner = self.bind_expr(inner, scope)?;
                if !self.infer_kind(&inner)?.is_numeric() {
                    return Err(EmfError::Type(format!("cannot negate '{}'", expr)));
                }
                Ok(BoundExpr::Negate(Box::new(inner)))
            }
            Expression::Binary { left, op, right } => {
                let bound = BoundExpr::Binary {
                    left: Box::new(self.bind_expr(left, scope)?),
                    op: *op,
                    right: Box::new(self.bind_expr(right, scope)?),
                };
                self.infer_kind(&bound)?;
                Ok(bound)
            }
        }
    }

    fn require_column(&self, name: &str) -> EmfResult<()> {
        if self.columns.contains_key(name) {
            Ok(())
        } else {
            Err(EmfError::plan(format!(
                "unknown column '{}' in table '{}'",
                name, self.phi.from_table
            )))
        }
    }

    /// Static kind of a bound expression.
    pub(super) fn infer_kind(&self, expr: &BoundExpr) -> EmfResult<ColumnType> {
        match expr {
            BoundExpr::Literal(value) => Ok(literal_kind(value)),
            BoundExpr::RowColumn(name) => self
                .columns
                .get(name)
                .copied()
                .ok_or_else(|| EmfError::plan(format!("unknown column '{}'", name))),
            BoundExpr::GroupAttr(i) => self
                .schema
                .grouping
                .get(*i)
                .map(|f| f.kind)
                .ok_or_else(|| EmfError::plan(format!("no grouping attribute #{}", i))),
            BoundExpr::Aggregate(slot) => self
                .schema
                .aggregates
                .get(*slot)
                .map(|s| s.result_kind)
                .ok_or_else(|| EmfError::plan(format!("no aggregate slot #{}", slot))),
            BoundExpr::RowsSeen => Ok(ColumnType::Int),
            BoundExpr::Negate(inner) => self.infer_kind(inner),
            BoundExpr::Binary { left, op, right } => {
                let l = self.infer_kind(left)?;
                let r = self.infer_kind(right)?;
                if !l.is_numeric() || !r.is_numeric() {
                    return Err(EmfError::Type(format!(
                        "cannot apply '{}' to {} and {}",
                        op.symbol(),
                        l,
                        r
                    )));
                }
                Ok(match op {
                    ArithmeticOp::Div => ColumnType::Real,
                    _ if l == ColumnType::Int && r == ColumnType::Int => ColumnType::Int,
                    _ => ColumnType::Real,
                })
            }
        }
    }

    /// Check the two sides are comparable, turning string literals into dates when the
    /// other side is a date.
    fn unify_operands(
        &self,
        left: BoundExpr,
        right: BoundExpr,
        condition: &Condition,
    ) -> EmfResult<(BoundExpr, BoundExpr)> {
        let l = self.infer_kind(&left)?;
        let r = self.infer_kind(&right)?;

        let mismatch = || {
            EmfError::Type(format!(
                "cannot compare {} with {} in '{}'",
                l, r, condition
            ))
        };

        match (l, r) {
            (a, b) if a.is_numeric() && b.is_numeric() => Ok((left, right)),
            (a, b) if a == b => Ok((left, right)),
            (ColumnType::Date, ColumnType::String) => {
                let right = date_literal(right).ok_or_else(mismatch)?;
                Ok((left, right))
            }
            (ColumnType::String, ColumnType::Date) => {
                let left = date_literal(left).ok_or_else(mismatch)?;
                Ok((left, right))
            }
            _ => Err(mismatch()),
        }
    }
}

fn literal_kind(value: &Value) -> ColumnType {
    match value {
        Value::Int(_) => ColumnType::Int,
        Value::Real(_) => ColumnType::Real,
        Value::Date(_) => ColumnType::Date,
        Value::Str(_) | Value::Null => ColumnType::String,
    }
}

fn date_literal(expr: BoundExpr) -> Option<BoundExpr> {
    match expr {
        BoundExpr::Literal(Value::Str(s)) => parse_date(&s).map(|d| BoundExpr::Literal(Value::Date(d))),
        _ => None,
    }
}
