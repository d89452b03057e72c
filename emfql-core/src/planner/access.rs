//! Access-path selection for grouping-variable scans.
//!
//! A path only narrows which groups are tested; the full predicate is still evaluated
//! for every candidate, so any path gives the same result as a full scan.

use super::types::AccessPath;
use super::PlanCompiler;
use crate::ast::{CompareOp, Condition, ConditionExpression, Expression};

/// A top-level `var.column = g` equality in σi.
#[derive(Debug, PartialEq)]
struct Correlation {
    attribute: usize,
    column: String,
}

impl<'a> PlanCompiler<'a> {
    pub(super) fn choose_access(
        &self,
        var: &str,
        sigma: &ConditionExpression,
        implicit_correlation: bool,
    ) -> AccessPath {
        if !self.options.use_group_index {
            return AccessPath::FullScan;
        }
        if implicit_correlation {
            return AccessPath::GroupKey {
                columns: self.schema.grouping.iter().map(|f| f.name.clone()).collect(),
            };
        }
        // With an OR anywhere a single equality is not necessary for a match.
        if !sigma.is_conjunctive() {
            return AccessPath::FullScan;
        }

        let mut by_attribute: Vec<Option<String>> = vec![None; self.schema.grouping.len()];
        for condition in sigma.conditions() {
            if let Some(c) = self.extract_correlation(condition, var) {
                by_attribute[c.attribute].get_or_insert(c.column);
            }
        }

        if by_attribute.iter().all(Option::is_some) {
            return AccessPath::GroupKey {
                columns: by_attribute.into_iter().flatten().collect(),
            };
        }
        by_attribute
            .into_iter()
            .enumerate()
            .find_map(|(attribute, column)| {
                column.map(|column| AccessPath::AttributeIndex { attribute, column })
            })
            .unwrap_or(AccessPath::FullScan)
    }

    /// `var.c = g` or `g = var.c` with matching column kinds, not negated.
    fn extract_correlation(&self, condition: &Condition, var: &str) -> Option<Correlation> {
        if condition.negated || condition.op != CompareOp::Eq {
            return None;
        }
        let (column, group_attr) = match (&condition.left, &condition.right) {
            (Expression::VarAttr { var: v, attr }, Expression::Column(g))
            | (Expression::Column(g), Expression::VarAttr { var: v, attr })
                if v == var =>
            {
                (attr, g)
            }
            _ => return None,
        };

        let attribute = self.schema.grouping_index(group_attr)?;
        let column_kind = self.columns.get(column)?;
        if *column_kind != self.schema.grouping[attribute].kind {
            return None;
        }
        Some(Correlation {
            attribute,
            column: column.clone(),
        })
    }
}
