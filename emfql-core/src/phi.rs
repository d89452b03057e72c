//! The canonical Phi operator `(S, n, V, F, σ, G)`.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::ast::{AggregateFunction, ConditionExpression, EmfQuery, SelectItem};

/// Canonical form of a validated query.
///
/// `predicates[0]` is the WHERE clause (σ0); `predicates[i]` for `i >= 1` is the SUCH THAT
/// expression of the i-th declared grouping variable, so `predicates.len() == n + 1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhiOperator {
    pub from_table: String,
    /// S
    pub select: Vec<SelectItem>,
    pub n: usize,
    /// V
    pub grouping_attributes: Vec<String>,
    /// F
    pub aggregates: Vec<AggregateFunction>,
    /// σ
    pub predicates: Vec<ConditionExpression>,
    /// G
    pub having: ConditionExpression,
    /// Names for positions 1..=n.
    pub grouping_variables: Vec<String>,
}

impl PhiOperator {
    /// Map a validated query onto the 6-tuple. Pure; performs no validation.
    pub fn convert(query: &EmfQuery) -> Self {
        let mut predicates = Vec::with_capacity(query.grouping_variables.len() + 1);
        predicates.push(query.where_conditions.clone());
        for var in &query.grouping_variables {
            predicates.push(query.such_that.get(var).cloned().unwrap_or_default());
        }

        let phi = Self {
            from_table: query.from_table.clone(),
            select: query.select.clone(),
            n: query.grouping_variables.len(),
            grouping_attributes: query.grouping_attributes.clone(),
            aggregates: query.aggregates.clone(),
            predicates,
            having: query.having.clone(),
            grouping_variables: query.grouping_variables.clone(),
        };
        debug!(n = phi.n, aggregates = phi.aggregates.len(), "converted to Phi operator");
        phi
    }

    /// σ0.
    pub fn where_predicate(&self) -> Option<&ConditionExpression> {
        self.predicates.first()
    }

    /// σi for the grouping variable at 1-based position `i`.
    pub fn predicate(&self, i: usize) -> Option<&ConditionExpression> {
        if i == 0 {
            return None;
        }
        self.predicates.get(i)
    }

    /// 1-based declared position of a grouping variable.
    pub fn position_of(&self, var: &str) -> Option<usize> {
        self.grouping_variables
            .iter()
            .position(|v| v == var)
            .map(|p| p + 1)
    }

    /// Aggregates computed during the scan of the variable at 1-based position `i`.
    pub fn aggregates_of(&self, i: usize) -> impl Iterator<Item = &AggregateFunction> {
        let var = self.grouping_variables.get(i.wrapping_sub(1)).cloned();
        self.aggregates
            .iter()
            .filter(move |agg| Some(&agg.grouping_var) == var.as_ref())
    }
}

impl From<&EmfQuery> for PhiOperator {
    fn from(query: &EmfQuery) -> Self {
        PhiOperator::convert(query)
    }
}

const RULE: &str =
    "+----------------------------------------------------------------------------+";

impl fmt::Display for PhiOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "|                            PHI OPERATOR                                    |")?;
        writeln!(f, "{}", RULE)?;
        let select: Vec<&str> = self.select.iter().map(|s| s.text.as_str()).collect();
        writeln!(f, " S (SELECT ATTRIBUTE(S)):        [{}]", select.join(", "))?;
        writeln!(f, " n (NUMBER OF GROUPING VARS):    {}", self.n)?;
        writeln!(f, " V (GROUPING ATTRIBUTES):        [{}]", self.grouping_attributes.join(", "))?;
        let aggs: Vec<String> = self
            .aggregates
            .iter()
            .map(|agg| {
                let k = self.position_of(&agg.grouping_var).unwrap_or(0);
                format!("{} as {}", agg, agg.field_name(k))
            })
            .collect();
        writeln!(f, " F (F-VECT):                     [{}]", aggs.join(", "))?;
        writeln!(f, " σ (SELECT CONDITION-VECT):")?;
        for (i, sigma) in self.predicates.iter().enumerate() {
            let label = match i {
                0 => "WHERE".to_string(),
                _ => self
                    .grouping_variables
                    .get(i - 1)
                    .cloned()
                    .unwrap_or_default(),
            };
            let body = if sigma.is_empty() {
                "(true)".to_string()
            } else {
                sigma.to_string()
            };
            writeln!(f, "   σ{} [{}]: {}", i, label, body)?;
        }
        if self.having.is_empty() {
            writeln!(f, " G (HAVING_CONDITION):           (none)")?;
        } else {
            writeln!(f, " G (HAVING_CONDITION):           {}", self.having)?;
        }
        writeln!(f, "{}", RULE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AggregateKind;
    use crate::parser::parse;

    const QUERY: &str = "select cust, sum(x.quant), avg(y.quant), max(z.quant) from sales \
                         where year = 2020 group by cust; x, y, z \
                         such that x.state = 'NY', z.state = 'CT', y.state = 'NJ' \
                         having sum(x.quant) > avg(y.quant)";

    #[test]
    fn test_predicate_vector_layout() {
        let phi = PhiOperator::convert(&parse(QUERY).unwrap());
        assert_eq!(phi.n, 3);
        assert_eq!(phi.predicates.len(), phi.n + 1);
        assert_eq!(phi.where_predicate().unwrap().to_string(), "year = 2020");
        // declared order, not SUCH THAT text order
        assert_eq!(phi.predicate(1).unwrap().to_string(), "x.state = 'NY'");
        assert_eq!(phi.predicate(2).unwrap().to_string(), "y.state = 'NJ'");
        assert_eq!(phi.predicate(3).unwrap().to_string(), "z.state = 'CT'");
        assert!(phi.predicate(0).is_none());
        assert!(phi.predicate(4).is_none());
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let a = PhiOperator::convert(&parse(QUERY).unwrap());
        let b = PhiOperator::convert(&parse(QUERY).unwrap());
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_having_and_such_that_aggregates_in_f() {
        let phi = PhiOperator::convert(
            &parse(
                "select cust, count(x.*) from sales group by cust; x, y \
                 such that x.state = 'NY', y.quant > avg(x.quant) having max(y.quant) > 5",
            )
            .unwrap(),
        );
        let referenced: Vec<&AggregateFunction> = phi
            .predicates
            .iter()
            .flat_map(|p| p.aggregates())
            .chain(phi.having.aggregates())
            .collect();
        for agg in referenced {
            assert!(phi.aggregates.contains(agg), "{} missing from F", agg);
        }
    }

    #[test]
    fn test_positions_and_aggregates_of() {
        let phi = PhiOperator::convert(&parse(QUERY).unwrap());
        assert_eq!(phi.position_of("y"), Some(2));
        assert_eq!(phi.position_of("w"), None);
        let of_y: Vec<_> = phi.aggregates_of(2).collect();
        assert_eq!(of_y, vec![&AggregateFunction::new(AggregateKind::Avg, "y", "quant")]);
        assert_eq!(phi.aggregates_of(0).count(), 0);
    }

    #[test]
    fn test_display_lists_every_predicate() {
        let phi = PhiOperator::convert(&parse(QUERY).unwrap());
        let text = phi.to_string();
        assert!(text.contains("σ0 [WHERE]: year = 2020"));
        assert!(text.contains("σ3 [z]: z.state = 'CT'"));
        assert!(text.contains("avg(y.quant) as avg_2_quant"));
    }
}
