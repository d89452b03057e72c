//! Phi-format input: the six operands written out as labeled sections.
//!
//! ```text
//! SELECT ATTRIBUTE(S):
//! cust, 1_sum_quant, 2_sum_quant
//! NUMBER OF GROUPING VARIABLES(n):
//! 2
//! GROUPING ATTRIBUTES(V):
//! cust
//! F-VECT([F]):
//! 1_sum_quant, 2_sum_quant
//! SELECT CONDITION-VECT([σ]):
//! 1.state = 'NY'
//! 2.state = 'NJ'
//! HAVING_CONDITION(G):
//! 1_sum_quant > 2_sum_quant
//! ```
//!
//! `FROM:` and `WHERE:` sections are optional; the table defaults to `sales`.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::{
    clauses::{parse_from, parse_group_by, parse_select},
    conditions::parse_condition_expression,
    expressions::parse_operand,
    harvest_aggregates, split_top_level_commas,
};
use crate::ast::{ConditionExpression, EmfQuery, Expression};
use crate::error::{EmfError, EmfResult};
use crate::sections::{fold_case, strip_comments};

const DEFAULT_TABLE: &str = "sales";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PhiSection {
    From,
    Where,
    Select,
    VariableCount,
    GroupingAttributes,
    Aggregates,
    Predicates,
    Having,
}

impl PhiSection {
    const LABELS: [(&'static str, PhiSection); 7] = [
        ("select condition", PhiSection::Predicates),
        ("select attribute", PhiSection::Select),
        ("number of grouping variables", PhiSection::VariableCount),
        ("grouping attributes", PhiSection::GroupingAttributes),
        ("f-vect", PhiSection::Aggregates),
        ("having_condition", PhiSection::Having),
        ("having condition", PhiSection::Having),
    ];

    fn label(&self) -> &'static str {
        match self {
            PhiSection::From => "FROM",
            PhiSection::Where => "WHERE",
            PhiSection::Select => "SELECT ATTRIBUTE(S)",
            PhiSection::VariableCount => "NUMBER OF GROUPING VARIABLES(n)",
            PhiSection::GroupingAttributes => "GROUPING ATTRIBUTES(V)",
            PhiSection::Aggregates => "F-VECT([F])",
            PhiSection::Predicates => "SELECT CONDITION-VECT([σ])",
            PhiSection::Having => "HAVING_CONDITION(G)",
        }
    }

    /// Recognize a label line, returning the section and any content after the colon.
    fn parse_label(line: &str) -> Option<(PhiSection, &str)> {
        let (head, rest) = match line.split_once(':') {
            Some((head, rest)) if !head.contains('\'') => (head.trim(), rest.trim()),
            _ => (line.trim(), ""),
        };
        let has_colon = line.contains(':');

        if has_colon && (head == "from" || head == "where") {
            let section = if head == "from" {
                PhiSection::From
            } else {
                PhiSection::Where
            };
            return Some((section, rest));
        }

        Self::LABELS
            .iter()
            .find(|(prefix, _)| head.starts_with(prefix))
            .map(|(_, section)| (*section, rest))
    }
}

fn predicate_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^a-z0-9_.'])([a-z0-9_]+)\.[a-z_]").expect("predicate pattern is valid")
    })
}

/// Parse a Phi-format block into the same `EmfQuery` the ESQL parser produces.
pub fn parse_phi(raw: &str) -> EmfResult<EmfQuery> {
    let stripped = strip_comments(raw);
    if stripped.trim().is_empty() {
        return Err(EmfError::parse("Empty query received."));
    }
    let text = fold_case(&stripped);
    let sections = split_sections(&text)?;
    let joined = |section: PhiSection, sep: &str| -> String {
        sections
            .get(&section)
            .map(|lines| lines.join(sep))
            .unwrap_or_default()
    };

    let mut query = EmfQuery::new();

    let from = joined(PhiSection::From, " ");
    query.from_table = if from.trim().is_empty() {
        DEFAULT_TABLE.to_string()
    } else {
        parse_from(&from)?
    };

    let n_text = sections.get(&PhiSection::VariableCount).ok_or_else(|| {
        EmfError::parse(format!(
            "Phi input is missing {}",
            PhiSection::VariableCount.label()
        ))
    })?;
    let n_text = n_text.join(" ");
    let n: usize = n_text.trim().parse().map_err(|_| {
        EmfError::parse(format!(
            "{} must be a non-negative integer, found '{}'",
            PhiSection::VariableCount.label(),
            n_text.trim()
        ))
    })?;

    let (attributes, extra) = parse_group_by(&joined(PhiSection::GroupingAttributes, ","))?;
    if !extra.is_empty() {
        return Err(EmfError::parse(format!(
            "{} lists attributes only",
            PhiSection::GroupingAttributes.label()
        )));
    }
    query.grouping_attributes = attributes;

    let predicates: Vec<String> = sections
        .get(&PhiSection::Predicates)
        .cloned()
        .unwrap_or_default();
    if predicates.len() > n {
        return Err(EmfError::parse(format!(
            "{} has {} predicates but n = {}",
            PhiSection::Predicates.label(),
            predicates.len(),
            n
        )));
    }
    query.grouping_variables = variable_names(&predicates, n)?;

    query.where_conditions = parse_condition_expression(&joined(PhiSection::Where, " "), &[])?;

    let vars = query.grouping_variables.clone();
    for (i, var) in vars.iter().enumerate() {
        let expr = match predicates.get(i) {
            Some(text) => parse_condition_expression(text, &vars)?,
            None => ConditionExpression::new(),
        };
        query.such_that.insert(var.clone(), expr);
    }

    query.select = parse_select(&joined(PhiSection::Select, ","), &vars)?;

    for item in split_top_level_commas(&joined(PhiSection::Aggregates, ",")) {
        match parse_operand(&item, &vars)? {
            Expression::Aggregate(agg) => query.register_aggregate(&agg),
            _ => {
                return Err(EmfError::parse(format!(
                    "{} entry '{}' is not an aggregate",
                    PhiSection::Aggregates.label(),
                    item
                )))
            }
        }
    }

    query.having = parse_condition_expression(&joined(PhiSection::Having, " "), &vars)?;
    harvest_aggregates(&mut query);

    debug!(
        table = %query.from_table,
        variables = n,
        aggregates = query.aggregates.len(),
        "parsed Phi-format query"
    );
    Ok(query)
}

fn split_sections(text: &str) -> EmfResult<HashMap<PhiSection, Vec<String>>> {
    let mut sections: HashMap<PhiSection, Vec<String>> = HashMap::new();
    let mut current: Option<PhiSection> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((section, rest)) = PhiSection::parse_label(line) {
            if sections.contains_key(&section) {
                return Err(EmfError::parse(format!(
                    "Duplicate section {}",
                    section.label()
                )));
            }
            let lines = sections.entry(section).or_default();
            if !rest.is_empty() {
                lines.push(rest.to_string());
            }
            current = Some(section);
            continue;
        }

        match current {
            Some(section) => sections.entry(section).or_default().push(line.to_string()),
            None => {
                return Err(EmfError::parse(format!(
                    "Phi input must start with a section label, found '{}'",
                    line
                )))
            }
        }
    }

    Ok(sections)
}

/// Variable names from the predicates' `<name>.` prefixes in σ order; predicates without a
/// prefix and missing predicates take their 1-based position.
fn variable_names(predicates: &[String], n: usize) -> EmfResult<Vec<String>> {
    let mut names: Vec<String> = Vec::with_capacity(n);
    for i in 0..n {
        let name = predicates
            .get(i)
            .and_then(|p| predicate_var_pattern().captures(p))
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| (i + 1).to_string());
        if names.contains(&name) {
            return Err(EmfError::parse(format!(
                "Grouping variable '{}' has more than one predicate",
                name
            )));
        }
        names.push(name);
    }
    Ok(names)
}
