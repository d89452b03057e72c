//! Query model for EMF/ESQL.
//!
//! Operands are parsed once into a small tagged expression tree that both the predicate
//! evaluator and the projection evaluator consume.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::EmfError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggregateKind {
    pub const NAMES: [&'static str; 5] = ["sum", "avg", "count", "min", "max"];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Avg => "avg",
            AggregateKind::Count => "count",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
        }
    }
}

impl FromStr for AggregateKind {
    type Err = EmfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregateKind::Sum),
            "avg" => Ok(AggregateKind::Avg),
            "count" => Ok(AggregateKind::Count),
            "min" => Ok(AggregateKind::Min),
            "max" => Ok(AggregateKind::Max),
            other => Err(EmfError::parse(format!(
                "unknown aggregate function '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `func(var.attr)`. Equality is by all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AggregateFunction {
    pub function: AggregateKind,
    pub grouping_var: String,
    pub attribute: String,
}

impl AggregateFunction {
    pub fn new(function: AggregateKind, grouping_var: &str, attribute: &str) -> Self {
        Self {
            function,
            grouping_var: grouping_var.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn is_star(&self) -> bool {
        self.attribute == "*"
    }

    /// MF-structure column name: `<func>_<k>_<attr>` with `k` the 1-based position of
    /// the grouping variable.
    pub fn field_name(&self, var_position: usize) -> String {
        let attr = if self.is_star() {
            "star"
        } else {
            self.attribute.as_str()
        };
        format!("{}_{}_{}", self.function, var_position, attr)
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}.{})",
            self.function, self.grouping_var, self.attribute
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            ArithmeticOp::Add | ArithmeticOp::Sub => 1,
            ArithmeticOp::Mul | ArithmeticOp::Div => 2,
        }
    }
}

/// Comparison operators. `!=` is accepted on input and folded into `Ne`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    /// Detection order: multi-character operators before single-character ones.
    pub const SCAN_ORDER: [(&'static str, CompareOp); 7] = [
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        ("<>", CompareOp::Ne),
        ("!=", CompareOp::Ne),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        ("=", CompareOp::Eq),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
        }
    }
}

/// Operand expression tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expression {
    Literal(Value),
    /// Bare column name: a base-table column in WHERE, a grouping attribute elsewhere.
    Column(String),
    /// `var.attr`: the current row of a grouping variable's scan.
    VarAttr { var: String, attr: String },
    Aggregate(AggregateFunction),
    /// Bare `count(*)`: rows discovered for the group during Scan 0.
    CountStar,
    Negate(Box<Expression>),
    Binary {
        left: Box<Expression>,
        op: ArithmeticOp,
        right: Box<Expression>,
    },
}

impl Expression {
    /// Depth-first visit of this node and all children.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expression)) {
        f(self);
        match self {
            Expression::Negate(inner) => inner.walk(f),
            Expression::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            _ => {}
        }
    }

    pub fn aggregates(&self) -> Vec<&AggregateFunction> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expression::Aggregate(agg) = e {
                out.push(agg);
            }
        });
        out
    }

    pub fn var_attrs(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expression::VarAttr { var, attr } = e {
                out.push((var.as_str(), attr.as_str()));
            }
        });
        out
    }

    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expression::Column(name) = e {
                out.push(name.as_str());
            }
        });
        out
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, parent: ArithmeticOp, right: bool) -> fmt::Result {
        if let Expression::Binary { op, .. } = self {
            let looser = op.precedence() < parent.precedence();
            let same_non_assoc = right
                && op.precedence() == parent.precedence()
                && matches!(parent, ArithmeticOp::Sub | ArithmeticOp::Div);
            if looser || same_non_assoc {
                return write!(f, "({})", self);
            }
        }
        write!(f, "{}", self)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(Value::Str(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Expression::Literal(Value::Date(d)) => write!(f, "'{}'", d.format("%Y-%m-%d")),
            Expression::Literal(v) => write!(f, "{}", v),
            Expression::Column(name) => f.write_str(name),
            Expression::VarAttr { var, attr } => write!(f, "{}.{}", var, attr),
            Expression::Aggregate(agg) => write!(f, "{}", agg),
            Expression::CountStar => f.write_str("count(*)"),
            Expression::Negate(inner) => match inner.as_ref() {
                Expression::Binary { .. } => write!(f, "-({})", inner),
                _ => write!(f, "-{}", inner),
            },
            Expression::Binary { left, op, right } => {
                left.fmt_child(f, *op, false)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_child(f, *op, true)
            }
        }
    }
}

/// One atomic comparison `left op right`, optionally prefixed by NOT.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub left: Expression,
    pub op: CompareOp,
    pub right: Expression,
    pub negated: bool,
}

impl Condition {
    pub fn new(left: Expression, op: CompareOp, right: Expression) -> Self {
        Self {
            left,
            op,
            right,
            negated: false,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn operands(&self) -> [&Expression; 2] {
        [&self.left, &self.right]
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("NOT ")?;
        }
        write!(f, "{} {} {}", self.left, self.op.symbol(), self.right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

/// Conditions chained strictly left to right by AND/OR, without precedence grouping.
/// `connectives.len() == conditions.len() - 1`; an empty chain is always true.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConditionExpression {
    conditions: Vec<Condition>,
    connectives: Vec<Connective>,
}

impl ConditionExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
            connectives: Vec::new(),
        }
    }

    /// Append a condition; the connective is ignored for the first one.
    pub fn push(&mut self, connective: Connective, condition: Condition) {
        if !self.conditions.is_empty() {
            self.connectives.push(connective);
        }
        self.conditions.push(condition);
    }

    /// AND-append every condition of `other`, keeping its own connectives.
    pub fn extend_and(&mut self, other: ConditionExpression) {
        let mut connectives = other.connectives.into_iter();
        for (i, condition) in other.conditions.into_iter().enumerate() {
            let connective = if i == 0 {
                Connective::And
            } else {
                connectives.next().unwrap_or(Connective::And)
            };
            self.push(connective, condition);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn connectives(&self) -> &[Connective] {
        &self.connectives
    }

    /// True when every connective is AND, so each condition is individually necessary.
    pub fn is_conjunctive(&self) -> bool {
        self.connectives.iter().all(|c| *c == Connective::And)
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.conditions.iter().flat_map(|c| c.operands())
    }

    pub fn aggregates(&self) -> Vec<&AggregateFunction> {
        self.expressions().flat_map(|e| e.aggregates()).collect()
    }
}

impl fmt::Display for ConditionExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                let connective = self.connectives.get(i - 1).unwrap_or(&Connective::And);
                write!(f, " {} ", connective.as_str())?;
            }
            write!(f, "{}", condition)?;
        }
        Ok(())
    }
}

/// A projection-list entry: the text as written (used as the output header) and its
/// parsed form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectItem {
    pub text: String,
    pub expr: Expression,
}

/// The parsed, not-yet-canonicalized query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmfQuery {
    pub from_table: String,
    pub select: Vec<SelectItem>,
    pub where_conditions: ConditionExpression,
    pub grouping_attributes: Vec<String>,
    /// Declared order decides the predicate-vector position.
    pub grouping_variables: Vec<String>,
    pub such_that: HashMap<String, ConditionExpression>,
    /// Deduplicated aggregates referenced anywhere in select, such-that or having.
    pub aggregates: Vec<AggregateFunction>,
    pub having: ConditionExpression,
}

impl EmfQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an aggregate unless an equal one is already present.
    pub fn register_aggregate(&mut self, agg: &AggregateFunction) {
        if !self.aggregates.contains(agg) {
            self.aggregates.push(agg.clone());
        }
    }
}

const RULE: &str =
    "+----------------------------------------------------------------------------+";

impl fmt::Display for EmfQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "|                     PARSED EMF QUERY STRUCTURE                             |")?;
        writeln!(f, "{}", RULE)?;
        let select: Vec<&str> = self.select.iter().map(|s| s.text.as_str()).collect();
        writeln!(f, " SELECT:           [{}]", select.join(", "))?;
        writeln!(f, " FROM:             {}", self.from_table)?;
        if !self.where_conditions.is_empty() {
            writeln!(f, " WHERE:            {}", self.where_conditions)?;
        }
        writeln!(f, " GROUP BY:         [{}]", self.grouping_attributes.join(", "))?;
        writeln!(f, " Grouping Vars:    [{}]", self.grouping_variables.join(", "))?;
        if !self.such_that.is_empty() {
            writeln!(f, " SUCH THAT:")?;
            for var in &self.grouping_variables {
                if let Some(expr) = self.such_that.get(var) {
                    writeln!(f, "   {}: {}", var, expr)?;
                }
            }
        }
        if !self.aggregates.is_empty() {
            let aggs: Vec<String> = self.aggregates.iter().map(|a| a.to_string()).collect();
            writeln!(f, " F-VECTORS:        [{}]", aggs.join(", "))?;
        }
        if !self.having.is_empty() {
            writeln!(f, " HAVING:           {}", self.having)?;
        }
        writeln!(f, "{}", RULE)
    }
}
