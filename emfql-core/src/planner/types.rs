use serde::{Deserialize, Serialize};

use crate::ast::{AggregateFunction, AggregateKind, ArithmeticOp, CompareOp, ConditionExpression, Connective};
use crate::value::{ColumnType, Value};

/// Planner switches. Both only pick access paths and scan grouping; results never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    /// Share one base-table read between independent grouping variables.
    pub merge_independent_scans: bool,
    /// Probe the group table by key or attribute index instead of testing every group.
    pub use_group_index: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            merge_independent_scans: true,
            use_group_index: true,
        }
    }
}

/// Expression with every name resolved to a row column, group field or aggregate slot.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Literal(Value),
    /// Column of the base-table row being scanned (σ0 columns and `var.attr`).
    RowColumn(String),
    /// Grouping attribute `V[i]` of the group under test.
    GroupAttr(usize),
    /// Aggregate slot of the group under test.
    Aggregate(usize),
    /// Rows discovered for the group during Scan 0 (`count(*)`).
    RowsSeen,
    Negate(Box<BoundExpr>),
    Binary {
        left: Box<BoundExpr>,
        op: ArithmeticOp,
        right: Box<BoundExpr>,
    },
}

impl BoundExpr {
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a BoundExpr)) {
        f(self);
        match self {
            BoundExpr::Negate(inner) => inner.walk(f),
            BoundExpr::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            _ => {}
        }
    }

    pub fn aggregate_slots(&self) -> Vec<usize> {
        let mut slots = Vec::new();
        self.walk(&mut |e| {
            if let BoundExpr::Aggregate(slot) = e {
                slots.push(*slot);
            }
        });
        slots
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundCondition {
    pub left: BoundExpr,
    pub op: CompareOp,
    pub right: BoundExpr,
    pub negated: bool,
    /// Grouping-key equality: NULL matches NULL, exactly as rows were grouped in Scan 0.
    pub key_match: bool,
}

/// A bound condition chain, evaluated strictly left to right. Empty is always true.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundPredicate {
    pub conditions: Vec<BoundCondition>,
    pub connectives: Vec<Connective>,
}

impl BoundPredicate {
    pub fn is_always_true(&self) -> bool {
        self.conditions.is_empty()
    }

    /// AND a condition onto the end of the chain, so it applies to everything before it.
    pub fn and_then(&mut self, condition: BoundCondition) {
        if !self.conditions.is_empty() {
            self.connectives.push(Connective::And);
        }
        self.conditions.push(condition);
    }

    pub fn aggregate_slots(&self) -> Vec<usize> {
        self.conditions
            .iter()
            .flat_map(|c| {
                let mut slots = c.left.aggregate_slots();
                slots.extend(c.right.aggregate_slots());
                slots
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupingField {
    pub name: String,
    pub kind: ColumnType,
}

/// One MF-structure aggregate column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSlot {
    pub function: AggregateFunction,
    /// `<func>_<k>_<attr>`
    pub field_name: String,
    /// 1-based position of the grouping variable whose scan fills this slot.
    pub var_position: usize,
    /// Kind of the aggregated column; `None` for `count(var.*)`.
    pub attribute_kind: Option<ColumnType>,
    pub result_kind: ColumnType,
}

impl AggregateSlot {
    pub fn kind(&self) -> AggregateKind {
        self.function.function
    }
}

/// Layout of one group record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MfSchema {
    pub grouping: Vec<GroupingField>,
    pub aggregates: Vec<AggregateSlot>,
}

impl MfSchema {
    pub fn slot_of(&self, agg: &AggregateFunction) -> Option<usize> {
        self.aggregates.iter().position(|slot| &slot.function == agg)
    }

    pub fn grouping_index(&self, name: &str) -> Option<usize> {
        self.grouping.iter().position(|f| f.name == name)
    }
}

/// How a grouping variable's scan finds the groups a row may belong to.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    /// Build a grouping key from these row columns (one per grouping attribute, in V order)
    /// and look the group up directly.
    GroupKey { columns: Vec<String> },
    /// Look the row's `column` value up in an index over grouping attribute `attribute`.
    AttributeIndex { attribute: usize, column: String },
    /// Test the predicate against every group.
    FullScan,
}

/// Work done for one grouping variable on each row of its scan.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableScan {
    pub var: String,
    pub position: usize,
    /// σi as written.
    pub source: ConditionExpression,
    /// σi bound, with the implicit correlation appended when `implicit_correlation`.
    pub predicate: BoundPredicate,
    /// The variable ranges over its own group's rows (σi names no grouping attribute).
    pub implicit_correlation: bool,
    pub access: AccessPath,
    /// Slots of other variables that must hold a value before σi can match.
    pub guards: Vec<usize>,
    /// Slots updated when σi matches.
    pub updates: Vec<usize>,
    /// Positions of variables whose aggregates σi reads.
    pub depends_on: Vec<usize>,
}

/// Grouping variables evaluated during one shared read of the base table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanUnit {
    pub variables: Vec<VariableScan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub header: String,
    pub expr: BoundExpr,
    pub kind: ColumnType,
}
