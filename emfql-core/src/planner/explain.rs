//! Serializable description of a compiled plan.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::AccessPath;
use super::Plan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanExplain {
    pub table: String,
    /// σ0 as written, empty when there is no WHERE.
    pub where_sql: String,
    /// Query handed to the data source for every scan.
    pub scan_sql: String,
    pub grouping_fields: Vec<FieldExplain>,
    pub aggregate_fields: Vec<AggregateFieldExplain>,
    /// Scan 0 is implicit; these are the grouping-variable scans in execution order.
    pub scans: Vec<ScanUnitExplain>,
    pub having: String,
    pub projection: Vec<String>,
    pub merge_independent_scans: bool,
    pub use_group_index: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExplain {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateFieldExplain {
    pub field: String,
    pub function: String,
    pub variable: String,
    pub attribute: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanUnitExplain {
    /// 1-based scan number; Scan 0 is discovery.
    pub scan: usize,
    pub variables: Vec<VariableExplain>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableExplain {
    pub variable: String,
    pub position: usize,
    pub predicate: String,
    pub implicit_correlation: bool,
    pub access_path: String, // "group_key", "attribute_index(<g>)" or "full_scan"
    pub depends_on: Vec<usize>,
    pub guards: Vec<String>,
}

impl AccessPath {
    pub fn describe(&self, grouping: &[super::GroupingField]) -> String {
        match self {
            AccessPath::GroupKey { .. } => "group_key".to_string(),
            AccessPath::AttributeIndex { attribute, .. } => {
                let name = grouping
                    .get(*attribute)
                    .map(|f| f.name.as_str())
                    .unwrap_or("?");
                format!("attribute_index({})", name)
            }
            AccessPath::FullScan => "full_scan".to_string(),
        }
    }
}

impl Plan {
    pub fn explain(&self) -> PlanExplain {
        let slots = &self.schema.aggregates;

        let scans = self
            .units
            .iter()
            .enumerate()
            .map(|(i, unit)| ScanUnitExplain {
                scan: i + 1,
                variables: unit
                    .variables
                    .iter()
                    .map(|v| VariableExplain {
                        variable: v.var.clone(),
                        position: v.position,
                        predicate: v.source.to_string(),
                        implicit_correlation: v.implicit_correlation,
                        access_path: v.access.describe(&self.schema.grouping),
                        depends_on: v.depends_on.clone(),
                        guards: v.guards.iter().map(|g| slots[*g].field_name.clone()).collect(),
                    })
                    .collect(),
            })
            .collect();

        PlanExplain {
            table: self.table.clone(),
            where_sql: self.where_filter.where_sql().to_string(),
            scan_sql: self.where_filter.sql().to_string(),
            grouping_fields: self
                .schema
                .grouping
                .iter()
                .map(|f| FieldExplain {
                    name: f.name.clone(),
                    kind: f.kind.to_string(),
                })
                .collect(),
            aggregate_fields: slots
                .iter()
                .map(|s| AggregateFieldExplain {
                    field: s.field_name.clone(),
                    function: s.function.function.to_string(),
                    variable: s.function.grouping_var.clone(),
                    attribute: s.function.attribute.clone(),
                    kind: s.result_kind.to_string(),
                })
                .collect(),
            scans,
            having: self.having_source.to_string(),
            projection: self.projection.iter().map(|p| p.header.clone()).collect(),
            merge_independent_scans: self.options.merge_independent_scans,
            use_group_index: self.options.use_group_index,
        }
    }
}

impl fmt::Display for PlanExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan 0: {}", self.scan_sql)?;
        let fields: Vec<String> = self
            .grouping_fields
            .iter()
            .map(|g| format!("{}:{}", g.name, g.kind))
            .chain(
                self.aggregate_fields
                    .iter()
                    .map(|a| format!("{}:{}", a.field, a.kind)),
            )
            .collect();
        writeln!(f, "  mf-structure: {}", fields.join(", "))?;

        for unit in &self.scans {
            writeln!(f, "Scan {}: {}", unit.scan, self.scan_sql)?;
            for v in &unit.variables {
                let predicate = if v.predicate.is_empty() {
                    "(true)"
                } else {
                    v.predicate.as_str()
                };
                write!(f, "  {} [{}] {}", v.variable, v.access_path, predicate)?;
                if v.implicit_correlation {
                    write!(f, " + correlated on grouping attributes")?;
                }
                if !v.guards.is_empty() {
                    write!(f, " (needs {})", v.guards.join(", "))?;
                }
                writeln!(f)?;
            }
        }

        if !self.having.is_empty() {
            writeln!(f, "HAVING {}", self.having)?;
        }
        write!(f, "SELECT {}", self.projection.join(", "))
    }
}
