//! Local executor for EMF queries.
//!
//! Drives a compiled plan against a DataSource: Scan 0 discovers the groups, each scan
//! unit then reads the base table once and updates the aggregates of its grouping
//! variables, and finally HAVING filters the groups and the projection list is evaluated.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::ast::EmfQuery;
use crate::error::EmfResult;
use crate::parser::{self, InputFormat};
use crate::phi::PhiOperator;
use crate::planner::{self, AccessPath, AggregateSlot, Plan, PlanExplain, PlanOptions, ScanUnit, VariableScan};
use crate::validator;
use crate::value::{GroupKey, KeyPart, Row, Value};

use super::evaluate::{eval_predicate, evaluate, EvalContext};
use super::mf_structure::{AggregateState, MfStructure};
use super::DataSource;

type AttributeIndex = HashMap<KeyPart, Vec<usize>>;

/// Counters reported with every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStats {
    /// Base-table reads, Scan 0 included.
    pub scans: usize,
    pub rows_read: usize,
    pub groups: usize,
    pub groups_emitted: usize,
}

/// Projected rows of one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Projection-list text, one per column.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: ScanStats,
}

impl QueryResult {
    /// An array of objects keyed by header.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(header, value)| (header.clone(), json_value(value)))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Real(r) => serde_json::Number::from_f64(*r)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Date(_) | Value::Str(_) => serde_json::Value::String(value.to_string()),
    }
}

/// Local executor for EMF queries.
///
/// Executes queries against any DataSource implementation.
pub struct MfExecutor<D: DataSource> {
    data_source: D,
    options: PlanOptions,
}

impl<D: DataSource> MfExecutor<D> {
    /// Create a new executor with the given data source.
    pub fn new(data_source: D) -> Self {
        Self {
            data_source,
            options: PlanOptions::default(),
        }
    }

    /// Create a new executor with custom planner options.
    pub fn with_options(data_source: D, options: PlanOptions) -> Self {
        Self {
            data_source,
            options,
        }
    }

    pub fn data_source(&self) -> &D {
        &self.data_source
    }

    pub fn options(&self) -> PlanOptions {
        self.options
    }

    /// Parse (format detected from the text), validate and convert to Phi form.
    pub fn prepare(&self, text: &str) -> EmfResult<PhiOperator> {
        self.prepare_as(text, InputFormat::detect(text))
    }

    pub fn prepare_as(&self, text: &str, format: InputFormat) -> EmfResult<PhiOperator> {
        let query = parser::parse_with_format(text, format)?;
        validator::validate(&query)?;
        Ok(PhiOperator::convert(&query))
    }

    /// Execute a query string.
    pub fn execute(&self, text: &str) -> EmfResult<QueryResult> {
        let phi = self.prepare(text)?;
        self.execute_phi(&phi)
    }

    /// Execute a parsed query; it is validated first.
    pub fn execute_query(&self, query: &EmfQuery) -> EmfResult<QueryResult> {
        validator::validate(query)?;
        self.execute_phi(&PhiOperator::convert(query))
    }

    pub fn execute_phi(&self, phi: &PhiOperator) -> EmfResult<QueryResult> {
        let plan = self.compile(phi)?;
        self.run(&plan)
    }

    /// Compile against the base table's column metadata.
    pub fn compile(&self, phi: &PhiOperator) -> EmfResult<Plan> {
        let columns = self.data_source.column_types(&phi.from_table)?;
        planner::compile(phi, &columns, self.options)
    }

    pub fn explain(&self, text: &str) -> EmfResult<PlanExplain> {
        let phi = self.prepare(text)?;
        Ok(self.compile(&phi)?.explain())
    }

    /// Evaluate a compiled plan.
    pub fn run(&self, plan: &Plan) -> EmfResult<QueryResult> {
        let mut mf = MfStructure::new();
        let mut stats = ScanStats::default();

        self.discover(plan, &mut mf, &mut stats)?;

        // groups are fixed after Scan 0, so one index per attribute serves every scan
        let mut indexes: HashMap<usize, AttributeIndex> = HashMap::new();
        for (i, unit) in plan.units.iter().enumerate() {
            for var in &unit.variables {
                if let AccessPath::AttributeIndex { attribute, .. } = var.access {
                    indexes
                        .entry(attribute)
                        .or_insert_with(|| mf.build_index(attribute));
                }
            }
            self.scan_unit(plan, i + 1, unit, &mut mf, &indexes, &mut stats)?;
        }

        let rows = self.project(plan, &mf, &mut stats)?;
        info!(
            groups = stats.groups,
            emitted = stats.groups_emitted,
            scans = stats.scans,
            rows_read = stats.rows_read,
            "query finished"
        );

        Ok(QueryResult {
            headers: plan.projection.iter().map(|p| p.header.clone()).collect(),
            rows,
            stats,
        })
    }

    /// Scan 0: one record per distinct grouping key, aggregates untouched.
    fn discover(&self, plan: &Plan, mf: &mut MfStructure, stats: &mut ScanStats) -> EmfResult<()> {
        debug!(sql = %plan.where_filter.sql(), "scan 0 started");
        let mut rows = 0usize;
        for row in self.data_source.scan(&plan.table, &plan.where_filter)? {
            let row = row?;
            rows += 1;
            let values = plan
                .schema
                .grouping
                .iter()
                .map(|field| column_value(&row, &field.name))
                .collect();
            mf.discover(values, &plan.schema);
        }
        stats.scans += 1;
        stats.rows_read += rows;
        stats.groups = mf.len();
        info!(rows, groups = mf.len(), "scan 0 finished");
        Ok(())
    }

    fn scan_unit(
        &self,
        plan: &Plan,
        number: usize,
        unit: &ScanUnit,
        mf: &mut MfStructure,
        indexes: &HashMap<usize, AttributeIndex>,
        stats: &mut ScanStats,
    ) -> EmfResult<()> {
        let vars: Vec<&str> = unit.variables.iter().map(|v| v.var.as_str()).collect();
        debug!(scan = number, variables = ?vars, "scan started");

        let mut rows = 0usize;
        let mut updates = 0usize;
        for row in self.data_source.scan(&plan.table, &plan.where_filter)? {
            let row = row?;
            rows += 1;
            for var in &unit.variables {
                let matched = matching_groups(var, &row, mf, indexes)?;
                for group in matched {
                    for &slot in &var.updates {
                        let value = slot_input(&plan.schema.aggregates[slot], &row);
                        mf.update_aggregate(group, slot, &value)?;
                    }
                    updates += 1;
                }
            }
        }

        stats.scans += 1;
        stats.rows_read += rows;
        info!(scan = number, variables = ?vars, rows, matches = updates, "scan finished");
        Ok(())
    }

    /// HAVING (or the implicit count rule) per group, then the projection list.
    fn project(
        &self,
        plan: &Plan,
        mf: &MfStructure,
        stats: &mut ScanStats,
    ) -> EmfResult<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        for group in mf.groups() {
            let ctx = EvalContext::group(group);
            let keep = if !plan.having.is_always_true() {
                eval_predicate(&plan.having, &ctx)?
            } else if !plan.implicit_count_slots.is_empty() {
                plan.implicit_count_slots.iter().any(|&slot| {
                    group
                        .aggregates
                        .get(slot)
                        .map_or(false, |state| state.value() != Value::Int(0))
                })
            } else {
                true
            };
            if !keep {
                continue;
            }
            let values = plan
                .projection
                .iter()
                .map(|item| evaluate(&item.expr, &ctx))
                .collect::<EmfResult<Vec<_>>>()?;
            rows.push(values);
        }
        stats.groups_emitted = rows.len();
        debug!(survivors = rows.len(), "having applied");
        Ok(rows)
    }
}

/// Groups whose membership test passes for `row`. Candidates come from the access path;
/// the full predicate is checked for each of them.
fn matching_groups(
    var: &VariableScan,
    row: &Row,
    mf: &MfStructure,
    indexes: &HashMap<usize, AttributeIndex>,
) -> EmfResult<Vec<usize>> {
    let candidates: Vec<usize> = match &var.access {
        AccessPath::GroupKey { columns } => {
            let values: Vec<Value> = columns.iter().map(|c| column_value(row, c)).collect();
            mf.lookup_group(&GroupKey::from_values(&values))
                .into_iter()
                .collect()
        }
        AccessPath::AttributeIndex { attribute, column } => {
            let part = KeyPart::from(&column_value(row, column));
            indexes
                .get(attribute)
                .and_then(|index| index.get(&part))
                .cloned()
                .unwrap_or_default()
        }
        AccessPath::FullScan => (0..mf.len()).collect(),
    };

    let mut matched = Vec::new();
    for index in candidates {
        let Some(group) = mf.group(index) else {
            continue;
        };
        let guarded = var.guards.iter().all(|&slot| {
            group
                .aggregates
                .get(slot)
                .map_or(false, AggregateState::is_populated)
        });
        if guarded && eval_predicate(&var.predicate, &EvalContext::row_in_group(row, group))? {
            matched.push(index);
        }
    }
    Ok(matched)
}

fn column_value(row: &Row, column: &str) -> Value {
    row.get(column).cloned().unwrap_or(Value::Null)
}

/// The row value an aggregate folds in; `count(var.*)` ignores it.
fn slot_input(slot: &AggregateSlot, row: &Row) -> Value {
    if slot.function.is_star() {
        Value::Int(1)
    } else {
        column_value(row, &slot.function.attribute)
    }
}
