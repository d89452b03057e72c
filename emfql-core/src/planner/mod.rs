//! Plan compiler: Phi operator to executable scan plan.
//!
//! Compilation derives the MF-structure schema from column metadata, binds every
//! predicate and projection expression to row columns, group fields or aggregate slots,
//! picks an access path per grouping variable, and partitions the variables into scan
//! units that can share one read of the base table.

mod access;
mod bind;
mod explain;
mod merge;
mod types;

pub use explain::{AggregateFieldExplain, FieldExplain, PlanExplain, ScanUnitExplain, VariableExplain};
pub use types::*;

use tracing::{debug, info};

use crate::ast::{AggregateKind, ConditionExpression};
use crate::error::{EmfError, EmfResult};
use crate::executor::RowFilter;
use crate::phi::PhiOperator;
use crate::validator::is_uncorrelated;
use crate::value::{ColumnType, ColumnTypes};

use bind::Scope;

/// Executable form of a Phi operator.
#[derive(Debug, Clone)]
pub struct Plan {
    pub table: String,
    /// σ0, handed to the data source for Scan 0 and every later scan.
    pub where_filter: RowFilter,
    pub schema: MfSchema,
    pub units: Vec<ScanUnit>,
    pub having: BoundPredicate,
    pub having_source: ConditionExpression,
    pub projection: Vec<ProjectionItem>,
    /// Count slots of the projection list; without HAVING, groups where all of them are
    /// zero are suppressed.
    pub implicit_count_slots: Vec<usize>,
    pub options: PlanOptions,
}

impl Plan {
    pub fn variable_scans(&self) -> impl Iterator<Item = &VariableScan> {
        self.units.iter().flat_map(|u| u.variables.iter())
    }

    /// Base-table reads needed: discovery plus one per unit.
    pub fn scan_count(&self) -> usize {
        1 + self.units.len()
    }
}

/// Compile `phi` against the base table's column metadata.
pub fn compile(phi: &PhiOperator, columns: &ColumnTypes, options: PlanOptions) -> EmfResult<Plan> {
    PlanCompiler::new(phi, columns, options).compile()
}

pub(crate) struct PlanCompiler<'a> {
    phi: &'a PhiOperator,
    columns: &'a ColumnTypes,
    options: PlanOptions,
    schema: MfSchema,
}

impl<'a> PlanCompiler<'a> {
    fn new(phi: &'a PhiOperator, columns: &'a ColumnTypes, options: PlanOptions) -> Self {
        Self {
            phi,
            columns,
            options,
            schema: MfSchema::default(),
        }
    }

    fn compile(mut self) -> EmfResult<Plan> {
        self.schema = self.derive_schema()?;

        let where_source = self.phi.where_predicate().cloned().unwrap_or_default();
        let where_predicate = self.bind_predicate(&where_source, Scope::Row)?;
        let where_filter = RowFilter::new(where_predicate, &self.phi.from_table, &where_source);

        let mut scans = Vec::with_capacity(self.phi.n);
        for (i, var) in self.phi.grouping_variables.iter().enumerate() {
            scans.push(self.compile_variable(var, i + 1)?);
        }
        let units = merge::partition(scans, self.options.merge_independent_scans);

        let having = self.bind_predicate(&self.phi.having, Scope::Group)?;
        let projection = self.compile_projection()?;
        let implicit_count_slots = if self.phi.having.is_empty() {
            self.projection_count_slots(&projection)
        } else {
            Vec::new()
        };

        for unit in &units {
            let vars: Vec<&str> = unit.variables.iter().map(|v| v.var.as_str()).collect();
            debug!(variables = ?vars, "scan unit");
        }
        info!(
            table = %self.phi.from_table,
            aggregates = self.schema.aggregates.len(),
            scans = 1 + units.len(),
            "compiled plan"
        );

        Ok(Plan {
            table: self.phi.from_table.clone(),
            where_filter,
            schema: self.schema,
            units,
            having,
            having_source: self.phi.having.clone(),
            projection,
            implicit_count_slots,
            options: self.options,
        })
    }

    /// One field per grouping attribute, one slot per aggregate in F order.
    fn derive_schema(&self) -> EmfResult<MfSchema> {
        let mut schema = MfSchema::default();

        for name in &self.phi.grouping_attributes {
            let kind = self.column_kind(name).ok_or_else(|| {
                EmfError::plan(format!(
                    "grouping attribute '{}' is not a column of '{}'",
                    name, self.phi.from_table
                ))
            })?;
            schema.grouping.push(GroupingField {
                name: name.clone(),
                kind,
            });
        }

        for agg in &self.phi.aggregates {
            let var_position = self.phi.position_of(&agg.grouping_var).ok_or_else(|| {
                EmfError::plan(format!(
                    "{} refers to undeclared grouping variable '{}'",
                    agg, agg.grouping_var
                ))
            })?;

            let attribute_kind = if agg.is_star() {
                None
            } else {
                Some(self.column_kind(&agg.attribute).ok_or_else(|| {
                    EmfError::plan(format!(
                        "{}: '{}' is not a column of '{}'",
                        agg, agg.attribute, self.phi.from_table
                    ))
                })?)
            };

            let result_kind = match (agg.function, attribute_kind) {
                (AggregateKind::Count, _) => ColumnType::Int,
                (AggregateKind::Avg, Some(kind)) if kind.is_numeric() => ColumnType::Real,
                (AggregateKind::Sum, Some(kind)) if kind.is_numeric() => kind,
                (AggregateKind::Min | AggregateKind::Max, Some(kind)) => kind,
                (_, Some(kind)) => {
                    return Err(EmfError::plan(format!(
                        "{} needs a numeric column; '{}' is {}",
                        agg, agg.attribute, kind
                    )))
                }
                (_, None) => {
                    return Err(EmfError::plan(format!("{} is not supported", agg)));
                }
            };

            schema.aggregates.push(AggregateSlot {
                field_name: agg.field_name(var_position),
                function: agg.clone(),
                var_position,
                attribute_kind,
                result_kind,
            });
        }

        Ok(schema)
    }

    fn compile_variable(&self, var: &str, position: usize) -> EmfResult<VariableScan> {
        let source = self.phi.predicate(position).cloned().unwrap_or_default();
        let mut predicate = self.bind_predicate(&source, Scope::Variable(var))?;

        let implicit_correlation = is_uncorrelated(&source);
        if implicit_correlation {
            for condition in self.implicit_correlation() {
                predicate.and_then(condition);
            }
        }

        let mut depends_on: Vec<usize> = Vec::new();
        let mut guards: Vec<usize> = Vec::new();
        for slot in predicate.aggregate_slots() {
            let other = &self.schema.aggregates[slot];
            if other.var_position == position {
                return Err(EmfError::plan(format!(
                    "SUCH THAT for '{}' cannot use its own aggregate {}",
                    var, other.function
                )));
            }
            if other.var_position > position {
                return Err(EmfError::plan(format!(
                    "SUCH THAT for '{}' uses {}, which is computed by a later grouping variable",
                    var, other.function
                )));
            }
            if !depends_on.contains(&other.var_position) {
                depends_on.push(other.var_position);
            }
            let needs_guard = matches!(
                other.kind(),
                AggregateKind::Avg | AggregateKind::Min | AggregateKind::Max
            );
            if needs_guard && !guards.contains(&slot) {
                guards.push(slot);
            }
        }
        depends_on.sort_unstable();

        let updates: Vec<usize> = self
            .phi
            .aggregates_of(position)
            .filter_map(|agg| self.schema.slot_of(agg))
            .collect();

        let access = self.choose_access(var, &source, implicit_correlation);
        debug!(var, ?access, guards = guards.len(), "grouping variable compiled");

        Ok(VariableScan {
            var: var.to_string(),
            position,
            source,
            predicate,
            implicit_correlation,
            access,
            guards,
            updates,
            depends_on,
        })
    }

    fn compile_projection(&self) -> EmfResult<Vec<ProjectionItem>> {
        self.phi
            .select
            .iter()
            .map(|item| {
                let expr = self.bind_expr(&item.expr, Scope::Group)?;
                let kind = self.infer_kind(&expr)?;
                Ok(ProjectionItem {
                    header: item.text.clone(),
                    expr,
                    kind,
                })
            })
            .collect()
    }

    fn projection_count_slots(&self, projection: &[ProjectionItem]) -> Vec<usize> {
        let mut slots = Vec::new();
        for item in projection {
            for slot in item.expr.aggregate_slots() {
                if self.schema.aggregates[slot].kind() == AggregateKind::Count && !slots.contains(&slot) {
                    slots.push(slot);
                }
            }
        }
        slots
    }

    fn column_kind(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }
}

#[cfg(test)]
mod tests;
