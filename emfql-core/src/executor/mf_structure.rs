//! The MF-structure: one record per distinct grouping key.
//!
//! Records are created during Scan 0 only, in discovery order, and are never removed.
//! Later scans only update their aggregate states.

use std::collections::HashMap;

use crate::ast::AggregateKind;
use crate::error::{EmfError, EmfResult};
use crate::planner::{AggregateSlot, MfSchema};
use crate::value::{compare_values, ColumnType, GroupKey, KeyPart, Value};

/// Running state of one aggregate field.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    Count(i64),
    SumInt(i64),
    SumReal(f64),
    /// The visible mean is recomputed on every update.
    Avg { count: i64, sum: f64, mean: f64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl AggregateState {
    pub fn identity(slot: &AggregateSlot) -> Self {
        match slot.kind() {
            AggregateKind::Count => AggregateState::Count(0),
            AggregateKind::Sum if slot.result_kind == ColumnType::Int => AggregateState::SumInt(0),
            AggregateKind::Sum => AggregateState::SumReal(0.0),
            AggregateKind::Avg => AggregateState::Avg {
                count: 0,
                sum: 0.0,
                mean: 0.0,
            },
            AggregateKind::Min => AggregateState::Min(None),
            AggregateKind::Max => AggregateState::Max(None),
        }
    }

    /// Fold one row value in. Count counts every matching row; the others skip NULL.
    pub fn update(&mut self, value: &Value) -> EmfResult<()> {
        if let AggregateState::Count(n) = self {
            *n += 1;
            return Ok(());
        }
        if value.is_null() {
            return Ok(());
        }

        match self {
            AggregateState::SumInt(total) => {
                let current = *total;
                match value {
                    Value::Int(v) => {
                        *total = current.checked_add(*v).ok_or_else(|| {
                            EmfError::Execution(format!(
                                "integer overflow adding {} to sum {}",
                                v, current
                            ))
                        })?;
                    }
                    // a real in an int column widens the sum
                    other => {
                        let widened = current as f64 + numeric(other, "sum")?;
                        *self = AggregateState::SumReal(widened);
                    }
                }
            }
            AggregateState::SumReal(total) => *total += numeric(value, "sum")?,
            AggregateState::Avg { count, sum, mean } => {
                *count += 1;
                *sum += numeric(value, "avg")?;
                *mean = *sum / *count as f64;
            }
            AggregateState::Min(current) => {
                if replaces(current.as_ref(), value, std::cmp::Ordering::Less) {
                    *current = Some(value.clone());
                }
            }
            AggregateState::Max(current) => {
                if replaces(current.as_ref(), value, std::cmp::Ordering::Greater) {
                    *current = Some(value.clone());
                }
            }
            AggregateState::Count(_) => {}
        }
        Ok(())
    }

    /// Visible field value. Unset min/max is NULL; avg is 0.0 until its first update.
    pub fn value(&self) -> Value {
        match self {
            AggregateState::Count(n) | AggregateState::SumInt(n) => Value::Int(*n),
            AggregateState::SumReal(r) => Value::Real(*r),
            AggregateState::Avg { mean, .. } => Value::Real(*mean),
            AggregateState::Min(v) | AggregateState::Max(v) => v.clone().unwrap_or(Value::Null),
        }
    }

    /// Whether at least one value has been folded in.
    pub fn is_populated(&self) -> bool {
        match self {
            AggregateState::Avg { count, .. } => *count > 0,
            AggregateState::Min(v) | AggregateState::Max(v) => v.is_some(),
            AggregateState::Count(_) | AggregateState::SumInt(_) | AggregateState::SumReal(_) => {
                true
            }
        }
    }
}

fn numeric(value: &Value, function: &str) -> EmfResult<f64> {
    value.as_f64().ok_or_else(|| {
        EmfError::Execution(format!(
            "{} over non-numeric {} value '{}'",
            function,
            value.type_name(),
            value
        ))
    })
}

fn replaces(current: Option<&Value>, candidate: &Value, wanted: std::cmp::Ordering) -> bool {
    match current {
        None => true,
        Some(current) => compare_values(candidate, current) == Some(wanted),
    }
}

/// One group record.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub key: GroupKey,
    /// Grouping-attribute values in V order, copied from the first row seen.
    pub grouping_values: Vec<Value>,
    pub aggregates: Vec<AggregateState>,
    /// σ0-filtered rows with this key seen during Scan 0.
    pub rows_seen: i64,
}

impl GroupRecord {
    /// The key rebuilt from the stored grouping values.
    pub fn stored_key(&self) -> GroupKey {
        GroupKey::from_values(&self.grouping_values)
    }
}

#[derive(Debug, Default)]
pub struct MfStructure {
    groups: Vec<GroupRecord>,
    by_key: HashMap<GroupKey, usize>,
}

impl MfStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_group(&self, key: &GroupKey) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    /// Create a record with every aggregate at its identity. Returns the existing index
    /// when the key is already present.
    pub fn create_group(
        &mut self,
        key: GroupKey,
        grouping_values: Vec<Value>,
        schema: &MfSchema,
    ) -> usize {
        if let Some(index) = self.lookup_group(&key) {
            return index;
        }
        let index = self.groups.len();
        self.groups.push(GroupRecord {
            key: key.clone(),
            grouping_values,
            aggregates: schema.aggregates.iter().map(AggregateState::identity).collect(),
            rows_seen: 0,
        });
        self.by_key.insert(key, index);
        index
    }

    /// Scan 0 step: find or create the group for these grouping values and count the row.
    pub fn discover(&mut self, grouping_values: Vec<Value>, schema: &MfSchema) -> usize {
        let key = GroupKey::from_values(&grouping_values);
        let index = match self.lookup_group(&key) {
            Some(index) => index,
            None => self.create_group(key, grouping_values, schema),
        };
        self.groups[index].rows_seen += 1;
        index
    }

    pub fn update_aggregate(&mut self, group: usize, slot: usize, value: &Value) -> EmfResult<()> {
        let state = self
            .groups
            .get_mut(group)
            .and_then(|g| g.aggregates.get_mut(slot))
            .ok_or_else(|| {
                EmfError::Execution(format!("no aggregate slot #{} in group #{}", slot, group))
            })?;
        state.update(value)
    }

    /// Value of grouping attribute `attribute` to the groups holding it.
    pub fn build_index(&self, attribute: usize) -> HashMap<KeyPart, Vec<usize>> {
        let mut index: HashMap<KeyPart, Vec<usize>> = HashMap::new();
        for (i, group) in self.groups.iter().enumerate() {
            if let Some(value) = group.grouping_values.get(attribute) {
                index.entry(KeyPart::from(value)).or_default().push(i);
            }
        }
        index
    }

    pub fn group(&self, index: usize) -> Option<&GroupRecord> {
        self.groups.get(index)
    }

    pub fn groups(&self) -> &[GroupRecord] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
