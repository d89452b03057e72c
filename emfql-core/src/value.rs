//! Typed scalar values, column kinds, base-table rows and grouping keys.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EmfError, EmfResult};

/// Date formats accepted when reading date columns or comparing against date literals.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Column kind as reported by the data source metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Real,
    Date,
    String,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Real)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Real => "real",
            ColumnType::Date => "date",
            ColumnType::String => "string",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = EmfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "bigint" | "smallint" => Ok(ColumnType::Int),
            "real" | "double" | "float" | "numeric" | "decimal" => Ok(ColumnType::Real),
            "date" => Ok(ColumnType::Date),
            "string" | "text" | "varchar" | "char" => Ok(ColumnType::String),
            other => Err(EmfError::Type(format!("unknown column type '{}'", other))),
        }
    }
}

/// Column name (lowercase) to kind, as returned by `DataSource::column_types`.
pub type ColumnTypes = HashMap<String, ColumnType>;

/// A scalar flowing through predicates, aggregates and projections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Date(NaiveDate),
    Str(String),
}

impl Value {
    /// Parse raw reader text into a value of the given column kind.
    /// Empty text is NULL for every kind.
    pub fn parse_typed(raw: &str, kind: ColumnType) -> EmfResult<Value> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        match kind {
            ColumnType::Int => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| EmfError::Type(format!("'{}' is not an int", raw))),
            ColumnType::Real => raw
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| EmfError::Type(format!("'{}' is not a real", raw))),
            ColumnType::Date => parse_date(raw)
                .map(Value::Date)
                .ok_or_else(|| EmfError::Type(format!("'{}' is not a date", raw))),
            ColumnType::String => Ok(Value::Str(raw.to_string())),
        }
    }

    /// Guess the narrowest column kind able to hold `raw`. Words such as `NaN` or `inf`
    /// stay strings.
    pub fn infer_kind(raw: &str) -> Option<ColumnType> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else if raw.parse::<i64>().is_ok() {
            Some(ColumnType::Int)
        } else if raw.parse::<f64>().map_or(false, f64::is_finite) {
            Some(ColumnType::Real)
        } else if parse_date(raw).is_some() {
            Some(ColumnType::Date)
        } else {
            Some(ColumnType::String)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Date(_) => "date",
            Value::Str(_) => "string",
        }
    }
}

/// Case folding for table and column names, the same folding applied to query text.
pub fn fold_identifier(name: &str) -> String {
    name.to_lowercase()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Reals always carry a fractional part so averages never look truncated.
fn format_real(r: f64) -> String {
    if r.is_finite() && r.fract() == 0.0 {
        format!("{:.1}", r)
    } else {
        format!("{}", r)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) => f.write_str(&format_real(*r)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// Compare two values for ordering.
///
/// Ints and reals compare numerically, dates compare with dates or with strings that
/// parse as dates. NULL and mismatched kinds are unordered.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_), Value::Real(_))
        | (Value::Real(_), Value::Int(_))
        | (Value::Real(_), Value::Real(_)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Str(s)) => parse_date(s).map(|b| a.cmp(&b)),
        (Value::Str(s), Value::Date(b)) => parse_date(s).map(|a| a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// One row of the base table, keyed by lowercase column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, column: &str, value: Value) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: Value) {
        self.values.insert(fold_identifier(column), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Hashable projection of a value, used in grouping keys and index buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Null,
    Int(i64),
    Real(u64),
    Date(NaiveDate),
    Str(String),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Int(i) => KeyPart::Int(*i),
            // -0.0 and 0.0 must land in the same group
            Value::Real(r) => KeyPart::Real(if *r == 0.0 { 0 } else { r.to_bits() }),
            Value::Date(d) => KeyPart::Date(*d),
            Value::Str(s) => KeyPart::Str(s.clone()),
        }
    }
}

/// Ordered tuple of grouping-attribute values (order per V).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(Vec<KeyPart>);

impl GroupKey {
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        GroupKey(values.into_iter().map(KeyPart::from).collect())
    }
}
