//! Executor module for EMF queries.
//!
//! This module provides a trait-based executor that runs compiled plans against any
//! data source implementing the DataSource trait.

mod evaluate;
mod format;
mod local;
mod mf_structure;

pub use evaluate::{arithmetic, eval_condition, eval_predicate, evaluate, EvalContext};
pub use format::{format_row, format_table, RULE_WIDTH};
pub use local::{MfExecutor, QueryResult, ScanStats};
pub use mf_structure::{AggregateState, GroupRecord, MfStructure};

use std::collections::HashMap;

use crate::ast::ConditionExpression;
use crate::error::{EmfError, EmfResult};
use crate::planner::BoundPredicate;
use crate::value::{fold_identifier, ColumnTypes, Row};

/// Rows produced by one scan. Reader failures surface as `Err` items and abort the query.
pub type RowIter<'a> = Box<dyn Iterator<Item = EmfResult<Row>> + 'a>;

/// Trait for the tabular reader an EMF query runs against.
///
/// Every scan of a query receives the same σ0 filter, both in bound form (for sources
/// that filter in memory) and as SQL text (for sources that push it down).
pub trait DataSource {
    /// Column name to kind for `table`. Consulted once per query.
    fn column_types(&self, table: &str) -> EmfResult<ColumnTypes>;

    /// Read the rows of `table` that satisfy `filter`.
    fn scan<'a>(&'a self, table: &str, filter: &'a RowFilter) -> EmfResult<RowIter<'a>>;

    /// Check if a table exists.
    fn table_exists(&self, table: &str) -> bool {
        self.column_types(table).is_ok()
    }
}

impl<D: DataSource + ?Sized> DataSource for &D {
    fn column_types(&self, table: &str) -> EmfResult<ColumnTypes> {
        (**self).column_types(table)
    }

    fn scan<'a>(&'a self, table: &str, filter: &'a RowFilter) -> EmfResult<RowIter<'a>> {
        (**self).scan(table, filter)
    }

    fn table_exists(&self, table: &str) -> bool {
        (**self).table_exists(table)
    }
}

/// σ0 as handed to a data source.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    predicate: BoundPredicate,
    where_sql: String,
    sql: String,
}

impl RowFilter {
    pub fn new(predicate: BoundPredicate, table: &str, source: &ConditionExpression) -> Self {
        let where_sql = source.to_string();
        let sql = if where_sql.is_empty() {
            format!("SELECT * FROM {}", table)
        } else {
            format!("SELECT * FROM {} WHERE {}", table, where_sql)
        };
        Self {
            predicate,
            where_sql,
            sql,
        }
    }

    /// A filter that accepts every row.
    pub fn all(table: &str) -> Self {
        Self::new(BoundPredicate::default(), table, &ConditionExpression::new())
    }

    pub fn matches(&self, row: &Row) -> EmfResult<bool> {
        eval_predicate(&self.predicate, &EvalContext::row(row))
    }

    pub fn predicate(&self) -> &BoundPredicate {
        &self.predicate
    }

    /// The WHERE condition text, empty when there is none.
    pub fn where_sql(&self) -> &str {
        &self.where_sql
    }

    /// `SELECT * FROM <table> [WHERE <σ0>]`
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// In-memory data source for testing
#[derive(Debug, Default, Clone)]
pub struct InMemoryDataSource {
    tables: HashMap<String, (ColumnTypes, Vec<Row>)>,
}

impl InMemoryDataSource {
    /// Create a new empty in-memory data source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with its column kinds and rows
    pub fn add_table(&mut self, name: &str, columns: ColumnTypes, rows: Vec<Row>) {
        self.tables.insert(fold_identifier(name), (columns, rows));
    }

    /// Append a single row
    pub fn insert(&mut self, table: &str, row: Row) {
        self.tables
            .entry(fold_identifier(table))
            .or_default()
            .1
            .push(row);
    }

    fn table(&self, name: &str) -> EmfResult<&(ColumnTypes, Vec<Row>)> {
        self.tables
            .get(&fold_identifier(name))
            .ok_or_else(|| EmfError::DataSource(format!("table '{}' not found", name)))
    }
}

impl DataSource for InMemoryDataSource {
    fn column_types(&self, table: &str) -> EmfResult<ColumnTypes> {
        self.table(table).map(|(columns, _)| columns.clone())
    }

    fn scan<'a>(&'a self, table: &str, filter: &'a RowFilter) -> EmfResult<RowIter<'a>> {
        let (_, rows) = self.table(table)?;
        let iter = rows.iter().filter_map(move |row| match filter.matches(row) {
            Ok(true) => Some(Ok(row.clone())),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        });
        Ok(Box::new(iter))
    }

    fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(&fold_identifier(table))
    }
}
