//! CSV-backed data source.
//!
//! Each table is a CSV file with a header row, found at `<data_dir>/<table>.csv` unless
//! the configuration names another path. Column names are case-insensitive. Column kinds
//! come from the configuration when declared and are otherwise inferred from the data:
//! a column is the narrowest of int, real, date and string that holds every non-empty
//! cell. Empty cells read as NULL.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use emfql_core::{
    fold_identifier, ColumnType, ColumnTypes, DataSource, EmfError, EmfResult, Row, RowFilter,
    RowIter, Value,
};
use tracing::debug;

use crate::config::{Config, TableConfig};

pub struct CsvDataSource {
    data_dir: PathBuf,
    tables: HashMap<String, TableConfig>,
    // inferred kinds per table; a query asks once per scan
    types: RefCell<HashMap<String, ColumnTypes>>,
}

impl CsvDataSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            tables: HashMap::new(),
            types: RefCell::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut source = Self::new(&config.data_dir);
        for (name, table) in &config.tables {
            source = source.with_table(name, table.clone());
        }
        source
    }

    /// Register a path or declared column kinds for one table.
    pub fn with_table(mut self, name: &str, table: TableConfig) -> Self {
        self.tables.insert(fold_identifier(name), table);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File backing `table`.
    pub fn table_path(&self, table: &str) -> PathBuf {
        let key = fold_identifier(table);
        match self.tables.get(&key).and_then(|t| t.path.as_ref()) {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.data_dir.join(path),
            None => self.data_dir.join(format!("{}.csv", key)),
        }
    }

    fn open(&self, table: &str) -> EmfResult<(csv::Reader<File>, Vec<String>)> {
        let path = self.table_path(table);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| source_error(table, &path, e))?;
        let headers = reader
            .headers()
            .map_err(|e| source_error(table, &path, e))?
            .iter()
            .map(fold_identifier)
            .collect();
        Ok((reader, headers))
    }

    fn load_types(&self, table: &str) -> EmfResult<ColumnTypes> {
        let path = self.table_path(table);
        let (mut reader, headers) = self.open(table)?;
        let declared = self
            .tables
            .get(&fold_identifier(table))
            .map(|t| &t.columns);

        if let Some(declared) = declared {
            if let Some(missing) = declared
                .keys()
                .find(|c| !headers.contains(&fold_identifier(c)))
            {
                return Err(EmfError::DataSource(format!(
                    "column '{}' declared for table '{}' is not in {}",
                    missing,
                    table,
                    path.display()
                )));
            }
        }

        let mut inferred: Vec<Option<ColumnType>> = vec![None; headers.len()];
        let mut rows = 0usize;
        for record in reader.records() {
            let record = record.map_err(|e| source_error(table, &path, e))?;
            for (slot, cell) in inferred.iter_mut().zip(record.iter()) {
                *slot = widen(*slot, Value::infer_kind(cell));
            }
            rows += 1;
        }

        let types: ColumnTypes = headers
            .iter()
            .zip(inferred)
            .map(|(name, kind)| {
                let declared_kind = declared.and_then(|d| {
                    d.iter()
                        .find(|(c, _)| fold_identifier(c) == *name)
                        .map(|(_, k)| *k)
                });
                let kind = declared_kind.or(kind).unwrap_or(ColumnType::String);
                (name.clone(), kind)
            })
            .collect();

        debug!(
            "Table '{}' ({}): {} rows, columns {:?}",
            table,
            path.display(),
            rows,
            types
        );
        Ok(types)
    }
}

/// Join two observed kinds: int and real give real, anything else mixed gives string.
fn widen(current: Option<ColumnType>, seen: Option<ColumnType>) -> Option<ColumnType> {
    match (current, seen) {
        (None, kind) | (kind, None) => kind,
        (Some(a), Some(b)) if a == b => Some(a),
        (Some(ColumnType::Int), Some(ColumnType::Real))
        | (Some(ColumnType::Real), Some(ColumnType::Int)) => Some(ColumnType::Real),
        _ => Some(ColumnType::String),
    }
}

fn source_error(table: &str, path: &Path, e: csv::Error) -> EmfError {
    EmfError::DataSource(format!(
        "cannot read table '{}' from {}: {}",
        table,
        path.display(),
        e
    ))
}

impl DataSource for CsvDataSource {
    fn column_types(&self, table: &str) -> EmfResult<ColumnTypes> {
        let key = fold_identifier(table);
        if let Some(types) = self.types.borrow().get(&key) {
            return Ok(types.clone());
        }
        let types = self.load_types(table)?;
        self.types.borrow_mut().insert(key, types.clone());
        Ok(types)
    }

    fn scan<'a>(&'a self, table: &str, filter: &'a RowFilter) -> EmfResult<RowIter<'a>> {
        let types = self.column_types(table)?;
        let path = self.table_path(table);
        let (reader, headers) = self.open(table)?;
        let columns: Vec<(String, ColumnType)> = headers
            .into_iter()
            .map(|name| {
                let kind = types.get(&name).copied().unwrap_or(ColumnType::String);
                (name, kind)
            })
            .collect();
        debug!("{} [{}]", filter.sql(), path.display());

        let table = table.to_string();
        let iter = reader.into_records().filter_map(move |record| {
            let row = record
                .map_err(|e| source_error(&table, &path, e))
                .and_then(|record| {
                    let mut row = Row::new();
                    for ((name, kind), cell) in columns.iter().zip(record.iter()) {
                        row.insert(name, Value::parse_typed(cell, *kind)?);
                    }
                    Ok(row)
                });
            match row.and_then(|row| filter.matches(&row).map(|keep| (keep, row))) {
                Ok((true, row)) => Some(Ok(row)),
                Ok((false, _)) => None,
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::new(iter))
    }

    fn table_exists(&self, table: &str) -> bool {
        self.table_path(table).is_file()
    }
}
