//! Common test utilities for the CSV-backed query tests
//!
//! Provides shared helper functions for:
//! - Writing table fixtures into a temporary data directory
//! - Building configurations that point at it
//! - Running queries and reading back rows

#![allow(dead_code)]

use std::path::Path;

use emfql::{run_query, Config};
use emfql_core::{QueryResult, Value};
use tempfile::TempDir;

pub const SALES_CSV: &str = "\
cust,prod,day,month,year,state,quant
A,apple,2020-01-05,1,2020,NY,10
A,apple,2020-03-11,3,2020,NJ,4
A,pear,2021-02-20,2,2021,NY,20
B,apple,2020-07-01,7,2020,NY,3
B,pear,2021-09-14,9,2021,NJ,3
C,pear,2021-12-30,12,2021,CT,7
";

pub fn create_data_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

pub fn write_table(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(format!("{}.csv", name)), content).expect("Failed to write table");
}

/// A data directory holding `sales.csv` and a config pointing at it.
pub fn create_sales_dir() -> (Config, TempDir) {
    let dir = create_data_dir();
    write_table(dir.path(), "sales", SALES_CSV);
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    (config, dir)
}

pub fn execute(config: &Config, query: &str) -> QueryResult {
    run_query(config, query, None).unwrap_or_else(|e| panic!("query failed: {}\n{}", e, query))
}

pub fn s(v: &str) -> Value {
    Value::Str(v.to_string())
}
