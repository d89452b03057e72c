//! Command-line Tests
//!
//! Runs the `emfql` binary against a temporary data directory:
//! - Inline and file queries in table, JSON and CSV output
//! - Output files
//! - EXPLAIN output
//! - Configuration files and failure exit codes

mod common;

use std::path::Path;
use std::process::{Command, Output};

use common::{create_sales_dir, write_table, SALES_CSV};

const NY_NJ_QUERY: &str = "SELECT cust, sum(x.quant), sum(y.quant) FROM sales GROUP BY cust; x, y \
                           SUCH THAT x.state = 'NY', y.state = 'NJ'";

fn emfql(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_emfql"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("EMFQL_DATA_DIR")
        .env_remove("EMFQL_OUTPUT_FORMAT")
        .env_remove("EMFQL_OUTPUT_FILE")
        .args(args)
        .output()
        .expect("Failed to run emfql")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_inline_query_prints_table() {
    let (_config, dir) = create_sales_dir();
    let output = emfql(dir.path(), &["-q", NY_NJ_QUERY]);
    assert!(output.status.success(), "{:?}", output);

    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "cust | sum(x.quant) | sum(y.quant)",
            "------------------------------------------------------------",
            "A | 30 | 4",
            "B | 3 | 3",
            "C | 0 | 0",
        ]
    );
}

#[test]
fn test_query_file_with_json_output() {
    let (_config, dir) = create_sales_dir();
    std::fs::write(dir.path().join("ny.esql"), NY_NJ_QUERY).unwrap();

    let output = emfql(dir.path(), &["ny.esql", "--json"]);
    assert!(output.status.success(), "{:?}", output);

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json[0]["cust"], "A");
    assert_eq!(json[0]["sum(x.quant)"], 30);
    assert_eq!(json.as_array().unwrap().len(), 3);
}

#[test]
fn test_output_file_and_csv_format() {
    let (_config, dir) = create_sales_dir();
    let output = emfql(
        dir.path(),
        &["-q", NY_NJ_QUERY, "--output-format", "csv", "-o", "out/result.csv"],
    );
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).is_empty());

    let written = std::fs::read_to_string(dir.path().join("out/result.csv")).unwrap();
    assert_eq!(
        written,
        "cust,sum(x.quant),sum(y.quant)\nA,30,4\nB,3,3\nC,0,0\n"
    );
}

#[test]
fn test_explain_prints_plan() {
    let (_config, dir) = create_sales_dir();
    let output = emfql(
        dir.path(),
        &[
            "--explain",
            "-q",
            "SELECT cust, sum(x.quant) FROM sales WHERE year = 2020 GROUP BY cust; x \
             SUCH THAT x.state = 'NY'",
        ],
    );
    assert!(output.status.success(), "{:?}", output);

    let text = stdout(&output);
    assert!(text.contains("Scan 0: SELECT * FROM sales WHERE year = 2020"));
    assert!(text.contains("x [group_key]"));
}

#[test]
fn test_config_file_sets_data_dir() {
    let (_config, dir) = create_sales_dir();
    let tables = dir.path().join("tables");
    std::fs::create_dir_all(&tables).unwrap();
    write_table(&tables, "orders", SALES_CSV);
    std::fs::write(
        dir.path().join("emfql.toml"),
        "data_dir = \"tables\"\n\n[planner]\nmerge_independent_scans = false\n",
    )
    .unwrap();

    let output = emfql(
        dir.path(),
        &[
            "-q",
            "SELECT cust, count(x.quant) FROM orders GROUP BY cust; x SUCH THAT x.state = 'NJ'",
        ],
    );
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).contains("A | 1\nB | 1\n"));
}

#[test]
fn test_invalid_query_fails() {
    let (_config, dir) = create_sales_dir();
    let output = emfql(dir.path(), &["-q", "SELECT cust, sum(x.quant) FROM sales"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("GROUP BY clause is required"));
}
