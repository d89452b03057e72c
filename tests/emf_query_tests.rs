//! EMF Query Tests over CSV tables
//!
//! End-to-end tests for:
//! - Multi-feature grouping variables with implicit and explicit correlation
//! - HAVING and the implicit count rule
//! - WHERE (σ0) filtering during group discovery
//! - Phi-format input
//! - Column kinds inferred from CSV or declared in configuration
//! - Planner switches never changing results

mod common;

use std::collections::HashMap;

use common::{create_data_dir, create_sales_dir, execute, s, write_table};
use emfql::config::TableConfig;
use emfql::{render, run_query, AppError, Config, OutputFormat};
use emfql_core::{ColumnType, EmfError, InputFormat, PlanOptions, Value};

#[test]
fn test_average_per_state_for_each_customer() {
    let (config, _dir) = create_sales_dir();
    let result = execute(
        &config,
        "SELECT cust, avg(x.quant), avg(y.quant)
         FROM sales
         GROUP BY cust; x, y
         SUCH THAT x.state = 'NY', y.state = 'NJ'",
    );

    assert_eq!(result.headers, vec!["cust", "avg(x.quant)", "avg(y.quant)"]);
    assert_eq!(
        result.rows,
        vec![
            vec![s("A"), Value::Real(15.0), Value::Real(4.0)],
            vec![s("B"), Value::Real(3.0), Value::Real(3.0)],
            vec![s("C"), Value::Real(0.0), Value::Real(0.0)],
        ]
    );

    let text = render(&result, OutputFormat::Table).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "cust | avg(x.quant) | avg(y.quant)");
    assert_eq!(lines[1], "-".repeat(60));
    assert_eq!(lines[2], "A | 15.0 | 4.0");
    assert_eq!(lines[4], "C | 0.0 | 0.0");
}

#[test]
fn test_having_keeps_customers_selling_more_in_ny() {
    let (config, _dir) = create_sales_dir();
    let result = execute(
        &config,
        "SELECT cust, sum(x.quant), sum(y.quant) FROM sales GROUP BY cust; x, y \
         SUCH THAT x.state = 'NY', y.state = 'NJ' \
         HAVING sum(x.quant) > sum(y.quant)",
    );
    assert_eq!(result.rows, vec![vec![s("A"), Value::Int(30), Value::Int(4)]]);
    assert_eq!(result.stats.groups, 3);
    assert_eq!(result.stats.groups_emitted, 1);
}

#[test]
fn test_groups_without_counted_rows_are_dropped() {
    let (config, _dir) = create_sales_dir();
    let result = execute(
        &config,
        "SELECT cust, count(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY'",
    );
    assert_eq!(
        result.rows,
        vec![vec![s("A"), Value::Int(2)], vec![s("B"), Value::Int(1)]]
    );
}

#[test]
fn test_previous_year_average() {
    let (config, _dir) = create_sales_dir();
    let result = execute(
        &config,
        "SELECT cust, year, avg(x.quant), avg(y.quant) FROM sales GROUP BY cust, year; x, y \
         SUCH THAT x.cust = cust and x.year = year, y.cust = cust and y.year = year - 1",
    );
    assert_eq!(
        result.rows,
        vec![
            vec![s("A"), Value::Int(2020), Value::Real(7.0), Value::Real(0.0)],
            vec![s("A"), Value::Int(2021), Value::Real(20.0), Value::Real(7.0)],
            vec![s("B"), Value::Int(2020), Value::Real(3.0), Value::Real(0.0)],
            vec![s("B"), Value::Int(2021), Value::Real(3.0), Value::Real(3.0)],
            vec![s("C"), Value::Int(2021), Value::Real(7.0), Value::Real(0.0)],
        ]
    );
}

#[test]
fn test_where_limits_discovered_groups() {
    let (config, _dir) = create_sales_dir();
    let result = execute(
        &config,
        "SELECT prod, sum(x.quant) FROM sales WHERE year = 2021 GROUP BY prod; x \
         SUCH THAT x.state <> 'CT'",
    );
    assert_eq!(result.rows, vec![vec![s("pear"), Value::Int(23)]]);
}

#[test]
fn test_date_column_comparison() {
    let (config, _dir) = create_sales_dir();
    let result = execute(
        &config,
        "SELECT cust, count(x.*), max(x.day) FROM sales GROUP BY cust; x \
         SUCH THAT x.day >= '2021-01-01'",
    );
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.rows[0][1], Value::Int(1));
    assert_eq!(result.rows[2][2].to_string(), "2021-12-30");
}

#[test]
fn test_phi_block_matches_esql() {
    let (config, _dir) = create_sales_dir();
    let esql = execute(
        &config,
        "SELECT cust, sum(x.quant), sum(y.quant) FROM sales GROUP BY cust; x, y \
         SUCH THAT x.state = 'NY', y.state = 'NJ' HAVING sum(x.quant) > sum(y.quant)",
    );
    let phi = run_query(
        &config,
        "SELECT ATTRIBUTE(S):
cust, 1_sum_quant, 2_sum_quant
NUMBER OF GROUPING VARIABLES(n):
2
GROUPING ATTRIBUTES(V):
cust
F-VECT([F]):
1_sum_quant, 2_sum_quant
SELECT CONDITION-VECT([σ]):
1.state = 'NY'
2.state = 'NJ'
HAVING_CONDITION(G):
1_sum_quant > 2_sum_quant
",
        Some(InputFormat::Phi),
    )
    .unwrap();
    assert_eq!(phi.rows, esql.rows);
}

#[test]
fn test_planner_switches_do_not_change_results() {
    let (mut config, _dir) = create_sales_dir();
    let query = "SELECT prod, avg(x.quant), count(y.quant), sum(z.quant) FROM sales GROUP BY prod; x, y, z \
                 SUCH THAT x.prod = prod, y.prod = prod and y.quant > avg(x.quant), z.state = 'NY'";
    let baseline = execute(&config, query);
    assert_eq!(baseline.rows.len(), 2);

    for merge in [true, false] {
        for index in [true, false] {
            config.planner = PlanOptions {
                merge_independent_scans: merge,
                use_group_index: index,
            };
            assert_eq!(execute(&config, query).rows, baseline.rows);
        }
    }
}

#[test]
fn test_declared_column_kind_overrides_inference() {
    let (mut config, _dir) = create_sales_dir();
    config.tables.insert(
        "sales".to_string(),
        TableConfig {
            path: None,
            columns: HashMap::from([("quant".to_string(), ColumnType::Real)]),
        },
    );
    let result = execute(
        &config,
        "SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY'",
    );
    assert_eq!(result.rows[0], vec![s("A"), Value::Real(30.0)]);
}

#[test]
fn test_configured_table_path() {
    let dir = create_data_dir();
    write_table(dir.path(), "sales_2020", "cust,state,quant\nA,NY,1\nA,NY,2\n");
    let mut config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    config.tables.insert(
        "sales".to_string(),
        TableConfig {
            path: Some("sales_2020.csv".into()),
            columns: HashMap::new(),
        },
    );
    let result = execute(
        &config,
        "SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY'",
    );
    assert_eq!(result.rows, vec![vec![s("A"), Value::Int(3)]]);
}

#[test]
fn test_missing_table_is_reported() {
    let (config, _dir) = create_sales_dir();
    let err = run_query(
        &config,
        "SELECT cust, sum(x.quant) FROM returns GROUP BY cust; x SUCH THAT x.state = 'NY'",
        None,
    )
    .unwrap_err();
    assert!(matches!(err, AppError::Query(EmfError::DataSource(_))));
    assert!(err.to_string().contains("returns"));
}

#[test]
fn test_parse_errors_surface_before_reading() {
    let dir = create_data_dir();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let err = run_query(&config, "SELECT cust GROUP BY cust; x", None).unwrap_err();
    assert!(matches!(err, AppError::Query(EmfError::Parse(_))));
}

#[test]
fn test_json_rows_keyed_by_projection() {
    let (config, _dir) = create_sales_dir();
    let result = execute(
        &config,
        "SELECT cust, sum(x.quant) / 2 FROM sales GROUP BY cust; x SUCH THAT x.state = 'NJ'",
    );
    assert_eq!(
        result.to_json(),
        serde_json::json!([
            {"cust": "A", "sum(x.quant) / 2": 2.0},
            {"cust": "B", "sum(x.quant) / 2": 1.5},
            {"cust": "C", "sum(x.quant) / 2": 0.0}
        ])
    );
}

#[test]
fn test_empty_key_cells_form_their_own_group() {
    let dir = create_data_dir();
    write_table(
        dir.path(),
        "sales",
        "cust,state,quant\n,NY,5\n,NY,7\nA,NY,3\nA,NJ,2\n,CT,1\n",
    );
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };

    let result = execute(
        &config,
        "SELECT cust, count(x.quant), sum(x.quant), max(y.quant) FROM sales GROUP BY cust; x, y \
         SUCH THAT x.state = 'NY', y.state = 'NJ'",
    );
    assert_eq!(
        result.rows,
        vec![
            vec![Value::Null, Value::Int(2), Value::Int(12), Value::Null],
            vec![s("A"), Value::Int(1), Value::Int(3), Value::Int(2)],
        ]
    );
    let text = render(&result, OutputFormat::Table).unwrap();
    assert!(text.contains("NULL | 2 | 12 | NULL\n"));

    // an explicit comparison against a missing customer never holds
    let result = execute(
        &config,
        "SELECT cust, count(*), count(x.quant) FROM sales GROUP BY cust; x \
         SUCH THAT x.cust <> 'A' HAVING count(*) > 0",
    );
    assert_eq!(
        result.rows,
        vec![
            vec![Value::Null, Value::Int(3), Value::Int(0)],
            vec![s("A"), Value::Int(2), Value::Int(0)],
        ]
    );
}

#[test]
fn test_non_ascii_column_names() {
    let dir = create_data_dir();
    write_table(dir.path(), "lager", "Ärea,Menge\nNord,1\nNord,2\nSüd,5\n");
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let result = execute(
        &config,
        "SELECT Ärea, sum(x.Menge) FROM lager GROUP BY Ärea; x SUCH THAT x.menge > 0",
    );
    assert_eq!(
        result.rows,
        vec![
            vec![s("Nord"), Value::Int(3)],
            vec![s("Süd"), Value::Int(5)],
        ]
    );
}
