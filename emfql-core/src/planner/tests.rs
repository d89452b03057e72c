use super::*;
use crate::ast::{AggregateFunction, CompareOp, Connective};
use crate::parser::parse;
use crate::validator::validate;
use crate::value::Value;

fn columns() -> ColumnTypes {
    ColumnTypes::from([
        ("cust".to_string(), ColumnType::String),
        ("prod".to_string(), ColumnType::String),
        ("state".to_string(), ColumnType::String),
        ("quant".to_string(), ColumnType::Int),
        ("price".to_string(), ColumnType::Real),
        ("day".to_string(), ColumnType::Date),
        ("year".to_string(), ColumnType::Int),
    ])
}

fn phi(text: &str) -> PhiOperator {
    let query = parse(text).unwrap();
    validate(&query).unwrap();
    PhiOperator::convert(&query)
}

fn plan_with(text: &str, options: PlanOptions) -> Plan {
    compile(&phi(text), &columns(), options).unwrap()
}

fn plan(text: &str) -> Plan {
    plan_with(text, PlanOptions::default())
}

fn plan_err(text: &str) -> EmfError {
    compile(&phi(text), &columns(), PlanOptions::default()).unwrap_err()
}

fn variable<'p>(plan: &'p Plan, var: &str) -> &'p VariableScan {
    plan.variable_scans().find(|v| v.var == var).unwrap()
}

fn unit_vars(plan: &Plan) -> Vec<Vec<&str>> {
    plan.units
        .iter()
        .map(|u| u.variables.iter().map(|v| v.var.as_str()).collect())
        .collect()
}

#[test]
fn test_schema_kinds_and_names() {
    let plan = plan(
        "SELECT cust, sum(x.quant), avg(x.quant), count(x.state), min(x.day), max(x.price), sum(x.price) \
         FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY'",
    );
    assert_eq!(plan.schema.grouping[0].kind, ColumnType::String);

    let slots: Vec<(&str, ColumnType)> = plan
        .schema
        .aggregates
        .iter()
        .map(|s| (s.field_name.as_str(), s.result_kind))
        .collect();
    assert_eq!(
        slots,
        vec![
            ("sum_1_quant", ColumnType::Int),
            ("avg_1_quant", ColumnType::Real),
            ("count_1_state", ColumnType::Int),
            ("min_1_day", ColumnType::Date),
            ("max_1_price", ColumnType::Real),
            ("sum_1_price", ColumnType::Real),
        ]
    );
    assert_eq!(plan.projection[2].kind, ColumnType::Real);
}

#[test]
fn test_sum_of_strings_rejected() {
    let err = plan_err("SELECT cust, sum(x.state) FROM sales GROUP BY cust; x SUCH THAT x.quant > 1");
    assert!(matches!(err, EmfError::Plan(_)));
    assert!(err.to_string().contains("numeric"));
}

#[test]
fn test_unknown_columns() {
    let err = plan_err("SELECT cust, sum(x.qty) FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY'");
    assert!(err.to_string().contains("qty"));

    let err = plan_err(
        "SELECT cust, sum(x.quant) FROM sales WHERE amount > 3 GROUP BY cust; x SUCH THAT x.state = 'NY'",
    );
    assert!(err.to_string().contains("unknown column 'amount'"));

    let err = plan_err("SELECT region, sum(x.quant) FROM sales GROUP BY region; x SUCH THAT x.state = 'NY'");
    assert!(err.to_string().contains("grouping attribute 'region'"));
}

#[test]
fn test_forward_and_self_references_rejected() {
    let err = plan_err(
        "SELECT cust, sum(x.quant), avg(y.quant) FROM sales GROUP BY cust; x, y \
         SUCH THAT x.quant > avg(y.quant), y.state = 'NY'",
    );
    assert!(err.to_string().contains("later grouping variable"));

    let err = plan_err(
        "SELECT cust, avg(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.quant > avg(x.quant)",
    );
    assert!(err.to_string().contains("own aggregate"));
}

#[test]
fn test_dependencies_and_guards() {
    let plan = plan(
        "SELECT cust, avg(x.quant), sum(y.quant), count(z.quant) FROM sales GROUP BY cust; x, y, z \
         SUCH THAT x.state = 'NY', y.state = 'NJ', z.quant > avg(x.quant) and z.quant < sum(y.quant)",
    );
    let z = variable(&plan, "z");
    assert_eq!(z.depends_on, vec![1, 2]);
    // only the average needs a populated guard; a sum is meaningful from zero
    let avg_slot = plan
        .schema
        .slot_of(&AggregateFunction::new(AggregateKind::Avg, "x", "quant"))
        .unwrap();
    assert_eq!(z.guards, vec![avg_slot]);
    assert_eq!(unit_vars(&plan), vec![vec!["x", "y"], vec!["z"]]);
}

#[test]
fn test_min_max_references_are_guarded() {
    let plan = plan(
        "SELECT cust, max(x.quant), count(y.quant) FROM sales GROUP BY cust; x, y \
         SUCH THAT x.state = 'NY', y.quant = max(x.quant)",
    );
    assert_eq!(variable(&plan, "y").guards.len(), 1);
}

#[test]
fn test_each_variable_updates_its_own_slots() {
    let plan = plan(
        "SELECT cust, sum(x.quant), avg(y.quant), count(x.quant) FROM sales GROUP BY cust; x, y \
         SUCH THAT x.state = 'NY', y.state = 'NJ'",
    );
    let field_names = |var: &str| -> Vec<&str> {
        variable(&plan, var)
            .updates
            .iter()
            .map(|&slot| plan.schema.aggregates[slot].field_name.as_str())
            .collect()
    };
    assert_eq!(field_names("x"), vec!["sum_1_quant", "count_1_quant"]);
    assert_eq!(field_names("y"), vec!["avg_2_quant"]);
}

#[test]
fn test_implicit_correlation_appended_last() {
    let plan = plan(
        "SELECT cust, prod, sum(x.quant) FROM sales GROUP BY cust, prod; x \
         SUCH THAT x.state = 'NY' or x.state = 'NJ'",
    );
    let x = variable(&plan, "x");
    assert!(x.implicit_correlation);
    assert_eq!(x.predicate.conditions.len(), 4);
    assert_eq!(
        x.predicate.connectives,
        vec![Connective::Or, Connective::And, Connective::And]
    );
    let last = &x.predicate.conditions[3];
    assert_eq!(last.left, BoundExpr::RowColumn("prod".into()));
    assert_eq!(last.op, CompareOp::Eq);
    assert_eq!(last.right, BoundExpr::GroupAttr(1));
    assert!(last.key_match);
    assert!(!x.predicate.conditions[0].key_match);
    assert_eq!(
        x.access,
        AccessPath::GroupKey {
            columns: vec!["cust".into(), "prod".into()]
        }
    );
}

#[test]
fn test_access_paths() {
    let full_key = plan(
        "SELECT cust, prod, sum(x.quant) FROM sales GROUP BY cust, prod; x \
         SUCH THAT x.prod = prod and cust = x.cust and x.quant > 2",
    );
    let x = variable(&full_key, "x");
    assert!(!x.implicit_correlation);
    assert_eq!(
        x.access,
        AccessPath::GroupKey {
            columns: vec!["cust".into(), "prod".into()]
        }
    );

    let partial = plan(
        "SELECT cust, prod, sum(x.quant) FROM sales GROUP BY cust, prod; x \
         SUCH THAT x.prod = prod and x.cust <> cust",
    );
    assert_eq!(
        variable(&partial, "x").access,
        AccessPath::AttributeIndex {
            attribute: 1,
            column: "prod".into()
        }
    );

    let disjunction = plan(
        "SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.cust = cust or x.quant > 5",
    );
    assert_eq!(variable(&disjunction, "x").access, AccessPath::FullScan);

    let negated = plan(
        "SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT not x.cust = cust",
    );
    assert_eq!(variable(&negated, "x").access, AccessPath::FullScan);

    let off = plan_with(
        "SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY'",
        PlanOptions {
            use_group_index: false,
            ..PlanOptions::default()
        },
    );
    assert_eq!(variable(&off, "x").access, AccessPath::FullScan);
}

#[test]
fn test_independent_variables_merge() {
    let query = "SELECT cust, sum(x.quant), sum(y.quant) FROM sales GROUP BY cust; x, y \
                 SUCH THAT x.state = 'NY', y.state = 'NJ'";
    let merged = plan(query);
    assert_eq!(unit_vars(&merged), vec![vec!["x", "y"]]);
    assert_eq!(merged.scan_count(), 2);

    let separate = plan_with(
        query,
        PlanOptions {
            merge_independent_scans: false,
            ..PlanOptions::default()
        },
    );
    assert_eq!(unit_vars(&separate), vec![vec!["x"], vec!["y"]]);
    assert_eq!(separate.scan_count(), 3);
}

#[test]
fn test_implicit_count_slots() {
    let without_having = plan(
        "SELECT cust, count(x.quant), sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY'",
    );
    assert_eq!(without_having.implicit_count_slots, vec![0]);

    let with_having = plan(
        "SELECT cust, count(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY' \
         HAVING count(x.quant) >= 0",
    );
    assert!(with_having.implicit_count_slots.is_empty());
}

#[test]
fn test_operand_types() {
    let err = plan_err("SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.quant = 'many'");
    assert!(matches!(err, EmfError::Type(_)));

    let plan = plan(
        "SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.day >= '2020-01-01'",
    );
    let first = &variable(&plan, "x").predicate.conditions[0];
    assert!(matches!(first.right, BoundExpr::Literal(Value::Date(_))));

    let err = plan_err("SELECT cust, sum(x.quant) FROM sales GROUP BY cust; x SUCH THAT x.day > 'soon'");
    assert!(matches!(err, EmfError::Type(_)));
}

#[test]
fn test_having_and_projection_bind_to_group() {
    let plan = plan(
        "SELECT cust, sum(x.quant) / 2 FROM sales GROUP BY cust; x SUCH THAT x.state = 'NY' \
         HAVING cust <> 'B' and sum(x.quant) > 0",
    );
    assert_eq!(plan.having.conditions[0].left, BoundExpr::GroupAttr(0));
    assert_eq!(plan.having.conditions[1].left, BoundExpr::Aggregate(0));
    assert_eq!(plan.projection[0].expr, BoundExpr::GroupAttr(0));
    assert_eq!(plan.projection[1].kind, ColumnType::Real);
}

#[test]
fn test_explain() {
    let plan = plan(
        "SELECT cust, sum(x.quant), avg(y.quant) FROM sales WHERE year = 2020 GROUP BY cust; x, y \
         SUCH THAT x.state = 'NY', y.cust = cust and y.quant > sum(x.quant)",
    );
    let explain = plan.explain();
    assert_eq!(explain.scan_sql, "SELECT * FROM sales WHERE year = 2020");
    assert_eq!(explain.where_sql, "year = 2020");
    assert_eq!(explain.scans.len(), 2);
    assert_eq!(explain.scans[0].variables[0].access_path, "group_key");
    assert!(explain.scans[0].variables[0].implicit_correlation);
    assert_eq!(explain.scans[1].variables[0].depends_on, vec![1]);
    assert!(explain.scans[1].variables[0].guards.is_empty());

    let json = serde_json::to_value(&explain).unwrap();
    assert_eq!(json["aggregate_fields"][1]["field"], "avg_2_quant");
    assert_eq!(json["aggregate_fields"][1]["kind"], "real");
    assert_eq!(json["grouping_fields"][0]["name"], "cust");

    let text = explain.to_string();
    assert!(text.starts_with("Scan 0: SELECT * FROM sales WHERE year = 2020"));
    assert!(text.contains("Scan 2: "));
    assert!(text.contains("y [group_key] y.cust = cust AND y.quant > sum(x.quant)"));
}

#[test]
fn test_compile_is_deterministic() {
    let query = "SELECT cust, sum(x.quant), sum(y.quant) FROM sales GROUP BY cust; x, y \
                 SUCH THAT x.state = 'NY', y.state = 'NJ' HAVING sum(x.quant) > sum(y.quant)";
    let a = plan(query);
    let b = plan(query);
    assert_eq!(a.explain(), b.explain());
    assert_eq!(a.units, b.units);
}
