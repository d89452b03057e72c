//! Plain-text result rendering.

use crate::value::Value;

use super::local::QueryResult;

pub const RULE_WIDTH: usize = 60;

/// One output line: the values joined by `" | "`.
pub fn format_row(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Header, a dashed rule, then one line per surviving group.
pub fn format_table(result: &QueryResult) -> String {
    let mut out = String::new();
    out.push_str(&result.headers.join(" | "));
    out.push('\n');
    out.push_str(&"-".repeat(RULE_WIDTH));
    out.push('\n');
    for row in &result.rows {
        out.push_str(&format_row(row));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScanStats;

    #[test]
    fn test_format_table() {
        let result = QueryResult {
            headers: vec!["cust".into(), "avg(x.quant)".into()],
            rows: vec![
                vec![Value::Str("A".into()), Value::Real(20.0)],
                vec![Value::Str("B".into()), Value::Null],
            ],
            stats: ScanStats::default(),
        };
        let text = format_table(&result);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "cust | avg(x.quant)");
        assert_eq!(lines[1], "-".repeat(60));
        assert_eq!(lines[2], "A | 20.0");
        assert_eq!(lines[3], "B | NULL");
        assert_eq!(lines.len(), 4);
    }
}
