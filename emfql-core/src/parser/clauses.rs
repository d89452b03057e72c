//! Clause-level parsers: projection list, FROM, GROUP BY and the packed SUCH THAT clause.

use std::collections::HashMap;

use super::{
    conditions::parse_condition_expression, expressions::parse_operand, is_word_char,
    scan_top_level, split_top_level_commas, word_at,
};
use crate::ast::{ConditionExpression, SelectItem};
use crate::error::{EmfError, EmfResult};

/// Split the projection list on top-level commas and parse every item.
pub fn parse_select(text: &str, grouping_vars: &[String]) -> EmfResult<Vec<SelectItem>> {
    split_top_level_commas(text)
        .into_iter()
        .map(|item| {
            let expr = parse_operand(&item, grouping_vars)?;
            Ok(SelectItem { text: item, expr })
        })
        .collect()
}

/// The single base table.
pub fn parse_from(text: &str) -> EmfResult<String> {
    let table = text.trim();
    if table.is_empty() {
        return Err(EmfError::parse("FROM clause missing."));
    }
    if !is_identifier(table) {
        return Err(EmfError::parse(format!(
            "FROM must name a single table, found '{}'",
            table
        )));
    }
    Ok(table.to_string())
}

/// `attr, attr [; | :] var, var` into grouping attributes and grouping-variable names.
pub fn parse_group_by(text: &str) -> EmfResult<(Vec<String>, Vec<String>)> {
    let (attrs, vars) = match text.find([';', ':']) {
        Some(i) => (&text[..i], &text[i + 1..]),
        None => (text, ""),
    };

    let split = |part: &str, what: &str| -> EmfResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for name in part.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !is_identifier(name) {
                return Err(EmfError::parse(format!("Invalid {} '{}'", what, name)));
            }
            if names.iter().any(|n| n == name) {
                return Err(EmfError::parse(format!("Duplicate {} '{}'", what, name)));
            }
            names.push(name.to_string());
        }
        Ok(names)
    };

    Ok((
        split(attrs, "grouping attribute")?,
        split(vars, "grouping variable")?,
    ))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_word_char)
}

/// A `<name>.` prefix found at top level in SUCH THAT text.
#[derive(Debug)]
struct VarPrefix<'t> {
    name: &'t str,
    /// Where a segment for this variable begins (a leading NOT included).
    start: usize,
    /// Whether the prefix opens a new condition (text start, after `,`, AND, OR or NOT)
    /// rather than sitting on the right of a comparison.
    opens_condition: bool,
}

/// Split the packed SUCH THAT clause into one condition expression per grouping variable.
///
/// A variable's conditions run until a condition introduced by a different variable's
/// `<name>.` prefix. Repeated sections for one variable are AND-ed together. Every
/// declared variable gets an entry, empty when the clause never mentions it.
pub fn parse_such_that(
    text: &str,
    grouping_vars: &[String],
) -> EmfResult<HashMap<String, ConditionExpression>> {
    let mut map: HashMap<String, ConditionExpression> = grouping_vars
        .iter()
        .map(|v| (v.clone(), ConditionExpression::new()))
        .collect();

    if text.trim().is_empty() {
        return Ok(map);
    }

    let prefixes = find_var_prefixes(text);
    let mut segments: Vec<(&str, usize, usize)> = Vec::new();
    let mut current: Option<(&str, usize)> = None;

    for prefix in &prefixes {
        if !grouping_vars.iter().any(|v| v == prefix.name) {
            if prefix.opens_condition {
                return Err(EmfError::parse(format!(
                    "Grouping variable '{}' in SUCH THAT is not declared in GROUP BY",
                    prefix.name
                )));
            }
            continue;
        }
        match current {
            None => current = Some((prefix.name, 0)),
            Some((name, start)) if prefix.opens_condition && name != prefix.name => {
                segments.push((name, start, prefix.start));
                current = Some((prefix.name, prefix.start));
            }
            Some(_) => {}
        }
    }

    match current {
        Some((name, start)) => segments.push((name, start, text.len())),
        None if grouping_vars.len() == 1 => {
            segments.push((grouping_vars[0].as_str(), 0, text.len()))
        }
        None => {
            return Err(EmfError::parse(format!(
                "SUCH THAT condition names no grouping variable: '{}'",
                text.trim()
            )))
        }
    }

    for (name, start, end) in segments {
        let piece = trim_separators(&text[start..end]);
        if piece.is_empty() {
            continue;
        }
        let expr = parse_condition_expression(piece, grouping_vars)?;
        if let Some(entry) = map.get_mut(name) {
            entry.extend_and(expr);
        }
    }

    Ok(map)
}

fn find_var_prefixes(text: &str) -> Vec<VarPrefix<'_>> {
    let scanned = scan_top_level(text);
    let mut prefixes = Vec::new();

    for (pos, sc) in scanned.iter().enumerate() {
        if !sc.top_level || !is_word_char(sc.ch) {
            continue;
        }
        let at_word_start = pos == 0 || {
            let prev = scanned[pos - 1].ch;
            !is_word_char(prev) && prev != '.'
        };
        if !at_word_start {
            continue;
        }

        let word_end = text[sc.index..]
            .find(|c: char| !is_word_char(c))
            .map_or(text.len(), |off| sc.index + off);
        let after_dot = text[word_end..].strip_prefix('.');
        let names_attribute = after_dot
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_alphabetic() || c == '_');
        if !names_attribute {
            continue;
        }

        let before = text[..sc.index].trim_end();
        let (opens_condition, start) = if before.is_empty() || before.ends_with(',') {
            (true, sc.index)
        } else if ends_with_word(before, "not") {
            let not_start = before.len() - 3;
            let before_not = text[..not_start].trim_end();
            let opens = before_not.is_empty()
                || before_not.ends_with(',')
                || ends_with_word(before_not, "and")
                || ends_with_word(before_not, "or");
            (opens, not_start)
        } else {
            let opens = ends_with_word(before, "and") || ends_with_word(before, "or");
            (opens, sc.index)
        };

        prefixes.push(VarPrefix {
            name: &text[sc.index..word_end],
            start,
            opens_condition,
        });
    }

    prefixes
}

fn ends_with_word(text: &str, word: &str) -> bool {
    text.len() >= word.len() && word_at(text, text.len() - word.len(), word)
}

/// Strip separators left between two variables' sections: commas and dangling AND/OR.
fn trim_separators(mut text: &str) -> &str {
    loop {
        let trimmed = text.trim().trim_matches(',').trim();
        let trimmed = if ends_with_word(trimmed, "and") {
            &trimmed[..trimmed.len() - 3]
        } else if ends_with_word(trimmed, "or") {
            &trimmed[..trimmed.len() - 2]
        } else if word_at(trimmed, 0, "and") {
            &trimmed[3..]
        } else if word_at(trimmed, 0, "or") {
            &trimmed[2..]
        } else {
            trimmed
        };
        if trimmed.len() == text.len() {
            return trimmed;
        }
        text = trimmed;
    }
}
