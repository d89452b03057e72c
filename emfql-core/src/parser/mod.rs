//! ESQL and Phi-format parsing into `EmfQuery`.
//!
//! Clause text comes from the section extractor; operands are tokenized by the
//! expression lexer and parsed by recursive descent into `Expression` trees.

mod clauses;
mod conditions;
mod expressions;
mod phi_input;


use tracing::debug;

use crate::ast::{AggregateFunction, EmfQuery, Expression};
use crate::error::{EmfError, EmfResult};
use crate::lexer::{Lexer, Token};
use crate::sections::{extract_sections, normalize, Clause};

pub use clauses::{parse_from, parse_group_by, parse_select, parse_such_that};
pub use conditions::{parse_condition_expression, parse_single_condition};
pub use expressions::parse_operand;
pub use phi_input::parse_phi;

/// The two accepted query text layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Esql,
    Phi,
}

impl InputFormat {
    /// Phi blocks are recognized by their operand labels; anything else is ESQL.
    pub fn detect(text: &str) -> Self {
        let is_phi = text.lines().any(|line| {
            let line = line.trim().to_lowercase();
            line.starts_with("select attribute") || line.starts_with("number of grouping variables")
        });
        if is_phi {
            InputFormat::Phi
        } else {
            InputFormat::Esql
        }
    }
}

impl std::str::FromStr for InputFormat {
    type Err = EmfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "esql" | "sql" => Ok(InputFormat::Esql),
            "phi" => Ok(InputFormat::Phi),
            other => Err(EmfError::parse(format!("unknown input format '{}'", other))),
        }
    }
}

/// Parse query text, detecting its layout.
pub fn parse_query(text: &str) -> EmfResult<EmfQuery> {
    parse_with_format(text, InputFormat::detect(text))
}

pub fn parse_with_format(text: &str, format: InputFormat) -> EmfResult<EmfQuery> {
    match format {
        InputFormat::Esql => parse(text),
        InputFormat::Phi => parse_phi(text),
    }
}

/// Parse ESQL text.
pub fn parse(raw: &str) -> EmfResult<EmfQuery> {
    let normalized = normalize(raw)?;
    let sections = extract_sections(&normalized);

    let mut query = EmfQuery::new();
    // variables first, so field names such as `sum_1_quant` resolve in SELECT too
    let (attributes, variables) = parse_group_by(sections.get(Clause::GroupBy))?;
    query.grouping_attributes = attributes;
    query.grouping_variables = variables;

    query.select = parse_select(sections.get(Clause::Select), &query.grouping_variables)?;
    query.from_table = parse_from(sections.get(Clause::From))?;
    query.where_conditions = parse_condition_expression(sections.get(Clause::Where), &[])?;

    // Without declared variables there is nothing to attribute SUCH THAT text to;
    // the validator reports the missing GROUP BY instead.
    if !query.grouping_variables.is_empty() {
        query.such_that = parse_such_that(sections.get(Clause::SuchThat), &query.grouping_variables)?;
    }

    query.having = parse_condition_expression(sections.get(Clause::Having), &query.grouping_variables)?;
    harvest_aggregates(&mut query);

    debug!(
        table = %query.from_table,
        variables = query.grouping_variables.len(),
        aggregates = query.aggregates.len(),
        "parsed ESQL query"
    );
    Ok(query)
}

/// Register every aggregate referenced by the projection list, then each such-that
/// expression in declared order, then HAVING.
pub(crate) fn harvest_aggregates(query: &mut EmfQuery) {
    let mut found: Vec<AggregateFunction> = query
        .select
        .iter()
        .flat_map(|item| item.expr.aggregates())
        .cloned()
        .collect();
    for var in &query.grouping_variables {
        if let Some(expr) = query.such_that.get(var) {
            found.extend(expr.aggregates().into_iter().cloned());
        }
    }
    found.extend(query.having.aggregates().into_iter().cloned());

    for agg in &found {
        query.register_aggregate(agg);
    }
}

/// Recursive-descent parser over one operand's tokens.
///
/// `grouping_vars` resolves the `var_func_attr` / `func_k_attr` field-name forms into
/// aggregate references.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    grouping_vars: &'a [String],
}

impl<'a> Parser<'a> {
    pub fn new(input: &str, grouping_vars: &'a [String]) -> EmfResult<Self> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
            grouping_vars,
        })
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn peek_token(&self, offset: usize) -> &Token {
        self.tokens.get(self.position + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: Token) -> EmfResult<()> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(EmfError::parse(format!(
                "Expected {:?}, found {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_token(), Token::Eof)
    }

    /// Parse a complete operand; trailing tokens are an error.
    pub fn parse(mut self) -> EmfResult<Expression> {
        let expr = self.parse_expression()?;
        if !self.is_at_end() {
            return Err(EmfError::parse(format!(
                "Unexpected {:?} after '{}'",
                self.current_token(),
                expr
            )));
        }
        Ok(expr)
    }
}

/// One character of clause text with its nesting context.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanChar {
    pub index: usize,
    pub ch: char,
    /// Outside every literal and parenthesis. Quotes and parentheses themselves are never
    /// top level.
    pub top_level: bool,
}

pub(crate) fn scan_top_level(text: &str) -> Vec<ScanChar> {
    let mut out = Vec::with_capacity(text.len());
    let mut depth = 0i32;
    let mut in_literal = false;
    for (index, ch) in text.char_indices() {
        let top_level = match ch {
            '\'' => {
                in_literal = !in_literal;
                false
            }
            _ if in_literal => false,
            '(' => {
                depth += 1;
                false
            }
            ')' => {
                depth -= 1;
                false
            }
            _ => depth == 0,
        };
        out.push(ScanChar {
            index,
            ch,
            top_level,
        });
    }
    out
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `word` occurs at byte `index` of `text` as a whole word (case-insensitive).
/// A preceding `.` also disqualifies, so `x.or` is an attribute, not a connective.
pub(crate) fn word_at(text: &str, index: usize, word: &str) -> bool {
    let Some(rest) = text.get(index..) else {
        return false;
    };
    match rest.get(..word.len()) {
        Some(head) if head.eq_ignore_ascii_case(word) => {}
        _ => return false,
    }
    let before_ok = text[..index]
        .chars()
        .next_back()
        .map_or(true, |c| !is_word_char(c) && c != '.');
    let after_ok = rest[word.len()..]
        .chars()
        .next()
        .map_or(true, |c| !is_word_char(c));
    before_ok && after_ok
}

/// Split on top-level commas, trimming each piece and dropping empty ones.
pub(crate) fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut start = 0;
    for sc in scan_top_level(text) {
        if sc.top_level && sc.ch == ',' {
            items.push(text[start..sc.index].trim().to_string());
            start = sc.index + 1;
        }
    }
    items.push(text[start..].trim().to_string());
    items.retain(|s| !s.is_empty());
    items
}
