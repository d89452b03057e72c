//! Line-editor helper for the interactive prompts: keyword completion and hints.

use std::borrow::Cow;

use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

const KEYWORDS: &[&str] = &[
    // ESQL clauses
    "SELECT",
    "FROM",
    "WHERE",
    "GROUP BY",
    "SUCH THAT",
    "HAVING",
    "DONE",
    // aggregates
    "sum(",
    "avg(",
    "count(",
    "min(",
    "max(",
    // connectives
    "and",
    "or",
    "not",
    // session commands
    ".help",
    ".exit",
    ".explain",
    "esql",
    "phi",
];

fn word_start(line: &str) -> usize {
    line.rfind(|c: char| c.is_whitespace() || c == '(' || c == ',')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Tab completion helper
pub struct EmfqlHelper {
    completions: Vec<String>,
}

impl EmfqlHelper {
    pub fn new() -> Self {
        Self {
            completions: KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Add table column names to the completion list.
    pub fn with_columns<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        for column in columns {
            if !self.completions.iter().any(|c| c == column) {
                self.completions.push(column.to_string());
            }
        }
        self
    }

    fn candidates<'a>(&'a self, word: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        let lower = word.to_ascii_lowercase();
        self.completions
            .iter()
            .filter(move |c| !word.is_empty() && c.to_ascii_lowercase().starts_with(&lower))
    }
}

impl Default for EmfqlHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for EmfqlHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let start = word_start(&line[..pos]);
        let word = &line[start..pos];

        let matches: Vec<Pair> = self
            .candidates(word)
            .map(|c| Pair {
                display: c.clone(),
                replacement: c.clone(),
            })
            .collect();

        Ok((start, matches))
    }
}

impl Hinter for EmfqlHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }

        let word = &line[word_start(line)..];
        self.candidates(word)
            .find(|c| c.len() > word.len())
            .map(|c| c[word.len()..].to_string())
    }
}

impl Highlighter for EmfqlHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(hint.truecolor(100, 100, 100).to_string())
    }
}

impl Validator for EmfqlHelper {}

impl Helper for EmfqlHelper {}
