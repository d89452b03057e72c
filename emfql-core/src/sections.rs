//! Section extraction for ESQL text.
//!
//! Raw text is cut at the first comment line, string literals are swapped for
//! placeholders, the rest is case-folded and whitespace-collapsed, and each clause
//! keyword is located in the fixed order SELECT, FROM, WHERE, GROUP BY, SUCH THAT, HAVING.
//! Missing clauses yield empty text; the validator decides whether that is an error.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{EmfError, EmfResult};

/// Line prefixes that end the query text.
const COMMENT_MARKERS: [&str; 3] = ["--", "//", "#"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Select,
    From,
    Where,
    GroupBy,
    SuchThat,
    Having,
}

impl Clause {
    pub const ORDER: [Clause; 6] = [
        Clause::Select,
        Clause::From,
        Clause::Where,
        Clause::GroupBy,
        Clause::SuchThat,
        Clause::Having,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Clause::Select => "select",
            Clause::From => "from",
            Clause::Where => "where",
            Clause::GroupBy => "group by",
            Clause::SuchThat => "such that",
            Clause::Having => "having",
        }
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            Clause::ORDER
                .iter()
                .map(|c| {
                    Regex::new(&format!(r"\b{}\b", c.keyword()))
                        .expect("clause keyword patterns are valid")
                })
                .collect()
        });
        &patterns[*self as usize]
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"'#(\d+)'").expect("placeholder pattern is valid"))
}

/// Query text after comment stripping, literal extraction and case folding.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    text: String,
    literals: Vec<String>,
}

impl NormalizedQuery {
    /// Folded text with literals still replaced by `'#N'` placeholders.
    pub fn folded(&self) -> &str {
        &self.text
    }

    /// Put the original literal text (quotes included) back into `fragment`.
    pub fn restore(&self, fragment: &str) -> String {
        placeholder_pattern()
            .replace_all(fragment, |caps: &regex::Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.literals.get(i))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Drop everything from the first comment line onwards.
pub fn strip_comments(raw: &str) -> String {
    let mut kept = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if COMMENT_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            break;
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Replace every `'...'` literal (with `''` escapes) by a `'#N'` placeholder.
fn extract_literals(text: &str) -> EmfResult<(String, Vec<String>)> {
    let mut out = String::with_capacity(text.len());
    let mut literals = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\'' {
            out.push(c);
            continue;
        }
        let mut literal = String::from('\'');
        let mut closed = false;
        while let Some(ch) = chars.next() {
            literal.push(ch);
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    literal.push('\'');
                    chars.next();
                } else {
                    closed = true;
                    break;
                }
            }
        }
        if !closed {
            return Err(EmfError::parse(format!(
                "unterminated string literal: {}",
                literal
            )));
        }
        out.push_str(&format!("'#{}'", literals.len()));
        literals.push(literal);
    }

    Ok((out, literals))
}

/// Lowercase everything outside single-quoted literals, keeping line structure.
pub fn fold_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_literal = false;
    for c in text.chars() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
        } else if in_literal {
            out.push(c);
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Prepare raw ESQL text for clause extraction.
pub fn normalize(raw: &str) -> EmfResult<NormalizedQuery> {
    let stripped = strip_comments(raw);
    if stripped.trim().is_empty() {
        return Err(EmfError::parse("Empty query received."));
    }

    let (text, literals) = extract_literals(&stripped)?;
    let folded = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    Ok(NormalizedQuery {
        text: folded,
        literals,
    })
}

/// Clause texts keyed by clause, literals restored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sections {
    map: HashMap<Clause, String>,
}

impl Sections {
    pub fn get(&self, clause: Clause) -> &str {
        self.map.get(&clause).map(|s| s.as_str()).unwrap_or("")
    }
}

/// Split normalized text into its clauses.
///
/// A clause spans from just after its keyword to the nearest later-ordered keyword that
/// occurs after it, or to the end of the text.
pub fn extract_sections(query: &NormalizedQuery) -> Sections {
    let text = query.folded();
    let found: Vec<Option<(usize, usize)>> = Clause::ORDER
        .iter()
        .map(|c| c.pattern().find(text).map(|m| (m.start(), m.end())))
        .collect();

    let mut map = HashMap::new();
    for (i, clause) in Clause::ORDER.iter().enumerate() {
        let Some((_, start)) = found[i] else {
            map.insert(*clause, String::new());
            continue;
        };
        let end = found[i + 1..]
            .iter()
            .flatten()
            .map(|(s, _)| *s)
            .filter(|s| *s >= start)
            .min()
            .unwrap_or(text.len());
        map.insert(*clause, query.restore(text[start..end].trim()));
    }

    Sections { map }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(raw: &str) -> Sections {
        extract_sections(&normalize(raw).unwrap())
    }

    #[test]
    fn test_all_clauses() {
        let s = sections(
            "SELECT cust, sum(x.quant) FROM Sales WHERE year = 2020 \
             GROUP BY cust; x SUCH THAT x.state = 'NY' HAVING sum(x.quant) > 10",
        );
        assert_eq!(s.get(Clause::Select), "cust, sum(x.quant)");
        assert_eq!(s.get(Clause::From), "sales");
        assert_eq!(s.get(Clause::Where), "year = 2020");
        assert_eq!(s.get(Clause::GroupBy), "cust; x");
        assert_eq!(s.get(Clause::SuchThat), "x.state = 'NY'");
        assert_eq!(s.get(Clause::Having), "sum(x.quant) > 10");
    }

    #[test]
    fn test_missing_clauses_are_empty() {
        let s = sections("select cust from sales such that x.state = 'NJ'");
        assert_eq!(s.get(Clause::Where), "");
        assert_eq!(s.get(Clause::GroupBy), "");
        assert_eq!(s.get(Clause::From), "sales");
        assert_eq!(s.get(Clause::SuchThat), "x.state = 'NJ'");
        assert_eq!(s.get(Clause::Having), "");
    }

    #[test]
    fn test_literals_keep_case_and_hide_keywords() {
        let s = sections("SELECT prod FROM sales GROUP BY prod; x SUCH THAT x.note = 'Where From'");
        assert_eq!(s.get(Clause::Where), "");
        assert_eq!(s.get(Clause::SuchThat), "x.note = 'Where From'");
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let s = sections("select fromage from sales group by fromage; x such that x.fromage = fromage");
        assert_eq!(s.get(Clause::Select), "fromage");
        assert_eq!(s.get(Clause::From), "sales");
    }

    #[test]
    fn test_comment_line_ends_query() {
        let raw = "SELECT cust\nFROM sales\n-- GROUP BY cust; x\nGROUP BY prod; y";
        let s = sections(raw);
        assert_eq!(s.get(Clause::From), "sales");
        assert_eq!(s.get(Clause::GroupBy), "");
    }

    #[test]
    fn test_whitespace_collapsed() {
        let s = sections("SELECT   cust ,\n\t prod\nFROM\n  sales");
        assert_eq!(s.get(Clause::Select), "cust , prod");
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(matches!(normalize("   \n "), Err(EmfError::Parse(_))));
        assert!(matches!(normalize("# only a comment"), Err(EmfError::Parse(_))));
    }

    #[test]
    fn test_unterminated_literal() {
        let err = normalize("select a from t where b = 'oops").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_fold_case_keeps_literals() {
        assert_eq!(
            fold_case("X.State = 'NY'\nSUM(X.Quant)"),
            "x.state = 'NY'\nsum(x.quant)"
        );
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let s = sections("select a from t where name = 'O''Brien'");
        assert_eq!(s.get(Clause::Where), "name = 'O''Brien'");
    }
}
