//! Interactive query entry.
//!
//! Asks for the input format, then either reads ESQL lines until a line `DONE`, or walks
//! through the Phi operands one prompt at a time (one σ prompt per grouping variable)
//! and assembles a Phi-format block. Each query runs as soon as it is complete; the
//! session ends on `.exit` or end of input.

use std::path::PathBuf;

use colored::Colorize;
use emfql_core::{DataSource, InputFormat, MfExecutor, QueryResult};
use rustyline::error::ReadlineError;
use rustyline::Editor;
use tracing::{debug, warn};

use super::helper::EmfqlHelper;
use crate::error::{AppError, AppResult};
use crate::output::{emit, render, OutputFormat};

/// Line that ends a multi-line ESQL query.
pub const END_OF_QUERY: &str = "DONE";

/// Something that hands out one line per prompt; `None` means the input is exhausted.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> AppResult<Option<String>>;
}

/// Operands collected by the Phi prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhiAnswers {
    pub from: String,
    pub where_clause: String,
    pub select: String,
    pub variable_count: usize,
    pub grouping_attributes: String,
    pub aggregates: String,
    pub predicates: Vec<String>,
    pub having: String,
}

impl PhiAnswers {
    /// Lay the answers out as a labeled Phi-format block.
    pub fn to_block(&self) -> String {
        let mut lines = Vec::new();
        if !self.from.is_empty() {
            lines.push("FROM:".to_string());
            lines.push(self.from.clone());
        }
        if !self.where_clause.is_empty() {
            lines.push("WHERE:".to_string());
            lines.push(self.where_clause.clone());
        }
        lines.push("SELECT ATTRIBUTE(S):".to_string());
        lines.push(self.select.clone());
        lines.push("NUMBER OF GROUPING VARIABLES(n):".to_string());
        lines.push(self.variable_count.to_string());
        lines.push("GROUPING ATTRIBUTES(V):".to_string());
        lines.push(self.grouping_attributes.clone());
        lines.push("F-VECT([F]):".to_string());
        lines.push(self.aggregates.clone());
        lines.push("SELECT CONDITION-VECT([σ]):".to_string());
        lines.extend(self.predicates.iter().filter(|p| !p.is_empty()).cloned());
        lines.push("HAVING_CONDITION(G):".to_string());
        if !self.having.is_empty() {
            lines.push(self.having.clone());
        }
        let mut block = lines.join("\n");
        block.push('\n');
        block
    }
}

/// Next step chosen at the format prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Query { text: String, format: InputFormat },
    Help,
    ToggleExplain,
    Exit,
}

fn prompt(source: &mut impl LineSource, text: &str) -> AppResult<Option<String>> {
    Ok(source.read_line(text)?.map(|line| line.trim().to_string()))
}

/// Read the next entry; end of input counts as `.exit`.
pub fn read_entry(source: &mut impl LineSource) -> AppResult<Entry> {
    loop {
        let Some(answer) = prompt(source, "Input format [esql/phi] (esql): ")? else {
            return Ok(Entry::Exit);
        };
        let choice = answer.to_ascii_lowercase();
        match choice.as_str() {
            ".exit" | ".quit" | ".q" => return Ok(Entry::Exit),
            ".help" | ".h" | ".?" => return Ok(Entry::Help),
            ".explain" => return Ok(Entry::ToggleExplain),
            "" | "esql" | "sql" | "e" | "1" => {
                return Ok(match read_esql(source)? {
                    Some(text) => Entry::Query {
                        text,
                        format: InputFormat::Esql,
                    },
                    None => Entry::Exit,
                });
            }
            "phi" | "p" | "2" => {
                return Ok(match read_phi(source)? {
                    Some(answers) => Entry::Query {
                        text: answers.to_block(),
                        format: InputFormat::Phi,
                    },
                    None => Entry::Exit,
                });
            }
            other => println!("  {} {}", "Unknown input format:".red(), other),
        }
    }
}

/// ESQL lines up to (not including) a line `DONE`.
pub fn read_esql(source: &mut impl LineSource) -> AppResult<Option<String>> {
    println!(
        "  {}",
        format!("Enter the query; finish with a line {}", END_OF_QUERY).dimmed()
    );
    let mut lines: Vec<String> = Vec::new();
    loop {
        let label = if lines.is_empty() { "esql> " } else { "  ... " };
        let Some(line) = prompt(source, label)? else {
            return Ok(None);
        };
        if line.eq_ignore_ascii_case(END_OF_QUERY) {
            break;
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(Some(lines.join("\n")))
}

/// The Phi operands, one prompt each.
pub fn read_phi(source: &mut impl LineSource) -> AppResult<Option<PhiAnswers>> {
    macro_rules! ask {
        ($text:expr) => {
            match prompt(source, $text)? {
                Some(answer) => answer,
                None => return Ok(None),
            }
        };
    }

    let mut answers = PhiAnswers {
        from: ask!("FROM (sales): "),
        where_clause: ask!("WHERE (blank for none): "),
        select: ask!("SELECT ATTRIBUTE(S): "),
        ..PhiAnswers::default()
    };
    answers.variable_count = loop {
        let raw = ask!("NUMBER OF GROUPING VARIABLES(n): ");
        match raw.parse::<usize>() {
            Ok(n) => break n,
            Err(_) => println!("  {} '{}'", "Not a number:".red(), raw),
        }
    };
    answers.grouping_attributes = ask!("GROUPING ATTRIBUTES(V): ");
    answers.aggregates = ask!("F-VECT([F]): ");
    for i in 1..=answers.variable_count {
        answers.predicates.push(ask!(&format!("σ{}: ", i)));
    }
    answers.having = ask!("HAVING_CONDITION(G) (blank for none): ");
    Ok(Some(answers))
}

/// rustyline-backed line source with history.
pub struct EditorSource {
    editor: Editor<EmfqlHelper, rustyline::history::DefaultHistory>,
    history_file: PathBuf,
}

impl EditorSource {
    /// History lives in `~/.emfql_history`.
    pub fn new(helper: EmfqlHelper) -> AppResult<Self> {
        let history_file = std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".emfql_history"))
            .unwrap_or_else(|_| PathBuf::from(".emfql_history"));
        Self::with_history(helper, history_file)
    }

    /// A history file that cannot be read or written only costs the history.
    pub fn with_history(helper: EmfqlHelper, history_file: PathBuf) -> AppResult<Self> {
        let mut editor = Editor::new().map_err(readline_error)?;
        editor.set_helper(Some(helper));

        if let Err(e) = editor.load_history(&history_file) {
            debug!("No history loaded from {}: {}", history_file.display(), e);
        }

        Ok(Self {
            editor,
            history_file,
        })
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str) -> AppResult<Option<String>> {
        match self.editor.readline(&prompt.cyan().to_string()) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                        debug!("History entry not recorded: {}", e);
                    }
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(readline_error(e)),
        }
    }
}

impl Drop for EditorSource {
    fn drop(&mut self) {
        if let Err(e) = self.editor.save_history(&self.history_file) {
            warn!("Failed to save history to {}: {}", self.history_file.display(), e);
        }
    }
}

fn readline_error(e: ReadlineError) -> AppError {
    AppError::Io(std::io::Error::other(e.to_string()))
}

fn print_banner() {
    println!(
        "  {} {}",
        "EMFQL interactive query entry".white().bold(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
    println!(
        "  Type {} for help, {} to quit\n",
        ".help".yellow(),
        ".exit".yellow()
    );
}

fn print_help() {
    println!("\n{}", "Input formats:".white().bold());
    println!(
        "  {}   ESQL text over several lines, ended by a line {}",
        "esql".yellow(),
        END_OF_QUERY.yellow()
    );
    println!("  {}    The six Phi operands, prompted one by one", "phi".yellow());

    println!("\n{}", "Commands:".white().bold());
    println!("  {}     Show this help", ".help".yellow());
    println!("  {}  Toggle printing the plan before results", ".explain".yellow());
    println!("  {}     Exit", ".exit".yellow());

    println!("\n{}", "Example:".white().bold());
    println!(
        "  {}",
        "SELECT cust, avg(x.quant), avg(y.quant) FROM sales".green()
    );
    println!("  {}", "GROUP BY cust; x, y".green());
    println!("  {}", "SUCH THAT x.state = 'NY', y.state = 'NJ'".green());
    println!("  {}", END_OF_QUERY.green());
    println!();
}

fn print_result(result: &QueryResult, format: OutputFormat) -> AppResult<()> {
    if format != OutputFormat::Table {
        return emit(&render(result, format)?, None);
    }
    let text = render(result, format)?;
    let mut lines = text.lines();
    if let Some(header) = lines.next() {
        println!("{}", header.white().bold());
    }
    for line in lines {
        println!("{}", line);
    }
    println!(
        "{}",
        format!(
            "  ({} groups, {} emitted, {} scans, {} rows read)",
            result.stats.groups,
            result.stats.groups_emitted,
            result.stats.scans,
            result.stats.rows_read
        )
        .dimmed()
    );
    Ok(())
}

/// Run queries entered at the terminal until the user exits.
pub fn run_session<D: DataSource>(
    executor: &MfExecutor<D>,
    source: &mut impl LineSource,
    format: OutputFormat,
    mut explain: bool,
) -> AppResult<()> {
    print_banner();

    loop {
        match read_entry(source)? {
            Entry::Exit => {
                println!("{}", "Goodbye!".dimmed());
                return Ok(());
            }
            Entry::Help => print_help(),
            Entry::ToggleExplain => {
                explain = !explain;
                println!(
                    "  {} {}",
                    "Explain:".dimmed(),
                    if explain { "on".green() } else { "off".red() }
                );
            }
            Entry::Query { text, format: input } => {
                debug!("Interactive query:\n{}", text);
                let outcome = executor.prepare_as(&text, input).and_then(|phi| {
                    let plan = executor.compile(&phi)?;
                    if explain {
                        println!("{}", phi.to_string().cyan());
                        println!("{}", plan.explain().to_string().cyan());
                    }
                    executor.run(&plan)
                });
                match outcome {
                    Ok(result) => print_result(&result, format)?,
                    Err(e) => println!("{} {}", "Error:".red().bold(), e),
                }
            }
        }
    }
}
