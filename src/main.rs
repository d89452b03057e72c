use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use emfql::cli::{run_session, EditorSource, EmfqlHelper};
use emfql::{emit, render, Config, OutputFormat};
use emfql_core::{parser, validate, DataSource, InputFormat, PhiOperator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "emfql")]
#[command(about = "EMFQL - multi-feature (EMF/ESQL) OLAP queries over CSV tables", long_about = None)]
struct Args {
    /// Query file (ESQL or Phi format); `-` reads stdin. Prompts interactively when omitted.
    query: Option<PathBuf>,

    /// Query text given inline instead of a file
    #[arg(short = 'q', long = "query", conflicts_with = "query")]
    query_text: Option<String>,

    /// Input format: esql or phi (detected from the text by default)
    #[arg(short, long)]
    format: Option<InputFormat>,

    /// Print the parsed query, Phi operator and scan plan instead of running
    #[arg(long)]
    explain: bool,

    /// Result format: table, json or csv
    #[arg(long)]
    output_format: Option<OutputFormat>,

    /// Shorthand for --output-format json
    #[arg(long, conflicts_with = "output_format")]
    json: bool,

    /// Write results to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (default: ./emfql.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding <table>.csv files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Read the table once per grouping variable instead of sharing reads
    #[arg(long)]
    no_merge: bool,

    /// Test every group on each row instead of probing the group index
    #[arg(long)]
    no_index: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,
}

impl Args {
    /// Command-line flags win over file and environment settings.
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(format) = self.output_format {
            config.output.format = format;
        }
        if self.json {
            config.output.format = OutputFormat::Json;
        }
        if let Some(file) = &self.output {
            config.output.file = Some(file.clone());
        }
        if self.no_merge {
            config.planner.merge_independent_scans = false;
        }
        if self.no_index {
            config.planner.use_group_index = false;
        }
    }

    /// Query text from the inline flag, the file argument or piped stdin.
    fn read_query(&self) -> anyhow::Result<Option<String>> {
        if let Some(text) = &self.query_text {
            return Ok(Some(text.clone()));
        }
        match &self.query {
            Some(path) if path == Path::new("-") => read_stdin().map(Some),
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .with_context(|| format!("Failed to read query file {}", path.display())),
            None if !std::io::stdin().is_terminal() => read_stdin().map(Some),
            None => Ok(None),
        }
    }
}

fn read_stdin() -> anyhow::Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read query from stdin")?;
    Ok(text)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_file(path)?,
        None => Config::load(Path::new("."))?,
    };
    args.apply(&mut config);

    // Initialize logging; stdout carries only results
    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "emfql=info,emfql_core=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.show_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let executor = emfql::executor(&config);
    tracing::debug!("Reading tables from {}", executor.data_source().data_dir().display());

    let Some(text) = args.read_query()? else {
        let columns = executor
            .data_source()
            .column_types("sales")
            .map(|types| types.into_keys().collect::<Vec<_>>())
            .unwrap_or_default();
        let helper = EmfqlHelper::new().with_columns(columns.iter().map(String::as_str));
        let mut source = EditorSource::new(helper)?;
        run_session(&executor, &mut source, config.output.format, args.explain)?;
        return Ok(());
    };

    let format = args.format.unwrap_or_else(|| InputFormat::detect(&text));
    let output_file = config.output.file.as_deref();

    if args.explain {
        let query = parser::parse_with_format(&text, format)?;
        validate(&query)?;
        let phi = PhiOperator::convert(&query);
        let explain = executor.compile(&phi)?.explain();
        let rendered = match config.output.format {
            OutputFormat::Json => {
                let mut json = serde_json::to_string_pretty(&explain)?;
                json.push('\n');
                json
            }
            _ => format!("{}\n{}\n{}\n", query, phi, explain),
        };
        emit(&rendered, output_file)?;
        return Ok(());
    }

    let phi = executor.prepare_as(&text, format)?;
    let result = executor.execute_phi(&phi)?;
    tracing::info!(
        "{} groups, {} emitted, {} scans, {} rows read",
        result.stats.groups,
        result.stats.groups_emitted,
        result.stats.scans,
        result.stats.rows_read
    );
    emit(&render(&result, config.output.format)?, output_file)?;

    Ok(())
}
