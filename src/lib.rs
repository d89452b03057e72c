pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod source;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use output::{emit, render, OutputFormat};
pub use source::CsvDataSource;

use emfql_core::{InputFormat, MfExecutor, QueryResult};

/// An executor over the configured CSV tables with the configured planner switches.
pub fn executor(config: &Config) -> MfExecutor<CsvDataSource> {
    MfExecutor::with_options(CsvDataSource::from_config(config), config.planner)
}

/// Parse, plan and run one query text; the layout is detected unless given.
pub fn run_query(
    config: &Config,
    text: &str,
    format: Option<InputFormat>,
) -> AppResult<QueryResult> {
    let executor = executor(config);
    let format = format.unwrap_or_else(|| InputFormat::detect(text));
    let phi = executor.prepare_as(text, format)?;
    Ok(executor.execute_phi(&phi)?)
}
