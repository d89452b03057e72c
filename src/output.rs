//! Result rendering and delivery.
//!
//! Query results are rendered as the plain-text table (header, dashed rule, one line per
//! group), as a JSON array of objects keyed by projection text, or as CSV. Rendered text
//! goes to stdout unless an output file is configured.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use emfql_core::{format_table, QueryResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" | "text" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(AppError::config(format!(
                "unknown output format '{}' (expected table, json or csv)",
                other
            ))),
        }
    }
}

/// Render a result in the requested format.
pub fn render(result: &QueryResult, format: OutputFormat) -> AppResult<String> {
    match format {
        OutputFormat::Table => Ok(format_table(result)),
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(&result.to_json())?;
            text.push('\n');
            Ok(text)
        }
        OutputFormat::Csv => render_csv(result),
    }
}

fn render_csv(result: &QueryResult) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&result.headers)?;
    for row in &result.rows {
        // NULL is an empty cell so the file reads back as missing values
        writer.write_record(row.iter().map(|v| {
            if v.is_null() {
                String::new()
            } else {
                v.to_string()
            }
        }))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write rendered text to `file`, or to stdout when no file is given.
pub fn emit(text: &str, file: Option<&Path>) -> AppResult<()> {
    match file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, text)?;
            info!("Wrote results to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(text.as_bytes())?;
            handle.flush()?;
        }
    }
    Ok(())
}
