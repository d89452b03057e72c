//! Configuration handling for the emfql CLI
//!
//! Manages the optional `emfql.toml` configuration file.
//!
//! ## Environment Variables
//!
//! The following environment variables override config file settings:
//!
//! - `EMFQL_DATA_DIR` - Directory holding `<table>.csv` files
//! - `EMFQL_OUTPUT_FORMAT` - `table`, `json` or `csv`
//! - `EMFQL_OUTPUT_FILE` - Write results to this file instead of stdout
//! - `EMFQL_LOG_LEVEL` - Log filter directive, e.g. `debug` or `emfql_core=trace`
//!
//! These can be set in a `.env` file next to the configuration file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use emfql_core::{fold_identifier, ColumnType, PlanOptions};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::output::OutputFormat;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "emfql.toml";

/// Environment variable names
pub const ENV_DATA_DIR: &str = "EMFQL_DATA_DIR";
pub const ENV_OUTPUT_FORMAT: &str = "EMFQL_OUTPUT_FORMAT";
pub const ENV_OUTPUT_FILE: &str = "EMFQL_OUTPUT_FILE";
pub const ENV_LOG_LEVEL: &str = "EMFQL_LOG_LEVEL";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the table files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log filter directive; `RUST_LOG` wins when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub planner: PlanOptions,
    /// Per-table overrides, keyed by table name
    #[serde(default)]
    pub tables: HashMap<String, TableConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Results go to stdout when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Where a table lives and which column kinds to use instead of inferring them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// CSV file, relative to `data_dir` unless absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub columns: HashMap<String, ColumnType>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: None,
            output: OutputConfig::default(),
            planner: PlanOptions::default(),
            tables: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a directory
    ///
    /// Loads any `.env` file in the directory, reads `emfql.toml` when present (defaults
    /// otherwise) and applies environment variable overrides.
    pub fn load(dir: &Path) -> AppResult<Self> {
        load_env_file(dir);

        let config_path = dir.join(CONFIG_FILE_NAME);
        let mut config = if config_path.exists() {
            Self::read_file(&config_path)?
        } else {
            Self::default()
        };
        config.resolve_relative_to(dir);

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load an explicitly named configuration file; it must exist.
    pub fn load_file(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        load_env_file(dir);

        let mut config = Self::read_file(path)?;
        config.resolve_relative_to(dir);

        config.apply_env_overrides();
        Ok(config)
    }

    fn read_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// A relative `data_dir` in a config file is relative to that file's directory.
    fn resolve_relative_to(&mut self, dir: &Path) {
        if self.data_dir.is_relative() && !dir.as_os_str().is_empty() && dir != Path::new(".") {
            self.data_dir = dir.join(&self.data_dir);
        }
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable lookup; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(format) = var(ENV_OUTPUT_FORMAT) {
            match format.parse::<OutputFormat>() {
                Ok(format) => self.output.format = format,
                Err(e) => warn!("Ignoring {}: {}", ENV_OUTPUT_FORMAT, e),
            }
        }

        if let Some(file) = var(ENV_OUTPUT_FILE) {
            self.output.file = Some(PathBuf::from(file));
        }

        if let Some(level) = var(ENV_LOG_LEVEL) {
            self.log_level = Some(level);
        }
    }

    /// Declared overrides for `table`, if any (table names are case-insensitive).
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables
            .iter()
            .find(|(key, _)| fold_identifier(key) == fold_identifier(name))
            .map(|(_, table)| table)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> AppResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// Load env file if present (ignore errors)
fn load_env_file(dir: &Path) {
    let env_path = dir.join(".env");
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.output.format, OutputFormat::Table);
        assert!(config.planner.merge_independent_scans);
        assert!(config.planner.use_group_index);
    }

    #[test]
    fn test_parse_full_file() {
        let config: Config = toml::from_str(
            r#"
data_dir = "data"
log_level = "debug"

[output]
format = "json"
file = "out/result.json"

[planner]
merge_independent_scans = false

[tables.sales]
path = "sales_2021.csv"
columns = { quant = "int", day = "date", price = "real" }
"#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.file, Some(PathBuf::from("out/result.json")));
        assert!(!config.planner.merge_independent_scans);
        assert!(config.planner.use_group_index);

        let sales = config.table("SALES").unwrap();
        assert_eq!(sales.path, Some(PathBuf::from("sales_2021.csv")));
        assert_eq!(sales.columns["day"], ColumnType::Date);
    }

    #[test]
    fn test_unknown_column_kind_rejected() {
        let err = toml::from_str::<Config>("[tables.sales]\ncolumns = { quant = \"decimal\" }");
        assert!(err.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        let vars = HashMap::from([
            (ENV_DATA_DIR, "/srv/olap"),
            (ENV_OUTPUT_FORMAT, "csv"),
            (ENV_OUTPUT_FILE, ""),
            (ENV_LOG_LEVEL, "emfql_core=debug"),
        ]);
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/srv/olap"));
        assert_eq!(config.output.format, OutputFormat::Csv);
        assert_eq!(config.output.file, None);
        assert_eq!(config.log_level.as_deref(), Some("emfql_core=debug"));
    }

    #[test]
    fn test_bad_format_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|name| (name == ENV_OUTPUT_FORMAT).then(|| "xml".to_string()));
        assert_eq!(config.output.format, OutputFormat::Table);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "data_dir = \"tables\"\n[output]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = Config::load_file(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config.data_dir, dir.path().join("tables"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load_file(Path::new("/nonexistent/emfql.toml")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_serialization() {
        let mut config = Config::default();
        config.output.format = OutputFormat::Json;
        let toml_str = config.to_toml().unwrap();
        assert!(toml_str.contains("data_dir = \".\""));
        assert!(toml_str.contains("format = \"json\""));
        assert!(toml_str.contains("merge_independent_scans = true"));
    }
}
