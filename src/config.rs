//! Configuration management for the docfold driver.
//!
//! This module provides configuration handling through multiple sources:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/docfold/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `DOCFOLD_`, sections separated
//!    by `__`, e.g. `DOCFOLD_BATCH__RESET_INTERVAL=500`)
//! 5. Command-line arguments
//!
//! Configuration options are loaded in order of precedence, with later sources
//! overriding earlier ones.

use clap::Parser;
use config::{Config, ConfigError};
use docfold_core::config::{BatchConfig, CodecConfig, FlattenConfig, SinkConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const DEFAULT_CONFIG_PATH: &str = "/etc/docfold/config.toml";

/// Command-line arguments parser.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Input file with one JSON document per line
    #[arg(short, long, value_name = "FILE", env = "DOCFOLD_INPUT")]
    pub input: Option<PathBuf>,

    /// Records per persisted batch
    #[arg(long, env = "DOCFOLD_RESET_INTERVAL")]
    pub reset_interval: Option<u64>,

    /// Pass-through tags (comma separated or repeated)
    #[arg(long, value_delimiter = ',')]
    pub pass_through: Option<Vec<String>>,

    /// Field holding the record sequence key
    #[arg(long)]
    pub sequence_field: Option<String>,

    /// Log progress every N records (0 disables)
    #[arg(long)]
    pub progress_interval: Option<u64>,

    /// Sink engine type ("memory", "jsonl" or "duckdb")
    #[arg(long, env = "DOCFOLD_SINK_ENGINE")]
    pub sink_engine: Option<String>,

    /// Sink connection (file path or ":memory:")
    #[arg(long, env = "DOCFOLD_SINK_CONNECTION")]
    pub sink_connection: Option<String>,

    /// Sink options (key=value pairs)
    #[arg(long)]
    pub sink_options: Option<Vec<String>>,
}

/// Where input documents come from.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("records.jsonl"),
        }
    }
}

/// Complete driver configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Flattening rules
    #[serde(default)]
    pub fold: FlattenConfig,
    /// Batch cadence
    #[serde(default)]
    pub batch: BatchConfig,
    /// Reserved keys of the codec
    #[serde(default)]
    pub codec: CodecConfig,
    /// Input documents
    #[serde(default)]
    pub source: SourceConfig,
    /// Output aggregates
    #[serde(default)]
    pub sink: SinkConfig,
}

impl Settings {
    /// Loads configuration from all available sources.
    pub fn new(cli: CliArgs) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load default configuration
        builder = builder.add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ));

        // Load system configuration if it exists
        if let Ok(metadata) = std::fs::metadata(DEFAULT_CONFIG_PATH) {
            if metadata.is_file() {
                builder = builder.add_source(config::File::from(PathBuf::from(DEFAULT_CONFIG_PATH)));
            }
        }

        // Load user configuration if specified
        if let Some(ref config_path) = cli.config {
            builder = builder.add_source(config::File::from(config_path.clone()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DOCFOLD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Override with command line arguments
        if let Some(ref input) = cli.input {
            builder = builder.set_override("source.path", input.to_string_lossy().to_string())?;
        }
        if let Some(interval) = cli.reset_interval {
            builder = builder.set_override("batch.reset_interval", interval)?;
        }
        if let Some(ref tags) = cli.pass_through {
            builder = builder.set_override("fold.pass_through", tags.clone())?;
        }
        if let Some(ref field) = cli.sequence_field {
            builder = builder.set_override("fold.sequence_field", field.as_str())?;
        }
        if let Some(interval) = cli.progress_interval {
            builder = builder.set_override("batch.progress_interval", interval)?;
        }
        if let Some(ref engine) = cli.sink_engine {
            builder = builder.set_override("sink.engine", engine.as_str())?;
        }
        if let Some(ref connection) = cli.sink_connection {
            builder = builder.set_override("sink.connection", connection.as_str())?;
        }
        if let Some(ref options) = cli.sink_options {
            builder = builder.set_override("sink.options", parse_options(options))?;
        }

        builder.build()?.try_deserialize()
    }
}

/// Parses `key=value` pairs, ignoring malformed entries.
fn parse_options(options: &[String]) -> HashMap<String, String> {
    options
        .iter()
        .filter_map(|opt| {
            let (key, value) = opt.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
