//! docfold binary.
//!
//! Reads documents (one JSON object per line, sorted by the sequence field),
//! folds them into batch aggregates and writes the key-encoded aggregates to
//! the configured sink.
//!
//! # Configuration
//!
//! Configuration can be provided through multiple sources, in order of precedence:
//!
//! 1. Command-line arguments (highest precedence)
//! 2. Environment variables (prefixed with `DOCFOLD_`)
//! 3. User-specified configuration file (via `--config`)
//! 4. System-wide configuration (`/etc/docfold/config.toml`)
//! 5. Default configuration (embedded in binary)
//!
//! ```text
//! Options:
//!   -c, --config <FILE>               Path to configuration file
//!   -i, --input <FILE>                Input JSON lines file [env: DOCFOLD_INPUT]
//!       --reset-interval <N>          Records per batch [env: DOCFOLD_RESET_INTERVAL]
//!       --pass-through <TAGS>         Pass-through tags, comma separated
//!       --sequence-field <FIELD>      Field holding the sequence key
//!       --progress-interval <N>       Log progress every N records
//!       --sink-engine <TYPE>          "memory", "jsonl" or "duckdb" [env: DOCFOLD_SINK_ENGINE]
//!       --sink-connection <STR>       Sink path or ":memory:" [env: DOCFOLD_SINK_CONNECTION]
//!       --sink-options <KEY=VAL>      Sink options (can be specified multiple times)
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Fold into a JSON lines file, 500 records per batch
//! docfold --input events.jsonl --reset-interval 500 --sink-connection cube.jsonl
//!
//! # Fold into DuckDB
//! docfold --input events.jsonl --sink-engine duckdb --sink-connection cube.db \
//!   --sink-options table=event_batches
//! ```

use clap::Parser;
use docfold::{BatchDriver, CliArgs, JsonLinesSource, LogProgress, Settings};
use docfold_core::storage::open_sink;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli_args = CliArgs::parse();
    let settings = Settings::new(cli_args)?;

    let source = JsonLinesSource::open(&settings.source.path)?;
    let sink = open_sink(&settings.sink)?;
    info!(
        input = %settings.source.path.display(),
        sink = %settings.sink.engine,
        reset_interval = settings.batch.reset_interval,
        "Starting fold"
    );

    let driver = BatchDriver::new(Box::new(source), sink, &settings)?
        .with_progress(Box::new(LogProgress::new(settings.batch.progress_interval)));
    let summary = driver.run().await?;

    info!(
        records = summary.records,
        batches = summary.batches,
        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        "Fold complete"
    );
    Ok(())
}
