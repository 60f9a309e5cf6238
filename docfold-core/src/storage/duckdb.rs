//! DuckDB sink.
//!
//! Persists each batch as one row of an embedded DuckDB table, so the
//! aggregates can be queried in place with DuckDB's JSON functions.
//!
//! Rows are keyed by `(run_id, batch_index)`. Every sink gets a fresh run id
//! unless one is configured, so repeated runs against the same database file
//! do not collide. Passing the run id of a failed run lets a resumed run
//! append its remaining batches to it.
//!
//! # Configuration
//!
//! ```toml
//! [sink]
//! engine = "duckdb"
//! connection = "cube.db"        # or ":memory:"
//! # Optional: target table, DuckDB worker threads and run id
//! options = { table = "batch_aggregates", threads = "4", run_id = "nightly-42" }
//! ```

use super::{BatchSink, EncodedBatch};
use crate::error::{FoldError, Result};
use async_trait::async_trait;
use chrono::Utc;
use duckdb::{params, Config, Connection};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

const DEFAULT_TABLE: &str = "batch_aggregates";

/// DuckDB-backed sink for batch aggregates.
#[derive(Clone)]
pub struct DuckDbSink {
    conn: Arc<Mutex<Connection>>,
    table: String,
    run_id: String,
}

impl DuckDbSink {
    /// Opens a DuckDB database. Use ":memory:" (or an empty string) for an
    /// in-memory database.
    pub fn new(connection_string: &str, table: &str, threads: Option<i64>) -> Result<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FoldError::Configuration(format!("invalid table name '{}'", table)));
        }

        let mut config = Config::default();
        if let Some(threads) = threads {
            config = config.threads(threads)?;
        }

        let conn = if connection_string.is_empty() || connection_string == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            Connection::open_with_flags(connection_string, config)?
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
            run_id: Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string(),
        })
    }

    /// Persists under `run_id` instead of the generated one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::new(":memory:", DEFAULT_TABLE, None)
    }

    /// Builds a sink from `[sink]` options (`table`, `threads`, `run_id`).
    pub fn new_with_options(connection_string: &str, options: &HashMap<String, String>) -> Result<Self> {
        let table = options
            .get("table")
            .map(String::as_str)
            .unwrap_or(DEFAULT_TABLE);
        let threads = options
            .get("threads")
            .map(|s| {
                s.parse::<i64>().map_err(|e| {
                    FoldError::Configuration(format!("invalid sink option threads='{}': {}", s, e))
                })
            })
            .transpose()?;

        let sink = Self::new(connection_string, table, threads)?;
        Ok(match options.get("run_id") {
            Some(run_id) => sink.with_run_id(run_id.as_str()),
            None => sink,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Reads back the documents persisted by this sink's run, in batch order.
    pub async fn load_documents(&self) -> Result<Vec<JsonMap<String, JsonValue>>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT document FROM {} WHERE run_id = ? ORDER BY batch_index ASC",
            self.table
        ))?;
        let rows = stmt.query_map(params![self.run_id], |row| row.get::<_, String>(0))?;

        let mut documents = Vec::new();
        for row in rows {
            match serde_json::from_str::<JsonValue>(&row?)? {
                JsonValue::Object(map) => documents.push(map),
                _ => {
                    return Err(FoldError::Storage(format!(
                        "non-object document in table {}",
                        self.table
                    )))
                }
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl BatchSink for DuckDbSink {
    async fn init(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                run_id VARCHAR NOT NULL,
                batch_index BIGINT NOT NULL,
                first_sequence BIGINT NOT NULL,
                record_count BIGINT NOT NULL,
                document VARCHAR NOT NULL,
                PRIMARY KEY (run_id, batch_index)
            );
            "#,
            table = self.table
        ))?;
        info!(
            "Writing batch aggregates to DuckDB table {} (run {})",
            self.table, self.run_id
        );
        Ok(())
    }

    async fn persist(&self, batch: EncodedBatch) -> Result<()> {
        let document = serde_json::to_string(&batch.document)?;
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO {} (run_id, batch_index, first_sequence, record_count, document) VALUES (?, ?, ?, ?, ?)",
                self.table
            ),
            params![
                self.run_id,
                batch.index as i64,
                batch.first_sequence as i64,
                batch.record_count as i64,
                document,
            ],
        )?;
        Ok(())
    }
}
