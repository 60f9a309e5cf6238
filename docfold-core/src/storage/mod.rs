//! Sinks for flushed batch aggregates.
//!
//! This module provides multiple sink implementations:
//! - `memory`: batches kept in process, for tests and dry runs
//! - `jsonl`: one encoded document per line in an append-only file
//! - `duckdb`: rows in an embedded DuckDB table
//!
//! Each backend implements the `BatchSink` trait. The driver calls
//! `persist` exactly once per flushed batch and never overlaps calls.

pub mod duckdb;
pub mod jsonl;
pub mod memory;

use crate::config::SinkConfig;
use crate::error::{FoldError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

pub use self::duckdb::DuckDbSink;
pub use self::jsonl::JsonLinesSink;
pub use self::memory::MemorySink;

/// A flushed batch, with its keys already passed through the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedBatch {
    /// Zero-based flush number within the run.
    pub index: u64,
    /// Source position of the first record folded into the batch.
    pub first_sequence: u64,
    /// Number of records folded into the batch.
    pub record_count: u64,
    /// The encoded aggregate document.
    pub document: JsonMap<String, JsonValue>,
}

/// Storage backend for batch aggregates.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Prepare the target (create tables, check the file is writable).
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Durably store one batch.
    async fn persist(&self, batch: EncodedBatch) -> Result<()>;
}

/// Opens the sink named by `config.engine`.
pub fn open_sink(config: &SinkConfig) -> Result<Box<dyn BatchSink>> {
    let sink: Box<dyn BatchSink> = match config.engine.as_str() {
        "memory" => Box::new(MemorySink::new()),
        "jsonl" => Box::new(JsonLinesSink::new(&config.connection)?),
        "duckdb" => Box::new(DuckDbSink::new_with_options(&config.connection, &config.options)?),
        other => {
            return Err(FoldError::Configuration(format!(
                "unsupported sink engine '{}'",
                other
            )))
        }
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_open_sink_rejects_unknown_engine() {
        let config = SinkConfig {
            engine: "mongodb".to_string(),
            connection: String::new(),
            options: HashMap::new(),
        };
        let err = open_sink(&config).err().unwrap();
        assert!(err.to_string().contains("unsupported sink engine 'mongodb'"));
    }

    #[tokio::test]
    async fn test_open_memory_and_duckdb_sinks() {
        for engine in ["memory", "duckdb"] {
            let config = SinkConfig {
                engine: engine.to_string(),
                connection: ":memory:".to_string(),
                options: HashMap::new(),
            };
            let sink = open_sink(&config).unwrap();
            sink.init().await.unwrap();
        }
    }
}
