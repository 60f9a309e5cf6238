//! Engine configuration surface.
//!
//! These structures are plain data: they deserialize from the `[fold]`,
//! `[batch]`, `[codec]` and `[sink]` sections of the service configuration
//! and carry defaults matching the embedded `config/default.toml` of the
//! `docfold` binary. Loading and layering live in the driver crate.

use crate::error::{FoldError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU64;

/// Rules for turning a document into flattened keys.
#[derive(Debug, Clone, Deserialize)]
pub struct FlattenConfig {
    /// Field names that flattening recurses through.
    #[serde(default = "default_pass_through")]
    pub pass_through: Vec<String>,
    /// Top-level ordering field; never aggregated.
    #[serde(default = "default_sequence_field")]
    pub sequence_field: String,
    /// Top-level document identifier; never aggregated.
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_pass_through() -> Vec<String> {
    vec!["data".to_string(), "attributes".to_string(), "properties".to_string()]
}

fn default_sequence_field() -> String {
    "timestamp".to_string()
}

fn default_id_field() -> String {
    "_id".to_string()
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            pass_through: default_pass_through(),
            sequence_field: default_sequence_field(),
            id_field: default_id_field(),
        }
    }
}

/// Batch cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Number of records folded into one persisted aggregate.
    #[serde(default = "default_reset_interval")]
    pub reset_interval: u64,
    /// Emit a progress line every this many records (0 disables).
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_reset_interval() -> u64 {
    1000
}

fn default_progress_interval() -> u64 {
    10000
}

impl BatchConfig {
    /// Validated reset interval.
    pub fn reset_interval(&self) -> Result<NonZeroU64> {
        NonZeroU64::new(self.reset_interval).ok_or_else(|| {
            FoldError::Configuration("batch.reset_interval must be at least 1".to_string())
        })
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            reset_interval: default_reset_interval(),
            progress_interval: default_progress_interval(),
        }
    }
}

/// Keys the codec leaves untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct CodecConfig {
    #[serde(default = "default_reserved_keys")]
    pub reserved_keys: Vec<String>,
}

pub(crate) fn default_reserved_keys() -> Vec<String> {
    vec!["_id".to_string(), "tracking".to_string()]
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            reserved_keys: default_reserved_keys(),
        }
    }
}

/// Sink backend selection.
///
/// ```toml
/// [sink]
/// engine = "duckdb"        # "memory", "jsonl" or "duckdb"
/// connection = "cube.db"   # file path, or ":memory:" for duckdb
/// options = { table = "batch_aggregates" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub engine: String,
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            engine: "jsonl".to_string(),
            connection: "aggregates.jsonl".to_string(),
            options: HashMap::new(),
        }
    }
}
