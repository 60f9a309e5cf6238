//! Append-only JSON lines sink.
//!
//! Every flushed batch becomes one line holding its encoded document. Each
//! write is flushed and synced before `persist` returns, so a line that is
//! present in the file is a complete batch.

use super::{BatchSink, EncodedBatch};
use crate::error::{FoldError, Result};
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BatchSink for JsonLinesSink {
    async fn init(&self) -> Result<()> {
        info!("Writing batch aggregates to {}", self.path.display());
        Ok(())
    }

    async fn persist(&self, batch: EncodedBatch) -> Result<()> {
        let line = serde_json::to_string(&batch.document)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Reads back the encoded documents of a JSON lines sink file.
pub fn read_documents(path: impl AsRef<Path>) -> Result<Vec<JsonMap<String, JsonValue>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut documents = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JsonValue>(&line)? {
            JsonValue::Object(map) => documents.push(map),
            _ => {
                return Err(FoldError::MalformedLine {
                    line: index as u64 + 1,
                    reason: "expected a JSON object".to_string(),
                })
            }
        }
    }
    Ok(documents)
}
