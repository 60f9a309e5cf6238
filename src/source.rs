//! Record sources.
//!
//! A source hands the driver a finite, forward-only stream of records that
//! is already sorted by the sequence field. The driver never re-sorts.

use async_stream::stream;
use docfold_core::{FoldError, Record, Result};
use futures::stream::{self, BoxStream};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

/// Ordered supplier of input documents.
pub trait RecordSource: Send + Sync {
    /// Opens the stream of records, in ascending sequence order.
    fn records(&self) -> BoxStream<'static, Result<Record>>;

    /// Number of records the stream will yield, when known up front.
    fn total_records(&self) -> Option<u64> {
        None
    }
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    records: Vec<Record>,
}

impl VecSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Builds a source from JSON documents; each must be an object.
    pub fn from_json(documents: Vec<serde_json::Value>) -> Result<Self> {
        documents
            .into_iter()
            .map(Record::from_json)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }
}

impl RecordSource for VecSource {
    fn records(&self) -> BoxStream<'static, Result<Record>> {
        Box::pin(stream::iter(self.records.clone().into_iter().map(Ok)))
    }

    fn total_records(&self) -> Option<u64> {
        Some(self.records.len() as u64)
    }
}

/// One JSON object per line. Blank lines are skipped.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    total: u64,
}

impl JsonLinesSource {
    /// Opens `path` and counts its records, one line at a time.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = std::io::BufReader::new(std::fs::File::open(&path)?);
        let mut total = 0u64;
        for line in std::io::BufRead::lines(reader) {
            if !line?.trim().is_empty() {
                total += 1;
            }
        }
        Ok(Self { path, total })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for JsonLinesSource {
    fn records(&self) -> BoxStream<'static, Result<Record>> {
        let path = self.path.clone();
        Box::pin(stream! {
            let file = match File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    yield Err(FoldError::from(e));
                    return;
                }
            };
            let mut lines = LinesStream::new(BufReader::new(file).lines());
            let mut number = 0u64;
            while let Some(line) = lines.next().await {
                number += 1;
                match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => {
                        yield parse_line(number, &line);
                    }
                    Err(e) => {
                        yield Err(FoldError::from(e));
                        return;
                    }
                }
            }
        })
    }

    fn total_records(&self) -> Option<u64> {
        Some(self.total)
    }
}

fn parse_line(number: u64, line: &str) -> Result<Record> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| FoldError::MalformedLine {
        line: number,
        reason: e.to_string(),
    })?;
    Record::from_json(value).map_err(|e| FoldError::MalformedLine {
        line: number,
        reason: e.to_string(),
    })
}
