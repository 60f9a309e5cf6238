use crate::config::Settings;
use crate::progress::ProgressObserver;
use crate::source::RecordSource;
use chrono::{DateTime, Utc};
use docfold_core::flatten::leaf_paths;
use docfold_core::{BatchAggregate, BatchSink, EncodedBatch, Flattener, FoldError, KeyCodec, Result};
use futures::StreamExt;
use std::num::NonZeroU64;
use tracing::{debug, info, warn};

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Records absorbed from the source.
    pub records: u64,
    /// Batches persisted to the sink.
    pub batches: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Pulls records from a source, folds them into batch aggregates and
/// persists one encoded aggregate every `reset_interval` records.
pub struct BatchDriver {
    source: Box<dyn RecordSource>,
    sink: Box<dyn BatchSink>,
    progress: Option<Box<dyn ProgressObserver>>,
    flattener: Flattener,
    codec: KeyCodec,
    reset_interval: NonZeroU64,
    sequence_field: String,
}

impl BatchDriver {
    pub fn new(
        source: Box<dyn RecordSource>,
        sink: Box<dyn BatchSink>,
        settings: &Settings,
    ) -> Result<Self> {
        Ok(Self {
            source,
            sink,
            progress: None,
            flattener: Flattener::new(&settings.fold)
                .with_reserved(settings.codec.reserved_keys.iter().cloned()),
            codec: KeyCodec::new(settings.codec.reserved_keys.iter().cloned()),
            reset_interval: settings.batch.reset_interval()?,
            sequence_field: settings.fold.sequence_field.clone(),
        })
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressObserver>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs the source to exhaustion.
    ///
    /// A sink failure stops the run with [`FoldError::Persist`]; batches
    /// persisted before it stay valid and cover the first `resume_after`
    /// records.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        self.sink.init().await?;

        let total = self.source.total_records();
        let mut records = self.source.records();
        let mut batch = BatchAggregate::new();
        let mut position = 0u64;
        let mut batches = 0u64;
        let mut persisted_records = 0u64;
        let mut last_key: Option<f64> = None;

        while let Some(record) = records.next().await {
            let record = record?;

            if let Some(key) = record.sequence_key(&self.sequence_field) {
                if let Some(previous) = last_key.filter(|previous| key < *previous) {
                    warn!(
                        position,
                        key,
                        previous,
                        "Sequence key went backwards; source is not sorted on {}",
                        self.sequence_field
                    );
                }
                last_key = Some(key);
            }

            let flattened = self.flattener.flatten(&record)?;
            debug!(position, keys = flattened.len(), paths = ?leaf_paths(&record), "Absorbing record");
            batch = batch.absorb(&flattened, position, self.reset_interval);
            position += 1;

            if let Some(progress) = &self.progress {
                progress.on_record(position, total);
            }

            if position % self.reset_interval.get() == 0 {
                let full = std::mem::take(&mut batch);
                persisted_records += self.flush(full, batches, persisted_records).await?;
                batches += 1;
            }
        }

        if !batch.is_empty() {
            persisted_records += self.flush(batch, batches, persisted_records).await?;
            batches += 1;
        }

        info!(records = persisted_records, batches, "Source exhausted");
        Ok(RunSummary {
            records: position,
            batches,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Encodes and persists one batch, returning its record count.
    async fn flush(&self, batch: BatchAggregate, index: u64, resume_after: u64) -> Result<u64> {
        let record_count = batch.record_count();
        let encoded = EncodedBatch {
            index,
            first_sequence: batch.first_sequence().unwrap_or(resume_after),
            record_count,
            document: self.codec.encode(&batch.to_document(index)),
        };

        self.sink
            .persist(encoded)
            .await
            .map_err(|e| FoldError::Persist {
                batch: index,
                resume_after,
                reason: e.to_string(),
            })?;

        info!(batch = index, records = record_count, "Flushed batch aggregate");
        Ok(record_count)
    }
}
