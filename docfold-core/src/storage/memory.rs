//! In-process sink.

use super::{BatchSink, EncodedBatch};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Keeps every persisted batch in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<EncodedBatch>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the batches persisted so far, in persist order.
    pub async fn batches(&self) -> Vec<EncodedBatch> {
        self.batches.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.batches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.batches.lock().await.is_empty()
    }
}

#[async_trait]
impl BatchSink for MemorySink {
    async fn persist(&self, batch: EncodedBatch) -> Result<()> {
        self.batches.lock().await.push(batch);
        Ok(())
    }
}
