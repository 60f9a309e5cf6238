//! docfold: fold streams of nested documents into batch aggregates
//!
//! This library drives the `docfold-core` engine over an ordered source of
//! documents: every record is flattened, folded into the current batch
//! aggregate, and every `reset_interval` records the batch is key-encoded
//! and persisted to a sink.
//!
//! # Example
//!
//! ```rust,no_run
//! use docfold::{BatchDriver, LogProgress, Settings, VecSource};
//! use docfold_core::storage::MemorySink;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut settings = Settings::default();
//!     settings.batch.reset_interval = 2;
//!
//!     let source = VecSource::from_json(vec![
//!         json!({"timestamp": 1, "a": "x", "n": 5}),
//!         json!({"timestamp": 2, "a": "y", "n": 7}),
//!     ])?;
//!     let sink = MemorySink::new();
//!
//!     let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings)?
//!         .with_progress(Box::new(LogProgress::new(1)));
//!     let summary = driver.run().await?;
//!     println!("Folded {} records into {} batches", summary.records, summary.batches);
//!
//!     for batch in sink.batches().await {
//!         println!("{}", serde_json::to_string(&batch.document)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod progress;
pub mod source;
pub mod tests;

pub use config::{CliArgs, Settings, SourceConfig};
pub use driver::{BatchDriver, RunSummary};
pub use progress::{LogProgress, ProgressObserver};
pub use source::{JsonLinesSource, RecordSource, VecSource};
