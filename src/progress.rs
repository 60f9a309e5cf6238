//! Progress reporting.

use tracing::info;

/// Receives the position of every absorbed record. Purely advisory.
pub trait ProgressObserver: Send + Sync {
    /// `position` is 1-based: the number of records absorbed so far.
    fn on_record(&self, position: u64, total: Option<u64>);
}

/// Logs a progress line every `interval` records.
#[derive(Debug, Clone)]
pub struct LogProgress {
    interval: u64,
}

impl LogProgress {
    pub fn new(interval: u64) -> Self {
        Self { interval }
    }

    /// The line logged at `position`, if any.
    pub fn message(&self, position: u64, total: Option<u64>) -> Option<String> {
        if self.interval == 0 || position % self.interval != 0 {
            return None;
        }
        Some(match total {
            Some(total) if total > 0 => format!(
                "Processed {} out of {} documents ({:.2}%)",
                position,
                total,
                position as f64 / total as f64 * 100.0
            ),
            _ => format!("Processed {} documents", position),
        })
    }
}

impl ProgressObserver for LogProgress {
    fn on_record(&self, position: u64, total: Option<u64>) {
        if let Some(message) = self.message(position, total) {
            info!("{}", message);
        }
    }
}
