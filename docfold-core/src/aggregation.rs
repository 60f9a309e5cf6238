//! Batch aggregation of flattened records.
//!
//! This module holds the running statistics kept for every flattened key and
//! the [`BatchAggregate`] that folds records into them:
//! - text keys (dimensions) keep an occurrence count,
//! - numeric keys (measures) keep count, sum, min, max and the last value,
//! - opaque keys keep the most recently seen subtree,
//! - a tracking bit-string per record records which keys it touched.
//!
//! Sums use Neumaier compensated summation so large batches do not drift.

use crate::flatten::{FlatEntry, FlattenedRecord, NumericKind};
use crate::value::{number_to_json, Value};
use indexmap::IndexMap;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::num::NonZeroU64;

/// Field holding the per-record presence bit-strings in persisted batches.
pub const TRACKING_FIELD: &str = "tracking";

/// Field holding the batch identifier in persisted batches.
pub const ID_FIELD: &str = "_id";

/// Occurrence count of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStat {
    pub count: u64,
}

/// Running statistics of a measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericStat {
    pub count: u64,
    sum: f64,
    compensation: f64,
    pub min: f64,
    pub max: f64,
    /// Most recently observed value.
    pub original: f64,
    pub kind: NumericKind,
}

impl NumericStat {
    /// Seeds the stat with its first observation.
    pub fn new(value: f64, kind: NumericKind) -> Self {
        Self {
            count: 1,
            sum: value,
            compensation: 0.0,
            min: value,
            max: value,
            original: value,
            kind,
        }
    }

    pub fn update(&mut self, value: f64, kind: NumericKind) {
        self.count += 1;

        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.original = value;
        self.kind = kind;
    }

    /// Compensated sum of all observations.
    pub fn sum(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Accumulated state for one flattened key.
#[derive(Debug, Clone, PartialEq)]
pub enum RunningStat {
    Text(TextStat),
    Numeric(NumericStat),
}

impl RunningStat {
    pub fn count(&self) -> u64 {
        match self {
            RunningStat::Text(stat) => stat.count,
            RunningStat::Numeric(stat) => stat.count,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            RunningStat::Text(stat) => json!({ "count": stat.count }),
            RunningStat::Numeric(stat) => json!({
                "count": stat.count,
                "sum": number_to_json(stat.sum()),
                "min": number_to_json(stat.min),
                "max": number_to_json(stat.max),
                "original": number_to_json(stat.original),
                "kind": stat.kind.as_str(),
            }),
        }
    }
}

/// What a batch holds under one key.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntry {
    Stat(RunningStat),
    /// Last-write-wins subtree of an opaque field.
    Opaque(Value),
}

impl BatchEntry {
    pub fn stat(&self) -> Option<&RunningStat> {
        match self {
            BatchEntry::Stat(stat) => Some(stat),
            BatchEntry::Opaque(_) => None,
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            BatchEntry::Stat(stat) => stat.to_json(),
            BatchEntry::Opaque(value) => JsonValue::from(value.clone()),
        }
    }
}

/// In-memory accumulator for one batch of records.
///
/// Keys keep the order in which the batch first saw them; that order is the
/// bit order of every tracking string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchAggregate {
    entries: IndexMap<String, BatchEntry>,
    tracking: Vec<String>,
    /// Number of keys the tracking bit-strings cover, fixed at the reset
    /// record.
    tracked_keys: usize,
    first_sequence: Option<u64>,
    records: u64,
}

impl BatchAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one flattened record into the batch and returns the new state.
    ///
    /// `sequence` is the record's position in the source. When it is a
    /// multiple of `reset_interval` the record opens a batch and tracking
    /// restarts with a single bit-string over every key known once the
    /// record is absorbed. Later records append a bit-string over that same
    /// key prefix, so all bit-strings of a batch have the same width; keys
    /// first seen after the reset record still get stats but no bit.
    pub fn absorb(
        mut self,
        record: &FlattenedRecord,
        sequence: u64,
        reset_interval: NonZeroU64,
    ) -> Self {
        for (key, entry) in record {
            self.merge_entry(key, entry);
        }

        let boundary = sequence % reset_interval.get() == 0;
        if boundary || self.tracking.is_empty() {
            self.tracked_keys = self.entries.len();
        }

        let bits: String = self
            .entries
            .keys()
            .take(self.tracked_keys)
            .map(|key| if record.contains_key(key) { '1' } else { '0' })
            .collect();

        if boundary {
            self.tracking = vec![bits];
            self.first_sequence = Some(sequence);
            self.records = 1;
        } else {
            self.tracking.push(bits);
            self.first_sequence.get_or_insert(sequence);
            self.records += 1;
        }

        self
    }

    fn merge_entry(&mut self, key: &str, entry: &FlatEntry) {
        match entry {
            FlatEntry::Opaque(value) => {
                self.insert(key, BatchEntry::Opaque(value.clone()));
            }
            FlatEntry::Dimension => match self.entries.get_mut(key) {
                Some(BatchEntry::Stat(RunningStat::Text(stat))) => stat.count += 1,
                _ => self.insert(key, BatchEntry::Stat(RunningStat::Text(TextStat { count: 1 }))),
            },
            FlatEntry::Measure { value, kind } => match self.entries.get_mut(key) {
                Some(BatchEntry::Stat(RunningStat::Numeric(stat))) => stat.update(*value, *kind),
                _ => self.insert(
                    key,
                    BatchEntry::Stat(RunningStat::Numeric(NumericStat::new(*value, *kind))),
                ),
            },
        }
    }

    /// Replaces the value of a key without moving it in key order.
    fn insert(&mut self, key: &str, entry: BatchEntry) {
        match self.entries.get_mut(key) {
            Some(slot) => *slot = entry,
            None => {
                self.entries.insert(key.to_string(), entry);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Number of records absorbed since the batch opened.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Source position of the first record in the batch.
    pub fn first_sequence(&self) -> Option<u64> {
        self.first_sequence
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&BatchEntry> {
        self.entries.get(key)
    }

    pub fn stat(&self, key: &str) -> Option<&RunningStat> {
        self.get(key).and_then(BatchEntry::stat)
    }

    pub fn tracking(&self) -> &[String] {
        &self.tracking
    }

    /// Renders the persisted form of the batch:
    /// `{"_id": id, "tracking": [...], <key>: <stat or subtree>, ...}`.
    pub fn to_document(&self, id: u64) -> JsonMap<String, JsonValue> {
        let mut doc = JsonMap::new();
        doc.insert(ID_FIELD.to_string(), json!(id));
        doc.insert(TRACKING_FIELD.to_string(), json!(self.tracking));
        for (key, entry) in &self.entries {
            doc.insert(key.clone(), entry.to_json());
        }
        doc
    }
}
