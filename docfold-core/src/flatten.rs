//! Path flattening and leaf classification.
//!
//! A document is walked depth-first. Keys listed in the pass-through set are
//! walked *through*: the key becomes a path segment and its value is visited.
//! Any other key that holds a map or a sequence stops the walk, and the whole
//! subtree is recorded verbatim under the dotted path (an opaque entry).
//! Scalar leaves are classified wherever they are met:
//!
//! - text becomes a dimension,
//! - a number becomes a measure, tagged `time` when it reads as a calendar
//!   timestamp,
//! - anything else (booleans, null) is skipped.
//!
//! Keys are always built from field names (or sequence indices). The content
//! of a text leaf never becomes part of a key.
//!
//! Top-level fields named like a reserved batch key (`_id`, `tracking`, or
//! any extra reserved key of the codec) are rejected, since the persisted
//! batch stores its own identifier and bitmask under those names.

use crate::aggregation::{ID_FIELD, TRACKING_FIELD};
use crate::config::FlattenConfig;
use crate::error::{FoldError, Result};
use crate::value::{Record, Value};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// Whether a measure looks like a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    Number,
    Time,
}

impl NumericKind {
    /// Classifies a number. Integral values that chrono can represent as
    /// milliseconds since the Unix epoch are treated as timestamps.
    pub fn classify(value: f64) -> Self {
        if value.is_finite()
            && value.fract() == 0.0
            && value.abs() <= i64::MAX as f64
            && DateTime::<Utc>::from_timestamp_millis(value as i64).is_some()
        {
            NumericKind::Time
        } else {
            NumericKind::Number
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NumericKind::Number => "number",
            NumericKind::Time => "time",
        }
    }
}

impl Display for NumericKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome for one flattened key.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatEntry {
    /// Text leaf.
    Dimension,
    /// Numeric leaf.
    Measure { value: f64, kind: NumericKind },
    /// Subtree stored as-is, excluded from statistics.
    Opaque(Value),
}

/// Flattened form of one record, in visiting order.
pub type FlattenedRecord = IndexMap<String, FlatEntry>;

/// Turns records into [`FlattenedRecord`]s.
#[derive(Debug, Clone)]
pub struct Flattener {
    pass_through: HashSet<String>,
    skipped: HashSet<String>,
    reserved: HashSet<String>,
}

impl Flattener {
    pub fn new(config: &FlattenConfig) -> Self {
        Self {
            pass_through: config.pass_through.iter().cloned().collect(),
            skipped: [config.sequence_field.clone(), config.id_field.clone()]
                .into_iter()
                .collect(),
            reserved: [ID_FIELD.to_string(), TRACKING_FIELD.to_string()]
                .into_iter()
                .collect(),
        }
    }

    /// Adds names that top-level fields may not use.
    pub fn with_reserved<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn is_pass_through(&self, key: &str) -> bool {
        self.pass_through.contains(key)
    }

    /// Flattens one record. Top-level identifier and ordering fields are
    /// not facts about the document and are left out.
    pub fn flatten(&self, record: &Record) -> Result<FlattenedRecord> {
        let mut out = FlattenedRecord::new();
        for (key, value) in record.fields() {
            if self.skipped.contains(key) {
                continue;
            }
            if self.reserved.contains(key) {
                return Err(FoldError::ReservedField { field: key.clone() });
            }
            self.visit_field("", key, value, &mut out);
        }
        Ok(out)
    }

    fn visit_field(&self, path: &str, key: &str, value: &Value, out: &mut FlattenedRecord) {
        let path = join(path, key);
        match value {
            Value::Nested(_) | Value::Sequence(_) if !self.is_pass_through(key) => {
                out.insert(path, FlatEntry::Opaque(value.clone()));
            }
            _ => self.visit_value(path, value, out),
        }
    }

    fn visit_value(&self, path: String, value: &Value, out: &mut FlattenedRecord) {
        match value {
            Value::Nested(fields) => {
                for (key, child) in fields {
                    self.visit_field(&path, key, child, out);
                }
            }
            Value::Sequence(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.visit_value(join(&path, &index.to_string()), item, out);
                }
            }
            Value::Text(_) => {
                out.insert(path, FlatEntry::Dimension);
            }
            Value::Number(n) => {
                out.insert(
                    path,
                    FlatEntry::Measure {
                        value: *n,
                        kind: NumericKind::classify(*n),
                    },
                );
            }
            Value::Bool(_) | Value::Null => {}
        }
    }
}

/// Lists every dotted leaf path of a record, descending through all nested
/// maps regardless of pass-through tags. Sequences count as leaves.
pub fn leaf_paths(record: &Record) -> Vec<String> {
    fn walk(path: &str, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Nested(fields) if !fields.is_empty() => {
                for (key, child) in fields {
                    walk(&join(path, key), child, out);
                }
            }
            _ => out.push(path.to_string()),
        }
    }

    let mut out = Vec::new();
    for (key, value) in record.fields() {
        walk(key, value, &mut out);
    }
    out
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
