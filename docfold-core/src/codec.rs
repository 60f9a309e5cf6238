//! Storage-safe key encoding.
//!
//! Flattened keys contain dots, and opaque subtrees may carry keys with a
//! leading `$`. Both clash with document-store key syntax, so every key of a
//! persisted batch is hex-encoded before it is written, at every nesting
//! level. Reserved keys (the batch identifier and the tracking field) are
//! left as they are at the top level of the document, and so are their
//! values. Below the top level every key is encoded, so an opaque subtree
//! holding its own `_id` or `$oid` keys is stored safely.

use crate::config::default_reserved_keys;
use crate::error::{FoldError, Result};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashSet;

/// Reversible key transform for persisted batches.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    reserved: HashSet<String>,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(default_reserved_keys())
    }
}

impl KeyCodec {
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved.contains(key)
    }

    /// Hex-encodes every key except the reserved top-level ones.
    pub fn encode(&self, map: &JsonMap<String, JsonValue>) -> JsonMap<String, JsonValue> {
        map.iter()
            .map(|(key, value)| {
                if self.is_reserved(key) {
                    (key.clone(), value.clone())
                } else {
                    (hex::encode(key.as_bytes()), encode_value(value))
                }
            })
            .collect()
    }

    /// Inverse of [`KeyCodec::encode`]. A key that is not valid hex or does
    /// not decode to UTF-8 is an error.
    pub fn decode(&self, map: &JsonMap<String, JsonValue>) -> Result<JsonMap<String, JsonValue>> {
        let mut out = JsonMap::with_capacity(map.len());
        for (key, value) in map {
            if self.is_reserved(key) {
                out.insert(key.clone(), value.clone());
            } else {
                out.insert(decode_key(key)?, decode_value(value)?);
            }
        }
        Ok(out)
    }
}

fn encode_map(map: &JsonMap<String, JsonValue>) -> JsonMap<String, JsonValue> {
    map.iter()
        .map(|(key, value)| (hex::encode(key.as_bytes()), encode_value(value)))
        .collect()
}

fn encode_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(encode_map(map)),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(encode_value).collect()),
        other => other.clone(),
    }
}

fn decode_map(map: &JsonMap<String, JsonValue>) -> Result<JsonMap<String, JsonValue>> {
    let mut out = JsonMap::with_capacity(map.len());
    for (key, value) in map {
        out.insert(decode_key(key)?, decode_value(value)?);
    }
    Ok(out)
}

fn decode_value(value: &JsonValue) -> Result<JsonValue> {
    Ok(match value {
        JsonValue::Object(map) => JsonValue::Object(decode_map(map)?),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        other => other.clone(),
    })
}

fn decode_key(key: &str) -> Result<String> {
    let bytes = hex::decode(key).map_err(|e| FoldError::Codec {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| FoldError::Codec {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
