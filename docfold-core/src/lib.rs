/*!
# docfold-core: flatten-and-aggregate engine for document streams

docfold-core folds a stream of deeply nested documents into a small number of
batch aggregate records ready for multidimensional ("cube") analysis.

## Key Features

### Path Flattening
- Depth-first traversal of nested documents into dotted key paths
- Configurable pass-through tags that flattening recurses through
- Opaque subtrees for all other nested fields, stored verbatim

### Leaf Classification
- Text leaves become dimensions, counted per batch
- Numeric leaves become measures, tagged `time` when they read as timestamps

### Batch Aggregation
- Running count, compensated sum, min, max and last value per measure
- Per-record presence bit-strings (`tracking`) for sparsity reconstruction
- Value-semantics `absorb`: the caller owns every intermediate state

### Storage
- Reversible hex key codec keeping dotted keys safe for document stores
- Sinks for memory, JSON lines files and DuckDB

## Usage

```rust
use docfold_core::aggregation::BatchAggregate;
use docfold_core::codec::KeyCodec;
use docfold_core::config::FlattenConfig;
use docfold_core::flatten::Flattener;
use docfold_core::value::Record;
use serde_json::json;
use std::num::NonZeroU64;

let flattener = Flattener::new(&FlattenConfig::default());
let interval = NonZeroU64::new(2).unwrap();

let mut batch = BatchAggregate::new();
for (position, doc) in [
    json!({"timestamp": 1, "a": "x", "n": 5}),
    json!({"timestamp": 2, "a": "y", "n": 7}),
]
.into_iter()
.enumerate()
{
    let record = Record::from_json(doc).unwrap();
    batch = batch.absorb(&flattener.flatten(&record).unwrap(), position as u64, interval);
}

let document = KeyCodec::default().encode(&batch.to_document(0));
assert_eq!(document["tracking"], json!(["11", "11"]));
```
*/

pub mod aggregation;
pub mod codec;
pub mod config;
pub mod error;
pub mod flatten;
pub mod storage;
pub mod value;

pub use aggregation::{BatchAggregate, BatchEntry, NumericStat, RunningStat, TextStat};
pub use codec::KeyCodec;
pub use error::{FoldError, Result};
pub use flatten::{FlatEntry, FlattenedRecord, Flattener, NumericKind};
pub use storage::{BatchSink, EncodedBatch};
pub use value::{Record, Value};
