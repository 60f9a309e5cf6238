#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::driver::BatchDriver;
    use crate::progress::ProgressObserver;
    use crate::source::{RecordSource, VecSource};
    use async_trait::async_trait;
    use docfold_core::storage::{BatchSink, EncodedBatch, MemorySink};
    use docfold_core::{FoldError, KeyCodec, Record, Result};
    use futures::stream::{self, BoxStream};
    use mockall::*;
    use serde_json::{json, Map as JsonMap, Value as JsonValue};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    mock! {
        pub Source {}
        impl RecordSource for Source {
            fn records(&self) -> BoxStream<'static, Result<Record>>;
            fn total_records(&self) -> Option<u64>;
        }
    }

    mock! {
        pub Progress {}
        impl ProgressObserver for Progress {
            fn on_record(&self, position: u64, total: Option<u64>);
        }
    }

    /// Accepts `fail_at` persists, then refuses every later one.
    struct FailingSink {
        calls: Arc<AtomicU64>,
        fail_at: u64,
    }

    #[async_trait]
    impl BatchSink for FailingSink {
        async fn persist(&self, _batch: EncodedBatch) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_at {
                return Err(FoldError::Storage("disk full".to_string()));
            }
            Ok(())
        }
    }

    fn settings(reset_interval: u64) -> Settings {
        let mut settings = Settings::default();
        settings.fold.sequence_field = "ts".to_string();
        settings.batch.reset_interval = reset_interval;
        settings
    }

    fn numbered_source(count: u64) -> VecSource {
        VecSource::from_json(
            (0..count)
                .map(|i| json!({"ts": i + 1, "a": format!("v{}", i), "n": i as f64 + 0.5}))
                .collect(),
        )
        .unwrap()
    }

    fn decode(batch: &EncodedBatch) -> JsonMap<String, JsonValue> {
        KeyCodec::default().decode(&batch.document).unwrap()
    }

    #[tokio::test]
    async fn test_two_records_fold_into_one_batch() {
        let source = VecSource::from_json(vec![
            json!({"ts": 1, "a": "x", "n": 5}),
            json!({"ts": 2, "a": "y", "n": 7}),
        ])
        .unwrap();
        let sink = MemorySink::new();

        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(2)).unwrap();
        let summary = assert_ok!(driver.run().await);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.batches, 1);

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        let doc = decode(&batches[0]);
        assert_eq!(doc["tracking"], json!(["11", "11"]));
        assert_eq!(doc["a"], json!({"count": 2}));
        assert_eq!(doc["n"]["count"], json!(2));
        assert_eq!(doc["n"]["sum"], json!(12));
        assert_eq!(doc["n"]["min"], json!(5));
        assert_eq!(doc["n"]["max"], json!(7));
        assert_eq!(doc["n"]["original"], json!(7));
        assert!(!doc.contains_key("ts"));
    }

    #[tokio::test]
    async fn test_flush_count_is_ceiling_of_records_over_interval() {
        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(numbered_source(7)), Box::new(sink.clone()), &settings(3)).unwrap();

        let summary = driver.run().await.unwrap();
        assert_eq!(summary.batches, 3);

        let batches = sink.batches().await;
        let counts: Vec<u64> = batches.iter().map(|b| b.record_count).collect();
        let firsts: Vec<u64> = batches.iter().map(|b| b.first_sequence).collect();
        let indices: Vec<u64> = batches.iter().map(|b| b.index).collect();
        assert_eq!(counts, vec![3, 3, 1]);
        assert_eq!(firsts, vec![0, 3, 6]);
        assert_eq!(indices, vec![0, 1, 2]);

        for batch in &batches {
            let doc = decode(batch);
            assert_eq!(doc["_id"], json!(batch.index));
            assert_eq!(doc["tracking"].as_array().unwrap().len() as u64, batch.record_count);
        }
    }

    #[tokio::test]
    async fn test_each_batch_starts_with_fresh_keys() {
        let source = VecSource::from_json(vec![
            json!({"ts": 1, "a": "x"}),
            json!({"ts": 2, "b": "y"}),
            json!({"ts": 3, "c": "z"}),
        ])
        .unwrap();
        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(2)).unwrap();
        driver.run().await.unwrap();

        let batches = sink.batches().await;
        assert_eq!(decode(&batches[0])["tracking"], json!(["1", "0"]));
        let second = decode(&batches[1]);
        assert_eq!(second["tracking"], json!(["1"]));
        assert!(!second.contains_key("a"));
    }

    #[tokio::test]
    async fn test_empty_source_produces_no_flush() {
        let mut source = MockSource::new();
        source.expect_total_records().return_const(Some(0u64));
        source
            .expect_records()
            .times(1)
            .return_once(|| Box::pin(stream::iter(Vec::<Result<Record>>::new())));

        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(2)).unwrap();

        let summary = driver.run().await.unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(summary.batches, 0);
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_progress_sees_every_position() {
        let mut progress = MockProgress::new();
        let mut seq = Sequence::new();
        for expected in 1..=3u64 {
            progress
                .expect_on_record()
                .withf(move |position, total| *position == expected && *total == Some(3))
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }

        let driver = BatchDriver::new(Box::new(numbered_source(3)), Box::new(MemorySink::new()), &settings(2))
            .unwrap()
            .with_progress(Box::new(progress));
        assert_ok!(driver.run().await);
    }

    #[tokio::test]
    async fn test_persist_failure_reports_resume_point() {
        let calls = Arc::new(AtomicU64::new(0));
        let sink = FailingSink {
            calls: calls.clone(),
            fail_at: 1,
        };
        let driver = BatchDriver::new(Box::new(numbered_source(6)), Box::new(sink), &settings(2)).unwrap();

        let err = assert_err!(driver.run().await);
        match err {
            FoldError::Persist { batch, resume_after, .. } => {
                assert_eq!(batch, 1);
                assert_eq!(resume_after, 2);
            }
            other => panic!("expected persist error, got {:?}", other),
        }
        // The run stops at the first failed flush.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_source_error_stops_the_run() {
        let mut source = MockSource::new();
        source.expect_total_records().return_const(None);
        source.expect_records().return_once(|| {
            Box::pin(stream::iter(vec![
                Record::from_json(json!({"ts": 1, "a": "x"})),
                Err(FoldError::MalformedLine {
                    line: 2,
                    reason: "bad".to_string(),
                }),
            ]))
        });

        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(10)).unwrap();

        let err = driver.run().await.unwrap_err();
        assert!(matches!(err, FoldError::MalformedLine { line: 2, .. }));
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_out_of_order_records_are_still_absorbed_once() {
        let source = VecSource::from_json(vec![
            json!({"ts": 5, "n": 1.5}),
            json!({"ts": 3, "n": 2.5}),
            json!({"ts": 9, "n": 3.5}),
        ])
        .unwrap();
        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(3)).unwrap();
        driver.run().await.unwrap();

        let doc = decode(&sink.batches().await[0]);
        assert_eq!(doc["n"]["count"], json!(3));
        assert_eq!(doc["n"]["original"], json!(3.5));
    }

    #[tokio::test]
    async fn test_pass_through_and_opaque_fields_persist() {
        let source = VecSource::from_json(vec![
            json!({"ts": 1, "data": {"region": "emea", "sales": 10.5}, "meta": {"a.b": 1}}),
            json!({"ts": 2, "data": {"region": "apac", "sales": 2.25}, "meta": {"a.b": 2}}),
        ])
        .unwrap();
        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(5)).unwrap();
        driver.run().await.unwrap();

        let batches = sink.batches().await;
        let raw = &batches[0].document;
        assert!(raw.contains_key(&hex_key("data.region")));
        assert!(!raw.contains_key("data.region"));

        let doc = decode(&batches[0]);
        assert_eq!(doc["data.region"], json!({"count": 2}));
        assert_eq!(doc["data.sales"]["sum"], json!(12.75));
        assert_eq!(doc["meta"], json!({"a.b": 2}));
    }

    #[tokio::test]
    async fn test_tracking_width_is_fixed_within_a_batch() {
        let source = VecSource::from_json(vec![
            json!({"ts": 1, "a": "x"}),
            json!({"ts": 2, "b": "y"}),
            json!({"ts": 3, "a": "z", "c": "w"}),
        ])
        .unwrap();
        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(3)).unwrap();
        driver.run().await.unwrap();

        let doc = decode(&sink.batches().await[0]);
        assert_eq!(doc["tracking"], json!(["1", "0", "1"]));
        assert_eq!(doc["b"], json!({"count": 1}));
        assert_eq!(doc["c"], json!({"count": 1}));
    }

    #[tokio::test]
    async fn test_field_named_like_reserved_key_is_rejected() {
        let source = VecSource::from_json(vec![
            json!({"ts": 1, "tracking": "UPS", "n": 1}),
            json!({"ts": 2, "tracking": "DHL", "n": 2}),
        ])
        .unwrap();
        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(2)).unwrap();

        let err = assert_err!(driver.run().await);
        assert!(matches!(err, FoldError::ReservedField { ref field } if field == "tracking"));
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_extra_reserved_keys_apply_to_fields() {
        let mut settings = settings(2);
        settings.codec.reserved_keys.push("raw".to_string());
        let source = VecSource::from_json(vec![json!({"ts": 1, "raw": "x"})]).unwrap();
        let driver = BatchDriver::new(Box::new(source), Box::new(MemorySink::new()), &settings).unwrap();

        let err = driver.run().await.unwrap_err();
        assert!(matches!(err, FoldError::ReservedField { ref field } if field == "raw"));
    }

    #[tokio::test]
    async fn test_opaque_subtree_with_reserved_names_round_trips() {
        let reference = json!({"_id": {"$oid": "5f1d2c"}, "tracking": ["a", "b"], "$ref": "orders"});
        let source = VecSource::from_json(vec![
            json!({"ts": 1, "_id": "doc-1", "order": reference.clone(), "n": 2.5}),
        ])
        .unwrap();
        let sink = MemorySink::new();
        let driver = BatchDriver::new(Box::new(source), Box::new(sink.clone()), &settings(2)).unwrap();
        driver.run().await.unwrap();

        let batches = sink.batches().await;
        let raw = &batches[0].document;
        assert_eq!(raw["_id"], json!(0));
        assert_eq!(raw["tracking"], json!(["11"]));
        let stored = raw[&hex_key("order")].as_object().unwrap();
        assert!(stored.contains_key(&hex_key("_id")));
        assert!(stored.keys().all(|k| !k.starts_with('$') && k != "_id" && k != "tracking"));
        assert_eq!(stored[&hex_key("_id")][&hex_key("$oid")], json!("5f1d2c"));

        let doc = decode(&batches[0]);
        assert_eq!(doc["order"], reference);
        assert_eq!(doc["n"]["sum"], json!(2.5));
    }

    #[test]
    fn test_zero_reset_interval_is_rejected() {
        let result = BatchDriver::new(Box::new(numbered_source(1)), Box::new(MemorySink::new()), &settings(0));
        assert!(matches!(result, Err(FoldError::Configuration(_))));
    }

    fn hex_key(key: &str) -> String {
        key.bytes().map(|b| format!("{:02x}", b)).collect()
    }
}
