use domain::{Record, RecordValue};
use m2i_storage::{InMemoryRecordSink, RecordSink};
use std::collections::BTreeMap;

fn record(measurement: &str, value: f64) -> Record {
    let mut fields = BTreeMap::new();
    fields.insert("value".to_string(), RecordValue::F64(value));
    Record {
        measurement: measurement.to_string(),
        time: "2024-06-01T12:00:00Z".to_string(),
        tags: BTreeMap::new(),
        fields,
    }
}

#[tokio::test]
async fn writes_to_default_database() {
    let sink = InMemoryRecordSink::new("node");
    sink.write(&record("temperature", 21.5), None)
        .await
        .expect("write");

    let stored = sink.records();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].database, "node");
    assert_eq!(stored[0].record.measurement, "temperature");
}

#[tokio::test]
async fn database_override_wins() {
    let sink = InMemoryRecordSink::new("node");
    sink.write(&record("a", 1.0), Some("other"))
        .await
        .expect("write");
    sink.write(&record("b", 2.0), None).await.expect("write");

    let databases: Vec<_> = sink.records().into_iter().map(|r| r.database).collect();
    assert_eq!(databases, vec!["other".to_string(), "node".to_string()]);
}

#[tokio::test]
async fn failing_database_does_not_store() {
    let sink = InMemoryRecordSink::new("node");
    sink.fail_writes_to("broken");

    assert!(sink.write(&record("a", 1.0), Some("broken")).await.is_err());
    assert!(sink.is_empty());
    sink.write(&record("a", 1.0), None).await.expect("write");
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn rejects_records_without_fields() {
    let sink = InMemoryRecordSink::new("node");
    let mut empty = record("a", 1.0);
    empty.fields.clear();
    assert!(sink.write(&empty, None).await.is_err());
    assert!(sink.write(&record("a", 1.0), Some(" ")).await.is_err());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn ensure_database_is_idempotent() {
    let sink = InMemoryRecordSink::new("node");
    sink.ensure_database("node").await.expect("create");
    sink.ensure_database("node").await.expect("create again");
    sink.ensure_database("archive").await.expect("create");
    assert_eq!(sink.databases(), vec!["archive".to_string(), "node".to_string()]);
    assert!(sink.ensure_database("").await.is_err());
}
