use m2i_telemetry::{
    MetricsSnapshot, metrics, record_forward_failure, record_message_received,
    record_write_latency_ms,
};

#[test]
fn counters_only_grow() {
    let before = metrics().snapshot();
    record_message_received();
    record_forward_failure();
    record_write_latency_ms(12);
    let after = metrics().snapshot();

    assert!(after.messages_received > before.messages_received);
    assert!(after.forward_failure > before.forward_failure);
    assert!(after.write_latency_ms_count > before.write_latency_ms_count);
    assert!(after.write_latency_ms_total >= before.write_latency_ms_total + 12);
}

#[test]
fn average_latency_handles_empty_snapshot() {
    let empty = MetricsSnapshot::default();
    assert_eq!(empty.average_write_latency_ms(), 0);

    let snapshot = MetricsSnapshot {
        write_latency_ms_total: 30,
        write_latency_ms_count: 3,
        ..MetricsSnapshot::default()
    };
    assert_eq!(snapshot.average_write_latency_ms(), 10);
}
