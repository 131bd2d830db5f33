//! 追踪初始化与进程内计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub payload_fallbacks: u64,
    pub rules_matched: u64,
    pub rules_skipped_schedule: u64,
    pub records_built: u64,
    pub records_dropped: u64,
    pub write_success: u64,
    pub write_failure: u64,
    pub forward_success: u64,
    pub forward_failure: u64,
    pub write_latency_ms_total: u64,
    pub write_latency_ms_count: u64,
}

impl MetricsSnapshot {
    /// 平均写入延迟（毫秒），无样本时为 0。
    pub fn average_write_latency_ms(&self) -> u64 {
        if self.write_latency_ms_count == 0 {
            0
        } else {
            self.write_latency_ms_total / self.write_latency_ms_count
        }
    }
}

/// 基础指标。
pub struct TelemetryMetrics {
    messages_received: AtomicU64,
    payload_fallbacks: AtomicU64,
    rules_matched: AtomicU64,
    rules_skipped_schedule: AtomicU64,
    records_built: AtomicU64,
    records_dropped: AtomicU64,
    write_success: AtomicU64,
    write_failure: AtomicU64,
    forward_success: AtomicU64,
    forward_failure: AtomicU64,
    write_latency_ms_total: AtomicU64,
    write_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            payload_fallbacks: AtomicU64::new(0),
            rules_matched: AtomicU64::new(0),
            rules_skipped_schedule: AtomicU64::new(0),
            records_built: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            write_success: AtomicU64::new(0),
            write_failure: AtomicU64::new(0),
            forward_success: AtomicU64::new(0),
            forward_failure: AtomicU64::new(0),
            write_latency_ms_total: AtomicU64::new(0),
            write_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            payload_fallbacks: self.payload_fallbacks.load(Ordering::Relaxed),
            rules_matched: self.rules_matched.load(Ordering::Relaxed),
            rules_skipped_schedule: self.rules_skipped_schedule.load(Ordering::Relaxed),
            records_built: self.records_built.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            write_success: self.write_success.load(Ordering::Relaxed),
            write_failure: self.write_failure.load(Ordering::Relaxed),
            forward_success: self.forward_success.load(Ordering::Relaxed),
            forward_failure: self.forward_failure.load(Ordering::Relaxed),
            write_latency_ms_total: self.write_latency_ms_total.load(Ordering::Relaxed),
            write_latency_ms_count: self.write_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing。
///
/// `RUST_LOG` 优先；未设置时使用 `default_level`（如 `info`、`debug`）。
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录 MQTT 消息接收次数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录载荷按字符串处理（非 JSON）的次数。
pub fn record_payload_fallback() {
    metrics().payload_fallbacks.fetch_add(1, Ordering::Relaxed);
}

/// 记录规则匹配次数。
pub fn record_rule_matched() {
    metrics().rules_matched.fetch_add(1, Ordering::Relaxed);
}

/// 记录因调度窗口未激活而跳过的次数。
pub fn record_rule_skipped_schedule() {
    metrics()
        .rules_skipped_schedule
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录成功构建的记录数。
pub fn record_record_built() {
    metrics().records_built.fetch_add(1, Ordering::Relaxed);
}

/// 记录未能构建（measurement 缺失或字段为空）的次数。
pub fn record_record_dropped() {
    metrics().records_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入成功次数。
pub fn record_write_success() {
    metrics().write_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入失败次数。
pub fn record_write_failure() {
    metrics().write_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录 HTTP 转发成功次数。
pub fn record_forward_success() {
    metrics().forward_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录 HTTP 转发失败次数。
pub fn record_forward_failure() {
    metrics().forward_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入延迟（毫秒）。
pub fn record_write_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .write_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .write_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
