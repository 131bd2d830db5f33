//! 分发引擎：一条 MQTT 消息 → 所有匹配规则 → 记录写入 / HTTP 转发。
//!
//! 规则之间相互独立，任一规则失败（构建中止、写入失败、转发失败）只记录日志和计数，
//! 不影响其余规则，也不向调用方传播。

use chrono::Local;
use domain::{Clock, InboundMessage, MessageContext};
use m2i_forward::{ForwardRequest, HttpForwarder, HttpMethod};
use m2i_storage::RecordSink;
use m2i_telemetry::{
    record_forward_failure, record_forward_success, record_message_received,
    record_payload_fallback, record_record_built, record_record_dropped, record_rule_matched,
    record_rule_skipped_schedule, record_write_failure, record_write_latency_ms,
    record_write_success,
};
use m2i_transform::{RecordBuilder, Rule, ValueRef, topic_matches};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// HTTP 转发设置。
#[derive(Clone)]
pub struct Forwarding {
    /// 配置的动词无法识别时为 None，此时每次转发都会被跳过。
    pub method: Option<HttpMethod>,
    /// 原始配置值（用于日志）。
    pub action: String,
    pub destination: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub forwarder: Arc<dyn HttpForwarder>,
}

/// 分发器参数。
#[derive(Clone, Default)]
pub struct DispatcherConfig {
    pub rules: Vec<Rule>,
    pub builder: RecordBuilder,
    pub forwarding: Option<Forwarding>,
}

/// 单条消息的处理结果统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// topic 匹配的规则数
    pub matched: usize,
    /// 调度窗口未激活而跳过
    pub skipped: usize,
    /// 未生成记录（measurement 缺失或字段为空）
    pub dropped: usize,
    pub written: usize,
    /// 写入失败
    pub failed: usize,
    pub forwarded: usize,
    pub forward_failed: usize,
}

struct DispatcherInner {
    rules: Vec<Rule>,
    builder: RecordBuilder,
    forwarding: Option<Forwarding>,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
}

/// 分发器入口，启动时构建一次，之后只读共享。
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, sink: Arc<dyn RecordSink>, clock: Arc<dyn Clock>) -> Self {
        let inner = DispatcherInner {
            rules: config.rules,
            builder: config.builder,
            forwarding: config.forwarding,
            sink,
            clock,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.inner.rules
    }

    /// 规则中出现的去重 topic filter（按首次出现顺序）。
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for rule in &self.inner.rules {
            if !topics.contains(&rule.topic) {
                topics.push(rule.topic.clone());
            }
        }
        topics
    }

    /// 规则级数据库覆盖集合。
    pub fn override_databases(&self) -> BTreeSet<String> {
        self.inner
            .rules
            .iter()
            .filter_map(|rule| rule.database.clone())
            .collect()
    }

    pub async fn on_message(&self, message: &InboundMessage) -> DispatchReport {
        record_message_received();
        let mut report = DispatchReport::default();
        let mut ctx: Option<MessageContext> = None;

        for rule in &self.inner.rules {
            if !topic_matches(&rule.topic, &message.topic) {
                continue;
            }
            report.matched += 1;
            record_rule_matched();

            let now = self.inner.clock.now();
            if let Some(schedule) = &rule.schedule {
                if !schedule.is_active(&now.with_timezone(&Local)) {
                    info!(
                        target: "m2i.pipeline",
                        topic = %message.topic,
                        schedule = %schedule,
                        "rule_skipped_schedule"
                    );
                    report.skipped += 1;
                    record_rule_skipped_schedule();
                    continue;
                }
            }

            let ctx = ctx.get_or_insert_with(|| {
                let payload = decode_payload(&message.payload, &message.topic);
                MessageContext::new(&message.topic, payload, message.received_at, message.qos)
            });

            let record = match self.inner.builder.build(rule, ctx, now) {
                Ok(record) => record,
                Err(err) => {
                    warn!(
                        target: "m2i.pipeline",
                        topic = %message.topic,
                        rule = %rule.topic,
                        error = %err,
                        "record_not_built"
                    );
                    report.dropped += 1;
                    record_record_dropped();
                    continue;
                }
            };
            record_record_built();

            let started = Instant::now();
            match self
                .inner
                .sink
                .write(&record, rule.database.as_deref())
                .await
            {
                Ok(()) => {
                    record_write_latency_ms(started.elapsed().as_millis() as u64);
                    record_write_success();
                    report.written += 1;
                    debug!(
                        target: "m2i.pipeline",
                        measurement = %record.measurement,
                        fields = record.fields.len(),
                        tags = record.tags.len(),
                        "record_written"
                    );
                }
                Err(err) => {
                    record_write_failure();
                    report.failed += 1;
                    error!(
                        target: "m2i.pipeline",
                        measurement = %record.measurement,
                        database = ?rule.database,
                        error = %err,
                        "record_write_failed"
                    );
                }
            }

            if let (Some(forwarding), Some(content)) = (&self.inner.forwarding, &rule.http_content) {
                match self.forward(forwarding, content, ctx).await {
                    Some(true) => report.forwarded += 1,
                    Some(false) => report.forward_failed += 1,
                    None => {}
                }
            }
        }

        if report.matched == 0 {
            debug!(target: "m2i.pipeline", topic = %message.topic, "message_unmatched");
        }
        report
    }

    /// 返回 None 表示未发送（动词无效）。
    async fn forward(
        &self,
        forwarding: &Forwarding,
        content: &BTreeMap<String, ValueRef>,
        ctx: &MessageContext,
    ) -> Option<bool> {
        let Some(method) = forwarding.method else {
            error!(
                target: "m2i.pipeline",
                action = %forwarding.action,
                "http_forward_skipped_invalid_method"
            );
            return None;
        };

        let mut form = BTreeMap::new();
        for (name, source) in content {
            match source.resolve(ctx) {
                Some(value) => {
                    form.insert(name.clone(), form_value(value));
                }
                None => warn!(
                    target: "m2i.pipeline",
                    field = %name,
                    source = %source,
                    "http_content_unresolved"
                ),
            }
        }

        let request = ForwardRequest {
            method,
            url: forwarding.destination.clone(),
            form,
            username: forwarding.username.clone(),
            password: forwarding.password.clone(),
        };
        match forwarding.forwarder.forward(&request).await {
            Ok(()) => {
                record_forward_success();
                debug!(
                    target: "m2i.pipeline",
                    method = %method,
                    destination = %forwarding.destination,
                    "http_forwarded"
                );
                Some(true)
            }
            Err(err) => {
                record_forward_failure();
                error!(
                    target: "m2i.pipeline",
                    method = %method,
                    destination = %forwarding.destination,
                    error = %err,
                    "http_forward_failed"
                );
                Some(false)
            }
        }
    }
}

/// 解码载荷：UTF-8（有损）→ JSON；空文本视为 null，解析失败回退为字符串。
pub fn decode_payload(payload: &[u8], topic: &str) -> Value {
    let text = String::from_utf8_lossy(payload);
    if text.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                target: "m2i.pipeline",
                topic = %topic,
                error = %err,
                "payload_not_json"
            );
            record_payload_fallback();
            Value::String(text.into_owned())
        }
    }
}

fn form_value(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
