//! 运行链路装配模块
//!
//! 将配置、存储写入器、HTTP 转发器、分发引擎和 MQTT 采集源组装在一起：
//! MQTT 消息 → 规则匹配 → 记录构建 → InfluxDB 写入（可选 HTTP 转发）。

use domain::{InboundMessage, SystemClock};
use m2i_config::AppConfig;
use m2i_forward::{ForwardError, ReqwestForwarder};
use m2i_ingest::{IngestError, MessageHandler, MqttSource, MqttSourceConfig, Source};
use m2i_pipeline::{Dispatcher, DispatcherConfig, Forwarding};
use m2i_storage::{InfluxDbSink, InfluxDbSinkConfig, RecordSink};
use m2i_telemetry::metrics;
use m2i_transform::RecordBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const METRICS_INTERVAL: Duration = Duration::from_secs(60);
const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// 分发处理器
///
/// 实现 `MessageHandler`，把每条入站消息交给分发引擎。
/// 规则级错误已在引擎内记录，这里始终返回 Ok。
struct DispatchHandler {
    dispatcher: Dispatcher,
}

#[async_trait::async_trait]
impl MessageHandler for DispatchHandler {
    async fn handle(&self, message: InboundMessage) -> Result<(), IngestError> {
        let report = self.dispatcher.on_message(&message).await;
        debug!(
            target: "m2i.app",
            topic = %message.topic,
            matched = report.matched,
            skipped = report.skipped,
            dropped = report.dropped,
            written = report.written,
            failed = report.failed,
            forwarded = report.forwarded,
            "message_dispatched"
        );
        Ok(())
    }
}

/// 按配置构建分发引擎
fn build_dispatcher(
    config: &AppConfig,
    sink: Arc<dyn RecordSink>,
) -> Result<Dispatcher, ForwardError> {
    let forwarding = match &config.http {
        Some(http) => Some(Forwarding {
            method: http.method,
            action: http.action.clone(),
            destination: http.destination.clone(),
            username: http.username.clone(),
            password: http.password.clone(),
            forwarder: Arc::new(ReqwestForwarder::new(Some(FORWARD_TIMEOUT))?),
        }),
        None => None,
    };
    Ok(Dispatcher::new(
        DispatcherConfig {
            rules: config.rules.clone(),
            builder: RecordBuilder::new(config.base64decode.clone()),
            forwarding,
        },
        sink,
        Arc::new(SystemClock),
    ))
}

/// 启动前确保默认库与所有覆盖库存在
async fn ensure_databases(
    sink: &dyn RecordSink,
    dispatcher: &Dispatcher,
    default_database: &str,
) -> Result<(), m2i_storage::StorageError> {
    let mut databases = dispatcher.override_databases();
    databases.insert(default_database.to_string());
    for database in databases {
        info!(target: "m2i.app", database = %database, "influxdb_create_database");
        sink.ensure_database(&database).await?;
    }
    Ok(())
}

/// 周期输出指标快照
fn spawn_metrics_reporter() -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(METRICS_INTERVAL).await;
            let snapshot = metrics().snapshot();
            info!(
                target: "m2i.app",
                messages = snapshot.messages_received,
                payload_fallbacks = snapshot.payload_fallbacks,
                rules_matched = snapshot.rules_matched,
                rules_skipped = snapshot.rules_skipped_schedule,
                records_built = snapshot.records_built,
                records_dropped = snapshot.records_dropped,
                write_success = snapshot.write_success,
                write_failure = snapshot.write_failure,
                forward_success = snapshot.forward_success,
                forward_failure = snapshot.forward_failure,
                write_latency_avg_ms = snapshot.average_write_latency_ms(),
                "metrics_snapshot"
            );
        }
    })
}

/// 运行桥接，直到 MQTT 源退出或收到 Ctrl-C
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(InfluxDbSink::new(InfluxDbSinkConfig {
        host: config.influxdb.host.clone(),
        port: config.influxdb.port,
        username: config.influxdb.username.clone(),
        password: config.influxdb.password.clone(),
        database: config.influxdb.database.clone(),
        ssl: config.influxdb.ssl,
        timeout: config.influxdb.timeout,
        retries: config.influxdb.retries,
    })?);
    let dispatcher = build_dispatcher(&config, sink.clone())?;

    if let Err(err) = ensure_databases(sink.as_ref(), &dispatcher, sink.default_database()).await {
        error!(target: "m2i.app", error = %err, "influxdb_create_database_failed");
        return Err(err.into());
    }

    let reporter = spawn_metrics_reporter();

    let source = MqttSource::new(MqttSourceConfig {
        host: config.mqtt.host.clone(),
        port: config.mqtt.port,
        username: config.mqtt.username.clone(),
        password: config.mqtt.password.clone(),
        client_id: config.mqtt.client_id.clone(),
        topics: dispatcher.topics(),
    });
    info!(
        target: "m2i.app",
        host = %config.mqtt.host,
        port = config.mqtt.port,
        topics = source.config().topics.len(),
        "bridge_started"
    );
    let handler = Arc::new(DispatchHandler { dispatcher });

    let result = tokio::select! {
        result = source.run(handler) => result,
        _ = tokio::signal::ctrl_c() => {
            info!(target: "m2i.app", "shutdown_requested");
            Ok(())
        }
    };
    reporter.abort();
    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use m2i_storage::InMemoryRecordSink;

    const CONFIG: &str = r#"
mqtt: {host: broker}
influxdb: {host: db, database: node}
http: {destination: "http://127.0.0.1:9/hook", action: bogus}
points:
  - measurement: temperature
    topic: node/+/thermometer
    fields: {value: $.payload}
    tags: {id: "$.topic[1]"}
    httpcontent: {temp: $.payload}
  - measurement: archived
    topic: node/#
    fields: {value: $.payload}
    database: archive
"#;

    #[tokio::test]
    async fn handler_writes_through_dispatcher() {
        let config = AppConfig::from_yaml_str(CONFIG).expect("config");
        let sink = Arc::new(InMemoryRecordSink::new("node"));
        let dispatcher = build_dispatcher(&config, sink.clone()).expect("dispatcher");

        ensure_databases(sink.as_ref(), &dispatcher, "node")
            .await
            .expect("databases");
        assert_eq!(sink.databases(), vec!["archive".to_string(), "node".to_string()]);

        let handler = DispatchHandler { dispatcher };
        handler
            .handle(InboundMessage {
                topic: "node/kit/thermometer".to_string(),
                payload: b"21.5".to_vec(),
                received_at: 1717243200.0,
                qos: 0,
            })
            .await
            .expect("handled");

        let stored = sink.records();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].database, "node");
        assert_eq!(stored[0].record.measurement, "temperature");
        assert_eq!(stored[1].database, "archive");
    }
}
