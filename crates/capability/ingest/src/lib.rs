use async_trait::async_trait;
use domain::InboundMessage;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS, SubscribeFilter,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
    #[error("source error: {0}")]
    Source(String),
}

/// 入站消息处理器。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage) -> Result<(), IngestError>;
}

/// 采集源抽象。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(&self, handler: Arc<dyn MessageHandler>) -> Result<(), IngestError>;
}

/// 占位源（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait]
impl Source for NoopSource {
    async fn run(&self, _handler: Arc<dyn MessageHandler>) -> Result<(), IngestError> {
        Ok(())
    }
}

/// MQTT 采集源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 未配置时生成 `mqtt2influxdb-<uuid>`。
    pub client_id: Option<String>,
    /// 订阅的 topic filter（会去重）。
    pub topics: Vec<String>,
}

/// MQTT 采集源。
///
/// 每次连接确认后重新订阅全部 topic；消息按到达顺序逐条交给处理器，
/// 处理完成前不会读取下一条。
#[derive(Debug, Clone)]
pub struct MqttSource {
    config: MqttSourceConfig,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MqttSourceConfig {
        &self.config
    }

    fn client_id(&self) -> String {
        match &self.config.client_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => format!("mqtt2influxdb-{}", uuid::Uuid::new_v4()),
        }
    }
}

#[async_trait]
impl Source for MqttSource {
    async fn run(&self, handler: Arc<dyn MessageHandler>) -> Result<(), IngestError> {
        let topics = dedup_topics(&self.config.topics);
        if topics.is_empty() {
            return Err(IngestError::Source("no topics to subscribe".to_string()));
        }

        let client_id = self.client_id();
        let mut options = MqttOptions::new(client_id.clone(), self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(username) = self.config.username.as_ref() {
            options.set_credentials(username, self.config.password.clone().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        info!(
            target: "m2i.ingest",
            host = %self.config.host,
            port = self.config.port,
            client_id = %client_id,
            "mqtt_connecting"
        );

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        warn!(target: "m2i.ingest", code = ?ack.code, "mqtt_connect_refused");
                        continue;
                    }
                    info!(target: "m2i.ingest", topics = topics.len(), "mqtt_connected");
                    let filters = topics
                        .iter()
                        .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtMostOnce));
                    if let Err(err) = client.subscribe_many(filters).await {
                        warn!(target: "m2i.ingest", error = %err, "mqtt_subscribe_failed");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        target: "m2i.ingest",
                        topic = %publish.topic,
                        payload_size = publish.payload.len(),
                        "mqtt_message"
                    );
                    let message = InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                        received_at: now_epoch_seconds(),
                        qos: qos_level(publish.qos),
                    };
                    if let Err(err) = handler.handle(message).await {
                        warn!(target: "m2i.ingest", topic = %publish.topic, error = %err, "message_handler_failed");
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!(target: "m2i.ingest", "mqtt_disconnected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(target: "m2i.ingest", error = %err, "mqtt_eventloop_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// 去重并保持首次出现的顺序。
pub fn dedup_topics(topics: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(topics.len());
    for topic in topics {
        if !unique.contains(topic) {
            unique.push(topic.clone());
        }
    }
    unique
}

fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

fn now_epoch_seconds() -> f64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_secs_f64()
}
