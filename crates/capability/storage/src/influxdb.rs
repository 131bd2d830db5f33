//! InfluxDB 1.x HTTP 写入实现
//!
//! - `POST /write?db=<db>&precision=s`：行协议写入
//! - `POST /query`：`CREATE DATABASE`

use crate::error::StorageError;
use crate::line_protocol::encode_record;
use crate::traits::RecordSink;
use crate::validation::ensure_database;
use async_trait::async_trait;
use domain::Record;
use std::time::Duration;
use tracing::{debug, warn};

/// InfluxDB 连接配置
#[derive(Debug, Clone)]
pub struct InfluxDbSinkConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// 默认数据库
    pub database: String,
    pub ssl: bool,
    pub timeout: Option<Duration>,
    /// 写入失败后的重试次数
    pub retries: usize,
}

/// InfluxDB 记录写入器
#[derive(Clone)]
pub struct InfluxDbSink {
    client: reqwest::Client,
    base_url: String,
    config: InfluxDbSinkConfig,
}

impl InfluxDbSink {
    pub fn new(config: InfluxDbSinkConfig) -> Result<Self, StorageError> {
        ensure_database(&config.database)?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        let scheme = if config.ssl { "https" } else { "http" };
        let base_url = format!("{}://{}:{}", scheme, config.host, config.port);
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn default_database(&self) -> &str {
        &self.config.database
    }

    async fn post_write(&self, database: &str, line: &str) -> Result<(), WriteFailure> {
        let response = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[("db", database), ("precision", "s")])
            .basic_auth(&self.config.username, Some(&self.config.password))
            .body(line.to_string())
            .send()
            .await
            .map_err(|err| WriteFailure {
                error: err.into(),
                retryable: true,
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WriteFailure {
                error: StorageError::new(format!(
                    "influxdb write failed: {} {}",
                    status,
                    body.trim()
                )),
                // 4xx（如行协议错误）重试无意义
                retryable: status.is_server_error(),
            });
        }
        Ok(())
    }
}

/// 单次写入失败
struct WriteFailure {
    error: StorageError,
    retryable: bool,
}

#[async_trait]
impl RecordSink for InfluxDbSink {
    async fn write(&self, record: &Record, database: Option<&str>) -> Result<(), StorageError> {
        let database = database.unwrap_or(self.config.database.as_str());
        ensure_database(database)?;
        let line = encode_record(record)?;
        debug!(target: "m2i.storage", database = %database, line = %line, "influxdb_write");

        let mut attempt = 0;
        loop {
            match self.post_write(database, &line).await {
                Ok(()) => return Ok(()),
                Err(failure) => {
                    attempt += 1;
                    if !failure.retryable || attempt > self.config.retries {
                        return Err(failure.error);
                    }
                    warn!(
                        target: "m2i.storage",
                        database = %database,
                        attempt = attempt,
                        error = %failure.error,
                        "influxdb_write_retry"
                    );
                }
            }
        }
    }

    async fn ensure_database(&self, database: &str) -> Result<(), StorageError> {
        ensure_database(database)?;
        let statement = format!("CREATE DATABASE \"{}\"", database.replace('"', "\\\""));
        debug!(target: "m2i.storage", database = %database, "influxdb_create_database");
        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .form(&[("q", statement.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::new(format!(
                "influxdb create database failed: {} {}",
                status,
                body.trim()
            )));
        }
        Ok(())
    }
}
