//! YAML 文件的原始结构（反序列化后再校验、转换为领域类型）。

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawConfig {
    pub mqtt: RawMqtt,
    pub influxdb: RawInfluxDb,
    pub base64decode: Option<RawBase64Decode>,
    pub http: Option<RawHttp>,
    #[serde(default)]
    pub points: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawMqtt {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawInfluxDb {
    pub host: String,
    #[serde(default = "default_influxdb_port")]
    pub port: u16,
    pub database: String,
    #[serde(default = "default_influxdb_credential")]
    pub username: String,
    #[serde(default = "default_influxdb_credential")]
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_retries")]
    pub retries: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawBase64Decode {
    pub source: Scalar,
    pub target: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawHttp {
    pub destination: String,
    #[serde(default = "default_http_action")]
    pub action: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawPoint {
    pub measurement: Scalar,
    pub topic: String,
    pub schedule: Option<String>,
    pub fields: RawFields,
    #[serde(default)]
    pub tags: BTreeMap<String, Scalar>,
    pub database: Option<String>,
    pub httpcontent: Option<BTreeMap<String, Scalar>>,
}

/// `fields` 可以是一个路径，也可以是逐字段映射。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawFields {
    Path(String),
    Map(BTreeMap<String, RawField>),
}

/// 单字段：`{value, type}` 或直接一个标量。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawField {
    Typed {
        value: Scalar,
        #[serde(rename = "type")]
        kind: String,
    },
    Bare(Scalar),
}

/// YAML 标量。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Bool(v) => v.to_string(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Text(v) => v.clone(),
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_influxdb_port() -> u16 {
    8086
}

fn default_influxdb_credential() -> String {
    "root".to_string()
}

fn default_retries() -> usize {
    3
}

fn default_http_action() -> String {
    "post".to_string()
}
