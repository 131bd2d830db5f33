//! 应用运行配置加载：YAML 文件 + 环境变量覆盖。
//!
//! 加载流程：
//! 1. 读取并反序列化 YAML（[`raw`]）
//! 2. 校验并转换为规则模型（topic、路径、表达式、cron 在加载期解析）
//! 3. 应用 `M2I_*` 环境变量覆盖（连接参数）

mod raw;

use m2i_forward::HttpMethod;
use m2i_transform::{
    Base64Decode, Conversion, CronSchedule, FieldSpec, FieldsSpec, JsonPath, Rule, ValueRef,
    validate_topic_filter,
};
use raw::{RawConfig, RawField, RawFields, RawPoint, Scalar};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::error;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required value: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// MQTT 连接配置。
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
}

/// InfluxDB 连接配置。
#[derive(Debug, Clone, PartialEq)]
pub struct InfluxDbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl: bool,
    pub timeout: Option<Duration>,
    pub retries: usize,
}

/// HTTP 转发配置。
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub destination: String,
    /// 原始动词文本。
    pub action: String,
    /// 无法识别的动词为 None（加载时已记录错误日志）。
    pub method: Option<HttpMethod>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub influxdb: InfluxDbConfig,
    pub base64decode: Option<Base64Decode>,
    pub http: Option<HttpConfig>,
    pub rules: Vec<Rule>,
}

impl AppConfig {
    /// 读取配置文件并应用环境变量覆盖。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_path(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// 仅读取配置文件。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;
        Self::from_raw(raw)
    }

    /// 连接参数的环境变量覆盖（`.env` 由调用方先加载）。
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(host) = read_optional("M2I_MQTT_HOST") {
            self.mqtt.host = host;
        }
        self.mqtt.port = read_u16_with_default("M2I_MQTT_PORT", self.mqtt.port)?;
        if let Some(username) = read_optional("M2I_MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = read_optional("M2I_MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(host) = read_optional("M2I_INFLUXDB_HOST") {
            self.influxdb.host = host;
        }
        self.influxdb.port = read_u16_with_default("M2I_INFLUXDB_PORT", self.influxdb.port)?;
        if let Some(username) = read_optional("M2I_INFLUXDB_USERNAME") {
            self.influxdb.username = username;
        }
        if let Some(password) = read_optional("M2I_INFLUXDB_PASSWORD") {
            self.influxdb.password = password;
        }
        Ok(())
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mqtt = MqttConfig {
            host: required("mqtt.host", raw.mqtt.host)?,
            port: raw.mqtt.port,
            username: raw.mqtt.username.filter(|v| !v.is_empty()),
            password: raw.mqtt.password,
            client_id: raw.mqtt.client_id.filter(|v| !v.trim().is_empty()),
        };

        let influxdb = InfluxDbConfig {
            host: required("influxdb.host", raw.influxdb.host)?,
            port: raw.influxdb.port,
            database: required("influxdb.database", raw.influxdb.database)?,
            username: raw.influxdb.username,
            password: raw.influxdb.password,
            ssl: raw.influxdb.ssl,
            timeout: raw.influxdb.timeout_seconds.map(Duration::from_secs),
            retries: raw.influxdb.retries,
        };

        let base64decode = match raw.base64decode {
            Some(decode) => Some(Base64Decode {
                source: value_ref("base64decode.source", &decode.source)?,
                target: required("base64decode.target", decode.target)?,
            }),
            None => None,
        };

        let http = match raw.http {
            Some(http) => {
                let method = match http.action.parse::<HttpMethod>() {
                    Ok(method) => Some(method),
                    Err(err) => {
                        error!(
                            target: "m2i.config",
                            action = %http.action,
                            error = %err,
                            "http_action_invalid"
                        );
                        None
                    }
                };
                Some(HttpConfig {
                    destination: required("http.destination", http.destination)?,
                    action: http.action,
                    method,
                    username: http.username,
                    password: http.password,
                })
            }
            None => None,
        };

        if raw.points.is_empty() {
            return Err(ConfigError::Missing("points".to_string()));
        }
        let rules = raw
            .points
            .into_iter()
            .enumerate()
            .map(|(index, point)| build_rule(index, point))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            mqtt,
            influxdb,
            base64decode,
            http,
            rules,
        })
    }
}

fn build_rule(index: usize, point: RawPoint) -> Result<Rule, ConfigError> {
    let location = format!("points[{}]", index);

    validate_topic_filter(&point.topic)
        .map_err(|err| ConfigError::Invalid(format!("{}.topic", location), err.to_string()))?;
    let measurement = value_ref(&format!("{}.measurement", location), &point.measurement)?;

    let fields = match point.fields {
        RawFields::Path(path) => FieldsSpec::Path(
            JsonPath::parse(&path)
                .map_err(|err| ConfigError::Invalid(format!("{}.fields", location), err.to_string()))?,
        ),
        RawFields::Map(entries) => {
            if entries.is_empty() {
                return Err(ConfigError::Missing(format!("{}.fields", location)));
            }
            let mut fields = BTreeMap::new();
            for (name, field) in entries {
                let field_location = format!("{}.fields.{}", location, name);
                fields.insert(name, field_spec(&field_location, field)?);
            }
            FieldsSpec::from_map(fields)
        }
    };

    let mut rule = Rule::new(point.topic, measurement, fields);

    let mut tags = BTreeMap::new();
    for (name, source) in &point.tags {
        tags.insert(
            name.clone(),
            value_ref(&format!("{}.tags.{}", location, name), source)?,
        );
    }
    rule = rule.with_tags(tags);

    if let Some(schedule) = point.schedule {
        let schedule = CronSchedule::parse(&schedule).map_err(|err| {
            ConfigError::Invalid(format!("{}.schedule", location), err.to_string())
        })?;
        rule = rule.with_schedule(schedule);
    }

    if let Some(database) = point.database {
        rule = rule.with_database(required(&format!("{}.database", location), database)?);
    }

    if let Some(content) = point.httpcontent {
        let mut resolved = BTreeMap::new();
        for (name, source) in &content {
            resolved.insert(
                name.clone(),
                value_ref(&format!("{}.httpcontent.{}", location, name), source)?,
            );
        }
        rule = rule.with_http_content(resolved);
    }

    Ok(rule)
}

/// 非文本标量按原类型写入（字面量 + 对应转换），文本按取值语法解析。
fn field_spec(location: &str, field: RawField) -> Result<FieldSpec, ConfigError> {
    match field {
        RawField::Typed { value, kind } => Ok(FieldSpec::Typed {
            value: value_ref(location, &value)?,
            conversion: Conversion::from_name(&kind),
        }),
        RawField::Bare(Scalar::Text(text)) => Ok(FieldSpec::Value(parse_value_ref(location, &text)?)),
        RawField::Bare(scalar) => {
            let conversion = match scalar {
                Scalar::Bool(_) => Conversion::Bool,
                Scalar::Int(_) => Conversion::Int,
                _ => Conversion::Float,
            };
            Ok(FieldSpec::Typed {
                value: ValueRef::literal(scalar.to_text()),
                conversion,
            })
        }
    }
}

fn value_ref(location: &str, scalar: &Scalar) -> Result<ValueRef, ConfigError> {
    match scalar {
        Scalar::Text(text) => parse_value_ref(location, text),
        other => Ok(ValueRef::literal(other.to_text())),
    }
}

fn parse_value_ref(location: &str, text: &str) -> Result<ValueRef, ConfigError> {
    ValueRef::parse(text).map_err(|err| ConfigError::Invalid(location.to_string(), err.to_string()))
}

fn required(location: &str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(location.to_string()));
    }
    Ok(value)
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
