//! 记录构建：规则 + 消息上下文 → 一条时序记录。

use crate::rule::{FieldsSpec, Rule};
use crate::value_ref::ValueRef;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::{MessageContext, Record, RecordValue};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const PAYLOAD_TIMESTAMP_KEY: &str = "timestamp";

/// 记录未生成的原因。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("measurement did not resolve: {0}")]
    MissingMeasurement(String),
    #[error("no field resolved")]
    EmptyFields,
}

/// base64 旁路解码配置。
#[derive(Debug, Clone, PartialEq)]
pub struct Base64Decode {
    pub source: ValueRef,
    pub target: String,
}

/// 记录构建器。
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    base64: Option<Base64Decode>,
}

impl RecordBuilder {
    pub fn new(base64: Option<Base64Decode>) -> Self {
        Self { base64 }
    }

    /// 按规则构建记录。
    ///
    /// `ctx` 只会被追加 base64 解码结果（每个上下文一次），其余只读。
    pub fn build(
        &self,
        rule: &Rule,
        ctx: &mut MessageContext,
        now: DateTime<Utc>,
    ) -> Result<Record, BuildError> {
        let measurement = rule
            .measurement
            .resolve(ctx)
            .and_then(|value| measurement_name(&value))
            .ok_or_else(|| BuildError::MissingMeasurement(rule.measurement.to_string()))?;

        let time = record_time(ctx.payload(), now);

        if let Some(decode) = &self.base64 {
            attach_base64(decode, ctx);
        }

        let fields = match &rule.fields {
            FieldsSpec::Map(specs) => {
                let mut fields = BTreeMap::new();
                for (name, spec) in specs {
                    let value = spec
                        .value_ref()
                        .resolve(ctx)
                        .and_then(|value| RecordValue::from_json(&value));
                    let value = match (value, spec.conversion()) {
                        (Some(value), Some(conversion)) => {
                            let converted = conversion.apply(value.clone());
                            if converted.is_none() {
                                warn!(
                                    target: "m2i.transform",
                                    field = %name,
                                    value = %value,
                                    conversion = ?conversion,
                                    "field_conversion_failed"
                                );
                            }
                            converted
                        }
                        (value, _) => value,
                    };
                    match value {
                        Some(value) => {
                            fields.insert(name.clone(), value);
                        }
                        None => warn!(
                            target: "m2i.transform",
                            field = %name,
                            source = %spec.value_ref(),
                            "field_unresolved"
                        ),
                    }
                }
                if fields.len() != specs.len() {
                    warn!(
                        target: "m2i.transform",
                        configured = specs.len(),
                        resolved = fields.len(),
                        "field_count_mismatch"
                    );
                }
                fields
            }
            FieldsSpec::Path(path) => match path.find_first(ctx.tree()) {
                Some(Value::Object(members)) => members
                    .iter()
                    .filter_map(|(name, value)| {
                        RecordValue::from_json(value).map(|value| (name.clone(), value))
                    })
                    .collect(),
                other => {
                    warn!(
                        target: "m2i.transform",
                        path = %path,
                        found = ?other,
                        "fields_path_not_object"
                    );
                    BTreeMap::new()
                }
            },
        };

        if fields.is_empty() {
            return Err(BuildError::EmptyFields);
        }

        let mut tags = BTreeMap::new();
        for (name, source) in &rule.tags {
            match source
                .resolve(ctx)
                .and_then(|value| RecordValue::from_json(&value))
            {
                Some(value) => {
                    tags.insert(name.clone(), value);
                }
                None => warn!(
                    target: "m2i.transform",
                    tag = %name,
                    source = %source,
                    "tag_unresolved"
                ),
            }
        }
        if tags.len() != rule.tags.len() {
            warn!(
                target: "m2i.transform",
                configured = rule.tags.len(),
                resolved = tags.len(),
                "tag_count_mismatch"
            );
        }

        Ok(Record {
            measurement,
            time,
            tags,
            fields,
        })
    }
}

fn measurement_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) if !name.is_empty() => Some(name.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(v) => Some(v.to_string()),
        _ => None,
    }
}

/// 优先使用载荷内的 `timestamp`（Unix 秒），否则使用当前时间。
///
/// 载荷不是 JSON 对象时不做提取。
pub fn record_time(payload: &Value, now: DateTime<Utc>) -> String {
    let embedded = match payload {
        Value::Object(map) => map.get(PAYLOAD_TIMESTAMP_KEY),
        _ => None,
    };
    let parsed = embedded.and_then(|value| {
        let seconds = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        from_epoch_seconds(seconds)
    });
    match (embedded, parsed) {
        (Some(_), Some(time)) => {
            debug!(target: "m2i.transform", "payload_timestamp_used");
            time.to_rfc3339_opts(SecondsFormat::Secs, true)
        }
        (Some(value), None) => {
            warn!(target: "m2i.transform", value = %value, "payload_timestamp_invalid");
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        }
        _ => now.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
        return None;
    }
    let nanos = ((seconds - whole) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos.min(999_999_999))
}

fn attach_base64(decode: &Base64Decode, ctx: &mut MessageContext) {
    if ctx.has_decoded(&decode.target) {
        return;
    }
    let encoded = match decode.source.resolve(ctx) {
        Some(Value::String(text)) => text,
        other => {
            warn!(
                target: "m2i.transform",
                source = %decode.source,
                found = ?other,
                "base64_source_not_string"
            );
            return;
        }
    };
    match BASE64.decode(encoded.trim()) {
        Ok(raw) => ctx.attach_decoded(&decode.target, &raw),
        Err(err) => warn!(
            target: "m2i.transform",
            source = %decode.source,
            error = %err,
            "base64_decode_failed"
        ),
    }
}
