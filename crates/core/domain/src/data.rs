use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// 协议输入原始消息。
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// 接收时间（Unix 秒，含小数部分）。
    pub received_at: f64,
    pub qos: u8,
}

/// 记录字段/标签的标量值。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
}

impl RecordValue {
    /// 从 JSON 值转换；null、数组、对象不是标量，返回 None。
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(Self::Bool(*v)),
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Some(Self::I64(v))
                } else {
                    n.as_f64().map(Self::F64)
                }
            }
            Value::String(v) => Some(Self::String(v.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// 转回 JSON 值（非有限浮点数返回 None）。
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::I64(v) => Some(Value::from(*v)),
            Self::F64(v) => serde_json::Number::from_f64(*v).map(Value::Number),
            Self::Bool(v) => Some(Value::Bool(*v)),
            Self::String(v) => Some(Value::String(v.clone())),
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I64(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
        }
    }
}

/// 待写入时序库的一条记录。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub measurement: String,
    /// RFC3339 UTC 时间字符串。
    pub time: String,
    pub tags: BTreeMap<String, RecordValue>,
    pub fields: BTreeMap<String, RecordValue>,
}
