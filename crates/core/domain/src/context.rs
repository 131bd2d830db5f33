//! 单条消息的求值上下文。
//!
//! 上下文以一棵 JSON 树保存，路径表达式直接在树上求值：
//!
//! ```text
//! {
//!   "topic": ["node", "a", "temperature"],
//!   "payload": <JSON 或原始字符串>,
//!   "timestamp": 1700000000.25,
//!   "qos": 1,
//!   "base64decoded": { "<target>": { "raw": [..], "hex": ".." } }
//! }
//! ```

use serde_json::{Map, Value};

const TOPIC_KEY: &str = "topic";
const PAYLOAD_KEY: &str = "payload";
const TIMESTAMP_KEY: &str = "timestamp";
const QOS_KEY: &str = "qos";
const DECODED_KEY: &str = "base64decoded";

/// 消息上下文：每条消息构建一次，在所有匹配规则之间复用。
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    tree: Value,
}

impl MessageContext {
    pub fn new(topic: &str, payload: Value, timestamp: f64, qos: u8) -> Self {
        let segments = topic
            .split('/')
            .map(|segment| Value::String(segment.to_string()))
            .collect::<Vec<_>>();
        let timestamp = serde_json::Number::from_f64(timestamp)
            .map(Value::Number)
            .unwrap_or(Value::Null);

        let mut root = Map::new();
        root.insert(TOPIC_KEY.to_string(), Value::Array(segments));
        root.insert(PAYLOAD_KEY.to_string(), payload);
        root.insert(TIMESTAMP_KEY.to_string(), timestamp);
        root.insert(QOS_KEY.to_string(), Value::from(qos));
        Self {
            tree: Value::Object(root),
        }
    }

    /// 完整上下文树（路径表达式的根 `$`）。
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn payload(&self) -> &Value {
        self.tree.get(PAYLOAD_KEY).unwrap_or(&Value::Null)
    }

    pub fn topic_segments(&self) -> Vec<&str> {
        match self.tree.get(TOPIC_KEY) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// 是否已挂载指定 target 的 base64 解码结果。
    pub fn has_decoded(&self, target: &str) -> bool {
        self.tree
            .get(DECODED_KEY)
            .and_then(|decoded| decoded.get(target))
            .is_some()
    }

    /// 挂载 base64 解码结果：`raw` 为字节数组，`hex` 为小写十六进制串。
    pub fn attach_decoded(&mut self, target: &str, raw: &[u8]) {
        let hex = raw.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        let mut entry = Map::new();
        entry.insert(
            "raw".to_string(),
            Value::Array(raw.iter().map(|b| Value::from(*b)).collect()),
        );
        entry.insert("hex".to_string(), Value::String(hex));

        let Value::Object(root) = &mut self.tree else {
            return;
        };
        let decoded = root
            .entry(DECODED_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(decoded) = decoded {
            decoded.insert(target.to_string(), Value::Object(entry));
        }
    }
}
