//! InfluxDB 行协议编码
//!
//! `measurement,tag=v field=1i,other="s" <epoch_seconds>`

use crate::error::StorageError;
use crate::validation::ensure_writable;
use chrono::DateTime;
use domain::{Record, RecordValue};

/// 将记录编码为一行行协议（时间精度：秒）
pub fn encode_record(record: &Record) -> Result<String, StorageError> {
    ensure_writable(record)?;
    let seconds = DateTime::parse_from_rfc3339(&record.time)
        .map_err(|err| StorageError::new(format!("invalid record time {}: {}", record.time, err)))?
        .timestamp();

    let mut line = escape(&record.measurement, &[',', ' ']);
    for (key, value) in &record.tags {
        let value = value.to_string();
        // 空标签值会被 InfluxDB 拒绝
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(&value, &[',', '=', ' ']));
    }

    let fields = record
        .fields
        .iter()
        .map(|(key, value)| {
            Ok(format!(
                "{}={}",
                escape(key, &[',', '=', ' ']),
                field_value(value)?
            ))
        })
        .collect::<Result<Vec<_>, StorageError>>()?;
    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&seconds.to_string());
    Ok(line)
}

fn field_value(value: &RecordValue) -> Result<String, StorageError> {
    Ok(match value {
        RecordValue::I64(v) => format!("{}i", v),
        RecordValue::F64(v) if v.is_finite() => {
            // 保证浮点字段始终带小数形式，避免与整数字段类型冲突
            if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{:.1}", v)
            } else {
                v.to_string()
            }
        }
        RecordValue::F64(v) => return Err(StorageError::new(format!("non-finite field value {}", v))),
        RecordValue::Bool(v) => v.to_string(),
        RecordValue::String(v) => format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")),
    })
}

fn escape(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
