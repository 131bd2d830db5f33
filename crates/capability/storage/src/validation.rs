//! 验证辅助函数
//!
//! 写入前的统一校验：
//! - ensure_database：数据库名非空
//! - ensure_writable：记录满足写入前提（measurement 与字段非空）

use crate::error::StorageError;
use domain::Record;

/// 验证数据库名非空
pub fn ensure_database(database: &str) -> Result<(), StorageError> {
    if database.trim().is_empty() {
        return Err(StorageError::new("database required"));
    }
    Ok(())
}

/// 验证记录可写
///
/// 时序库拒绝无字段的点，这里提前拦截。
pub fn ensure_writable(record: &Record) -> Result<(), StorageError> {
    if record.measurement.is_empty() {
        return Err(StorageError::new("measurement required"));
    }
    if record.fields.is_empty() {
        return Err(StorageError::new("record has no fields"));
    }
    Ok(())
}
