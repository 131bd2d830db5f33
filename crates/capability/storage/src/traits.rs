//! 存储接口 Trait 定义
//!
//! - RecordSink：时序记录写入
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use async_trait::async_trait;
use domain::Record;

/// 时序记录写入接口
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// 写入单条记录；`database` 为 None 时写入默认数据库
    async fn write(&self, record: &Record, database: Option<&str>) -> Result<(), StorageError>;

    /// 确保数据库存在（启动时调用）
    async fn ensure_database(&self, database: &str) -> Result<(), StorageError>;
}
