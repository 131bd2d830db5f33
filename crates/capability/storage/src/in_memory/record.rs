//! 时序写入内存实现
//!
//! 仅用于本地测试和占位。

use crate::error::StorageError;
use crate::traits::RecordSink;
use crate::validation::{ensure_database, ensure_writable};
use domain::Record;
use std::collections::BTreeSet;
use std::sync::RwLock;

/// 已写入的记录及其目标数据库
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub database: String,
    pub record: Record,
}

/// 时序写入内存存储
pub struct InMemoryRecordSink {
    default_database: String,
    records: RwLock<Vec<StoredRecord>>,
    databases: RwLock<BTreeSet<String>>,
    fail_databases: RwLock<BTreeSet<String>>,
}

impl InMemoryRecordSink {
    /// 创建新的内存写入器
    pub fn new(default_database: impl Into<String>) -> Self {
        Self {
            default_database: default_database.into(),
            records: RwLock::new(Vec::new()),
            databases: RwLock::new(BTreeSet::new()),
            fail_databases: RwLock::new(BTreeSet::new()),
        }
    }

    /// 让写入指定数据库的请求失败（用于测试故障隔离）
    pub fn fail_writes_to(&self, database: impl Into<String>) {
        if let Ok(mut fail) = self.fail_databases.write() {
            fail.insert(database.into());
        }
    }

    /// 获取当前累计的记录数量（用于测试）
    pub fn len(&self) -> usize {
        self.records.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已写入记录快照
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records.read().map(|v| v.clone()).unwrap_or_default()
    }

    /// 已创建的数据库
    pub fn databases(&self) -> Vec<String> {
        self.databases
            .read()
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl RecordSink for InMemoryRecordSink {
    async fn write(&self, record: &Record, database: Option<&str>) -> Result<(), StorageError> {
        let database = database.unwrap_or(self.default_database.as_str());
        ensure_database(database)?;
        ensure_writable(record)?;
        let failing = self
            .fail_databases
            .read()
            .map_err(|_| StorageError::new("lock failed"))?
            .contains(database);
        if failing {
            return Err(StorageError::new(format!("write to {} rejected", database)));
        }
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        records.push(StoredRecord {
            database: database.to_string(),
            record: record.clone(),
        });
        Ok(())
    }

    async fn ensure_database(&self, database: &str) -> Result<(), StorageError> {
        ensure_database(database)?;
        let mut databases = self
            .databases
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        databases.insert(database.to_string());
        Ok(())
    }
}
