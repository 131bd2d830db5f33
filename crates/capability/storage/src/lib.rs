//! # Storage 模块
//!
//! 时序记录的写入抽象层，支持多种存储后端实现。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：`RecordSink` 异步写入接口
//! 2. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 3. **验证辅助层** (`validation.rs`)：写入前校验
//! 4. **编码层** (`line_protocol.rs`)：InfluxDB 行协议
//! 5. **实现层**：
//!    - `influxdb.rs`：InfluxDB 1.x HTTP 写入（生产环境使用）
//!    - `in_memory/`：内存实现（用于测试和演示）
//!
//! ## 数据库选择
//!
//! 每条记录可携带规则级数据库覆盖；未覆盖时写入配置的默认数据库。
//! 写入器负责确保目标数据库存在（启动时对默认库与所有覆盖库调用 `ensure_database`）。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use m2i_storage::{InfluxDbSink, InfluxDbSinkConfig, RecordSink};
//!
//! let sink = InfluxDbSink::new(InfluxDbSinkConfig {
//!     host: "127.0.0.1".to_string(),
//!     port: 8086,
//!     username: "root".to_string(),
//!     password: "root".to_string(),
//!     database: "node".to_string(),
//!     ssl: false,
//!     timeout: None,
//!     retries: 3,
//! })?;
//! sink.ensure_database("node").await?;
//! sink.write(&record, None).await?;
//! ```

pub mod error;
pub mod in_memory;
pub mod influxdb;
pub mod line_protocol;
pub mod traits;
pub mod validation;

pub use error::*;
pub use influxdb::{InfluxDbSink, InfluxDbSinkConfig};
pub use line_protocol::encode_record;
pub use traits::*;
pub use validation::*;

pub use in_memory::{InMemoryRecordSink, StoredRecord};
