//! 消息 → 记录 转换引擎。
//!
//! - [`path`]：上下文树上的路径查找
//! - [`expr`]：占位符算术表达式
//! - [`value_ref`]：字面量 / 路径 / 表达式 三种取值方式
//! - [`coerce`]：字段类型转换
//! - [`schedule`]：cron 时间窗判定
//! - [`rule`]：规则模型
//! - [`topic`]：topic filter 匹配
//! - [`builder`]：按规则组装记录

pub mod builder;
pub mod coerce;
pub mod expr;
pub mod path;
pub mod rule;
pub mod schedule;
pub mod topic;
pub mod value_ref;

pub use builder::{Base64Decode, BuildError, RecordBuilder, record_time};
pub use coerce::Conversion;
pub use expr::{ExprError, Expression, Number};
pub use path::{JsonPath, PathError};
pub use rule::{FieldSpec, FieldsSpec, Rule};
pub use schedule::{CronSchedule, ScheduleError};
pub use topic::{TopicError, topic_matches, validate_topic_filter};
pub use value_ref::{ValueRef, ValueRefError};
