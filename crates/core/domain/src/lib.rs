pub mod context;
pub mod data;

pub use context::MessageContext;
pub use data::{InboundMessage, Record, RecordValue};

use chrono::{DateTime, Utc};

/// 时钟抽象：调度判定和时间戳回退都从这里取"现在"。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定时钟（仅用于测试或回放）。
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
