//! 五段式 cron 调度判定（分 时 日 月 周）。

use chrono::{Datelike, Timelike};
use std::fmt;

/// cron 解析错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("cron expression must have 5 fields, got {0}: {1}")]
    FieldCount(usize, String),
    #[error("invalid {field} field '{value}': {reason}")]
    Field {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    aliases: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    aliases: &[],
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    aliases: &[],
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    aliases: &[],
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    aliases: &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ],
};
// 7 也表示周日，解析后折叠到 0。
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    aliases: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
};

/// 已解析的 cron 调度。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fields = expr.split_whitespace().collect::<Vec<_>>();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(fields.len(), expr.to_string()));
        }
        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }
        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field(fields[0], &MINUTE)?,
            hours: parse_field(fields[1], &HOUR)?,
            days_of_month: parse_field(fields[2], &DAY_OF_MONTH)?,
            months: parse_field(fields[3], &MONTH)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 判断给定时刻所在的分钟是否命中调度。
    ///
    /// 日与周同时受限时任一命中即可（与标准 cron 一致）。
    pub fn is_active<T: Datelike + Timelike>(&self, now: &T) -> bool {
        let hit = |mask: u64, value: u32| mask & (1u64 << value) != 0;
        if !hit(self.minutes, now.minute())
            || !hit(self.hours, now.hour())
            || !hit(self.months, now.month())
        {
            return false;
        }
        let dom = hit(self.days_of_month, now.day());
        let dow = hit(self.days_of_week, now.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(text: &str, spec: &FieldSpec) -> Result<u64, ScheduleError> {
    let invalid = |reason: &'static str| ScheduleError::Field {
        field: spec.name,
        value: text.to_string(),
        reason,
    };

    let mut mask = 0u64;
    for item in text.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step = step.parse::<u32>().map_err(|_| invalid("bad step"))?;
                if step == 0 {
                    return Err(invalid("step must be positive"));
                }
                if step > spec.max {
                    return Err(invalid("step exceeds field range"));
                }
                (range, Some(step))
            }
            None => (item, None),
        };
        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            let lo = parse_value(lo, spec).ok_or_else(|| invalid("bad range"))?;
            let hi = parse_value(hi, spec).ok_or_else(|| invalid("bad range"))?;
            (lo, hi)
        } else {
            let start = parse_value(range, spec).ok_or_else(|| invalid("bad value"))?;
            // `a/n` 表示从 a 开始到上限
            let end = if step.is_some() { spec.max } else { start };
            (start, end)
        };
        if start > end {
            return Err(invalid("range start exceeds end"));
        }
        let step = step.unwrap_or(1);
        let mut value = start;
        while value <= end {
            mask |= 1u64 << value;
            match value.checked_add(step) {
                Some(next) => value = next,
                None => break,
            }
        }
    }
    Ok(mask)
}

fn parse_value(text: &str, spec: &FieldSpec) -> Option<u32> {
    let lowered = text.trim().to_ascii_lowercase();
    let value = match spec.aliases.iter().position(|alias| *alias == lowered) {
        Some(index) => index as u32 + spec.min,
        None => lowered.parse::<u32>().ok()?,
    };
    (spec.min..=spec.max).contains(&value).then_some(value)
}
