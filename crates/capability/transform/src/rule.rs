//! 规则模型：一条规则对应配置中的一个 point。

use crate::coerce::Conversion;
use crate::path::JsonPath;
use crate::schedule::CronSchedule;
use crate::value_ref::ValueRef;
use std::collections::BTreeMap;

const LEGACY_TYPE_KEY: &str = "type";
const LEGACY_VALUE_KEY: &str = "value";
const LEGACY_BOOLTOINT: &str = "booltoint";

/// 单个字段定义。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    Value(ValueRef),
    Typed {
        value: ValueRef,
        conversion: Conversion,
    },
}

impl FieldSpec {
    pub fn value_ref(&self) -> &ValueRef {
        match self {
            Self::Value(value) | Self::Typed { value, .. } => value,
        }
    }

    pub fn conversion(&self) -> Option<&Conversion> {
        match self {
            Self::Value(_) => None,
            Self::Typed { conversion, .. } => Some(conversion),
        }
    }
}

/// 字段集合：逐字段映射，或一个路径直接给出整组字段（JSON 对象）。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldsSpec {
    Map(BTreeMap<String, FieldSpec>),
    Path(JsonPath),
}

impl FieldsSpec {
    /// 由逐字段映射构建。
    ///
    /// 兼容旧写法：`type: booltoint` 不是字段，而是要求同级 `value` 字段把布尔值写成整数。
    pub fn from_map(mut fields: BTreeMap<String, FieldSpec>) -> Self {
        let legacy_booltoint = matches!(
            fields.get(LEGACY_TYPE_KEY),
            Some(FieldSpec::Value(value)) if value.as_literal() == Some(LEGACY_BOOLTOINT)
        );
        if legacy_booltoint {
            fields.remove(LEGACY_TYPE_KEY);
            if let Some(FieldSpec::Value(value)) = fields.remove(LEGACY_VALUE_KEY) {
                fields.insert(
                    LEGACY_VALUE_KEY.to_string(),
                    FieldSpec::Typed {
                        value,
                        conversion: Conversion::BoolToInt,
                    },
                );
            }
        }
        Self::Map(fields)
    }
}

/// 一条 topic → 记录 的映射规则，加载后不可变。
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// MQTT 订阅过滤器（支持 `+` / `#`）。
    pub topic: String,
    pub measurement: ValueRef,
    pub fields: FieldsSpec,
    pub tags: BTreeMap<String, ValueRef>,
    pub schedule: Option<CronSchedule>,
    /// 覆盖默认数据库。
    pub database: Option<String>,
    /// HTTP 转发内容（仅在启用转发时使用）。
    pub http_content: Option<BTreeMap<String, ValueRef>>,
}

impl Rule {
    pub fn new(topic: impl Into<String>, measurement: ValueRef, fields: FieldsSpec) -> Self {
        Self {
            topic: topic.into(),
            measurement,
            fields,
            tags: BTreeMap::new(),
            schedule: None,
            database: None,
            http_content: None,
        }
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, ValueRef>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_schedule(mut self, schedule: CronSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_http_content(mut self, content: BTreeMap<String, ValueRef>) -> Self {
        self.http_content = Some(content);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_booltoint_directive_becomes_conversion() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "value".to_string(),
            FieldSpec::Value(ValueRef::parse("$.payload").expect("parse")),
        );
        fields.insert("type".to_string(), FieldSpec::Value(ValueRef::literal("booltoint")));

        let FieldsSpec::Map(fields) = FieldsSpec::from_map(fields) else {
            panic!("expected map");
        };
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["value"].conversion(), Some(&Conversion::BoolToInt));
    }

    #[test]
    fn plain_type_field_is_kept() {
        let mut fields = BTreeMap::new();
        fields.insert("type".to_string(), FieldSpec::Value(ValueRef::literal("sensor")));

        let FieldsSpec::Map(fields) = FieldsSpec::from_map(fields) else {
            panic!("expected map");
        };
        assert!(fields.contains_key("type"));
    }
}
