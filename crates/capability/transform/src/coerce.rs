//! 字段类型转换。

use domain::RecordValue;

/// 支持的类型转换（固定枚举，配置加载时确定）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    Int,
    Float,
    Str,
    Bool,
    BoolToInt,
    /// 未知名称：原样透传。
    Passthrough(String),
}

impl Conversion {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "int" | "integer" => Self::Int,
            "float" => Self::Float,
            "str" | "string" => Self::Str,
            "bool" | "boolean" => Self::Bool,
            "booltoint" => Self::BoolToInt,
            other => Self::Passthrough(other.to_string()),
        }
    }

    /// 转换失败返回 None，由调用方丢弃该字段。
    pub fn apply(&self, value: RecordValue) -> Option<RecordValue> {
        match self {
            Self::Int => to_int(value),
            Self::Float => to_float(value),
            Self::Str => Some(RecordValue::String(value.to_string())),
            Self::Bool => to_bool(value),
            Self::BoolToInt => Some(match value {
                RecordValue::Bool(v) => RecordValue::I64(i64::from(v)),
                other => other,
            }),
            Self::Passthrough(_) => Some(value),
        }
    }
}

fn to_int(value: RecordValue) -> Option<RecordValue> {
    match value {
        RecordValue::I64(v) => Some(RecordValue::I64(v)),
        RecordValue::F64(v) if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 => {
            Some(RecordValue::I64(v.trunc() as i64))
        }
        RecordValue::F64(_) => None,
        RecordValue::Bool(v) => Some(RecordValue::I64(i64::from(v))),
        RecordValue::String(v) => v.trim().parse::<i64>().ok().map(RecordValue::I64),
    }
}

fn to_float(value: RecordValue) -> Option<RecordValue> {
    match value {
        RecordValue::I64(v) => Some(RecordValue::F64(v as f64)),
        RecordValue::F64(v) => Some(RecordValue::F64(v)),
        RecordValue::Bool(v) => Some(RecordValue::F64(if v { 1.0 } else { 0.0 })),
        RecordValue::String(v) => v.trim().parse::<f64>().ok().map(RecordValue::F64),
    }
}

fn to_bool(value: RecordValue) -> Option<RecordValue> {
    match value {
        RecordValue::Bool(v) => Some(RecordValue::Bool(v)),
        RecordValue::I64(v) => Some(RecordValue::Bool(v != 0)),
        RecordValue::F64(v) => Some(RecordValue::Bool(v != 0.0)),
        RecordValue::String(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(RecordValue::Bool(true)),
            "0" | "false" | "off" | "no" | "" => Some(RecordValue::Bool(false)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booltoint_maps_booleans_only() {
        let conv = Conversion::from_name("booltoint");
        assert_eq!(conv.apply(RecordValue::Bool(true)), Some(RecordValue::I64(1)));
        assert_eq!(conv.apply(RecordValue::Bool(false)), Some(RecordValue::I64(0)));
        assert_eq!(conv.apply(RecordValue::F64(2.5)), Some(RecordValue::F64(2.5)));
    }

    #[test]
    fn int_conversion() {
        let conv = Conversion::from_name("int");
        assert_eq!(conv.apply(RecordValue::F64(-2.7)), Some(RecordValue::I64(-2)));
        assert_eq!(
            conv.apply(RecordValue::String(" 42 ".to_string())),
            Some(RecordValue::I64(42))
        );
        assert_eq!(conv.apply(RecordValue::Bool(true)), Some(RecordValue::I64(1)));
        assert_eq!(conv.apply(RecordValue::String("4.5".to_string())), None);
        assert_eq!(conv.apply(RecordValue::String("abc".to_string())), None);
    }

    #[test]
    fn float_string_and_bool_conversions() {
        assert_eq!(
            Conversion::Float.apply(RecordValue::String("1.25".to_string())),
            Some(RecordValue::F64(1.25))
        );
        assert_eq!(
            Conversion::Str.apply(RecordValue::I64(7)),
            Some(RecordValue::String("7".to_string()))
        );
        assert_eq!(
            Conversion::Bool.apply(RecordValue::String("ON".to_string())),
            Some(RecordValue::Bool(true))
        );
        assert_eq!(Conversion::Bool.apply(RecordValue::String("maybe".to_string())), None);
    }

    #[test]
    fn unknown_name_passes_value_through() {
        let conv = Conversion::from_name("decimal");
        assert_eq!(conv, Conversion::Passthrough("decimal".to_string()));
        assert_eq!(
            conv.apply(RecordValue::String("x".to_string())),
            Some(RecordValue::String("x".to_string()))
        );
    }
}
