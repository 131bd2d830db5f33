//! 值引用：字面量、路径查找或算术表达式。

use crate::expr::{ExprError, Expression, Number};
use crate::path::{JsonPath, PLACEHOLDER_PREFIX, PathError};
use domain::MessageContext;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error, warn};

/// 值引用解析错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueRefError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// 配置中"如何从消息上下文取一个值"的描述。
///
/// 配置语法：`$` 开头为路径，`=` 开头为表达式，其余为字面量。
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRef {
    Literal(String),
    Path(JsonPath),
    Expression(Expression),
}

impl ValueRef {
    pub fn parse(text: &str) -> Result<Self, ValueRefError> {
        let trimmed = text.trim_start();
        if trimmed.starts_with('$') {
            return Ok(Self::Path(JsonPath::parse(trimmed)?));
        }
        if let Some(expr) = trimmed.strip_prefix('=') {
            return Ok(Self::Expression(Expression::parse(expr)?));
        }
        Ok(Self::Literal(text.to_string()))
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// 在上下文上求值；未命中或求值失败返回 None。
    pub fn resolve(&self, ctx: &MessageContext) -> Option<Value> {
        match self {
            Self::Literal(text) => Some(Value::String(text.clone())),
            Self::Path(path) => match path.find_first(ctx.tree()) {
                Some(Value::Null) | None => None,
                Some(value) => Some(value.clone()),
            },
            Self::Expression(expr) => resolve_expression(expr, ctx),
        }
    }

    /// 字面量的文本（用于识别 `type: booltoint` 之类的指令项）。
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.write_str(text),
            Self::Path(path) => write!(f, "{}", path),
            Self::Expression(expr) => write!(f, "= {}", expr),
        }
    }
}

fn resolve_expression(expr: &Expression, ctx: &MessageContext) -> Option<Value> {
    let mut vars = HashMap::new();
    for name in expr.variables() {
        if !name.starts_with(PLACEHOLDER_PREFIX) {
            error!(
                target: "m2i.transform",
                variable = %name,
                expression = %expr,
                "expression_variable_rejected"
            );
            continue;
        }
        let path = match JsonPath::from_placeholder(name) {
            Ok(path) => path,
            Err(err) => {
                error!(target: "m2i.transform", variable = %name, error = %err, "expression_variable_rejected");
                continue;
            }
        };
        match path.find_first(ctx.tree()) {
            Some(value) => match bind_number(value) {
                Some(number) => {
                    vars.insert(name.clone(), number);
                }
                None => warn!(
                    target: "m2i.transform",
                    variable = %name,
                    value = %value,
                    "expression_variable_not_numeric"
                ),
            },
            None => error!(
                target: "m2i.transform",
                variable = %name,
                path = %path,
                "expression_field_missing"
            ),
        }
    }

    debug!(target: "m2i.transform", expression = %expr, vars = ?vars, "expression_evaluate");
    match expr.evaluate(&vars) {
        Ok(Number::Int(v)) => Some(Value::from(v)),
        Ok(Number::Float(v)) => serde_json::Number::from_f64(v).map(Value::Number),
        Err(err) => {
            warn!(target: "m2i.transform", expression = %expr, error = %err, "expression_failed");
            None
        }
    }
}

fn bind_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Number::Int)
            .or_else(|| n.as_f64().map(Number::Float)),
        Value::Bool(v) => Some(Number::Int(i64::from(*v))),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .map(Number::Int)
                .or_else(|_| text.parse::<f64>().map(Number::Float))
                .ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(payload: Value) -> MessageContext {
        MessageContext::new("node/kit-1/thermometer/temperature", payload, 1.0, 0)
    }

    #[test]
    fn parse_selects_variant_by_prefix() {
        assert!(matches!(ValueRef::parse("$.payload"), Ok(ValueRef::Path(_))));
        assert!(matches!(
            ValueRef::parse("= JSON__payload * 2"),
            Ok(ValueRef::Expression(_))
        ));
        assert_eq!(
            ValueRef::parse("temperature"),
            Ok(ValueRef::Literal("temperature".to_string()))
        );
        assert!(ValueRef::parse("$.payload[").is_err());
        assert!(ValueRef::parse("= 1 +").is_err());
    }

    #[test]
    fn literal_and_path_resolution() {
        let ctx = ctx(json!({"value": 10, "nothing": null}));
        assert_eq!(ValueRef::literal("m").resolve(&ctx), Some(json!("m")));

        let path = ValueRef::parse("$.topic[1]").expect("parse");
        assert_eq!(path.resolve(&ctx), Some(json!("kit-1")));

        let path = ValueRef::parse("$.payload.nothing").expect("parse");
        assert_eq!(path.resolve(&ctx), None);

        let path = ValueRef::parse("$.payload.missing").expect("parse");
        assert_eq!(path.resolve(&ctx), None);
    }

    #[test]
    fn expression_binds_placeholders() {
        let ctx = ctx(json!({"value": 10, "celsius": "21.5"}));
        let expr = ValueRef::parse("= JSON__payload__value * 2").expect("parse");
        assert_eq!(expr.resolve(&ctx), Some(json!(20)));

        let expr = ValueRef::parse("= JSON__payload__celsius * 2 + 1").expect("parse");
        assert_eq!(expr.resolve(&ctx), Some(json!(44.0)));
    }

    #[test]
    fn expression_with_unprefixed_or_missing_variable_is_null() {
        let ctx = ctx(json!({"value": 10}));
        let expr = ValueRef::parse("= value * 2").expect("parse");
        assert_eq!(expr.resolve(&ctx), None);

        let expr = ValueRef::parse("= JSON__payload__missing * 2").expect("parse");
        assert_eq!(expr.resolve(&ctx), None);
    }
}
