//! JSON 值辅助函数
//!
//! 内置操作符和校验器共享的类型判断、真值、相等与包含语义。

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// 获取值的类型名称
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 真值判断：null、false、0、空字符串、空数组、空对象为假
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
    }
}

/// 严格相等
///
/// 不跨类型比较（`true` 与 `1`、`"1"` 与 `1` 都不相等），但整数与浮点数按数值比较，
/// 数组和对象逐元素递归。
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (a.as_u64(), b.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| strict_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| strict_eq(v, other)))
        }
        _ => left == right,
    }
}

/// 包含检查
///
/// - 字符串：子串匹配，needle 必须是字符串，否则返回 `None`
/// - 数组：严格相等的成员
/// - 对象：键存在，needle 必须是字符串，否则返回 `None`
/// - 其他类型不可包含，返回 `None`
pub fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::String(s) => needle.as_str().map(|sub| s.contains(sub)),
        Value::Array(items) => Some(items.iter().any(|item| strict_eq(item, needle))),
        Value::Object(map) => needle.as_str().map(|key| map.contains_key(key)),
        _ => None,
    }
}

/// 排序比较：数值之间按数值，字符串之间按字典序，其他组合不可比较
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// 解析 ISO 8601 日期时间并归一到 UTC
///
/// 支持 RFC 3339（带时区）、省略秒的带时区时间、无时区的日期时间（视为 UTC）
/// 和纯日期（当日零点 UTC）。日期与时间之间可用 `T` 或空格分隔。
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// 识别字面量字符串条件（大小写不敏感）
pub fn literal_bool(s: &str) -> Option<bool> {
    ["true", "true()"]
        .iter()
        .any(|lit| s.eq_ignore_ascii_case(lit))
        .then_some(true)
        .or_else(|| {
            ["false", "false()"]
                .iter()
                .any(|lit| s.eq_ignore_ascii_case(lit))
                .then_some(false)
        })
}
