//! 内置操作符
//!
//! 每个内置操作符在注册表初始化时注册一次，并声明左右操作数类型。

use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use tracing::debug;
use unicase::UniCase;

use crate::error::{Result, RuleError};
use crate::operators::{OperandSpec, OperandType, Operator};
use crate::registry::OperatorRegistry;
use crate::value;

/// 默认的正则缓存上限
pub const DEFAULT_REGEX_CACHE_LIMIT: usize = 256;

const CMP_TYPES: [OperandType; 2] = [OperandType::Number, OperandType::String];
const BOOLISH_TYPES: [OperandType; 3] = [
    OperandType::Boolean,
    OperandType::String,
    OperandType::Number,
];
const CONTAINER_TYPES: [OperandType; 3] = [
    OperandType::String,
    OperandType::Array,
    OperandType::Object,
];

/// 注册全部内置操作符
pub fn register_builtins(registry: &OperatorRegistry, regex_cache_limit: usize) -> Result<()> {
    let regex_cache = RegexCache::new(regex_cache_limit);

    let builtins = vec![
        (
            "is_none",
            Operator::from_fn(|l, _| l.is_null()).with_types(OperandSpec::Any, OperandSpec::Unchecked),
        ),
        (
            "is_not_none",
            Operator::from_fn(|l, _| !l.is_null()).with_types(OperandSpec::Any, OperandSpec::Unchecked),
        ),
        (
            "is_empty",
            Operator::from_fn(|l, _| !value::is_truthy(l))
                .with_types(OperandSpec::Any, OperandSpec::Unchecked),
        ),
        (
            "is_not_empty",
            Operator::from_fn(|l, _| value::is_truthy(l))
                .with_types(OperandSpec::Any, OperandSpec::Unchecked),
        ),
        (
            "is_true",
            Operator::from_fn(|l, _| is_true(l)).with_types(BOOLISH_TYPES, OperandSpec::Unchecked),
        ),
        (
            "is_false",
            Operator::from_fn(|l, _| !is_true(l)).with_types(BOOLISH_TYPES, OperandSpec::Unchecked),
        ),
        (
            "matches_regex",
            Operator::new(move |l, r| regex_cache.full_match(l, r))
                .with_types(OperandType::String, OperandType::String),
        ),
        (
            "date_between",
            Operator::new(date_between).with_types(OperandType::String, OperandType::Array),
        ),
        (
            "one_of",
            Operator::from_fn(|l, r| {
                r.as_array()
                    .is_some_and(|items| items.iter().any(|item| value::strict_eq(l, item)))
            })
            .with_types(OperandSpec::Any, OperandType::Array),
        ),
        ("less_than", ordering("less_than", |o| o.is_lt())),
        ("greater_than", ordering("greater_than", |o| o.is_gt())),
        (
            "greater_than_or_equal_to",
            ordering("greater_than_or_equal_to", |o| o.is_ge()),
        ),
        (
            "less_than_or_equal_to",
            ordering("less_than_or_equal_to", |o| o.is_le()),
        ),
        (
            "equal_to",
            Operator::from_fn(value::strict_eq).with_types(OperandSpec::Any, OperandSpec::Any),
        ),
        (
            "not_equal_to",
            Operator::from_fn(|l, r| !value::strict_eq(l, r))
                .with_types(OperandSpec::Any, OperandSpec::Any),
        ),
        (
            "starts_with",
            Operator::from_fn(|l, r| str_pair(l, r, |s, p| s.starts_with(p)))
                .with_types(OperandType::String, OperandType::String),
        ),
        (
            "ends_with",
            Operator::from_fn(|l, r| str_pair(l, r, |s, p| s.ends_with(p)))
                .with_types(OperandType::String, OperandType::String),
        ),
        (
            "contains",
            Operator::new(|l, r| contains("contains", l, r))
                .with_types(CONTAINER_TYPES, OperandSpec::Any),
        ),
        (
            "does_not_contain",
            Operator::new(|l, r| contains("does_not_contain", l, r).map(|found| !found))
                .with_types(CONTAINER_TYPES, OperandSpec::Any),
        ),
        (
            "contains_all",
            Operator::new(|l, r| contains_each("contains_all", l, r, true))
                .with_types(CONTAINER_TYPES, OperandType::Array),
        ),
        (
            "contains_any",
            Operator::new(|l, r| contains_each("contains_any", l, r, false))
                .with_types(CONTAINER_TYPES, OperandType::Array),
        ),
        (
            "case_fold_equal_to",
            Operator::from_fn(|l, r| str_pair(l, r, |a, b| UniCase::new(a) == UniCase::new(b)))
                .with_types(OperandType::String, OperandType::String),
        ),
    ];

    for (name, operator) in builtins {
        registry.register(name, operator)?;
    }

    debug!(count = registry.len(), "内置操作符注册完成");
    Ok(())
}

/// `is_true` 只接受布尔、字符串和数值
fn is_true(value: &Value) -> bool {
    match value {
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

fn str_pair(left: &Value, right: &Value, f: impl Fn(&str, &str) -> bool) -> bool {
    match (left.as_str(), right.as_str()) {
        (Some(l), Some(r)) => f(l, r),
        _ => false,
    }
}

/// 排序类操作符：同为数值或同为字符串才可比较
fn ordering(name: &'static str, accept: fn(std::cmp::Ordering) -> bool) -> Operator {
    Operator::new(move |l, r| {
        value::compare(l, r)
            .map(accept)
            .ok_or_else(|| RuleError::TypeMismatch {
                operator: name.to_string(),
                operand: 2,
                expected: value::type_name(l).to_string(),
            })
    })
    .with_types(CMP_TYPES, CMP_TYPES)
}

fn contains(name: &str, haystack: &Value, needle: &Value) -> Result<bool> {
    value::contains(haystack, needle).ok_or_else(|| RuleError::TypeMismatch {
        operator: name.to_string(),
        operand: 2,
        expected: "string".to_string(),
    })
}

/// `contains_all`（`all = true`）和 `contains_any`（`all = false`）
///
/// 左值为字符串时每个候选按子串匹配（与 `contains` 一致），而不是拆成单个字符，
/// 因此 `contains_any("abc", ["ab"])` 为 true。
fn contains_each(name: &str, haystack: &Value, needles: &Value, all: bool) -> Result<bool> {
    let needles = needles.as_array().map(Vec::as_slice).unwrap_or_default();

    for needle in needles {
        let found = contains(name, haystack, needle)?;
        if found != all {
            return Ok(found);
        }
    }

    Ok(all)
}

/// 判断左值日期是否位于右值 `[start, end]` 之间（闭区间，UTC）
fn date_between(left: &Value, right: &Value) -> Result<bool> {
    let bounds = right.as_array().map(Vec::as_slice).unwrap_or_default();
    let [start, end] = bounds else {
        return Err(RuleError::invalid_operand(
            "date_between",
            format!("expected [start, end], got {} element(s)", bounds.len()),
        ));
    };

    let date = parse_date_operand(left)?;
    let start = parse_date_operand(start)?;
    let end = parse_date_operand(end)?;

    Ok(start <= date && date <= end)
}

fn parse_date_operand(operand: &Value) -> Result<chrono::DateTime<chrono::Utc>> {
    let s = operand.as_str().ok_or_else(|| {
        RuleError::invalid_operand(
            "date_between",
            format!("expected ISO 8601 string, got {}", value::type_name(operand)),
        )
    })?;

    value::parse_datetime(s).ok_or_else(|| {
        RuleError::invalid_operand("date_between", format!("cannot parse date '{}'", s))
    })
}

/// 编译后的正则缓存，超过上限时整体清空
struct RegexCache {
    compiled: Arc<DashMap<String, Regex>>,
    limit: usize,
}

impl RegexCache {
    fn new(limit: usize) -> Self {
        Self {
            compiled: Arc::new(DashMap::new()),
            limit,
        }
    }

    /// 整串匹配：模式两端锚定
    fn full_match(&self, subject: &Value, pattern: &Value) -> Result<bool> {
        let (Some(subject), Some(pattern)) = (subject.as_str(), pattern.as_str()) else {
            return Ok(false);
        };

        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(regex.is_match(subject));
        }

        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            RuleError::invalid_operand("matches_regex", format!("invalid pattern '{}': {}", pattern, e))
        })?;
        let matched = regex.is_match(subject);

        if self.limit > 0 {
            if self.compiled.len() >= self.limit {
                self.compiled.clear();
            }
            self.compiled.insert(pattern.to_string(), regex);
        }

        Ok(matched)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.compiled.len()
    }
}
