//! 条件求值与校验
//!
//! 求值器递归解释条件树，`all` / `any` 短路，遇到第一个结构问题立即返回错误；
//! 校验器按完全相同的路径遍历，但从不失败，而是收集全部 [`ValidationError`]。

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, RuleError, ValidationError};
use crate::invoke::Invocable;
use crate::models::EvaluationResult;
use crate::registry::OperatorRegistry;
use crate::value::{is_truthy, literal_bool};

pub(crate) const ROOT_PATH: &str = "condition";

/// 事实比较节点允许的键
const FACT_KEYS: [&str; 5] = ["fact", "args", "params", "operator", "value"];

const MSG_NOT_BOOL_OR_DICT: &str = "Condition must be a boolean or a dictionary";
const MSG_FACT_REQUIRED: &str = "Fact is required for this condition";
const MSG_OPERATOR_REQUIRED: &str = "'operator' is required";
const MSG_OPERATOR_NOT_STRING: &str = "'operator' must be a string";
const MSG_ARGS_NOT_LIST: &str = "'args' must be a list";
const MSG_PARAMS_NOT_DICT: &str = "'params' must be a dictionary";
const MSG_METHOD_REQUIRED: &str = "Fact method name is required";
const MSG_METHOD_NOT_STRING: &str = "Fact method name must be a string";

/// 组合节点
pub(crate) enum Combinator<'a> {
    All(&'a Value),
    Any(&'a Value),
    Not(&'a Value),
}

/// 仅当对象恰好只有一个 `all` / `any` / `not` 键时才是组合节点
pub(crate) fn combinator(map: &Map<String, Value>) -> Option<Combinator<'_>> {
    if map.len() != 1 {
        return None;
    }
    let (key, operand) = map.iter().next()?;
    match key.as_str() {
        "all" => Some(Combinator::All(operand)),
        "any" => Some(Combinator::Any(operand)),
        "not" => Some(Combinator::Not(operand)),
        _ => None,
    }
}

/// 不在白名单中的键（已排序）
pub(crate) fn unknown_keys(map: &Map<String, Value>, allowed: &[&str]) -> Vec<String> {
    let mut keys: Vec<String> = map
        .keys()
        .filter(|k| !allowed.contains(&k.as_str()))
        .cloned()
        .collect();
    keys.sort_unstable();
    keys
}

/// 事实比较节点的借用视图（已通过结构检查）
pub(crate) struct FactComparisonRef<'a> {
    pub(crate) method: &'a str,
    pub(crate) operator: &'a str,
    pub(crate) args: &'a [Value],
    pub(crate) params: Option<&'a Map<String, Value>>,
    pub(crate) value: &'a Value,
}

impl<'a> FactComparisonRef<'a> {
    pub(crate) fn parse(map: &'a Map<String, Value>, path: &str) -> Result<Self> {
        let invalid = unknown_keys(map, &FACT_KEYS);
        if !invalid.is_empty() {
            return Err(RuleError::invalid_condition(
                path,
                format!("Invalid keys: {}", invalid.join(", ")),
            ));
        }

        let method = match map.get("fact") {
            Some(Value::String(s)) if !s.is_empty() => s.as_str(),
            Some(v) if is_truthy(v) => return Err(RuleError::invalid_condition(path, MSG_METHOD_NOT_STRING)),
            _ => return Err(RuleError::invalid_condition(path, MSG_METHOD_REQUIRED)),
        };

        let operator = match map.get("operator") {
            Some(Value::String(s)) if !s.is_empty() => s.as_str(),
            Some(v) if is_truthy(v) => return Err(RuleError::invalid_condition(path, MSG_OPERATOR_NOT_STRING)),
            _ => return Err(RuleError::invalid_condition(path, MSG_OPERATOR_REQUIRED)),
        };

        let args = match map.get("args") {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => return Err(RuleError::invalid_condition(path, MSG_ARGS_NOT_LIST)),
        };

        let params = match map.get("params") {
            None | Some(Value::Null) => None,
            Some(Value::Object(params)) => Some(params),
            Some(_) => return Err(RuleError::invalid_condition(path, MSG_PARAMS_NOT_DICT)),
        };

        Ok(Self {
            method,
            operator,
            args,
            params,
            value: map.get("value").unwrap_or(&Value::Null),
        })
    }
}

/// 条件求值器
pub struct ConditionEvaluator<'r> {
    registry: &'r OperatorRegistry,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl<'r> ConditionEvaluator<'r> {
    pub fn new(registry: &'r OperatorRegistry) -> Self {
        Self {
            registry,
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 求值条件
    pub fn evaluate(&self, condition: &Value, fact: Option<&dyn Invocable>) -> Result<bool> {
        self.evaluate_node(condition, fact, None, ROOT_PATH)
    }

    /// 求值条件并返回匹配路径与追踪信息
    pub fn evaluate_traced(
        &self,
        condition: &Value,
        fact: Option<&dyn Invocable>,
    ) -> Result<EvaluationResult> {
        let start = Instant::now();

        let mut result = EvaluationResult::default();
        let matched = self.evaluate_node(condition, fact, Some(&mut result), ROOT_PATH)?;

        result.matched = matched;
        result.evaluation_time_ms = start.elapsed().as_millis() as i64;

        Ok(result)
    }

    /// 追加一行追踪（仅在启用追踪且正在收集结果时）
    fn trace(&self, result: &mut Option<&mut EvaluationResult>, line: impl FnOnce() -> String) {
        if let (true, Some(result)) = (self.trace_enabled, result.as_deref_mut()) {
            result.evaluation_trace.push(line());
        }
    }

    /// 递归求值
    ///
    /// `result` 为 `None` 时不记录匹配路径和追踪。
    fn evaluate_node(
        &self,
        condition: &Value,
        fact: Option<&dyn Invocable>,
        result: Option<&mut EvaluationResult>,
        path: &str,
    ) -> Result<bool> {
        match condition {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if !s.is_empty() => literal_bool(s)
                .ok_or_else(|| RuleError::invalid_condition(path, "Invalid condition")),
            Value::Object(map) => match combinator(map) {
                Some(Combinator::All(operands)) => {
                    self.evaluate_group(operands, true, fact, result, path)
                }
                Some(Combinator::Any(operands)) => {
                    self.evaluate_group(operands, false, fact, result, path)
                }
                Some(Combinator::Not(operand)) => self
                    .evaluate_node(operand, fact, result, &format!("{}.not", path))
                    .map(|matched| !matched),
                None => self.evaluate_fact(map, fact, result, path),
            },
            _ => Err(RuleError::invalid_condition(path, MSG_NOT_BOOL_OR_DICT)),
        }
    }

    /// 求值 `all`（`is_all = true`）或 `any` 组，短路求值
    ///
    /// `all` 遇到 false 立即返回 false，`any` 遇到 true 立即返回 true，
    /// 之后的子节点不会被检查。空 `all` 为 true，空 `any` 为 false。
    fn evaluate_group(
        &self,
        operands: &Value,
        is_all: bool,
        fact: Option<&dyn Invocable>,
        mut result: Option<&mut EvaluationResult>,
        parent: &str,
    ) -> Result<bool> {
        let label = if is_all { "all" } else { "any" };
        let path = format!("{}.{}", parent, label);
        let children = operands
            .as_array()
            .ok_or_else(|| RuleError::invalid_condition(&path, format!("'{}' must be a list", label)))?;

        self.trace(&mut result, || {
            format!("{}: 开始评估 {} 组 (共 {} 个子节点)", path, label, children.len())
        });

        for (i, child) in children.iter().enumerate() {
            let child_path = format!("{}[{}]", path, i);
            let child_matched = self.evaluate_node(child, fact, result.as_deref_mut(), &child_path)?;

            if child_matched != is_all {
                self.trace(&mut result, || format!("{}: {} 短路 - 子节点 {}", path, label, i));
                return Ok(child_matched);
            }
        }

        Ok(is_all)
    }

    /// 求值事实比较节点
    fn evaluate_fact(
        &self,
        map: &Map<String, Value>,
        fact: Option<&dyn Invocable>,
        mut result: Option<&mut EvaluationResult>,
        path: &str,
    ) -> Result<bool> {
        let leaf = FactComparisonRef::parse(map, path)?;
        let fact = fact.ok_or_else(|| RuleError::invalid_condition(path, MSG_FACT_REQUIRED))?;

        if !fact.has_method(leaf.method) {
            return Err(RuleError::MethodNotFound {
                target: fact.type_name().to_string(),
                method: leaf.method.to_string(),
            });
        }

        let operator = self.registry.get(leaf.operator)?;

        let empty = Map::new();
        let left = fact
            .call_method(leaf.method, leaf.args, leaf.params.unwrap_or(&empty))
            .map_err(|source| RuleError::MethodInvocation {
                method: leaf.method.to_string(),
                source,
            })?;

        let matched = operator.apply(&left, leaf.value)?;
        debug!(path, fact = leaf.method, operator = leaf.operator, matched, "事实比较完成");

        self.trace(&mut result, || {
            format!(
                "{}: {}() = {} {} {} => {}",
                path,
                leaf.method,
                left,
                leaf.operator,
                leaf.value,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            )
        });

        if let (true, Some(result)) = (matched, result) {
            result.matched_conditions.push(path.to_string());
        }

        Ok(matched)
    }
}

/// 条件校验器
pub struct ConditionValidator<'r> {
    registry: &'r OperatorRegistry,
}

impl<'r> ConditionValidator<'r> {
    pub fn new(registry: &'r OperatorRegistry) -> Self {
        Self { registry }
    }

    /// 校验条件，返回全部错误（为空表示合法）
    pub fn validate(&self, condition: &Value, fact: Option<&dyn Invocable>) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.validate_node(condition, fact, ROOT_PATH, &mut errors);
        errors
    }

    fn validate_node(
        &self,
        condition: &Value,
        fact: Option<&dyn Invocable>,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        match condition {
            Value::Bool(_) => {}
            Value::String(s) if literal_bool(s).is_some() => {}
            Value::Object(map) => match combinator(map) {
                Some(Combinator::All(operands)) => {
                    self.validate_group(operands, "all", fact, path, errors)
                }
                Some(Combinator::Any(operands)) => {
                    self.validate_group(operands, "any", fact, path, errors)
                }
                Some(Combinator::Not(operand)) => {
                    self.validate_node(operand, fact, &format!("{}.not", path), errors)
                }
                None => self.validate_fact(map, fact, path, errors),
            },
            _ => errors.push(ValidationError::condition(path, MSG_NOT_BOOL_OR_DICT)),
        }
    }

    /// 校验 `all` / `any` 组：必须是非空列表，然后逐个校验子节点（不短路）
    fn validate_group(
        &self,
        operands: &Value,
        label: &str,
        fact: Option<&dyn Invocable>,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        let children = match operands.as_array() {
            Some(children) if !children.is_empty() => children,
            _ => {
                errors.push(ValidationError::condition(
                    format!("{}.{}", path, label),
                    format!("'{}' must be a list with at least one element", label),
                ));
                return;
            }
        };

        for (i, child) in children.iter().enumerate() {
            self.validate_node(child, fact, &format!("{}.{}[{}]", path, label, i), errors);
        }
    }

    /// 校验事实比较节点，检查顺序固定
    fn validate_fact(
        &self,
        map: &Map<String, Value>,
        fact: Option<&dyn Invocable>,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut push = |message: String| errors.push(ValidationError::condition(path, message));

        if fact.is_none() {
            push(MSG_FACT_REQUIRED.to_string());
        }

        let invalid = unknown_keys(map, &FACT_KEYS);
        if !invalid.is_empty() {
            push(format!("Invalid keys: {}", invalid.join(", ")));
        }

        match map.get("operator") {
            Some(Value::String(name)) if !name.is_empty() => {
                if let Err(e) = self.registry.get(name) {
                    push(e.to_string());
                }
            }
            Some(v) if is_truthy(v) => push(MSG_OPERATOR_NOT_STRING.to_string()),
            _ => push(MSG_OPERATOR_REQUIRED.to_string()),
        }

        if map.get("args").is_some_and(|v| !v.is_null() && !v.is_array()) {
            push(MSG_ARGS_NOT_LIST.to_string());
        }

        if map.get("params").is_some_and(|v| !v.is_null() && !v.is_object()) {
            push(MSG_PARAMS_NOT_DICT.to_string());
        }

        let method = match map.get("fact") {
            Some(Value::String(name)) if !name.is_empty() => Some(name.as_str()),
            Some(v) if is_truthy(v) => {
                push(MSG_METHOD_NOT_STRING.to_string());
                None
            }
            _ => {
                push(MSG_METHOD_REQUIRED.to_string());
                None
            }
        };

        if let (Some(fact), Some(method)) = (fact, method) {
            if !fact.has_method(method) {
                push(format!(
                    "Fact method '{}' is not defined in '{}'",
                    method,
                    fact.type_name()
                ));
            }
        }
    }
}
