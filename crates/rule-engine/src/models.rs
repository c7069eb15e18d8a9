//! 规则引擎领域模型
//!
//! 引擎本身直接解释 `serde_json::Value`；这里的类型化模型用于在代码中构造规则，
//! 与 JSON 形态双向转换（`serde(try_from/into = "Value")`）。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::{combinator, Combinator, FactComparisonRef, ROOT_PATH};
use crate::error::{Result, RuleError};
use crate::value::literal_bool;

/// 条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Condition {
    /// 布尔字面量，`"true()"` 等字符串字面量解析后也归一为此变体
    Literal(bool),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    Fact(FactComparison),
}

impl Condition {
    pub fn all(children: Vec<Condition>) -> Self {
        Self::All(children)
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Self::Any(children)
    }

    pub fn not(child: Condition) -> Self {
        Self::Not(Box::new(child))
    }

    /// 事实比较的简写
    pub fn fact(fact: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Fact(FactComparison::new(fact, operator).value(value))
    }

    fn parse(value: &Value, path: &str) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Literal(*b)),
            Value::String(s) if !s.is_empty() => literal_bool(s)
                .map(Self::Literal)
                .ok_or_else(|| RuleError::invalid_condition(path, "Invalid condition")),
            Value::Object(map) => match combinator(map) {
                Some(Combinator::All(children)) => {
                    Self::parse_group(children, "all", path).map(Self::All)
                }
                Some(Combinator::Any(children)) => {
                    Self::parse_group(children, "any", path).map(Self::Any)
                }
                Some(Combinator::Not(child)) => {
                    Self::parse(child, &format!("{}.not", path)).map(Self::not)
                }
                None => FactComparisonRef::parse(map, path)
                    .map(|leaf| Self::Fact(FactComparison::from_ref(leaf))),
            },
            _ => Err(RuleError::invalid_condition(
                path,
                "Condition must be a boolean or a dictionary",
            )),
        }
    }

    fn parse_group(children: &Value, label: &str, path: &str) -> Result<Vec<Self>> {
        let path = format!("{}.{}", path, label);
        match children.as_array() {
            Some(items) if !items.is_empty() => items
                .iter()
                .enumerate()
                .map(|(i, child)| Self::parse(child, &format!("{}[{}]", path, i)))
                .collect(),
            _ => Err(RuleError::invalid_condition(
                &path,
                format!("'{}' must be a list with at least one element", label),
            )),
        }
    }
}

impl TryFrom<Value> for Condition {
    type Error = RuleError;

    fn try_from(value: Value) -> Result<Self> {
        Self::parse(&value, ROOT_PATH)
    }
}

impl From<Condition> for Value {
    fn from(condition: Condition) -> Self {
        let wrap = |key: &str, inner: Value| {
            let mut map = Map::new();
            map.insert(key.to_string(), inner);
            Value::Object(map)
        };

        match condition {
            Condition::Literal(b) => Value::Bool(b),
            Condition::All(children) => {
                wrap("all", Value::Array(children.into_iter().map(Value::from).collect()))
            }
            Condition::Any(children) => {
                wrap("any", Value::Array(children.into_iter().map(Value::from).collect()))
            }
            Condition::Not(child) => wrap("not", Value::from(*child)),
            Condition::Fact(leaf) => Value::from(leaf),
        }
    }
}

impl From<FactComparison> for Condition {
    fn from(leaf: FactComparison) -> Self {
        Self::Fact(leaf)
    }
}

/// 事实比较：调用事实对象的方法，再用操作符与 `value` 比较
#[derive(Debug, Clone, PartialEq)]
pub struct FactComparison {
    pub fact: String,
    pub operator: String,
    pub args: Vec<Value>,
    pub params: Map<String, Value>,
    pub value: Option<Value>,
}

impl FactComparison {
    pub fn new(fact: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            fact: fact.into(),
            operator: operator.into(),
            args: Vec::new(),
            params: Map::new(),
            value: None,
        }
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

impl FactComparison {
    fn from_ref(leaf: FactComparisonRef<'_>) -> Self {
        Self {
            fact: leaf.method.to_string(),
            operator: leaf.operator.to_string(),
            args: leaf.args.to_vec(),
            params: leaf.params.cloned().unwrap_or_default(),
            value: (!leaf.value.is_null()).then(|| leaf.value.clone()),
        }
    }
}

impl From<FactComparison> for Value {
    fn from(leaf: FactComparison) -> Self {
        let mut map = Map::new();
        map.insert("fact".to_string(), Value::String(leaf.fact));
        map.insert("operator".to_string(), Value::String(leaf.operator));
        if !leaf.args.is_empty() {
            map.insert("args".to_string(), Value::Array(leaf.args));
        }
        if !leaf.params.is_empty() {
            map.insert("params".to_string(), Value::Object(leaf.params));
        }
        if let Some(value) = leaf.value {
            map.insert("value".to_string(), value);
        }
        Value::Object(map)
    }
}

/// 动作：调用执行者对象的方法，返回值被丢弃
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    pub action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl Action {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            args: Vec::new(),
            params: Map::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        let mut map = Map::new();
        map.insert("action".to_string(), Value::String(action.action));
        if !action.args.is_empty() {
            map.insert("args".to_string(), Value::Array(action.args));
        }
        if !action.params.is_empty() {
            map.insert("params".to_string(), Value::Object(action.params));
        }
        Value::Object(map)
    }
}

/// 规则定义：可选条件 + 动作列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置条件
    pub fn when(mut self, condition: impl Into<Condition>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// 追加动作
    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<Rule> for Value {
    fn from(rule: Rule) -> Self {
        let mut map = Map::new();
        if let Some(condition) = rule.condition {
            map.insert("condition".to_string(), Value::from(condition));
        }
        map.insert(
            "actions".to_string(),
            Value::Array(rule.actions.into_iter().map(Value::from).collect()),
        );
        Value::Object(map)
    }
}

/// 评估结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    /// 匹配成功的事实比较节点路径
    pub matched_conditions: Vec<String>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_json() -> Value {
        json!({
            "condition": {
                "all": [
                    {"fact": "is_active", "operator": "is_true"},
                    {"not": {"fact": "get_role", "operator": "equal_to", "value": "guest"}},
                    {"any": [
                        "false()",
                        {"fact": "get_score", "args": [2024], "params": {"scale": 10}, "operator": "greater_than", "value": 50}
                    ]}
                ]
            },
            "actions": [
                {"action": "send_email", "params": {"template": "welcome"}},
                {"action": "log"}
            ]
        })
    }

    #[test]
    fn test_rule_deserialization() {
        let rule: Rule = serde_json::from_value(sample_json()).unwrap();

        let expected = Rule::new()
            .when(Condition::all(vec![
                Condition::from(FactComparison::new("is_active", "is_true")),
                Condition::not(Condition::fact("get_role", "equal_to", "guest")),
                Condition::any(vec![
                    Condition::Literal(false),
                    FactComparison::new("get_score", "greater_than")
                        .arg(2024)
                        .param("scale", 10)
                        .value(50)
                        .into(),
                ]),
            ]))
            .then(Action::new("send_email").param("template", "welcome"))
            .then(Action::new("log"));

        assert_eq!(rule, expected);
    }

    #[test]
    fn test_rule_serialization() {
        let rule = Rule::new()
            .when(Condition::fact("get_age", "greater_than_or_equal_to", 18))
            .then(Action::new("grant").arg("adult"));

        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({
                "condition": {"fact": "get_age", "operator": "greater_than_or_equal_to", "value": 18},
                "actions": [{"action": "grant", "args": ["adult"]}]
            })
        );
        assert_eq!(
            Value::from(rule.clone()),
            serde_json::to_value(&rule).unwrap()
        );
    }

    #[test]
    fn test_rule_without_condition() {
        let rule = Rule::from_json(r#"{"actions": [{"action": "log"}]}"#).unwrap();
        assert!(rule.condition.is_none());
        assert_eq!(Value::from(rule), json!({"actions": [{"action": "log"}]}));

        let rule = Rule::from_json("{}").unwrap();
        assert_eq!(rule, Rule::default());
    }

    #[test]
    fn test_condition_rejects_invalid_shapes() {
        for (input, path) in [
            (json!("maybe"), "condition"),
            (json!(42), "condition"),
            (json!({"all": []}), "condition.all"),
            (json!({"any": [true, {"fact": "x"}]}), "condition.any[1]"),
            (json!({"not": {"fact": "x", "operator": "is_none", "bogus": 1}}), "condition.not"),
        ] {
            match Condition::try_from(input) {
                Err(RuleError::InvalidCondition { path: actual, .. }) => assert_eq!(actual, path),
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn test_action_rejects_unknown_keys() {
        let result: std::result::Result<Action, _> =
            serde_json::from_value(json!({"action": "log", "extra": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_literal_strings_normalize() {
        assert_eq!(Condition::try_from(json!("TRUE()")).unwrap(), Condition::Literal(true));
        assert_eq!(Value::from(Condition::Literal(false)), json!(false));
    }
}
