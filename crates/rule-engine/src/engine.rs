//! 规则引擎
//!
//! 组合条件求值与动作执行：条件成立（或未设置条件）时按顺序执行动作。
//! 校验与执行走相同的结构路径，但校验只收集错误，从不产生副作用。
//!
//! ## 使用示例
//!
//! ```ignore
//! use rule_engine::{MethodTable, RuleEngine};
//! use serde_json::json;
//!
//! let engine = RuleEngine::new();
//! let fact = MethodTable::new("Order").constant("amount", 1200);
//! let rule = json!({
//!     "condition": {"fact": "amount", "operator": "greater_than", "value": 1000},
//!     "actions": []
//! });
//!
//! assert!(engine.validate_rule(&rule, Some(&fact), None).is_none());
//! assert!(engine.execute_rule(&rule, Some(&fact), None)?);
//! ```

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::action;
use crate::condition::{ConditionEvaluator, ConditionValidator};
use crate::config::EngineConfig;
use crate::error::{InvalidRuleError, Result, ValidationError};
use crate::invoke::Invocable;
use crate::models::EvaluationResult;
use crate::operators::Operator;
use crate::registry::OperatorRegistry;

const MSG_RULE_NOT_DICT: &str = "Rule must be a dictionary";

/// 规则引擎
///
/// 克隆后共享同一个操作符注册表。
#[derive(Debug, Clone)]
pub struct RuleEngine {
    registry: OperatorRegistry,
    config: EngineConfig,
}

impl RuleEngine {
    /// 使用默认配置和内置操作符创建引擎
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            registry: OperatorRegistry::with_regex_cache_limit(config.regex_cache_limit),
            config,
        }
    }

    /// 使用外部注册表创建引擎（例如多个引擎共享自定义操作符）
    pub fn with_registry(registry: OperatorRegistry) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
        }
    }

    /// 从配置文件和环境变量创建引擎
    pub fn from_config() -> Result<Self> {
        let config = EngineConfig::load()?;
        info!(?config, "规则引擎配置已加载");
        Ok(Self::with_config(config))
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 注册自定义操作符
    pub fn register_operator(&self, name: &str, operator: Operator) -> Result<()> {
        self.registry.register(name, operator)
    }

    /// 求值条件
    pub fn evaluate_condition(&self, condition: &Value, fact: Option<&dyn Invocable>) -> Result<bool> {
        if !self.config.trace_enabled {
            return ConditionEvaluator::new(&self.registry).evaluate(condition, fact);
        }

        let result = self.trace_condition(condition, fact)?;
        for line in &result.evaluation_trace {
            debug!(trace = %line, "条件评估");
        }
        Ok(result.matched)
    }

    /// 求值条件并返回完整追踪
    pub fn trace_condition(
        &self,
        condition: &Value,
        fact: Option<&dyn Invocable>,
    ) -> Result<EvaluationResult> {
        ConditionEvaluator::new(&self.registry)
            .with_trace()
            .evaluate_traced(condition, fact)
    }

    /// 对规则的条件做追踪求值；未设置条件时视为匹配
    pub fn evaluate_rule_condition(
        &self,
        rule: &Value,
        fact: Option<&dyn Invocable>,
    ) -> Result<EvaluationResult> {
        let map = rule.as_object().ok_or_else(not_a_dictionary)?;
        match map.get("condition").filter(|c| !c.is_null()) {
            Some(condition) => self.trace_condition(condition, fact),
            None => Ok(EvaluationResult {
                matched: true,
                ..Default::default()
            }),
        }
    }

    /// 校验条件
    pub fn validate_condition(
        &self,
        condition: &Value,
        fact: Option<&dyn Invocable>,
    ) -> Vec<ValidationError> {
        ConditionValidator::new(&self.registry).validate(condition, fact)
    }

    /// 按顺序执行动作
    pub fn execute_actions(&self, actions: &Value, actor: Option<&dyn Invocable>) -> Result<()> {
        action::execute_actions(actions, actor)
    }

    /// 校验动作列表
    pub fn validate_actions(
        &self,
        actions: &Value,
        actor: Option<&dyn Invocable>,
    ) -> Vec<ValidationError> {
        action::validate_actions(actions, actor)
    }

    /// 校验规则，合法时返回 `None`
    ///
    /// 未指定执行者时使用事实对象。条件缺失或为 null 表示 "总是成立"，不报错；
    /// 动作缺失或为 null 视为空列表。
    #[instrument(skip_all)]
    pub fn validate_rule(
        &self,
        rule: &Value,
        fact: Option<&dyn Invocable>,
        actor: Option<&dyn Invocable>,
    ) -> Option<InvalidRuleError> {
        let actor = actor.or(fact);

        let Some(map) = rule.as_object() else {
            return Some(not_a_dictionary());
        };

        let condition_errors = match map.get("condition").filter(|c| !c.is_null()) {
            Some(condition) => self.validate_condition(condition, fact),
            None => Vec::new(),
        };

        let empty = Value::Array(Vec::new());
        let actions = map.get("actions").filter(|a| !a.is_null()).unwrap_or(&empty);
        let action_errors = self.validate_actions(actions, actor);

        let errors = InvalidRuleError::new(condition_errors, action_errors);
        if errors.is_empty() {
            return None;
        }

        warn!(errors = errors.len(), "规则校验失败");
        Some(errors)
    }

    /// 执行规则，返回动作是否被执行
    ///
    /// 条件存在且不成立时返回 `Ok(false)`，不执行任何动作。
    #[instrument(skip_all)]
    pub fn execute_rule(
        &self,
        rule: &Value,
        fact: Option<&dyn Invocable>,
        actor: Option<&dyn Invocable>,
    ) -> Result<bool> {
        let actor = actor.or(fact);
        let map = rule.as_object().ok_or_else(not_a_dictionary)?;

        if self.config.validate_before_execute {
            if let Some(errors) = self.validate_rule(rule, fact, actor) {
                return Err(errors.into());
            }
        }

        if let Some(condition) = map.get("condition").filter(|c| !c.is_null()) {
            if !self.evaluate_condition(condition, fact)? {
                debug!("条件不成立，跳过动作");
                return Ok(false);
            }
        }

        let empty = Value::Array(Vec::new());
        let actions = map.get("actions").filter(|a| !a.is_null()).unwrap_or(&empty);
        self.execute_actions(actions, actor)?;

        debug!("规则执行完成");
        Ok(true)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn not_a_dictionary() -> InvalidRuleError {
    InvalidRuleError::new(vec![ValidationError::condition("rule", MSG_RULE_NOT_DICT)], Vec::new())
}
