//! 规则引擎错误类型
//!
//! 求值/执行通道使用 [`RuleError`] 快速失败；校验通道只收集 [`ValidationError`]，
//! 最终聚合为 [`InvalidRuleError`]。

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::invoke::MethodError;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Operator '{0}' is not defined.")]
    UndefinedOperator(String),

    #[error("The '{0}' operator has already been registered.")]
    DuplicateOperator(String),

    #[error("Operand {operand} of operator '{operator}' must be of type {expected}.")]
    TypeMismatch {
        operator: String,
        operand: usize,
        expected: String,
    },

    #[error("Invalid operand for operator '{operator}': {message}")]
    InvalidOperand { operator: String, message: String },

    #[error("Invalid condition at path '{path}': {message}")]
    InvalidCondition { path: String, message: String },

    #[error("Invalid action at path '{path}': {message}")]
    InvalidAction { path: String, message: String },

    #[error(transparent)]
    InvalidRule(#[from] InvalidRuleError),

    #[error("Actor is required")]
    MissingActor,

    #[error("Method '{method}' is not defined in '{target}'")]
    MethodNotFound { target: String, method: String },

    #[error("Method '{method}' failed: {source}")]
    MethodInvocation {
        method: String,
        #[source]
        source: MethodError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    pub(crate) fn invalid_condition(path: &str, message: impl Into<String>) -> Self {
        Self::InvalidCondition {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_action(path: &str, message: impl Into<String>) -> Self {
        Self::InvalidAction {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_operand(operator: &str, message: impl Into<String>) -> Self {
        Self::InvalidOperand {
            operator: operator.to_string(),
            message: message.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::UndefinedOperator(_) => "UNDEFINED_OPERATOR",
            Self::DuplicateOperator(_) => "DUPLICATE_OPERATOR",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::InvalidOperand { .. } => "INVALID_OPERAND",
            Self::InvalidCondition { .. } => "INVALID_CONDITION",
            Self::InvalidAction { .. } => "INVALID_ACTION",
            Self::InvalidRule(_) => "INVALID_RULE",
            Self::MissingActor => "MISSING_ACTOR",
            Self::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            Self::MethodInvocation { .. } => "METHOD_INVOCATION_FAILED",
            Self::Json(_) => "JSON_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// 校验错误的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Condition,
    Action,
}

/// 单条校验错误：出错位置 + 描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub origin: Origin,
    /// 形如 `condition.all[1].any[2]` 或 `actions[0]`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn condition(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: Origin::Condition,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn action(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: Origin::Action,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.origin {
            Origin::Condition => "condition",
            Origin::Action => "action",
        };
        write!(f, "Invalid {} at path '{}': {}", kind, self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// 规则级聚合错误，按条件和动作两组分别保存
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidRuleError {
    pub condition_errors: Vec<ValidationError>,
    pub action_errors: Vec<ValidationError>,
}

impl InvalidRuleError {
    pub fn new(condition_errors: Vec<ValidationError>, action_errors: Vec<ValidationError>) -> Self {
        Self {
            condition_errors,
            action_errors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.condition_errors.is_empty() && self.action_errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.condition_errors.len() + self.action_errors.len()
    }

    /// 全部错误，条件错误在前
    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.condition_errors.iter().chain(self.action_errors.iter())
    }
}

impl fmt::Display for InvalidRuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid rule: {} condition error(s), {} action error(s)",
            self.condition_errors.len(),
            self.action_errors.len()
        )?;
        for error in self.errors() {
            write!(f, "; {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for InvalidRuleError {}
