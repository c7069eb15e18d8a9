//! 可嵌入规则引擎
//!
//! 提供数据驱动的规则评估能力，支持：
//! - JSON 条件树（`all` / `any` / `not` / 事实比较）短路求值
//! - 可扩展的类型化操作符注册表
//! - 按名称调用宿主对象方法的动作执行
//! - 不失败、收集全部错误的结构校验

pub mod action;
pub mod builtins;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod invoke;
pub mod logging;
pub mod models;
pub mod operators;
pub mod registry;
pub mod value;

pub use condition::{ConditionEvaluator, ConditionValidator};
pub use crate::config::{EngineConfig, LogFormat, LoggingConfig};
pub use engine::RuleEngine;
pub use error::{InvalidRuleError, Origin, Result, RuleError, ValidationError};
pub use invoke::{Invocable, MethodError, MethodResult, MethodTable};
pub use models::{Action, Condition, EvaluationResult, FactComparison, Rule};
pub use operators::{OperandSpec, OperandType, Operator, Predicate};
pub use registry::OperatorRegistry;
