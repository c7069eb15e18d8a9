//! 操作符注册表
//!
//! 使用 DashMap 保存 "名称 → 操作符"，克隆后共享同一张表。
//!
//! ## 设计说明
//!
//! - 注册不可覆盖、不可撤销：同名二次注册返回 [`RuleError::DuplicateOperator`]
//! - 注册在分片锁内完成 "检查 + 插入"，并发注册同一名称只有一个成功
//! - 注册表作为显式对象注入求值器和校验器，不存在隐藏的全局状态
//!
//! ## 使用示例
//!
//! ```ignore
//! use rule_engine::{Operator, OperatorRegistry, OperandType};
//!
//! let registry = OperatorRegistry::with_builtins();
//! registry.register(
//!     "divisible_by",
//!     Operator::from_fn(|l, r| match (l.as_i64(), r.as_i64()) {
//!         (Some(a), Some(b)) if b != 0 => a % b == 0,
//!         _ => false,
//!     })
//!     .with_types(OperandType::Number, OperandType::Number),
//! )?;
//! ```

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, instrument, warn};

use crate::builtins::{register_builtins, DEFAULT_REGEX_CACHE_LIMIT};
use crate::error::{Result, RuleError};
use crate::operators::Operator;

/// 操作符注册表
#[derive(Clone)]
pub struct OperatorRegistry {
    operators: Arc<DashMap<String, Operator>>,
}

impl OperatorRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            operators: Arc::new(DashMap::new()),
        }
    }

    /// 创建包含全部内置操作符的注册表
    pub fn with_builtins() -> Self {
        Self::with_regex_cache_limit(DEFAULT_REGEX_CACHE_LIMIT)
    }

    /// 创建包含全部内置操作符的注册表，并指定正则缓存上限（0 表示不缓存）
    pub fn with_regex_cache_limit(limit: usize) -> Self {
        let registry = Self::new();
        register_builtins(&registry, limit)
            .unwrap_or_else(|e| unreachable!("fresh registry rejected builtin operator: {e}"));
        registry
    }

    /// 注册操作符
    #[instrument(skip(self, operator))]
    pub fn register(&self, name: &str, operator: Operator) -> Result<()> {
        match self.operators.entry(name.to_string()) {
            Entry::Occupied(_) => {
                warn!("重复注册操作符: {}", name);
                Err(RuleError::DuplicateOperator(name.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(operator.named(name));
                info!("操作符已注册: {}", name);
                Ok(())
            }
        }
    }

    /// 获取操作符
    pub fn get(&self, name: &str) -> Result<Operator> {
        self.operators
            .get(name)
            .map(|op| op.value().clone())
            .ok_or_else(|| RuleError::UndefinedOperator(name.to_string()))
    }

    /// 检查操作符是否已注册
    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// 获取所有已注册的操作符名称（已排序）
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operators.iter().map(|op| op.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperandType;
    use serde_json::json;

    const BUILTINS: [&str; 22] = [
        "case_fold_equal_to",
        "contains",
        "contains_all",
        "contains_any",
        "date_between",
        "does_not_contain",
        "ends_with",
        "equal_to",
        "greater_than",
        "greater_than_or_equal_to",
        "is_empty",
        "is_false",
        "is_none",
        "is_not_empty",
        "is_not_none",
        "is_true",
        "less_than",
        "less_than_or_equal_to",
        "matches_regex",
        "not_equal_to",
        "one_of",
        "starts_with",
    ];

    #[test]
    fn test_registry_new() {
        let registry = OperatorRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_with_builtins() {
        let registry = OperatorRegistry::with_builtins();
        assert_eq!(registry.list(), BUILTINS.to_vec());
        assert_eq!(OperatorRegistry::default().len(), BUILTINS.len());
    }

    #[test]
    fn test_get_undefined() {
        let registry = OperatorRegistry::with_builtins();
        let err = registry.get("undefined_operator").unwrap_err();
        assert!(matches!(err, RuleError::UndefinedOperator(ref name) if name == "undefined_operator"));
        assert_eq!(err.to_string(), "Operator 'undefined_operator' is not defined.");
    }

    #[test]
    fn test_register_duplicate() {
        let registry = OperatorRegistry::with_builtins();
        let is_empty = registry.get("is_empty").unwrap();

        let err = registry.register("is_empty", is_empty).unwrap_err();
        assert!(matches!(err, RuleError::DuplicateOperator(ref name) if name == "is_empty"));
        assert_eq!(registry.len(), BUILTINS.len());
    }

    #[test]
    fn test_register_custom_operator() {
        let registry = OperatorRegistry::new();
        registry
            .register(
                "divisible_by",
                Operator::from_fn(|l, r| match (l.as_i64(), r.as_i64()) {
                    (Some(a), Some(b)) if b != 0 => a % b == 0,
                    _ => false,
                })
                .with_types(OperandType::Number, OperandType::Number),
            )
            .unwrap();

        assert!(registry.contains("divisible_by"));
        let op = registry.get("divisible_by").unwrap();
        assert_eq!(op.name(), "divisible_by");
        assert!(op.apply(&json!(9), &json!(3)).unwrap());
        assert!(!op.apply(&json!(10), &json!(3)).unwrap());

        let err = op.apply(&json!("9"), &json!(3)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operand 1 of operator 'divisible_by' must be of type number."
        );
    }

    #[test]
    fn test_clones_share_table() {
        let registry = OperatorRegistry::new();
        let shared = registry.clone();
        shared
            .register("always", Operator::from_fn(|_, _| true))
            .unwrap();
        assert!(registry.contains("always"));
    }

    #[test]
    fn test_concurrent_registration_has_single_winner() {
        let registry = OperatorRegistry::new();
        let successes: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = registry.clone();
                    scope.spawn(move || {
                        registry
                            .register("race", Operator::from_fn(|_, _| true))
                            .is_ok() as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(successes, 1);
        assert_eq!(registry.len(), 1);
    }
}
