//! 规则操作符定义
//!
//! 操作符是一个二元谓词 `(left, right) -> bool`，注册时显式声明左右操作数的类型，
//! 调用前先做运行时类型检查。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RuleError};

/// 操作数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl OperandType {
    /// 值是否属于该类型
    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Null, Value::Null)
                | (Self::Boolean, Value::Bool(_))
                | (Self::Number, Value::Number(_))
                | (Self::String, Value::String(_))
                | (Self::Array, Value::Array(_))
                | (Self::Object, Value::Object(_))
        )
    }
}

impl fmt::Display for OperandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        write!(f, "{}", s)
    }
}

/// 操作数类型声明
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OperandSpec {
    /// 不做检查
    #[default]
    Unchecked,
    /// 任意原始值：布尔、数值、字符串、null 或任意集合
    Any,
    /// 必须是其中之一
    OneOf(Vec<OperandType>),
}

impl OperandSpec {
    pub fn one_of(types: impl IntoIterator<Item = OperandType>) -> Self {
        Self::OneOf(types.into_iter().collect())
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Unchecked => true,
            Self::Any => ANY_TYPES.iter().any(|t| t.matches(value)),
            Self::OneOf(types) => types.iter().any(|t| t.matches(value)),
        }
    }
}

/// `Any` 放宽后接受的类型集合
const ANY_TYPES: [OperandType; 6] = [
    OperandType::Boolean,
    OperandType::Number,
    OperandType::String,
    OperandType::Null,
    OperandType::Array,
    OperandType::Object,
];

impl From<OperandType> for OperandSpec {
    fn from(t: OperandType) -> Self {
        Self::OneOf(vec![t])
    }
}

impl<const N: usize> From<[OperandType; N]> for OperandSpec {
    fn from(types: [OperandType; N]) -> Self {
        Self::OneOf(types.to_vec())
    }
}

impl fmt::Display for OperandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchecked => write!(f, "unchecked"),
            Self::Any => write!(f, "any"),
            Self::OneOf(types) => {
                let names: Vec<String> = types.iter().map(ToString::to_string).collect();
                write!(f, "{}", names.join(" | "))
            }
        }
    }
}

/// 谓词函数
pub type Predicate = dyn Fn(&Value, &Value) -> Result<bool> + Send + Sync;

/// 带类型声明的操作符
///
/// 克隆开销很小（谓词通过 `Arc` 共享）。名称在注册时写入，用于错误信息。
#[derive(Clone)]
pub struct Operator {
    name: String,
    predicate: Arc<Predicate>,
    left: OperandSpec,
    right: OperandSpec,
}

impl Operator {
    /// 从可能失败的谓词创建操作符，默认不做类型检查
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: String::new(),
            predicate: Arc::new(predicate),
            left: OperandSpec::Unchecked,
            right: OperandSpec::Unchecked,
        }
    }

    /// 从不会失败的谓词创建操作符
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self::new(move |left, right| Ok(predicate(left, right)))
    }

    /// 声明左右操作数类型
    pub fn with_types(mut self, left: impl Into<OperandSpec>, right: impl Into<OperandSpec>) -> Self {
        self.left = left.into();
        self.right = right.into();
        self
    }

    pub(crate) fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn left_spec(&self) -> &OperandSpec {
        &self.left
    }

    pub fn right_spec(&self) -> &OperandSpec {
        &self.right
    }

    /// 检查操作数类型后调用谓词
    pub fn apply(&self, left: &Value, right: &Value) -> Result<bool> {
        for (index, (operand, spec)) in [(left, &self.left), (right, &self.right)]
            .into_iter()
            .enumerate()
        {
            if !spec.accepts(operand) {
                return Err(RuleError::TypeMismatch {
                    operator: self.name.clone(),
                    operand: index + 1,
                    expected: spec.to_string(),
                });
            }
        }

        (self.predicate)(left, right)
    }

    /// 只有左操作数的操作符（如 `is_none`）的简写
    pub fn test(&self, left: &Value) -> Result<bool> {
        self.apply(left, &Value::Null)
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("left", &self.left)
            .field("right", &self.right)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operand_spec_accepts() {
        assert!(OperandSpec::Unchecked.accepts(&json!(null)));
        assert!(OperandSpec::Any.accepts(&json!({"k": 1})));
        assert!(OperandSpec::Any.accepts(&json!(null)));

        let spec = OperandSpec::from([OperandType::Boolean, OperandType::Number]);
        assert!(spec.accepts(&json!(true)));
        assert!(spec.accepts(&json!(1.5)));
        assert!(!spec.accepts(&json!("1")));
        assert!(!spec.accepts(&json!(null)));
    }

    #[test]
    fn test_operand_spec_display() {
        assert_eq!(OperandSpec::from(OperandType::String).to_string(), "string");
        assert_eq!(
            OperandSpec::one_of([OperandType::String, OperandType::Array]).to_string(),
            "string | array"
        );
    }

    #[test]
    fn test_apply_checks_types_in_order() {
        let op = Operator::from_fn(|l, r| l == r)
            .with_types(OperandType::String, OperandType::Number)
            .named("custom");

        assert!(!op.apply(&json!("a"), &json!(1)).unwrap());

        let err = op.apply(&json!(1), &json!("a")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operand 1 of operator 'custom' must be of type string."
        );

        let err = op.apply(&json!("a"), &json!("a")).unwrap_err();
        assert!(matches!(err, RuleError::TypeMismatch { operand: 2, .. }));
    }

    #[test]
    fn test_unchecked_operator_passes_everything() {
        let op = Operator::from_fn(|l, _| l.is_null()).named("nullish");
        assert!(op.test(&json!(null)).unwrap());
        assert!(!op.test(&json!([1])).unwrap());
    }

    #[test]
    fn test_fallible_predicate_propagates() {
        let op = Operator::new(|_, _| Err(RuleError::invalid_operand("boom", "always fails")))
            .named("boom");
        assert!(matches!(
            op.apply(&json!(1), &json!(2)),
            Err(RuleError::InvalidOperand { .. })
        ));
    }
}
