//! 事实 / 执行者能力接口
//!
//! 规则引擎只通过方法名调用宿主对象，不依赖反射。宿主可以直接实现 [`Invocable`]，
//! 也可以用 [`MethodTable`] 注册一张 "方法名 → 闭包" 表。

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// 宿主方法调用失败
#[derive(Debug, Error)]
pub enum MethodError {
    #[error("method '{0}' is not defined")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

pub type MethodResult = std::result::Result<Value, MethodError>;

/// 可按名称调用方法的宿主对象
///
/// 事实（fact）提供比较左值，执行者（actor）承接动作调用。两者都以 `&self` 调用，
/// 需要修改自身状态的实现请使用内部可变性。
#[cfg_attr(test, mockall::automock)]
pub trait Invocable {
    /// 用于错误信息的类型名
    fn type_name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// 是否暴露了指定方法
    fn has_method(&self, name: &str) -> bool;

    /// 按位置参数和关键字参数调用方法
    fn call_method(&self, name: &str, args: &[Value], params: &Map<String, Value>)
        -> MethodResult;
}

/// 去掉模块路径和泛型参数：`a::b::Foo<c::Bar>` -> `Foo`
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

type MethodFn<'a> = Box<dyn Fn(&[Value], &Map<String, Value>) -> MethodResult + 'a>;

/// 由宿主注册的方法表
///
/// 闭包可以借用宿主状态（生命周期 `'a`），因此无需为每个宿主类型手写 trait 实现。
///
/// ```ignore
/// let fired = parking_lot::Mutex::new(Vec::new());
/// let actor = MethodTable::new("Notifier")
///     .method("notify", |args, _| {
///         fired.lock().push(args.to_vec());
///         Ok(Value::Null)
///     });
/// ```
pub struct MethodTable<'a> {
    type_name: &'static str,
    methods: HashMap<String, MethodFn<'a>>,
}

impl<'a> MethodTable<'a> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            methods: HashMap::new(),
        }
    }

    /// 注册方法（构建器风格）
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value], &Map<String, Value>) -> MethodResult + 'a,
    {
        self.insert(name, f);
        self
    }

    /// 注册方法，同名方法会被替换
    pub fn insert<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&[Value], &Map<String, Value>) -> MethodResult + 'a,
    {
        self.methods.insert(name.into(), Box::new(f));
        self
    }

    /// 注册返回固定值的无参方法
    pub fn constant(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.method(name, move |_, _| Ok(value.clone()))
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Invocable for MethodTable<'_> {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    fn call_method(&self, name: &str, args: &[Value], params: &Map<String, Value>) -> MethodResult {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| MethodError::NotFound(name.to_string()))?;
        method(args, params)
    }
}

impl fmt::Debug for MethodTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("type_name", &self.type_name)
            .field("methods", &self.method_names())
            .finish()
    }
}
