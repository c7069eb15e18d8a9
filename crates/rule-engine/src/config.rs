//! 配置管理模块
//!
//! 配置文件与环境变量分层加载，缺失的配置项使用默认值。

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::builtins::DEFAULT_REGEX_CACHE_LIMIT;
use crate::error::Result;

/// 环境变量前缀（`RULE_ENGINE_TRACE_ENABLED`、`RULE_ENGINE_LOGGING__LOG_LEVEL`）
const ENV_PREFIX: &str = "RULE_ENGINE";

/// 服务特定配置文件名（不含扩展名）
const SERVICE_CONFIG: &str = "rule-engine";

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 结构化 JSON
    Json,
    /// 人类可读
    #[default]
    Pretty,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 求值时记录评估追踪并以 debug 级别输出
    pub trace_enabled: bool,
    /// 执行规则前先做完整校验，不合法时不产生任何副作用
    ///
    /// 校验总是要求执行者（或事实对象）存在，因此开启后即使规则没有动作，
    /// 缺少执行者也会以 `Actor is required` 失败；关闭时空动作列表不需要执行者。
    pub validate_before_execute: bool,
    /// `matches_regex` 编译缓存上限，0 表示不缓存
    pub regex_cache_limit: usize,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_enabled: false,
            validate_before_execute: false,
            regex_cache_limit: DEFAULT_REGEX_CACHE_LIMIT,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/rule-engine.toml（引擎特定配置）
    /// 3. 环境变量（RULE_ENGINE_ 前缀，嵌套字段用 `__` 分隔）
    ///
    /// 配置目录可通过 `CONFIG_DIR` 环境变量指定，默认为 `config`。
    pub fn load() -> Result<Self> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from(config_dir)
    }

    /// 从指定目录加载配置
    pub fn load_from(config_dir: impl AsRef<Path>) -> Result<Self> {
        Self::build(config_dir.as_ref(), Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn build(config_dir: &Path, environment: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", SERVICE_CONFIG))).required(false),
            )
            .add_source(environment)
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn no_env() -> Environment {
        EngineConfig::environment().source(Some(HashMap::new()))
    }

    fn repo_config_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config")
    }

    #[test]
    fn test_defaults_without_files() {
        let config = EngineConfig::build(Path::new("/nonexistent/config"), no_env()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.regex_cache_limit, 256);
        assert_eq!(config.logging.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_service_file_overrides_default_file() {
        let config = EngineConfig::build(&repo_config_dir(), no_env()).unwrap();
        assert!(config.validate_before_execute);
        assert!(!config.trace_enabled);
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.regex_cache_limit, 256);
    }

    #[test]
    fn test_environment_overrides_files() {
        let vars = HashMap::from([
            ("RULE_ENGINE_TRACE_ENABLED".to_string(), "true".to_string()),
            ("RULE_ENGINE_REGEX_CACHE_LIMIT".to_string(), "0".to_string()),
            ("RULE_ENGINE_LOGGING__LOG_FORMAT".to_string(), "json".to_string()),
            ("OTHER_TRACE_ENABLED".to_string(), "false".to_string()),
        ]);
        let environment = EngineConfig::environment().source(Some(vars));

        let config = EngineConfig::build(&repo_config_dir(), environment).unwrap();
        assert!(config.trace_enabled);
        assert_eq!(config.regex_cache_limit, 0);
        assert_eq!(config.logging.log_format, LogFormat::Json);
        assert_eq!(config.logging.log_level, "debug");
    }
}
