//! 路由配置模块
//!
//! 提供配置结构定义、YAML 加载和热重载功能：
//! - `rules`: 有序的分类规则列表
//! - `hooks`: 有序的管道阶段列表
//!
//! 配置文件格式：
//! ```yaml
//! proxycast:
//!   debug: false
//!   default_model_passthrough: false
//!   hooks:
//!     - proxycast.hooks.rule_evaluator
//!     - proxycast.hooks.model_router
//!   rules:
//!     - name: background
//!       rule: proxycast.rules.MatchModelRule
//!       params:
//!         - model_name: claude-3-5-haiku-20241022
//! ```

mod watcher;

pub use watcher::ConfigWatcher;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "PROXYCAST_ROUTER_CONFIG";

/// 规则配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// 规则名，同时也是命中后的路由标签
    pub name: String,
    /// 规则类型标识
    pub rule: String,
    /// 构造参数：位置参数和/或关键字映射
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

impl RuleSpec {
    pub fn new(name: &str, rule: &str, params: Vec<serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            rule: rule.to_string(),
            params,
        }
    }
}

/// 管道阶段标识
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct HookSpec(pub String);

impl HookSpec {
    pub fn new(identifier: &str) -> Self {
        Self(identifier.to_string())
    }

    pub fn identifier(&self) -> &str {
        &self.0
    }
}

fn default_hooks() -> Vec<HookSpec> {
    vec![
        HookSpec::new("proxycast.hooks.rule_evaluator"),
        HookSpec::new("proxycast.hooks.model_router"),
    ]
}

/// 路由配置
///
/// 未知字段直接报错，拼错的键不会被静默忽略。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// 调试模式
    #[serde(default)]
    pub debug: bool,
    /// 标签为 default 时保留客户端原始模型
    #[serde(default)]
    pub default_model_passthrough: bool,
    /// 管道阶段（按顺序执行）
    #[serde(default = "default_hooks")]
    pub hooks: Vec<HookSpec>,
    /// 分类规则（按顺序评估）
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_model_passthrough: false,
            hooks: default_hooks(),
            rules: Vec::new(),
        }
    }
}

/// 带 `proxycast:` 外层的配置文档（允许与宿主的其他配置段并列）
#[derive(Debug, Deserialize)]
struct WrappedConfig {
    proxycast: RouterConfig,
}

impl RouterConfig {
    /// 从 YAML 字符串解析配置
    ///
    /// 同时接受带 `proxycast:` 外层和不带外层的文档。
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        let config = match &document {
            serde_yaml::Value::Mapping(map) if map.contains_key("proxycast") => {
                serde_yaml::from_value::<WrappedConfig>(document)?.proxycast
            }
            serde_yaml::Value::Null => Self::default(),
            _ => serde_yaml::from_value(document)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            rules = config.rules.len(),
            hooks = config.hooks.len(),
            "router config loaded"
        );
        Ok(config)
    }

    /// 默认配置文件路径
    ///
    /// 优先使用 `PROXYCAST_ROUTER_CONFIG`，否则为 `<config_dir>/proxycast/router.yaml`
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proxycast")
            .join("router.yaml")
    }

    /// 结构校验（标识解析在注册表中完成）
    pub fn validate(&self) -> Result<(), ConfigError> {
        for spec in &self.rules {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::Invalid("规则名不能为空".to_string()));
            }
            if spec.rule.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "规则 '{}' 缺少 rule 标识",
                    spec.name
                )));
            }
        }
        for hook in &self.hooks {
            if hook.identifier().trim().is_empty() {
                return Err(ConfigError::Invalid("钩子标识不能为空".to_string()));
            }
        }
        Ok(())
    }

    /// 按名称查找规则配置
    pub fn rule(&self, name: &str) -> Option<&RuleSpec> {
        self.rules.iter().find(|r| r.name == name)
    }
}
