//! 规则注册表
//!
//! 把配置中的规则标识解析为构造函数，合并参数后实例化。
//! 任何解析或构造失败都是加载期的致命错误。

use super::builtin::{DefaultRule, MatchModelRule, MatchToolRule, ThinkingRule, TokenCountRule};
use super::params::RuleParams;
use super::ClassificationRule;
use crate::config::RuleSpec;
use crate::error::ConfigError;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// 内置规则命名空间，不带点的标识在此命名空间下解析
pub const BUILTIN_RULE_NAMESPACE: &str = "proxycast.rules";

type BuildFn = dyn Fn(&RuleParams) -> Result<Arc<dyn ClassificationRule>, ConfigError> + Send + Sync;

/// 规则构造函数
#[derive(Clone)]
pub struct RuleFactory {
    /// 声明的参数名，位置参数按此顺序绑定
    params: Vec<&'static str>,
    build: Arc<BuildFn>,
}

impl RuleFactory {
    pub fn new<F>(params: &[&'static str], build: F) -> Self
    where
        F: Fn(&RuleParams) -> Result<Arc<dyn ClassificationRule>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            params: params.to_vec(),
            build: Arc::new(build),
        }
    }

    pub fn params(&self) -> &[&'static str] {
        &self.params
    }
}

impl fmt::Debug for RuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleFactory")
            .field("params", &self.params)
            .finish()
    }
}

/// 已加载的规则实例
#[derive(Clone)]
pub struct LoadedRule {
    /// 配置中的规则名（即路由标签）
    pub name: String,
    /// 解析后的完整标识
    pub identifier: String,
    /// 规则实例
    pub rule: Arc<dyn ClassificationRule>,
}

impl fmt::Debug for LoadedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedRule")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("rule", &self.rule.name())
            .finish()
    }
}

/// 规则注册表
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    factories: IndexMap<String, RuleFactory>,
}

impl RuleRegistry {
    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// 创建包含内置规则的注册表
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin(
            "DefaultRule",
            RuleFactory::new(&["passthrough"], |p| {
                let passthrough = p.optional_bool("passthrough")?.unwrap_or(false);
                Ok(Arc::new(DefaultRule::new(passthrough)))
            }),
        );
        registry.register_builtin(
            "ThinkingRule",
            RuleFactory::new(&[], |_| Ok(Arc::new(ThinkingRule))),
        );
        registry.register_builtin(
            "MatchModelRule",
            RuleFactory::new(&["model_name"], |p| {
                Ok(Arc::new(MatchModelRule::new(p.required_str("model_name")?)))
            }),
        );
        registry.register_builtin(
            "MatchToolRule",
            RuleFactory::new(&["tool_name"], |p| {
                Ok(Arc::new(MatchToolRule::new(p.required_str("tool_name")?)))
            }),
        );
        registry.register_builtin(
            "TokenCountRule",
            RuleFactory::new(&["threshold"], |p| {
                Ok(Arc::new(TokenCountRule::new(p.required_u64("threshold")?)))
            }),
        );
        registry
    }

    fn register_builtin(&mut self, type_name: &str, factory: RuleFactory) {
        self.factories
            .insert(format!("{}.{}", BUILTIN_RULE_NAMESPACE, type_name), factory);
    }

    /// 注册规则类型，同名标识会被覆盖
    pub fn register(&mut self, identifier: &str, factory: RuleFactory) {
        if self
            .factories
            .insert(identifier.to_string(), factory)
            .is_some()
        {
            tracing::warn!(identifier = %identifier, "rule factory replaced");
        }
    }

    /// 解析标识，返回完整标识和构造函数
    pub fn resolve(&self, identifier: &str) -> Option<(&str, &RuleFactory)> {
        if let Some((key, factory)) = self.factories.get_key_value(identifier) {
            return Some((key.as_str(), factory));
        }
        if identifier.contains('.') {
            return None;
        }
        let qualified = format!("{}.{}", BUILTIN_RULE_NAMESPACE, identifier);
        self.factories
            .get_key_value(&qualified)
            .map(|(key, factory)| (key.as_str(), factory))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.resolve(identifier).is_some()
    }

    /// 所有已注册的标识（按注册顺序）
    pub fn identifiers(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// 实例化单条规则
    pub fn build(&self, spec: &RuleSpec) -> Result<LoadedRule, ConfigError> {
        let (identifier, factory) =
            self.resolve(&spec.rule)
                .ok_or_else(|| ConfigError::UnknownIdentifier {
                    kind: "规则",
                    identifier: spec.rule.clone(),
                })?;
        let params = RuleParams::merge(&spec.name, &spec.params, factory.params())?;
        let rule = (factory.build)(&params)?;

        Ok(LoadedRule {
            name: spec.name.clone(),
            identifier: identifier.to_string(),
            rule,
        })
    }

    /// 按顺序加载全部规则
    ///
    /// 顺序与配置一致，加载后不再改变。
    pub fn load(&self, specs: &[RuleSpec]) -> Result<Vec<LoadedRule>, ConfigError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());

        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateRule(spec.name.clone()));
            }
            let loaded = self.build(spec)?;
            tracing::debug!(
                rule = %loaded.name,
                identifier = %loaded.identifier,
                "rule loaded"
            );
            rules.push(loaded);
        }

        Ok(rules)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
