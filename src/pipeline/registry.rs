//! 管道阶段注册表
//!
//! 把配置中的 hooks 标识解析为阶段实例，未知标识是加载期的致命错误。

use super::stages::{ForwardOAuthStage, ModelRouterStage, RuleEvaluatorStage};
use super::traits::PipelineStage;
use crate::config::HookSpec;
use crate::error::ConfigError;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// 内置阶段命名空间，不带点的标识在此命名空间下解析
pub const BUILTIN_HOOK_NAMESPACE: &str = "proxycast.hooks";

type BuildFn = dyn Fn() -> Arc<dyn PipelineStage> + Send + Sync;

/// 已加载的阶段实例
#[derive(Clone)]
pub struct LoadedStage {
    /// 解析后的完整标识
    pub identifier: String,
    pub stage: Arc<dyn PipelineStage>,
}

impl fmt::Debug for LoadedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedStage")
            .field("identifier", &self.identifier)
            .field("stage", &self.stage.name())
            .finish()
    }
}

/// 阶段注册表
#[derive(Clone)]
pub struct StageRegistry {
    factories: IndexMap<String, Arc<BuildFn>>,
}

impl StageRegistry {
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// 创建包含内置阶段的注册表
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            &format!("{}.rule_evaluator", BUILTIN_HOOK_NAMESPACE),
            || Arc::new(RuleEvaluatorStage),
        );
        registry.register(
            &format!("{}.model_router", BUILTIN_HOOK_NAMESPACE),
            || Arc::new(ModelRouterStage),
        );
        registry.register(
            &format!("{}.forward_oauth", BUILTIN_HOOK_NAMESPACE),
            || Arc::new(ForwardOAuthStage),
        );
        registry
    }

    /// 注册阶段，同名标识会被覆盖
    pub fn register<F>(&mut self, identifier: &str, build: F)
    where
        F: Fn() -> Arc<dyn PipelineStage> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(identifier.to_string(), Arc::new(build))
            .is_some()
        {
            tracing::warn!(identifier = %identifier, "stage factory replaced");
        }
    }

    fn resolve(&self, identifier: &str) -> Option<(&str, &Arc<BuildFn>)> {
        if let Some((key, build)) = self.factories.get_key_value(identifier) {
            return Some((key.as_str(), build));
        }
        if identifier.contains('.') {
            return None;
        }
        self.factories
            .get_key_value(&format!("{}.{}", BUILTIN_HOOK_NAMESPACE, identifier))
            .map(|(key, build)| (key.as_str(), build))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.resolve(identifier).is_some()
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// 按顺序实例化全部阶段
    pub fn load(&self, hooks: &[HookSpec]) -> Result<Vec<LoadedStage>, ConfigError> {
        hooks
            .iter()
            .map(|hook| {
                let (identifier, build) = self.resolve(hook.identifier()).ok_or_else(|| {
                    ConfigError::UnknownIdentifier {
                        kind: "钩子",
                        identifier: hook.identifier().to_string(),
                    }
                })?;
                tracing::debug!(stage = %identifier, "stage loaded");
                Ok(LoadedStage {
                    identifier: identifier.to_string(),
                    stage: build(),
                })
            })
            .collect()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}
