//! 钩子管道模块
//!
//! 按配置顺序依次执行阶段：
//! 1. `rule_evaluator` - 调用分类器，把标签写入 metadata
//! 2. `model_router` - 按标签路由，改写 `model`
//! 3. `forward_oauth` - 可选，把客户端的 OAuth 头转发给 Anthropic
//!
//! 每个阶段都有隔离边界：阶段失败时记录日志，请求回到该阶段执行前的快照继续向后传递。
//! 只有路由不可满足（`StageError::Routing`）会终止管道。

mod registry;
mod stages;
mod traits;

pub use registry::{LoadedStage, StageRegistry, BUILTIN_HOOK_NAMESPACE};
pub use stages::{ForwardOAuthStage, ModelRouterStage, RuleEvaluatorStage};
pub use traits::PipelineStage;

use crate::classifier::RequestClassifier;
use crate::config::RouterConfig;
use crate::error::{ConfigError, RoutingError, StageError};
use crate::request::{ChatRequest, UserContext};
use crate::router::{ModelRouter, RouterView};
use std::sync::Arc;

/// 阶段可见的引擎句柄
///
/// 只暴露只读访问，阶段不能修改共享对象。
#[derive(Debug, Clone)]
pub struct EngineHandle {
    config: Arc<RouterConfig>,
    classifier: Arc<RequestClassifier>,
    router: Arc<ModelRouter>,
}

impl EngineHandle {
    pub fn new(
        config: Arc<RouterConfig>,
        classifier: Arc<RequestClassifier>,
        router: Arc<ModelRouter>,
    ) -> Self {
        Self {
            config,
            classifier,
            router,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    /// 路由器只读视图，不提供 `reload_models`
    pub fn router(&self) -> RouterView<'_> {
        RouterView::new(&self.router)
    }

    pub(crate) fn model_router(&self) -> &ModelRouter {
        &self.router
    }
}

/// 钩子管道
#[derive(Debug, Clone, Default)]
pub struct HookPipeline {
    stages: Vec<LoadedStage>,
}

impl HookPipeline {
    pub fn new(stages: Vec<LoadedStage>) -> Self {
        Self { stages }
    }

    /// 通过注册表加载配置中的 hooks
    pub fn from_config(
        config: &RouterConfig,
        registry: &StageRegistry,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(registry.load(&config.hooks)?))
    }

    pub fn stages(&self) -> &[LoadedStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// 依次执行全部启用的阶段
    ///
    /// 非致命错误只记录日志，请求保持阶段执行前的状态；路由错误直接返回。
    pub fn run(
        &self,
        request: ChatRequest,
        user: &UserContext,
        engine: &EngineHandle,
    ) -> Result<ChatRequest, RoutingError> {
        let mut current = request;

        for loaded in &self.stages {
            if !loaded.stage.is_enabled() {
                tracing::debug!(stage = %loaded.identifier, "stage disabled, skipping");
                continue;
            }

            match loaded.stage.apply(&current, user, engine) {
                Ok(next) => current = next,
                Err(StageError::Routing(e)) => {
                    tracing::error!(
                        stage = %loaded.identifier,
                        label = %e.label,
                        "routing fallback unsatisfiable, aborting pipeline"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(
                        stage = %loaded.identifier,
                        error_type = %e.error_type(),
                        error_message = %e,
                        "stage failed, continuing with pre-stage request"
                    );
                }
            }
        }

        Ok(current)
    }
}
