//! 路由引擎
//!
//! `RouterEngine` 是宿主代理使用的唯一入口：
//! - `classify_and_route` 对每个请求执行完整的钩子管道
//! - `reload` 用新配置构建完整的引擎状态后原子替换
//! - `reload_models` 重新读取宿主的模型列表
//!
//! 引擎状态加载后只读，请求路径上没有锁；并发请求看到的要么是旧状态要么是新状态。

use crate::classifier::RequestClassifier;
use crate::config::RouterConfig;
use crate::error::{ConfigError, EngineError};
use crate::pipeline::{EngineHandle, HookPipeline, StageRegistry};
use crate::request::{keys, ChatRequest, UserContext};
use crate::router::{DecisionKind, Deployment, ModelListSource, ModelRouter};
use crate::rules::RuleRegistry;
use arc_swap::ArcSwap;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// 引擎状态快照
#[derive(Debug)]
pub struct EngineState {
    handle: EngineHandle,
    pipeline: HookPipeline,
}

impl EngineState {
    /// 从配置构建完整状态
    ///
    /// 规则和钩子在这里全部解析和实例化，任何失败都会在请求到达前暴露。
    pub fn build(
        config: RouterConfig,
        rules: &RuleRegistry,
        stages: &StageRegistry,
        router: Arc<ModelRouter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = RequestClassifier::from_config(&config, rules)?;
        let pipeline = HookPipeline::from_config(&config, stages)?;

        tracing::info!(
            rules = ?classifier.labels(),
            hooks = ?pipeline
                .stages()
                .iter()
                .map(|s| s.identifier.as_str())
                .collect::<Vec<_>>(),
            "router engine state built"
        );

        Ok(Self {
            handle: EngineHandle::new(Arc::new(config), Arc::new(classifier), router),
            pipeline,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        self.handle.config()
    }

    pub fn classifier(&self) -> &RequestClassifier {
        self.handle.classifier()
    }

    pub fn router(&self) -> &ModelRouter {
        self.handle.model_router()
    }

    pub fn pipeline(&self) -> &HookPipeline {
        &self.pipeline
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }
}

/// 路由引擎
pub struct RouterEngine {
    state: ArcSwap<EngineState>,
    rules: RuleRegistry,
    stages: StageRegistry,
    router: Arc<ModelRouter>,
}

impl RouterEngine {
    /// 使用内置规则和阶段创建引擎
    pub fn new(
        config: RouterConfig,
        source: Arc<dyn ModelListSource>,
    ) -> Result<Self, ConfigError> {
        Self::with_registries(
            config,
            RuleRegistry::with_builtins(),
            StageRegistry::with_builtins(),
            source,
        )
    }

    /// 使用自定义注册表创建引擎
    pub fn with_registries(
        config: RouterConfig,
        rules: RuleRegistry,
        stages: StageRegistry,
        source: Arc<dyn ModelListSource>,
    ) -> Result<Self, ConfigError> {
        let router = Arc::new(ModelRouter::new(source));
        let state = EngineState::build(config, &rules, &stages, router.clone())?;
        Ok(Self {
            state: ArcSwap::from_pointee(state),
            rules,
            stages,
            router,
        })
    }

    /// 从配置文件创建引擎
    pub fn from_file(path: &Path, source: Arc<dyn ModelListSource>) -> Result<Self, ConfigError> {
        Self::new(RouterConfig::load_from_file(path)?, source)
    }

    /// 对请求分类并路由
    ///
    /// 返回改写后的请求；只有路由不可满足时返回错误。
    pub fn classify_and_route(
        &self,
        mut request: ChatRequest,
        user: &UserContext,
    ) -> Result<ChatRequest, EngineError> {
        let state = self.state.load_full();

        let request_id = match request.metadata_str(keys::REQUEST_ID) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                request.set_metadata(keys::REQUEST_ID, Value::String(id.clone()));
                id
            }
        };

        let span = tracing::debug_span!("classify_and_route", request_id = %request_id);
        let _enter = span.enter();

        let routed = state.pipeline.run(request, user, &state.handle)?;
        log_routing_decision(&routed);
        Ok(routed)
    }

    /// 只分类，不修改请求
    pub fn classify(&self, request: &ChatRequest) -> String {
        let state = self.state.load();
        state.classifier().classify(request, state.config())
    }

    /// 用新配置替换引擎状态
    ///
    /// 新状态构建失败时返回错误，当前状态保持不变。
    pub fn reload(&self, config: RouterConfig) -> Result<(), ConfigError> {
        let state = EngineState::build(config, &self.rules, &self.stages, self.router.clone())?;
        self.state.store(Arc::new(state));
        tracing::info!("router engine reloaded");
        Ok(())
    }

    pub fn reload_from_file(&self, path: &Path) -> Result<(), ConfigError> {
        self.reload(RouterConfig::load_from_file(path)?)
    }

    /// 重新读取宿主的模型列表
    pub fn reload_models(&self) {
        self.router.reload_models();
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> Arc<EngineState> {
        self.state.load_full()
    }

    pub fn config(&self) -> RouterConfig {
        self.state.load().config().clone()
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }
}

impl std::fmt::Debug for RouterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEngine")
            .field("state", &self.state.load_full())
            .finish()
    }
}

/// 记录路由决策
fn log_routing_decision(request: &ChatRequest) {
    let label = request.metadata_str(keys::MODEL_NAME);
    let original_model = request.metadata_str(keys::ALIAS_MODEL);
    let routed_model = request.metadata_str(keys::LITELLM_MODEL);
    let is_passthrough = request
        .metadata_value(keys::IS_PASSTHROUGH)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let kind = if is_passthrough {
        DecisionKind::Passthrough
    } else if original_model == routed_model {
        DecisionKind::NoChange
    } else {
        DecisionKind::Routed
    };

    let model_info = request
        .metadata_value(keys::MODEL_CONFIG)
        .and_then(Deployment::from_value)
        .and_then(|d| d.safe_model_info());

    tracing::info!(
        decision = kind.as_str(),
        label = label.unwrap_or("<none>"),
        original_model = original_model.unwrap_or("<none>"),
        routed_model = routed_model.unwrap_or("<none>"),
        is_passthrough,
        model_info = ?model_info,
        "routing decision"
    );
}
