//! 标签到部署的路由
//!
//! 把分类标签映射到宿主模型列表中的部署：
//! 1. 直接按标签查找
//! 2. 找不到时回退到 `default` 部署
//! 3. 仍找不到时重新加载一次模型列表再试（按间隔限流，间隔内直接失败）
//! 4. 依然失败返回 `RoutingError`
//!
//! 模型列表在第一次使用时加载，之后只读；`reload_models` 原子替换整张表。

use super::deployment::Deployment;
use super::source::ModelListSource;
use crate::classifier::DEFAULT_LABEL;
use crate::error::RoutingError;
use crate::request::{keys, ChatRequest};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 未命中触发的重载最小间隔
pub const DEFAULT_RETRY_RELOAD_INTERVAL: Duration = Duration::from_secs(5);

/// 路由决策类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// 路由到了不同的模型
    Routed,
    /// 命中了部署，但模型与原始请求相同
    NoChange,
    /// 标签为 default 且启用透传，保留原始模型
    Passthrough,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Routed => "ROUTED",
            DecisionKind::NoChange => "NO CHANGE",
            DecisionKind::Passthrough => "PASSTHROUGH",
        }
    }
}

/// 路由结果
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// 路由标签
    pub label: String,
    /// 客户端原始请求的模型
    pub original_model: Option<String>,
    /// 最终解析的部署模型
    pub resolved_model: String,
    /// 命中的部署（透传时为 None）
    pub deployment: Option<Arc<Deployment>>,
    /// 决策类型
    pub kind: DecisionKind,
}

/// 已加载的模型表
#[derive(Debug, Default)]
struct ModelTable {
    /// 标签 -> 部署
    by_name: IndexMap<String, Arc<Deployment>>,
    /// 完整模型列表（保留重复别名）
    list: Vec<Arc<Deployment>>,
    /// 底层模型 -> 别名列表
    group_alias: IndexMap<String, Vec<String>>,
}

impl ModelTable {
    fn build(entries: &[Value]) -> Self {
        let mut table = Self::default();
        for entry in entries {
            let Some(deployment) = Deployment::from_value(entry) else {
                tracing::debug!("skipping model list entry without model_name");
                continue;
            };
            let deployment = Arc::new(deployment);

            if let Some(underlying) = deployment.underlying_model() {
                table
                    .group_alias
                    .entry(underlying.to_string())
                    .or_default()
                    .push(deployment.model_name.clone());
            }
            table.list.push(deployment.clone());
            // 同名部署以后出现的为准
            table
                .by_name
                .insert(deployment.model_name.clone(), deployment);
        }
        table
    }

    fn lookup(&self, label: &str) -> Option<Arc<Deployment>> {
        self.by_name
            .get(label)
            .or_else(|| self.by_name.get(DEFAULT_LABEL))
            .cloned()
    }
}

/// 模型路由器
pub struct ModelRouter {
    source: Arc<dyn ModelListSource>,
    table: RwLock<Option<Arc<ModelTable>>>,
    /// 串行化加载，避免并发重复读取来源
    load_lock: Mutex<()>,
    /// 上次未命中重载的时间
    last_retry_reload: Mutex<Option<Instant>>,
    retry_interval: Duration,
}

impl ModelRouter {
    pub fn new(source: Arc<dyn ModelListSource>) -> Self {
        Self {
            source,
            table: RwLock::new(None),
            load_lock: Mutex::new(()),
            last_retry_reload: Mutex::new(None),
            retry_interval: DEFAULT_RETRY_RELOAD_INTERVAL,
        }
    }

    /// 设置未命中重载的最小间隔
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// 间隔内只允许一次未命中重载
    fn claim_retry_reload(&self) -> bool {
        let mut last = self.last_retry_reload.lock();
        let now = Instant::now();
        if last.is_some_and(|at| now.duration_since(at) < self.retry_interval) {
            return false;
        }
        *last = Some(now);
        true
    }

    /// 取当前模型表，首次访问时加载
    fn table(&self) -> Arc<ModelTable> {
        if let Some(table) = self.table.read().as_ref() {
            return table.clone();
        }

        let _guard = self.load_lock.lock();
        // 双重检查
        if let Some(table) = self.table.read().as_ref() {
            return table.clone();
        }
        let table = Arc::new(self.load_table());
        *self.table.write() = Some(table.clone());
        table
    }

    fn load_table(&self) -> ModelTable {
        let entries = match self.source.model_list() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "model list unavailable, no models loaded");
                Vec::new()
            }
        };
        let table = ModelTable::build(&entries);

        if table.by_name.is_empty() {
            tracing::error!("no models were loaded from the model list, check proxy configuration");
        } else {
            let mut names: Vec<&str> = table.by_name.keys().map(String::as_str).collect();
            names.sort_unstable();
            tracing::info!(count = names.len(), models = ?names, "model list loaded");
        }
        table
    }

    /// 强制重新加载模型列表
    ///
    /// 新表构建完成后整体替换，并发请求看到的要么是旧表要么是新表。
    pub fn reload_models(&self) {
        let _guard = self.load_lock.lock();
        let table = Arc::new(self.load_table());
        *self.table.write() = Some(table);
    }

    /// 查找标签对应的部署，找不到时回退到 default
    pub fn get_model_for_label(&self, label: &str) -> Option<Arc<Deployment>> {
        self.table().lookup(label)
    }

    /// 解析标签，找不到时重新加载一次模型列表
    pub fn route(&self, label: &str) -> Result<Arc<Deployment>, RoutingError> {
        if let Some(deployment) = self.get_model_for_label(label) {
            return Ok(deployment);
        }

        if !self.claim_retry_reload() {
            tracing::debug!(label = %label, "model list reloaded recently, skipping retry");
            return Err(RoutingError::new(label));
        }

        tracing::warn!(
            label = %label,
            "no model configured for label and no default fallback, reloading model list"
        );
        self.reload_models();

        match self.get_model_for_label(label) {
            Some(deployment) => {
                tracing::info!(
                    label = %label,
                    routed_model = %deployment.resolved_model(),
                    "routed after model reload"
                );
                Ok(deployment)
            }
            None => Err(RoutingError::new(label)),
        }
    }

    /// 路由请求并把决策写入 metadata
    ///
    /// 写入原始模型、标签和最终部署模型；`passthrough` 为 true 且标签为 default 时保留原始模型。
    pub fn route_request(
        &self,
        label: &str,
        request: &mut ChatRequest,
        passthrough: bool,
    ) -> Result<RouteDecision, RoutingError> {
        let original_model = request
            .metadata_str(keys::ALIAS_MODEL)
            .or_else(|| request.model())
            .map(str::to_string);

        if passthrough && label == DEFAULT_LABEL {
            if let Some(original) = &original_model {
                let decision = RouteDecision {
                    label: label.to_string(),
                    original_model: original_model.clone(),
                    resolved_model: original.clone(),
                    deployment: None,
                    kind: DecisionKind::Passthrough,
                };
                write_decision(request, &decision);
                tracing::debug!(model = %original, "passthrough for default label, keeping original model");
                return Ok(decision);
            }
            tracing::warn!("no original model found for passthrough, falling back to routing");
        }

        let deployment = self.route(label)?;
        if deployment.underlying_model().is_none() {
            tracing::warn!(
                label = %label,
                model_name = %deployment.model_name,
                "deployment has no litellm_params.model, using its model_name"
            );
        }
        let resolved_model = deployment.resolved_model().to_string();
        let kind = if original_model.as_deref() == Some(resolved_model.as_str()) {
            DecisionKind::NoChange
        } else {
            DecisionKind::Routed
        };

        request.set_model(resolved_model.clone());
        let decision = RouteDecision {
            label: label.to_string(),
            original_model,
            resolved_model,
            deployment: Some(deployment),
            kind,
        };
        write_decision(request, &decision);
        Ok(decision)
    }

    /// 完整模型列表
    pub fn model_list(&self) -> Vec<Arc<Deployment>> {
        self.table().list.clone()
    }

    /// 底层模型 -> 别名列表
    pub fn model_group_alias(&self) -> IndexMap<String, Vec<String>> {
        self.table().group_alias.clone()
    }

    /// 可用的部署别名（排序后）
    pub fn available_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_model_available(&self, model_name: &str) -> bool {
        self.table().by_name.contains_key(model_name)
    }
}

/// 路由器的只读视图
///
/// 交给管道阶段使用：可以路由和查询，不能强制重载模型列表。
#[derive(Debug, Clone, Copy)]
pub struct RouterView<'a> {
    router: &'a ModelRouter,
}

impl<'a> RouterView<'a> {
    pub fn new(router: &'a ModelRouter) -> Self {
        Self { router }
    }

    pub fn get_model_for_label(&self, label: &str) -> Option<Arc<Deployment>> {
        self.router.get_model_for_label(label)
    }

    pub fn route(&self, label: &str) -> Result<Arc<Deployment>, RoutingError> {
        self.router.route(label)
    }

    pub fn route_request(
        &self,
        label: &str,
        request: &mut ChatRequest,
        passthrough: bool,
    ) -> Result<RouteDecision, RoutingError> {
        self.router.route_request(label, request, passthrough)
    }

    pub fn model_list(&self) -> Vec<Arc<Deployment>> {
        self.router.model_list()
    }

    pub fn model_group_alias(&self) -> IndexMap<String, Vec<String>> {
        self.router.model_group_alias()
    }

    pub fn available_models(&self) -> Vec<String> {
        self.router.available_models()
    }

    pub fn is_model_available(&self, model_name: &str) -> bool {
        self.router.is_model_available(model_name)
    }
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRouter")
            .field("loaded", &self.table.read().is_some())
            .finish()
    }
}

fn write_decision(request: &mut ChatRequest, decision: &RouteDecision) {
    let metadata = request.metadata_mut();
    metadata.insert(
        keys::MODEL_NAME.to_string(),
        Value::String(decision.label.clone()),
    );
    metadata.insert(
        keys::ALIAS_MODEL.to_string(),
        decision
            .original_model
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    metadata.insert(
        keys::LITELLM_MODEL.to_string(),
        Value::String(decision.resolved_model.clone()),
    );
    metadata.insert(
        keys::MODEL_CONFIG.to_string(),
        decision
            .deployment
            .as_ref()
            .map(|d| d.to_value())
            .unwrap_or(Value::Null),
    );
    metadata.insert(
        keys::IS_PASSTHROUGH.to_string(),
        Value::Bool(decision.kind == DecisionKind::Passthrough),
    );
    metadata.insert(
        keys::ROUTED_AT.to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
}
