//! ProxyCast Router
//!
//! 位于 LLM 代理前面的请求分类与路由引擎：
//! - 按配置顺序评估分类规则，第一个命中的规则名作为路由标签
//! - 把标签解析为宿主模型列表中的部署，缺失时回退到 `default`
//! - 通过有序的钩子管道改写请求，单个阶段失败不影响其他阶段
//!
//! 引擎只做选择和标注，不直接调用任何模型服务。

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod global;
pub mod logger;
pub mod pipeline;
pub mod request;
pub mod router;
pub mod rules;

pub use classifier::{RequestClassifier, DEFAULT_LABEL};
pub use config::{ConfigWatcher, HookSpec, RouterConfig, RuleSpec};
pub use engine::{EngineState, RouterEngine};
pub use error::{ConfigError, EngineError, RoutingError, RuleError, StageError};
pub use pipeline::{EngineHandle, HookPipeline, PipelineStage, StageRegistry};
pub use request::{keys, ChatRequest, UserContext};
pub use router::{
    Deployment, ModelListSource, ModelRouter, RouterView, StaticModelList, YamlModelList,
};
pub use rules::{ClassificationRule, RuleFactory, RuleParams, RuleRegistry};
