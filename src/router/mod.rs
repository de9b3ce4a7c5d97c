//! 模型路由模块
//!
//! 把分类标签解析为宿主代理模型列表中的部署。
//!
//! 解析顺序：
//! - 标签对应的部署
//! - `default` 部署
//! - 重新加载模型列表后再试一次（按间隔限流）
//! - 仍然失败时返回 `RoutingError`，请求不会被静默放行
//!
//! 路由成功后在 `metadata` 中记录原始模型、标签和最终部署模型。

mod deployment;
mod model_router;
mod source;

pub use deployment::{Deployment, DeploymentParams};
pub use model_router::{
    DecisionKind, ModelRouter, RouteDecision, RouterView, DEFAULT_RETRY_RELOAD_INTERVAL,
};
pub use source::{ModelListSource, StaticModelList, YamlModelList};

#[cfg(test)]
mod tests;
