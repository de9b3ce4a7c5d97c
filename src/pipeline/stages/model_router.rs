//! 模型路由阶段
//!
//! 读取上一阶段写入的标签，通过路由器解析部署并改写请求的 `model`。
//! 缺少标签时按 `default` 处理。

use crate::classifier::DEFAULT_LABEL;
use crate::error::StageError;
use crate::pipeline::{EngineHandle, PipelineStage};
use crate::request::{keys, ChatRequest, UserContext};

/// 模型路由阶段
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelRouterStage;

impl PipelineStage for ModelRouterStage {
    fn apply(
        &self,
        request: &ChatRequest,
        _user: &UserContext,
        engine: &EngineHandle,
    ) -> Result<ChatRequest, StageError> {
        let label = match request.metadata_str(keys::MODEL_NAME) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => {
                tracing::warn!("no routing label in metadata, using default");
                DEFAULT_LABEL.to_string()
            }
        };

        let mut next = request.clone();
        let decision = engine.router().route_request(
            &label,
            &mut next,
            engine.config().default_model_passthrough,
        )?;

        tracing::debug!(
            label = %decision.label,
            resolved_model = %decision.resolved_model,
            decision = decision.kind.as_str(),
            "request routed"
        );
        Ok(next)
    }

    fn name(&self) -> &str {
        "model_router"
    }
}
