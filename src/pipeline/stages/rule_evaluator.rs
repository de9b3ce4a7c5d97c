//! 规则评估阶段
//!
//! 调用分类器得到标签，写入 `proxycast_model_name`，并记录客户端原始模型。

use crate::error::StageError;
use crate::pipeline::{EngineHandle, PipelineStage};
use crate::request::{keys, ChatRequest, UserContext};
use serde_json::Value;

/// 规则评估阶段
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluatorStage;

impl PipelineStage for RuleEvaluatorStage {
    fn apply(
        &self,
        request: &ChatRequest,
        _user: &UserContext,
        engine: &EngineHandle,
    ) -> Result<ChatRequest, StageError> {
        let label = engine.classifier().classify(request, engine.config());

        let mut next = request.clone();
        let original_model = request
            .model()
            .map(|m| Value::String(m.to_string()))
            .unwrap_or(Value::Null);
        next.set_metadata(keys::ALIAS_MODEL, original_model);
        next.set_metadata(keys::MODEL_NAME, Value::String(label.clone()));

        tracing::debug!(
            label = %label,
            model = request.model().unwrap_or("<none>"),
            "request classified"
        );
        Ok(next)
    }

    fn name(&self) -> &str {
        "rule_evaluator"
    }
}
