//! OAuth 转发阶段
//!
//! Claude Code 客户端（`user-agent` 含 `claude-cli`）的请求被路由到 Anthropic 官方 API 时，
//! 把客户端携带的 `authorization` 头写入 `provider_specific_header.extra_headers`。
//! 经由 Vertex、Bedrock 等托管 Anthropic 模型的部署不会转发。

use crate::error::StageError;
use crate::logger::sanitize_log_message;
use crate::pipeline::{EngineHandle, PipelineStage};
use crate::request::{keys, ChatRequest, UserContext};
use serde_json::{Map, Value};

const CLAUDE_CLI_MARKER: &str = "claude-cli";
const ANTHROPIC_HOSTS: [&str; 2] = ["api.anthropic.com", "anthropic.com"];

/// OAuth 转发阶段
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardOAuthStage;

impl PipelineStage for ForwardOAuthStage {
    fn apply(
        &self,
        request: &ChatRequest,
        _user: &UserContext,
        _engine: &EngineHandle,
    ) -> Result<ChatRequest, StageError> {
        let Some(proxy_request) = request.get("proxy_server_request") else {
            return Ok(request.clone());
        };
        let user_agent = header(proxy_request.get("headers"), "user-agent").unwrap_or_default();
        if !user_agent.contains(CLAUDE_CLI_MARKER) {
            return Ok(request.clone());
        }

        let routed_model = request.metadata_str(keys::LITELLM_MODEL).unwrap_or_default();
        if !targets_anthropic(request.metadata_value(keys::MODEL_CONFIG), routed_model) {
            tracing::debug!(model = %routed_model, "destination is not Anthropic, oauth not forwarded");
            return Ok(request.clone());
        }

        let raw_headers = request
            .get("secret_fields")
            .and_then(|s| s.get("raw_headers"));
        let Some(authorization) = header(raw_headers, "authorization").filter(|a| !a.is_empty())
        else {
            return Ok(request.clone());
        };

        let mut next = request.clone();
        let extra_headers = extra_headers_mut(&mut next)?;
        extra_headers.insert(
            "authorization".to_string(),
            Value::String(authorization.to_string()),
        );

        tracing::info!(
            user_agent = %sanitize_log_message(user_agent),
            model = %routed_model,
            auth_present = true,
            "forwarding request with Claude Code OAuth authentication"
        );
        Ok(next)
    }

    fn name(&self) -> &str {
        "forward_oauth"
    }
}

/// 大小写不敏感地读取头字段
fn header<'a>(headers: Option<&'a Value>, name: &str) -> Option<&'a str> {
    headers?
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.as_str())
}

/// 最终目的地是否为 Anthropic 官方 API
fn targets_anthropic(model_config: Option<&Value>, routed_model: &str) -> bool {
    let params = model_config.and_then(|c| c.get("litellm_params"));
    let api_base = params
        .and_then(|p| p.get("api_base"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let provider = params
        .and_then(|p| p.get("custom_llm_provider"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if !api_base.is_empty() {
        return match url::Url::parse(api_base) {
            Ok(url) => url
                .host_str()
                .is_some_and(|host| ANTHROPIC_HOSTS.contains(&host)),
            Err(e) => {
                tracing::warn!(api_base = %api_base, error = %e, "unparseable api_base");
                false
            }
        };
    }
    if !provider.is_empty() {
        return provider == "anthropic";
    }
    routed_model.starts_with("anthropic/") || routed_model.starts_with("claude")
}

fn extra_headers_mut(request: &mut ChatRequest) -> Result<&mut Map<String, Value>, StageError> {
    if request.get("provider_specific_header").map_or(true, Value::is_null) {
        request.insert("provider_specific_header", Value::Object(Map::new()));
    }
    let provider_header = request
        .get_mut("provider_specific_header")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            StageError::InvalidRequest("provider_specific_header is not an object".to_string())
        })?;

    let extra = provider_header
        .entry("extra_headers")
        .or_insert_with(|| Value::Object(Map::new()));
    if extra.is_null() {
        *extra = Value::Object(Map::new());
    }
    extra.as_object_mut().ok_or_else(|| {
        StageError::InvalidRequest(
            "provider_specific_header.extra_headers is not an object".to_string(),
        )
    })
}
