//! 内置分类规则

use super::tokens::{CharEstimator, LengthEstimator, TiktokenEstimator};
use super::ClassificationRule;
use crate::config::RouterConfig;
use crate::error::RuleError;
use crate::request::ChatRequest;
use serde_json::Value;
use std::sync::Arc;

/// 默认规则 - 总是命中，放在规则列表末尾
#[derive(Debug, Clone, Default)]
pub struct DefaultRule {
    /// 兼容旧配置的透传标记，不影响评估结果
    pub passthrough: bool,
}

impl DefaultRule {
    pub fn new(passthrough: bool) -> Self {
        Self { passthrough }
    }
}

impl ClassificationRule for DefaultRule {
    fn evaluate(&self, _request: &ChatRequest, _config: &RouterConfig) -> Result<bool, RuleError> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "DefaultRule"
    }
}

/// thinking 规则 - 请求开启了扩展思考
///
/// 同时接受 `{"enabled": true}` 和 Anthropic 的 `{"type": "enabled"}` 两种写法。
#[derive(Debug, Clone, Copy, Default)]
pub struct ThinkingRule;

impl ClassificationRule for ThinkingRule {
    fn evaluate(&self, request: &ChatRequest, _config: &RouterConfig) -> Result<bool, RuleError> {
        let Some(thinking) = request.thinking() else {
            return Ok(false);
        };
        match thinking {
            Value::Object(map) => {
                let enabled = map.get("enabled").map(is_truthy).unwrap_or(false);
                let typed = map.get("type").and_then(Value::as_str) == Some("enabled");
                Ok(enabled || typed)
            }
            other => Err(RuleError::InvalidField {
                field: "thinking".to_string(),
                message: format!("应为对象，实际为 {}", type_name(other)),
            }),
        }
    }

    fn name(&self) -> &str {
        "ThinkingRule"
    }
}

/// 模型规则 - 请求模型名与配置完全一致（区分大小写）
#[derive(Debug, Clone)]
pub struct MatchModelRule {
    model_name: String,
}

impl MatchModelRule {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl ClassificationRule for MatchModelRule {
    fn evaluate(&self, request: &ChatRequest, _config: &RouterConfig) -> Result<bool, RuleError> {
        Ok(request.model() == Some(self.model_name.as_str()))
    }

    fn name(&self) -> &str {
        "MatchModelRule"
    }
}

/// 工具规则 - 请求携带了指定名称的工具
///
/// 检查 `tools[].name`、OpenAI 格式的 `tools[].function.name` 以及字符串形式的工具项。
#[derive(Debug, Clone)]
pub struct MatchToolRule {
    tool_name: String,
}

impl MatchToolRule {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn tool_matches(&self, tool: &Value) -> bool {
        match tool {
            Value::String(name) => name == &self.tool_name,
            Value::Object(map) => {
                let direct = map.get("name").and_then(Value::as_str);
                let function = map
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str);
                direct == Some(self.tool_name.as_str()) || function == Some(self.tool_name.as_str())
            }
            _ => false,
        }
    }
}

impl ClassificationRule for MatchToolRule {
    fn evaluate(&self, request: &ChatRequest, _config: &RouterConfig) -> Result<bool, RuleError> {
        match request.tools() {
            None => Ok(false),
            Some(Value::Array(tools)) => Ok(tools.iter().any(|t| self.tool_matches(t))),
            Some(other) => Err(RuleError::InvalidField {
                field: "tools".to_string(),
                message: format!("应为数组，实际为 {}", type_name(other)),
            }),
        }
    }

    fn name(&self) -> &str {
        "MatchToolRule"
    }
}

/// 显式 Token 计数字段
const EXPLICIT_COUNT_FIELDS: [&str; 3] = ["token_count", "num_tokens", "input_tokens"];

/// Token 数规则 - 估算 Token 数 >= 阈值时命中
pub struct TokenCountRule {
    threshold: u64,
    /// None 时只使用字符数启发式
    estimator: Option<Arc<dyn LengthEstimator>>,
}

impl TokenCountRule {
    /// 使用进程共享的 tiktoken 估算器
    pub fn new(threshold: u64) -> Self {
        let estimator =
            TiktokenEstimator::shared().map(|e| e as Arc<dyn LengthEstimator>);
        Self {
            threshold,
            estimator,
        }
    }

    /// 指定估算器
    pub fn with_estimator(threshold: u64, estimator: Option<Arc<dyn LengthEstimator>>) -> Self {
        Self {
            threshold,
            estimator,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// 估算请求的 Token 数
    ///
    /// 取文本估算值与请求中显式计数字段的最大值。
    pub fn estimate(&self, request: &ChatRequest) -> u64 {
        let text = collect_text(request);
        let mut count = if text.is_empty() {
            0
        } else {
            self.count_text(&text, request.model()) as u64
        };

        for field in EXPLICIT_COUNT_FIELDS {
            if let Some(explicit) = request.get(field).and_then(Value::as_u64) {
                count = count.max(explicit);
            }
        }
        count
    }

    fn count_text(&self, text: &str, model: Option<&str>) -> usize {
        if let Some(estimator) = &self.estimator {
            match estimator.count(text, model) {
                Ok(count) => return count,
                Err(e) => {
                    tracing::warn!(
                        model = model.unwrap_or(""),
                        error = %e,
                        "token encoding failed, using character estimate"
                    );
                }
            }
        }
        CharEstimator::estimate(text)
    }
}

impl ClassificationRule for TokenCountRule {
    fn evaluate(&self, request: &ChatRequest, _config: &RouterConfig) -> Result<bool, RuleError> {
        Ok(self.estimate(request) >= self.threshold)
    }

    fn name(&self) -> &str {
        "TokenCountRule"
    }
}

/// 收集请求中参与 Token 估算的文本
///
/// 包括消息内容、顶层 system 以及工具的名称和描述，各片段以空格连接。
fn collect_text(request: &ChatRequest) -> String {
    let mut parts: Vec<&str> = Vec::new();

    if let Some(system) = request.get("system") {
        push_content(system, &mut parts);
    }

    for message in request.messages() {
        match message {
            Value::Object(map) => {
                if let Some(content) = map.get("content") {
                    push_content(content, &mut parts);
                }
            }
            Value::String(s) => parts.push(s),
            _ => {}
        }
    }

    if let Some(Value::Array(tools)) = request.tools() {
        for tool in tools {
            let described = tool.get("function").unwrap_or(tool);
            for key in ["name", "description"] {
                if let Some(s) = described.get(key).and_then(Value::as_str) {
                    parts.push(s);
                }
            }
        }
    }

    parts.join(" ").trim().to_string()
}

/// 字符串内容或 `{type: "text", text}` 片段列表
fn push_content<'a>(content: &'a Value, parts: &mut Vec<&'a str>) {
    match content {
        Value::String(s) => parts.push(s),
        Value::Array(items) => {
            for item in items {
                if item.get("type").and_then(Value::as_str) == Some("text") {
                    if let Some(text) = item.get("text").and_then(Value::as_str) {
                        parts.push(text);
                    }
                }
            }
        }
        _ => {}
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
