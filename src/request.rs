//! 请求模型
//!
//! `ChatRequest` 是宿主代理传入的聊天补全请求。引擎只关心其中一部分字段，
//! 其余字段（`proxy_server_request`、`secret_fields` 等）原样保留。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 路由决策写入 `metadata` 时使用的键
pub mod keys {
    /// 命中的路由标签
    pub const MODEL_NAME: &str = "proxycast_model_name";
    /// 客户端原始请求的模型
    pub const ALIAS_MODEL: &str = "proxycast_alias_model";
    /// 最终解析到的部署模型
    pub const LITELLM_MODEL: &str = "proxycast_litellm_model";
    /// 命中的部署配置（透传时为 null）
    pub const MODEL_CONFIG: &str = "proxycast_model_config";
    /// 是否为透传决策
    pub const IS_PASSTHROUGH: &str = "proxycast_is_passthrough";
    /// 请求 ID
    pub const REQUEST_ID: &str = "proxycast_request_id";
    /// 路由决策时间
    pub const ROUTED_AT: &str = "proxycast_routed_at";
}

/// 聊天补全请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatRequest {
    fields: Map<String, Value>,
}

impl ChatRequest {
    /// 创建只包含模型名的请求
    pub fn new(model: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("model".to_string(), Value::String(model.into()));
        fields.insert("messages".to_string(), Value::Array(Vec::new()));
        Self { fields }
    }

    /// 从 JSON 值构造，非对象返回 None
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    /// 请求的模型名（缺失或非字符串时返回 None）
    pub fn model(&self) -> Option<&str> {
        self.fields.get("model").and_then(Value::as_str)
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.fields
            .insert("model".to_string(), Value::String(model.into()));
    }

    /// 消息列表
    pub fn messages(&self) -> &[Value] {
        self.fields
            .get("messages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 追加一条消息
    pub fn push_message(&mut self, role: &str, content: impl Into<Value>) {
        let entry = self
            .fields
            .entry("messages")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(messages) = entry {
            messages.push(serde_json::json!({ "role": role, "content": content.into() }));
        }
    }

    /// 工具列表（未提供时为 None）
    pub fn tools(&self) -> Option<&Value> {
        self.fields.get("tools").filter(|v| !v.is_null())
    }

    /// thinking 参数（未提供时为 None）
    pub fn thinking(&self) -> Option<&Value> {
        self.fields.get("thinking").filter(|v| !v.is_null())
    }

    pub fn is_stream(&self) -> bool {
        self.fields
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// 只读元数据
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.fields.get("metadata").and_then(Value::as_object)
    }

    /// 可变元数据，缺失或类型不对时重建为空对象
    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .fields
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("metadata was just normalised to an object"),
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata().and_then(|m| m.get(key))
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata_value(key).and_then(Value::as_str)
    }

    pub fn set_metadata(&mut self, key: &str, value: Value) {
        self.metadata_mut().insert(key.to_string(), value);
    }
}

impl From<Map<String, Value>> for ChatRequest {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// 调用方上下文
///
/// 宿主代理鉴权后得到的调用方信息，阶段只读。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// API Key 别名
    #[serde(default)]
    pub key_alias: Option<String>,
    /// 用户 ID
    #[serde(default)]
    pub user_id: Option<String>,
    /// 团队 ID
    #[serde(default)]
    pub team_id: Option<String>,
    /// 其他字段
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl UserContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}
