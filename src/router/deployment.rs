//! 部署定义
//!
//! 对应宿主代理模型列表中的一项：
//! `{model_name, litellm_params: {model, api_base, custom_llm_provider, ...}, model_info}`
//!
//! 解析按字段进行，某个字段类型不对只影响它自己；原始条目整体保留，写入 metadata 时原样输出。

use serde_json::{Map, Value};

/// 模型列表中不应出现在日志里的字段
const SENSITIVE_INFO_KEYS: [&str; 4] = ["api_key", "secret", "token", "password"];

/// 部署调用参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentParams {
    /// 底层模型标识
    pub model: Option<String>,
    /// API 地址
    pub api_base: Option<String>,
    /// 自定义 Provider
    pub custom_llm_provider: Option<String>,
    /// 其他调用参数
    pub extra: Map<String, Value>,
}

impl DeploymentParams {
    const TYPED_KEYS: [&'static str; 3] = ["model", "api_base", "custom_llm_provider"];

    fn from_map(model_name: &str, raw: &Map<String, Value>) -> Self {
        let string_field = |key: &str| match raw.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                tracing::warn!(
                    model_name = %model_name,
                    field = key,
                    value = %other,
                    "litellm_params field is not a string, ignoring it"
                );
                None
            }
        };

        Self {
            model: string_field("model"),
            api_base: string_field("api_base"),
            custom_llm_provider: string_field("custom_llm_provider"),
            extra: raw
                .iter()
                .filter(|(k, _)| !Self::TYPED_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// 一个可路由的模型部署
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    /// 部署别名（即路由标签）
    pub model_name: String,
    /// 调用参数
    pub litellm_params: DeploymentParams,
    /// 附加信息
    pub model_info: Option<Value>,
    /// 模型列表中的原始条目（含 tpm/rpm 等顶层字段）
    entry: Map<String, Value>,
}

impl Deployment {
    pub fn new(model_name: &str, model: &str) -> Self {
        let mut entry = Map::new();
        entry.insert("model_name".into(), Value::String(model_name.to_string()));
        let mut deployment = Self {
            model_name: model_name.to_string(),
            litellm_params: DeploymentParams::default(),
            model_info: None,
            entry,
        };
        deployment.set_param("model", model);
        deployment.litellm_params.model = Some(model.to_string());
        deployment
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.set_param("api_base", api_base);
        self.litellm_params.api_base = Some(api_base.to_string());
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.set_param("custom_llm_provider", provider);
        self.litellm_params.custom_llm_provider = Some(provider.to_string());
        self
    }

    pub fn with_model_info(mut self, info: Value) -> Self {
        self.entry.insert("model_info".into(), info.clone());
        self.model_info = Some(info);
        self
    }

    fn set_param(&mut self, key: &str, value: &str) {
        let params = self
            .entry
            .entry("litellm_params")
            .or_insert_with(|| Value::Object(Map::new()));
        if !params.is_object() {
            *params = Value::Object(Map::new());
        }
        if let Value::Object(params) = params {
            params.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    /// 宽松解析模型列表项
    ///
    /// 没有 `model_name` 的项返回 None；`litellm_params` 不是对象时按空参数处理。
    pub fn from_value(entry: &Value) -> Option<Self> {
        let raw = entry.as_object()?;
        let model_name = raw.get("model_name")?.as_str()?;
        if model_name.is_empty() {
            return None;
        }

        let litellm_params = match raw.get("litellm_params") {
            None | Some(Value::Null) => DeploymentParams::default(),
            Some(Value::Object(params)) => DeploymentParams::from_map(model_name, params),
            Some(other) => {
                tracing::warn!(
                    model_name = %model_name,
                    value = %other,
                    "malformed litellm_params, treating as empty"
                );
                DeploymentParams::default()
            }
        };

        Some(Self {
            model_name: model_name.to_string(),
            litellm_params,
            model_info: raw.get("model_info").filter(|v| !v.is_null()).cloned(),
            entry: raw.clone(),
        })
    }

    /// 底层模型标识
    pub fn underlying_model(&self) -> Option<&str> {
        self.litellm_params
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
    }

    /// 最终解析的部署标识，缺少底层模型时使用部署别名
    pub fn resolved_model(&self) -> &str {
        self.underlying_model().unwrap_or(&self.model_name)
    }

    /// 去除敏感字段后的 model_info
    pub fn safe_model_info(&self) -> Option<Map<String, Value>> {
        let info = self.model_info.as_ref()?.as_object()?;
        let safe: Map<String, Value> = info
            .iter()
            .filter(|(k, _)| !SENSITIVE_INFO_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if safe.is_empty() {
            None
        } else {
            Some(safe)
        }
    }

    /// 原始模型列表条目，写入 metadata 的部署配置
    pub fn to_value(&self) -> Value {
        Value::Object(self.entry.clone())
    }
}
