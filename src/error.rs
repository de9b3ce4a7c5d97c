//! 路由引擎错误类型
//!
//! 定义规则评估、管道阶段、模型路由和配置加载过程中可能发生的错误。
//!
//! - `RuleError` / `StageError` 在请求路径上被就地恢复，只记录日志
//! - `RoutingError` / `ConfigError` 会返回给宿主代理

use thiserror::Error;

/// 规则评估错误
///
/// 规则在运行时失败时返回，分类器会把该规则视为不匹配。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    /// 请求字段类型与规则预期不符
    #[error("请求字段 {field} 格式无效: {message}")]
    InvalidField { field: String, message: String },

    /// 规则内部错误
    #[error("规则评估失败: {0}")]
    Evaluation(String),
}

impl RuleError {
    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            RuleError::InvalidField { .. } => "invalid_field",
            RuleError::Evaluation(_) => "rule_evaluation_error",
        }
    }
}

/// 路由失败：标签和 `default` 都没有可用部署
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("路由失败: 标签 '{label}' 没有配置模型，且不存在 'default' 模型可回退")]
pub struct RoutingError {
    /// 请求路由的标签
    pub label: String,
}

impl RoutingError {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// 配置错误
///
/// 加载阶段的致命错误，进程应拒绝启动。
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("无法读取配置文件 {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML 解析失败
    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// 规则或钩子标识无法解析
    #[error("无法解析{kind}标识: {identifier}")]
    UnknownIdentifier {
        kind: &'static str,
        identifier: String,
    },

    /// 规则构造参数无效
    #[error("规则 '{rule}' 参数无效: {message}")]
    InvalidParams { rule: String, message: String },

    /// 规则名重复
    #[error("规则名重复: {0}")]
    DuplicateRule(String),

    /// 其他校验错误
    #[error("配置无效: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io_error",
            ConfigError::Parse(_) => "config_parse_error",
            ConfigError::UnknownIdentifier { .. } => "unknown_identifier",
            ConfigError::InvalidParams { .. } => "invalid_params",
            ConfigError::DuplicateRule(_) => "duplicate_rule",
            ConfigError::Invalid(_) => "config_error",
        }
    }
}

/// 管道阶段错误
#[derive(Error, Debug)]
pub enum StageError {
    /// 路由不可满足，唯一会终止管道的阶段错误
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// 阶段执行失败
    #[error("阶段执行失败: {0}")]
    Failed(String),

    /// 请求结构无效
    #[error("请求格式无效: {0}")]
    InvalidRequest(String),

    /// 自定义阶段返回的任意错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// 是否为致命错误（需要传播给宿主）
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Routing(_))
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            StageError::Routing(_) => "routing_error",
            StageError::Failed(_) => "stage_failed",
            StageError::InvalidRequest(_) => "invalid_request",
            StageError::Other(_) => "stage_error",
        }
    }
}

/// 引擎入口错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Routing(_) => 404,
            EngineError::Config(_) => 500,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::Routing(_) => "routing_error",
            EngineError::Config(e) => e.error_type(),
        }
    }

    /// 转换为 JSON 错误响应
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": self.status_code()
            }
        })
    }
}
