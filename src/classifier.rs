//! 请求分类器
//!
//! 按配置顺序评估规则，第一个命中的规则名即为标签；全部未命中时标签为 `default`。
//! 单条规则在运行时出错只会被记录并视为未命中，不影响其余规则。

use crate::config::RouterConfig;
use crate::request::ChatRequest;
use crate::rules::{LoadedRule, RuleRegistry};
use crate::error::ConfigError;

/// 未命中任何规则时的标签
pub const DEFAULT_LABEL: &str = "default";

/// 请求分类器
#[derive(Debug, Clone, Default)]
pub struct RequestClassifier {
    /// 规则列表（加载后顺序固定）
    rules: Vec<LoadedRule>,
}

impl RequestClassifier {
    pub fn new(rules: Vec<LoadedRule>) -> Self {
        Self { rules }
    }

    /// 通过注册表加载配置中的规则
    pub fn from_config(
        config: &RouterConfig,
        registry: &RuleRegistry,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(registry.load(&config.rules)?))
    }

    pub fn rules(&self) -> &[LoadedRule] {
        &self.rules
    }

    /// 规则名列表（按评估顺序）
    pub fn labels(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// 对请求分类，返回标签
    pub fn classify(&self, request: &ChatRequest, config: &RouterConfig) -> String {
        for loaded in &self.rules {
            match loaded.rule.evaluate(request, config) {
                Ok(true) => {
                    tracing::debug!(rule = %loaded.name, "rule matched");
                    return loaded.name.clone();
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        rule = %loaded.name,
                        identifier = %loaded.identifier,
                        error_type = %e.error_type(),
                        error_message = %e,
                        "rule evaluation failed, treating as non-matching"
                    );
                }
            }
        }
        DEFAULT_LABEL.to_string()
    }
}
