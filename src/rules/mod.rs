//! 分类规则模块
//!
//! 规则是对请求的无副作用判定，分类器按配置顺序评估，第一个命中的规则名即为路由标签。
//!
//! 内置规则：
//! - `MatchModelRule` - 按模型名精确匹配
//! - `ThinkingRule` - 请求开启了 thinking
//! - `MatchToolRule` - 请求携带指定工具
//! - `TokenCountRule` - 估算 Token 数达到阈值
//! - `DefaultRule` - 总是命中
//!
//! 自定义规则实现 [`ClassificationRule`]，并通过 [`RuleRegistry::register`] 以点分标识注册。

mod builtin;
mod params;
mod registry;
mod tokens;

pub use builtin::{DefaultRule, MatchModelRule, MatchToolRule, ThinkingRule, TokenCountRule};
pub use params::RuleParams;
pub use registry::{LoadedRule, RuleFactory, RuleRegistry, BUILTIN_RULE_NAMESPACE};
pub use tokens::{CharEstimator, LengthEstimator, TiktokenEstimator, CHARS_PER_TOKEN};

use crate::config::RouterConfig;
use crate::error::RuleError;
use crate::request::ChatRequest;

/// 分类规则 trait
///
/// 规则实例在配置加载时构造一次，之后被所有请求并发复用，
/// 因此不能持有任何请求级状态。
pub trait ClassificationRule: Send + Sync {
    /// 评估请求是否命中
    ///
    /// 必须是确定性的、无副作用的、廉价的，不能执行阻塞 I/O。
    fn evaluate(&self, request: &ChatRequest, config: &RouterConfig) -> Result<bool, RuleError>;

    /// 规则类型名（用于日志）
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests;
