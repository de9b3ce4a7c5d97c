//! Token 长度估算
//!
//! 优先使用 tiktoken 精确分词，不可用时退化为字符数启发式（字符数 / 3）。

use crate::error::RuleError;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// 字符数启发式：每个 Token 约 3 个字符
pub const CHARS_PER_TOKEN: usize = 3;

/// 长度估算器
pub trait LengthEstimator: Send + Sync {
    /// 估算文本的 Token 数量
    ///
    /// * `model` - 可选的模型名称，用于选择合适的编码器
    fn count(&self, text: &str, model: Option<&str>) -> Result<usize, RuleError>;
}

/// 字符数估算器
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl CharEstimator {
    pub fn estimate(text: &str) -> usize {
        text.chars().count() / CHARS_PER_TOKEN
    }
}

impl LengthEstimator for CharEstimator {
    fn count(&self, text: &str, _model: Option<&str>) -> Result<usize, RuleError> {
        Ok(Self::estimate(text))
    }
}

/// tiktoken 估算器
pub struct TiktokenEstimator {
    /// 默认使用的 BPE 编码器（cl100k_base，适用于 GPT-4/Claude/Gemini 等）
    default_bpe: tiktoken_rs::CoreBPE,
    /// o200k_base 编码器（适用于 GPT-4o 等新模型）
    o200k_bpe: tiktoken_rs::CoreBPE,
}

static SHARED: Lazy<Option<Arc<TiktokenEstimator>>> = Lazy::new(|| match TiktokenEstimator::new() {
    Ok(estimator) => Some(Arc::new(estimator)),
    Err(e) => {
        tracing::warn!(error = %e, "tokenizer unavailable, falling back to character estimate");
        None
    }
});

impl TiktokenEstimator {
    /// 创建新的估算器
    pub fn new() -> Result<Self, RuleError> {
        let default_bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RuleError::Evaluation(format!("Token 估算器初始化失败: {}", e)))?;
        let o200k_bpe = tiktoken_rs::o200k_base()
            .map_err(|e| RuleError::Evaluation(format!("Token 估算器初始化失败: {}", e)))?;

        Ok(Self {
            default_bpe,
            o200k_bpe,
        })
    }

    /// 进程内共享的估算器，BPE 表只构建一次
    pub fn shared() -> Option<Arc<TiktokenEstimator>> {
        SHARED.clone()
    }

    /// 根据模型名称选择合适的 BPE 编码器
    fn select_bpe(&self, model: Option<&str>) -> &tiktoken_rs::CoreBPE {
        match model {
            Some(m) if m.contains("gpt-4o") || m.contains("o1") || m.contains("o3") => {
                &self.o200k_bpe
            }
            _ => &self.default_bpe,
        }
    }
}

impl LengthEstimator for TiktokenEstimator {
    fn count(&self, text: &str, model: Option<&str>) -> Result<usize, RuleError> {
        Ok(self.select_bpe(model).encode_with_special_tokens(text).len())
    }
}
