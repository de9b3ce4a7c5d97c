//! 日志模块
//!
//! - `init_tracing`: 安装 tracing-subscriber，`RUST_LOG` 优先于 debug 开关
//! - `sanitize_log_message`: 记录请求头派生内容前做脱敏

use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::EnvFilter;

/// 安装全局 tracing subscriber
///
/// 已经安装过时返回错误（例如宿主或测试框架已初始化）。
pub fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))
}

/// 脱敏规则：(模式, 替换文本)
static REDACTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        (r"sk-ant-[A-Za-z0-9_-]+", "sk-ant-***"),
        (
            r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        (
            r#"access[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "access_token: ***",
        ),
        (
            r#"refresh[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "refresh_token: ***",
        ),
        (r#"token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#, "token: ***"),
        (
            r#"[Aa]uthorization["']?\s*[:=]\s*["']?[A-Za-z0-9._\s-]+"#,
            "authorization: ***",
        ),
        (r#"password["']?\s*[:=]\s*["']?[^\s"',}]+"#, "password: ***"),
        (
            r#"secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "secret: ***",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            tracing::error!(pattern, error = %e, "invalid redaction pattern");
            None
        }
    })
    .collect()
});

/// 日志脱敏
pub fn sanitize_log_message(message: &str) -> String {
    REDACTIONS
        .iter()
        .fold(message.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}
