//! 进程级引擎
//!
//! 宿主代理的钩子回调拿不到自己的上下文对象时使用。首次访问时按默认路径加载配置，
//! `reset` 用于测试隔离。

use crate::config::RouterConfig;
use crate::engine::RouterEngine;
use crate::error::ConfigError;
use crate::router::ModelListSource;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

static ENGINE: Lazy<RwLock<Option<Arc<RouterEngine>>>> = Lazy::new(|| RwLock::new(None));

/// 用指定配置初始化进程级引擎，替换已有实例
pub fn init(
    config: RouterConfig,
    source: Arc<dyn ModelListSource>,
) -> Result<Arc<RouterEngine>, ConfigError> {
    let engine = Arc::new(RouterEngine::new(config, source)?);
    *ENGINE.write() = Some(engine.clone());
    Ok(engine)
}

/// 获取已初始化的引擎
pub fn get() -> Option<Arc<RouterEngine>> {
    ENGINE.read().clone()
}

/// 获取引擎，未初始化时从默认路径加载配置
///
/// 配置文件不存在时使用默认配置；文件存在但无效时返回错误。
pub fn get_or_init(source: Arc<dyn ModelListSource>) -> Result<Arc<RouterEngine>, ConfigError> {
    if let Some(engine) = get() {
        return Ok(engine);
    }

    let mut slot = ENGINE.write();
    if let Some(engine) = slot.as_ref() {
        return Ok(engine.clone());
    }

    let path = RouterConfig::default_path();
    let config = if path.exists() {
        RouterConfig::load_from_file(&path)?
    } else {
        tracing::info!(path = %path.display(), "router config not found, using defaults");
        RouterConfig::default()
    };

    let engine = Arc::new(RouterEngine::new(config, source)?);
    *slot = Some(engine.clone());
    Ok(engine)
}

/// 清除进程级引擎
pub fn reset() {
    *ENGINE.write() = None;
}
