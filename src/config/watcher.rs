//! 配置热重载
//!
//! 监听配置文件所在目录，文件变化后去抖，重新加载并构建完整的引擎状态再原子替换。
//! 无效的修改只记录日志，当前状态保持不变。

use super::RouterConfig;
use crate::engine::RouterEngine;
use crate::error::ConfigError;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 默认去抖间隔
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// 配置文件监听器
///
/// 丢弃后停止监听。必须在 tokio 运行时内创建。
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    pub fn start(path: impl Into<PathBuf>, engine: Arc<RouterEngine>) -> Result<Self, ConfigError> {
        Self::with_debounce(path, engine, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(
        path: impl Into<PathBuf>,
        engine: Arc<RouterEngine>,
        debounce: Duration,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => tracing::warn!(error = %e, "config watch error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| watch_error(&path, e))?;

        // 监听父目录，兼容先写临时文件再 rename 的编辑器
        let watch_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(&watch_dir, e))?;

        let task = tokio::spawn(watch_loop(path.clone(), engine, event_rx, debounce));
        tracing::info!(path = %path.display(), "watching router config");

        Ok(Self {
            path,
            _watcher: watcher,
            task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch_loop(
    path: PathBuf,
    engine: Arc<RouterEngine>,
    mut events: mpsc::UnboundedReceiver<notify::Event>,
    debounce: Duration,
) {
    while let Some(event) = events.recv().await {
        if !is_relevant(&event, &path) {
            continue;
        }

        // 编辑器保存时通常连续产生多个事件
        tokio::time::sleep(debounce).await;
        while events.try_recv().is_ok() {}

        apply_reload(&path, &engine);
    }
}

fn is_relevant(event: &notify::Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == path.file_name())
}

fn apply_reload(path: &Path, engine: &RouterEngine) {
    let result = RouterConfig::load_from_file(path).and_then(|config| engine.reload(config));
    match result {
        Ok(()) => tracing::info!(path = %path.display(), "router config reloaded"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error_type = %e.error_type(),
            error = %e,
            "router config reload rejected, keeping current config"
        ),
    }
}

fn watch_error(path: &Path, e: notify::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    }
}
