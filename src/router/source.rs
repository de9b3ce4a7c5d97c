//! 模型列表来源
//!
//! 部署列表由宿主代理持有，路由器只读取。

use anyhow::Context;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// 模型列表来源
pub trait ModelListSource: Send + Sync {
    /// 读取当前的模型列表（原始 JSON 项）
    fn model_list(&self) -> anyhow::Result<Vec<Value>>;
}

/// 内存中的模型列表
#[derive(Debug, Default)]
pub struct StaticModelList {
    entries: RwLock<Vec<Value>>,
}

impl StaticModelList {
    pub fn new(entries: Vec<Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// 替换模型列表（下次 reload 生效）
    pub fn replace(&self, entries: Vec<Value>) {
        *self.entries.write() = entries;
    }
}

impl ModelListSource for StaticModelList {
    fn model_list(&self) -> anyhow::Result<Vec<Value>> {
        Ok(self.entries.read().clone())
    }
}

/// 从宿主代理的 YAML 配置读取 `model_list`
#[derive(Debug, Clone)]
pub struct YamlModelList {
    path: PathBuf,
}

impl YamlModelList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelListSource for YamlModelList {
    fn model_list(&self) -> anyhow::Result<Vec<Value>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read model list {}", self.path.display()))?;
        let document: Value = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse model list {}", self.path.display()))?;

        match document.get("model_list") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries.clone()),
            Some(_) => anyhow::bail!("model_list in {} is not a list", self.path.display()),
        }
    }
}
