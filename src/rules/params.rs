//! 规则构造参数
//!
//! 配置中的 `params` 是位置参数与关键字映射的有序列表，
//! 这里把它们合并成一个参数集合，并按规则声明的参数名校验。

use crate::error::ConfigError;
use indexmap::IndexMap;
use serde_json::Value;

/// 合并后的规则构造参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleParams {
    /// 规则名（用于错误信息）
    rule: String,
    /// 位置参数（按出现顺序）
    positional: Vec<Value>,
    /// 关键字参数（按出现顺序）
    keyword: IndexMap<String, Value>,
    /// 规则声明的参数名，位置参数按下标对应
    declared: Vec<String>,
}

impl RuleParams {
    /// 合并位置参数与关键字映射，并按声明的参数名校验
    ///
    /// 以下情况返回 `ConfigError::InvalidParams`：
    /// - 位置参数多于声明的参数
    /// - 关键字不在声明中
    /// - 同一参数既按位置又按关键字给出，或关键字重复
    pub fn merge(rule: &str, raw: &[Value], declared: &[&str]) -> Result<Self, ConfigError> {
        let mut params = Self {
            rule: rule.to_string(),
            positional: Vec::new(),
            keyword: IndexMap::new(),
            declared: declared.iter().map(|s| s.to_string()).collect(),
        };

        for entry in raw {
            match entry {
                Value::Object(map) => {
                    for (key, value) in map {
                        if params.keyword.insert(key.clone(), value.clone()).is_some() {
                            return Err(params.invalid(format!("参数 '{}' 重复", key)));
                        }
                    }
                }
                other => params.positional.push(other.clone()),
            }
        }

        if params.positional.len() > params.declared.len() {
            return Err(params.invalid(format!(
                "最多接受 {} 个位置参数，实际提供 {} 个",
                params.declared.len(),
                params.positional.len()
            )));
        }

        for key in params.keyword.keys() {
            match params.declared.iter().position(|d| d == key) {
                None => return Err(params.invalid(format!("未知参数 '{}'", key))),
                Some(index) if index < params.positional.len() => {
                    return Err(params.invalid(format!("参数 '{}' 同时按位置和名称给出", key)))
                }
                Some(_) => {}
            }
        }

        Ok(params)
    }

    /// 按名称取参数值（关键字优先，否则按声明顺序取位置参数）
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.keyword.get(name) {
            return Some(value);
        }
        let index = self.declared.iter().position(|d| d == name)?;
        self.positional.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    pub fn required_str(&self, name: &str) -> Result<String, ConfigError> {
        match self.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.invalid(format!("参数 '{}' 应为字符串，实际为 {}", name, other))),
            None => Err(self.missing(name)),
        }
    }

    pub fn required_u64(&self, name: &str) -> Result<u64, ConfigError> {
        match self.get(name) {
            Some(value) => value.as_u64().ok_or_else(|| {
                self.invalid(format!("参数 '{}' 应为非负整数，实际为 {}", name, value))
            }),
            None => Err(self.missing(name)),
        }
    }

    pub fn optional_bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.invalid(format!("参数 '{}' 应为布尔值，实际为 {}", name, other))),
        }
    }

    fn missing(&self, name: &str) -> ConfigError {
        self.invalid(format!("缺少必需参数 '{}'", name))
    }

    fn invalid(&self, message: String) -> ConfigError {
        ConfigError::InvalidParams {
            rule: self.rule.clone(),
            message,
        }
    }
}
