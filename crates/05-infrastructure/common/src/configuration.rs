//! 配置节及类型化绑定

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 配置节
///
/// 快照中某个对象节点的一份拷贝，键为该节点下的直接子键。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSection {
    /// 配置数据
    pub data: BTreeMap<String, serde_json::Value>,
}

impl ConfigSection {
    /// 创建新的配置节
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 对象构建配置节，非对象值返回 `None`
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        value.as_object().map(|obj| Self {
            data: obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    /// 插入配置项
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// 获取配置项
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// 配置项数量
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 绑定到具体类型
    pub fn bind<T>(&self) -> Result<T, ConfigError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = serde_json::Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        serde_json::from_value(value).map_err(|e| ConfigError::SerializationError { source: e })
    }
}
