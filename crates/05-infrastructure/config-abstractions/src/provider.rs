//! 配置读取接口

use crate::key::ConfigKey;
use crate::snapshot::ConfigSnapshot;
use infrastructure_common::{ConfigError, ConfigSection};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// 配置提供者 trait
///
/// 所有读取都是对当前已提交快照的同步查找，不会阻塞在重载上。
pub trait ConfigProvider: Send + Sync {
    /// 当前已提交的快照
    fn snapshot(&self) -> Arc<ConfigSnapshot>;

    /// 获取提供者名称
    fn name(&self) -> &str;

    /// 查找原始值，`null` 视为不存在
    fn lookup(&self, key: &ConfigKey) -> Option<Value> {
        self.snapshot()
            .get(key)
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// 检查配置键是否存在
    fn contains_key(&self, key: &ConfigKey) -> bool {
        self.lookup(key).is_some()
    }

    /// 获取所有配置键（点分形式，包含中间节点）
    fn get_all_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Value::Object(obj) = self.snapshot().root() {
            collect_keys(obj, "", &mut keys);
        }
        keys
    }

    /// 获取配置节
    fn get_section(&self, key: &ConfigKey) -> Result<ConfigSection, ConfigError> {
        match self.lookup(key) {
            Some(value) => ConfigSection::from_value(&value).ok_or_else(|| {
                ConfigError::TypeConversionError {
                    message: format!("配置节 {key} 不是对象类型"),
                }
            }),
            None => Err(ConfigError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }
}

/// 配置读取扩展方法
///
/// 泛型读取接口，对所有 [`ConfigProvider`] 自动实现。
pub trait ConfigProviderExt: ConfigProvider {
    /// 获取原始 JSON 值
    fn get_value<K: Into<ConfigKey>>(&self, key: K) -> Option<Value> {
        self.lookup(&key.into())
    }

    /// 获取并反序列化为指定类型，不存在或类型不符时返回 `None`
    fn get<T, K>(&self, key: K) -> Option<T>
    where
        T: DeserializeOwned,
        K: Into<ConfigKey>,
    {
        let key = key.into();
        let value = self.lookup(&key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!("配置 {} 无法转换为 {}: {}", key, std::any::type_name::<T>(), e);
                None
            }
        }
    }

    /// 获取配置，不存在时返回默认值
    fn get_or<T, K>(&self, key: K, default: T) -> T
    where
        T: DeserializeOwned,
        K: Into<ConfigKey>,
    {
        self.get(key).unwrap_or(default)
    }

    /// 获取配置，不存在时返回 [`ConfigError::KeyNotFound`]
    fn get_or_fail<T, K>(&self, key: K) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        K: Into<ConfigKey>,
    {
        let key = key.into();
        let value = self.lookup(&key).ok_or_else(|| ConfigError::KeyNotFound {
            key: key.to_string(),
        })?;
        serde_json::from_value(value).map_err(|e| ConfigError::TypeConversionError {
            message: format!("{key}: {e}"),
        })
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}

/// 递归收集所有键
fn collect_keys(obj: &serde_json::Map<String, Value>, prefix: &str, keys: &mut Vec<String>) {
    for (key, value) in obj {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        keys.push(full_key.clone());

        if let Value::Object(nested) = value {
            collect_keys(nested, &full_key, keys);
        }
    }
}
