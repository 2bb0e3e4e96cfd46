//! 配置快照

use crate::key::ConfigKey;
use serde_json::{Map, Value};

/// 配置快照
///
/// 一次成功的流水线运行产出的完整配置。提交后不可变，
/// 重载时整体替换。
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    root: Value,
    generation: u64,
    loaded_at: chrono::DateTime<chrono::Utc>,
}

impl ConfigSnapshot {
    /// 空快照（尚未成功加载任何配置）
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
            generation: 0,
            loaded_at: chrono::Utc::now(),
        }
    }

    /// 创建快照
    pub fn new(root: Map<String, Value>, generation: u64) -> Self {
        Self {
            root: Value::Object(root),
            generation,
            loaded_at: chrono::Utc::now(),
        }
    }

    /// 根节点
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// 查找键对应的值
    pub fn get(&self, key: &ConfigKey) -> Option<&Value> {
        key.lookup(&self.root)
    }

    /// 第几次提交（0 表示从未提交）
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 提交时间
    pub fn loaded_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.loaded_at
    }

    /// 是否没有任何配置项
    pub fn is_empty(&self) -> bool {
        self.root.as_object().map_or(true, Map::is_empty)
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
