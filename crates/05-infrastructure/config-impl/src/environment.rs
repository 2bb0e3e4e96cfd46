//! 环境变量存储实现与 `.env` 文件解析

use config_abstractions::EnvironmentStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// 进程环境变量存储
///
/// 直接读写当前进程的环境变量。
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl EnvironmentStore for ProcessEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }
}

/// 内存环境变量存储
///
/// 与进程环境隔离，主要用于测试。
#[derive(Debug, Default)]
pub struct InMemoryEnvironment {
    vars: RwLock<HashMap<String, String>>,
}

impl InMemoryEnvironment {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定变量初始化
    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: RwLock::new(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// 删除变量
    pub fn remove(&self, key: &str) -> Option<String> {
        self.vars.write().remove(key)
    }

    /// 变量数量
    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }
}

impl EnvironmentStore for InMemoryEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.vars.write().insert(key.to_string(), value.to_string());
    }
}

/// 解析 `.env` 文件内容
///
/// 任意一行解析失败即整体失败，由调用方决定是否跳过该文件。
pub fn parse_env_content(content: &str) -> Result<Vec<(String, String)>, dotenvy::Error> {
    dotenvy::from_read_iter(content.as_bytes()).collect()
}

/// 将解析结果写入存储，已存在的变量不会被覆盖
///
/// 返回实际写入的变量数量。
pub fn populate(store: &dyn EnvironmentStore, vars: &[(String, String)]) -> usize {
    let mut written = 0;
    for (key, value) in vars {
        if store.set_if_absent(key, value) {
            written += 1;
        } else {
            debug!("环境变量 {} 已定义，忽略 .env 中的值", key);
        }
    }
    written
}
