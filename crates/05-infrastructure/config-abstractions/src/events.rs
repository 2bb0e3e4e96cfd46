//! 配置事件定义

use serde::{Deserialize, Serialize};

/// 配置事件
///
/// 目前只有一种事件：非首次加载成功提交后发出 `Reloaded`，不携带负载。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigEvent {
    /// 配置已重载
    Reloaded,
}

/// 配置事件监听器 trait
pub trait ConfigEventListener: Send + Sync {
    /// 配置重载完成
    fn on_reloaded(&self);

    /// 获取监听器名称
    fn name(&self) -> &str;

    /// 是否启用
    fn is_enabled(&self) -> bool {
        true
    }
}

/// 由闭包构造的监听器
pub struct FnEventListener<F> {
    name: String,
    callback: F,
}

impl<F> FnEventListener<F>
where
    F: Fn() + Send + Sync,
{
    /// 创建新的闭包监听器
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> ConfigEventListener for FnEventListener<F>
where
    F: Fn() + Send + Sync,
{
    fn on_reloaded(&self) {
        (self.callback)();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> std::fmt::Debug for FnEventListener<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEventListener")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
