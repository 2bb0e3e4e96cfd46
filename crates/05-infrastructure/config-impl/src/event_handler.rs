//! 配置重载事件分发

use config_abstractions::{ConfigEvent, ConfigEventListener};
use dashmap::DashMap;
use infrastructure_common::ConfigError;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 重载通知器
///
/// 同时支持两种订阅方式：`tokio::sync::broadcast` 接收器，以及按名称注册的监听器。
pub struct ReloadNotifier {
    sender: broadcast::Sender<ConfigEvent>,
    listeners: DashMap<String, Arc<dyn ConfigEventListener>>,
}

impl ReloadNotifier {
    /// 创建通知器
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            listeners: DashMap::new(),
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.sender.subscribe()
    }

    /// 注册监听器，同名监听器会被替换
    pub fn register_listener(&self, listener: Arc<dyn ConfigEventListener>) {
        info!("注册配置事件监听器: {}", listener.name());
        if self
            .listeners
            .insert(listener.name().to_string(), listener)
            .is_some()
        {
            warn!("同名监听器已被替换");
        }
    }

    /// 移除监听器
    pub fn unregister_listener(&self, name: &str) -> Result<(), ConfigError> {
        info!("移除配置事件监听器: {}", name);
        self.listeners
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ConfigError::KeyNotFound {
                key: name.to_string(),
            })
    }

    /// 发出事件
    ///
    /// 没有订阅者不是错误；监听器在调用线程上同步执行。
    pub fn emit(&self, event: ConfigEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!("配置事件 {:?} 已发送给 {} 个订阅者", event, receivers),
            Err(_) => debug!("配置事件 {:?} 没有订阅者", event),
        }

        // 先收集再调用，监听器内部可以安全地注册/移除监听器
        let listeners: Vec<Arc<dyn ConfigEventListener>> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for listener in listeners {
            if !listener.is_enabled() {
                continue;
            }
            debug!("向监听器 {} 分发事件: {:?}", listener.name(), event);
            match event {
                ConfigEvent::Reloaded => listener.on_reloaded(),
            }
        }
    }

    /// 监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// 所有监听器名称
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.iter().map(|entry| entry.key().clone()).collect()
    }

    /// 当前 broadcast 订阅者数量
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReloadNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadNotifier")
            .field("listeners", &self.listener_names())
            .field("receivers", &self.receiver_count())
            .finish()
    }
}
