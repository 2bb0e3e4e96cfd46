//! 配置监控抽象接口

use infrastructure_common::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 配置监控器 trait
///
/// 监控单个配置文件，变更通知由实现方投递到其构造时给定的通道。
pub trait ConfigWatcher: Send {
    /// 开始监控
    fn start_watching(&mut self) -> Result<(), ConfigError>;

    /// 停止监控，重复调用无副作用
    fn stop_watching(&mut self);

    /// 是否正在监控
    fn is_watching(&self) -> bool;

    /// 被监控的文件
    fn watched_path(&self) -> &Path;
}

/// 文件系统事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemEvent {
    /// 事件类型
    pub event_type: FileSystemEventType,
    /// 文件路径
    pub path: PathBuf,
    /// 事件时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl FileSystemEvent {
    /// 创建新的文件系统事件
    pub fn new(event_type: FileSystemEventType, path: impl Into<PathBuf>) -> Self {
        Self {
            event_type,
            path: path.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// 文件系统事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSystemEventType {
    /// 文件创建
    Created,
    /// 文件修改
    Modified,
    /// 文件删除
    Deleted,
}

impl FileSystemEventType {
    /// 该事件是否应触发重载
    pub fn triggers_reload(self) -> bool {
        matches!(self, Self::Created | Self::Modified)
    }
}
