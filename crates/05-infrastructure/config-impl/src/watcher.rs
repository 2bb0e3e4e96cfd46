//! 配置文件监控器实现

use config_abstractions::{ConfigWatcher, FileSystemEvent, FileSystemEventType};
use infrastructure_common::ConfigError;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 事件通道容量
pub const WATCH_CHANNEL_CAPACITY: usize = 1000;

/// 配置文件监控器
///
/// 监控配置文件所在目录（非递归），只转发文件名匹配的事件。
/// 这样编辑器以"写临时文件再重命名"方式保存时也能收到通知。
pub struct ConfigFileWatcher {
    path: PathBuf,
    file_name: Option<OsString>,
    sender: mpsc::Sender<FileSystemEvent>,
    watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for ConfigFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFileWatcher")
            .field("path", &self.path)
            .field("is_watching", &self.is_watching())
            .finish()
    }
}

impl ConfigFileWatcher {
    /// 创建监控器，事件投递到 `sender`
    pub fn new(path: impl Into<PathBuf>, sender: mpsc::Sender<FileSystemEvent>) -> Self {
        let path = path.into();
        let file_name = path.file_name().map(ToOwned::to_owned);
        Self {
            path,
            file_name,
            sender,
            watcher: None,
        }
    }

    /// 创建监控器及其事件接收端
    pub fn channel(path: impl Into<PathBuf>) -> (Self, mpsc::Receiver<FileSystemEvent>) {
        let (sender, receiver) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        (Self::new(path, sender), receiver)
    }

    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// 将 notify 事件转换为配置文件事件
fn translate(event: &Event, file_name: Option<&OsString>) -> Vec<FileSystemEvent> {
    let event_type = match event.kind {
        EventKind::Create(_) => FileSystemEventType::Created,
        EventKind::Modify(_) => FileSystemEventType::Modified,
        EventKind::Remove(_) => FileSystemEventType::Deleted,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|path| file_name.map_or(true, |name| path.file_name() == Some(name.as_os_str())))
        .map(|path| FileSystemEvent::new(event_type, path.clone()))
        .collect()
}

impl ConfigWatcher for ConfigFileWatcher {
    fn start_watching(&mut self) -> Result<(), ConfigError> {
        if self.watcher.is_some() {
            warn!("配置监控器已经在运行: {}", self.path.display());
            return Ok(());
        }

        let sender = self.sender.clone();
        let file_name = self.file_name.clone();
        let mut watcher = recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                for fs_event in translate(&event, file_name.as_ref()) {
                    debug!("配置文件事件: {:?} {}", fs_event.event_type, fs_event.path.display());
                    if let Err(e) = sender.try_send(fs_event) {
                        warn!("配置文件事件丢弃: {}", e);
                    }
                }
            }
            Err(e) => error!("文件监控错误: {:?}", e),
        })
        .map_err(|e| ConfigError::WatchError {
            message: format!("创建文件监控器失败: {e}"),
        })?;

        let dir = self.watch_dir();
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::WatchError {
                message: format!("添加监控路径失败: {}: {e}", dir.display()),
            })?;

        info!("开始监控配置文件: {}", self.path.display());
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop_watching(&mut self) {
        if self.watcher.take().is_some() {
            info!("停止监控配置文件: {}", self.path.display());
        }
    }

    fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    fn watched_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConfigFileWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
