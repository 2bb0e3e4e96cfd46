//! 动态配置服务

use crate::environment::ProcessEnvironment;
use crate::loader::{ConfigFileFormat, FileLoader, RealSource};
use crate::options::DynamicConfigOptions;
use crate::package::PackageInfo;
use crate::pipeline::{Pipeline, PipelineState};
use crate::watcher::ConfigFileWatcher;
use config_abstractions::{
    ConfigEvent, ConfigEventListener, ConfigKey, ConfigProvider, ConfigProviderExt, ConfigSnapshot,
    ConfigWatcher, EnvironmentStore, FileSystemEvent,
};
use infrastructure_common::ConfigError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

impl ConfigProvider for Pipeline {
    fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Pipeline::snapshot(self)
    }

    fn name(&self) -> &str {
        "DynamicConfigPipeline"
    }
}

struct WatchHandle {
    watcher: ConfigFileWatcher,
    task: JoinHandle<()>,
}

/// 动态配置服务
///
/// 构造时同步加载一次配置；主配置文件为 `.js`/`.json` 且使用真实文件系统时，
/// 在当前 tokio 运行时上监控文件变更并自动重载。
///
/// 读取通过 [`ConfigProviderExt`] 的 `get`/`get_or`/`get_or_fail` 进行。
pub struct ConfigService {
    pipeline: Arc<Pipeline>,
    watch: Mutex<Option<WatchHandle>>,
}

impl std::fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigService")
            .field("pipeline", &self.pipeline)
            .field("is_watching", &self.is_watching())
            .finish()
    }
}

impl ConfigService {
    /// 使用进程环境变量创建服务
    pub fn new(options: DynamicConfigOptions, loader: FileLoader) -> Self {
        Self::with_environment(options, loader, Arc::new(ProcessEnvironment))
    }

    /// 根据选项构建真实文件系统加载器并创建服务
    pub fn from_options(options: DynamicConfigOptions) -> Self {
        let loader = FileLoader::real(RealSource {
            config_file: options.config_file.clone(),
            root_folder: options.root_folder.clone(),
            env_file_path: options.env_file_path.as_ref().map(|path| path.to_paths()),
        });
        Self::new(options, loader)
    }

    /// 使用指定的环境变量存储创建服务
    pub fn with_environment(
        options: DynamicConfigOptions,
        loader: FileLoader,
        env: Arc<dyn EnvironmentStore>,
    ) -> Self {
        let pipeline = Arc::new(Pipeline::new(options, loader, env));
        pipeline.run(true);

        let service = Self {
            pipeline,
            watch: Mutex::new(None),
        };
        service.start_watch();
        service
    }

    fn start_watch(&self) {
        let loader = self.pipeline.loader();
        if loader.is_injected() {
            return;
        }
        if !matches!(
            loader.config_file_format(),
            ConfigFileFormat::Script | ConfigFileFormat::Json
        ) {
            return;
        }
        let Some(path) = loader.config_file().map(|path| path.to_path_buf()) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("没有可用的 tokio 运行时，配置热重载已禁用: {}", path.display());
            return;
        };

        let (mut watcher, receiver) = ConfigFileWatcher::channel(&path);
        if let Err(e) = watcher.start_watching() {
            warn!("配置文件监控启动失败，热重载已禁用: {}", e);
            return;
        }

        let task = runtime.spawn(watch_loop(
            Arc::downgrade(&self.pipeline),
            receiver,
            path,
            self.pipeline.options().debounce,
        ));
        *self.watch.lock() = Some(WatchHandle { watcher, task });
    }

    /// 重新运行流水线
    ///
    /// `initial` 为真时不发出重载事件。使用真实文件系统且非首次加载时，
    /// 先等待防抖间隔。返回是否提交了新配置。
    pub async fn force_reload(&self, initial: bool) -> bool {
        if !initial && !self.pipeline.loader().is_injected() {
            tokio::time::sleep(self.pipeline.options().debounce).await;
        }
        let pipeline = self.pipeline.clone();
        match tokio::task::spawn_blocking(move || pipeline.run(initial)).await {
            Ok(committed) => committed,
            Err(e) => {
                error!("配置重载任务异常结束: {}", e);
                false
            }
        }
    }

    /// 在当前线程上立即重新运行流水线，不做防抖等待
    pub fn reload_now(&self, initial: bool) -> bool {
        self.pipeline.run(initial)
    }

    /// 关闭文件监控，重复调用无副作用
    pub fn close_watch(&self) {
        if let Some(mut handle) = self.watch.lock().take() {
            handle.watcher.stop_watching();
            handle.task.abort();
            info!("配置文件监控已关闭");
        }
    }

    /// 是否正在监控配置文件
    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .as_ref()
            .is_some_and(|handle| handle.watcher.is_watching())
    }

    /// 订阅重载事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.pipeline.notifier().subscribe()
    }

    /// 注册重载监听器
    pub fn register_listener(&self, listener: Arc<dyn ConfigEventListener>) {
        self.pipeline.notifier().register_listener(listener);
    }

    /// 移除重载监听器
    pub fn unregister_listener(&self, name: &str) -> Result<(), ConfigError> {
        self.pipeline.notifier().unregister_listener(name)
    }

    /// 创建读取代理，每次调用都读取最新快照
    pub fn create_proxy<T, K>(&self, key: K) -> impl Fn() -> Option<T> + Send + Sync + 'static
    where
        T: DeserializeOwned + 'static,
        K: Into<ConfigKey>,
    {
        let pipeline = self.pipeline.clone();
        let key = key.into();
        move || pipeline.get(&key)
    }

    /// 创建带默认值的读取代理
    pub fn create_proxy_or<T, K>(
        &self,
        key: K,
        default: T,
    ) -> impl Fn() -> T + Send + Sync + 'static
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        K: Into<ConfigKey>,
    {
        let pipeline = self.pipeline.clone();
        let key = key.into();
        move || pipeline.get(&key).unwrap_or_else(|| default.clone())
    }

    /// 当前完整配置
    pub fn config(&self) -> Value {
        self.pipeline.snapshot().root().clone()
    }

    /// 包名，未知时为 `<unknown>`
    pub fn app_name(&self) -> String {
        self.pipeline.package().name().to_string()
    }

    /// 版本，未知时为 `<unknown>`
    pub fn version(&self) -> String {
        self.pipeline.package().version().to_string()
    }

    /// 包元数据
    pub fn package_info(&self) -> Arc<PackageInfo> {
        self.pipeline.package()
    }

    /// 最近一次运行的结果
    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// 构造时的选项
    pub fn options(&self) -> &DynamicConfigOptions {
        self.pipeline.options()
    }

    /// 文件加载器，注入模式下可用于替换内容
    pub fn loader(&self) -> &FileLoader {
        self.pipeline.loader()
    }

    /// 环境变量存储
    pub fn environment(&self) -> &Arc<dyn EnvironmentStore> {
        self.pipeline.environment()
    }

    /// 错误策略入口
    pub fn handle_fatal_error(&self, error: &ConfigError) {
        self.pipeline.handle_fatal_error(error);
    }
}

impl ConfigProvider for ConfigService {
    fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.pipeline.snapshot()
    }

    fn name(&self) -> &str {
        "ConfigService"
    }
}

impl Drop for ConfigService {
    fn drop(&mut self) {
        self.close_watch();
    }
}

/// 文件变更处理循环
///
/// 收到事件后等待防抖间隔，丢弃期间堆积的事件，再运行一次流水线。
async fn watch_loop(
    pipeline: Weak<Pipeline>,
    mut receiver: mpsc::Receiver<FileSystemEvent>,
    path: PathBuf,
    debounce: Duration,
) {
    while let Some(event) = receiver.recv().await {
        if !event.event_type.triggers_reload() {
            debug!("忽略配置文件事件: {:?}", event.event_type);
            continue;
        }

        tokio::time::sleep(debounce).await;
        let mut coalesced = 0;
        while receiver.try_recv().is_ok() {
            coalesced += 1;
        }
        if coalesced > 0 {
            debug!("合并了 {} 个配置文件事件", coalesced);
        }

        if !path.exists() {
            warn!("配置文件不存在，跳过重载: {}", path.display());
            continue;
        }
        let Some(pipeline) = pipeline.upgrade() else {
            break;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || pipeline.run(false)).await {
            error!("配置重载任务异常结束: {}", e);
        }
    }
    debug!("配置文件监控循环结束");
}
