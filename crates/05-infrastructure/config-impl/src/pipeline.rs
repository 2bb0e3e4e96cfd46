//! 配置加载流水线
//!
//! 每次运行依次执行：
//!
//! 1. 读取 `.env` 文件并写入环境变量（已有变量不覆盖）
//! 2. 读取包元数据
//! 3. 检查主配置文件格式
//! 4. 读取主配置文件
//! 5. 模板替换
//! 6. 解析（JSON 或受限脚本）
//! 7. 合并 `load` 工厂结果
//! 8. 校验
//! 9. 提交快照，非首次运行时发出 `Reloaded` 事件
//!
//! 任一致命错误都交给 [`Pipeline::handle_fatal_error`]，已提交的快照保持不变。

use crate::environment::{parse_env_content, populate};
use crate::event_handler::ReloadNotifier;
use crate::loader::{ConfigFileFormat, FileLoader};
use crate::merge::merge_maps;
use crate::options::DynamicConfigOptions;
use crate::package::{value_kind, PackageInfo};
use crate::script;
use crate::substitution::{Placeholder, TemplateSubstitution};
use config_abstractions::{ConfigEvent, ConfigSnapshot, EnvironmentStore};
use infrastructure_common::ConfigError;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// 重载成功后输出的日志
pub const RELOADED_MESSAGE: &str = "Config file reloaded";

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// 尚未运行
    Idle,
    /// 正在运行
    Loading,
    /// 最近一次运行已提交
    Committed,
    /// 最近一次运行失败
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Committed => "committed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 运行中止原因
enum Abort {
    /// 需要交给错误策略
    Fatal(ConfigError),
    /// 校验失败，交给校验回调
    Rejected(ConfigError),
}

impl From<ConfigError> for Abort {
    fn from(error: ConfigError) -> Self {
        Self::Fatal(error)
    }
}

/// 配置流水线
///
/// 持有选项、加载器、环境变量存储以及已提交的快照。
/// 运行互斥，读取不受运行影响。校验回调与错误回调在运行锁释放后调用，
/// 回调中可以再次运行流水线；事件监听器仍在锁内执行。
pub struct Pipeline {
    options: DynamicConfigOptions,
    loader: FileLoader,
    env: Arc<dyn EnvironmentStore>,
    snapshot: RwLock<Arc<ConfigSnapshot>>,
    package: RwLock<Arc<PackageInfo>>,
    state: RwLock<PipelineState>,
    run_lock: Mutex<()>,
    notifier: ReloadNotifier,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("loader", &self.loader)
            .field("state", &self.state())
            .field("generation", &self.snapshot().generation())
            .finish()
    }
}

impl Pipeline {
    /// 创建流水线，不会立即运行
    ///
    /// 加载器的 `NODE_ENV` 在此时确定，后续运行不再读取。
    pub fn new(
        options: DynamicConfigOptions,
        loader: FileLoader,
        env: Arc<dyn EnvironmentStore>,
    ) -> Self {
        debug!("NODE_ENV = {}", loader.resolve_node_env(env.as_ref()));
        Self {
            options,
            loader,
            env,
            snapshot: RwLock::new(Arc::new(ConfigSnapshot::empty())),
            package: RwLock::new(Arc::new(PackageInfo::unknown())),
            state: RwLock::new(PipelineState::Idle),
            run_lock: Mutex::new(()),
            notifier: ReloadNotifier::new(),
        }
    }

    /// 创建时的选项
    pub fn options(&self) -> &DynamicConfigOptions {
        &self.options
    }

    /// 文件加载器
    pub fn loader(&self) -> &FileLoader {
        &self.loader
    }

    /// 环境变量存储，`.env` 内容写入这里
    pub fn environment(&self) -> &Arc<dyn EnvironmentStore> {
        &self.env
    }

    /// 重载事件通知器
    pub fn notifier(&self) -> &ReloadNotifier {
        &self.notifier
    }

    /// 当前已提交的快照
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.read().clone()
    }

    /// 最近一次运行得到的包元数据
    pub fn package(&self) -> Arc<PackageInfo> {
        self.package.read().clone()
    }

    /// 流水线状态
    pub fn state(&self) -> PipelineState {
        *self.state.read()
    }

    /// 运行一次流水线，返回是否提交了新快照
    ///
    /// 同一时刻只有一次运行，后到的调用会等待前一次结束。
    #[instrument(skip(self))]
    pub fn run(&self, initial: bool) -> bool {
        let abort = {
            let _running = self.run_lock.lock();
            *self.state.write() = PipelineState::Loading;

            match self.execute() {
                Ok(config) => {
                    self.commit(config, initial);
                    return true;
                }
                Err(abort) => {
                    *self.state.write() = PipelineState::Failed;
                    abort
                }
            }
        };

        match abort {
            Abort::Fatal(error) => self.handle_fatal_error(&error),
            Abort::Rejected(error) => {
                if let Some(callback) = &self.options.validation_callback {
                    warn!("配置校验失败，交给校验回调处理: {}", error);
                    callback(&error);
                }
            }
        }
        false
    }

    fn execute(&self) -> Result<Map<String, Value>, Abort> {
        if !self.options.ignore_env_file {
            self.load_env_files();
        }

        let package = self.load_package();
        *self.package.write() = package.clone();

        let format = self.loader.config_file_format();
        if format == ConfigFileFormat::Unsupported {
            return Err(ConfigError::UnsupportedFileType {
                path: self
                    .loader
                    .config_file()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default(),
            }
            .into());
        }

        let engine = TemplateSubstitution::new(self.env.as_ref(), &package);
        let mut config = match format {
            ConfigFileFormat::None => Map::new(),
            _ => self.parse_config_file(format, &engine)?,
        };

        let factories = self.load_factories(&engine)?;
        merge_maps(&mut config, factories);

        self.validate(config)
    }

    fn load_env_files(&self) {
        let contents = self.loader.load_env_file_contents(self.env.as_ref());
        if contents.is_empty() {
            debug!("没有找到 .env 文件，仅使用已有环境变量");
            return;
        }
        for content in contents {
            match parse_env_content(&content) {
                Ok(vars) => {
                    let written = populate(self.env.as_ref(), &vars);
                    debug!("从 .env 写入 {} 个环境变量", written);
                }
                Err(e) => self.log_debug(&format!("Unable to parse the .env file: {e}")),
            }
        }
    }

    fn load_package(&self) -> Arc<PackageInfo> {
        let Some(descriptor) = self.loader.load_package_metadata() else {
            self.log_debug("package.json file not found");
            return Arc::new(PackageInfo::unknown());
        };
        match PackageInfo::parse(&descriptor) {
            Ok(info) => {
                debug!("包元数据: {} {}", info.name(), info.version());
                Arc::new(info)
            }
            Err(e) => {
                self.log_debug(&format!("Unable to parse package.json: {e}"));
                Arc::new(PackageInfo::unknown())
            }
        }
    }

    fn parse_config_file(
        &self,
        format: ConfigFileFormat,
        engine: &TemplateSubstitution<'_>,
    ) -> Result<Map<String, Value>, ConfigError> {
        let content = self.loader.load_config_file_content()?;
        let substitution = engine.substitute(&content);
        self.report_unresolved(&substitution.unresolved);

        let value = match format {
            ConfigFileFormat::Script => {
                script::evaluate(&substitution.text).map_err(|e| ConfigError::parse("js", e))?
            }
            _ => serde_json::from_str::<Value>(&substitution.text)
                .map_err(|e| ConfigError::parse("json", e))?,
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(ConfigError::InvalidRoot {
                actual: value_kind(&other).to_string(),
            }),
        }
    }

    fn load_factories(
        &self,
        engine: &TemplateSubstitution<'_>,
    ) -> Result<Map<String, Value>, ConfigError> {
        let mut layer = Map::new();
        for (index, factory) in self.options.load.iter().enumerate() {
            match factory() {
                None | Some(Value::Null) => {
                    return Err(ConfigError::FactoryWithoutContent { index });
                }
                Some(Value::Object(map)) => merge_maps(&mut layer, map),
                Some(_) => return Err(ConfigError::InvalidFactoryContent { index }),
            }
        }

        let mut value = Value::Object(layer);
        let unresolved = engine.substitute_value(&mut value);
        self.report_unresolved(&unresolved);
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    fn validate(&self, config: Map<String, Value>) -> Result<Map<String, Value>, Abort> {
        let Some(schema) = &self.options.validation_schema else {
            return Ok(config);
        };

        let result = schema.validate(&Value::Object(config), &self.options.validation_options);
        for warning in &result.warnings {
            debug!("校验警告: {} {}", warning.field, warning.message);
        }
        if !result.is_valid {
            let error = ConfigError::from(result.errors);
            return match &self.options.validation_callback {
                Some(_) => Err(Abort::Rejected(error)),
                None => Err(Abort::Fatal(error)),
            };
        }

        match result.value {
            Value::Object(map) => Ok(map),
            other => Err(Abort::Fatal(ConfigError::InvalidRoot {
                actual: value_kind(&other).to_string(),
            })),
        }
    }

    fn commit(&self, config: Map<String, Value>, initial: bool) {
        {
            let mut snapshot = self.snapshot.write();
            let generation = snapshot.generation() + 1;
            *snapshot = Arc::new(ConfigSnapshot::new(config, generation));
            debug!("配置快照已提交, generation = {}", generation);
        }
        *self.state.write() = PipelineState::Committed;

        if initial {
            info!("配置加载完成");
            return;
        }
        if !self.options.no_log_on_reload {
            if let Some(logger) = &self.options.logger {
                logger.log(RELOADED_MESSAGE);
            }
            info!("{}", RELOADED_MESSAGE);
        }
        self.notifier.emit(ConfigEvent::Reloaded);
    }

    fn report_unresolved(&self, unresolved: &[Placeholder]) {
        for placeholder in unresolved {
            self.log_debug(&placeholder.missing_message());
        }
    }

    /// 错误策略
    ///
    /// 有错误回调时交给回调，进程继续运行；否则记录致命日志并请求终止进程。
    pub fn handle_fatal_error(&self, error: &ConfigError) {
        match &self.options.on_load_error_callback {
            Some(callback) => {
                warn!("配置加载失败，交给错误回调处理: {}", error);
                callback(error);
            }
            None => {
                error!("配置加载失败: {}", error);
                if let Some(logger) = &self.options.logger {
                    logger.fatal(&error.to_string());
                }
                self.loader.terminate_process(error);
            }
        }
    }

    /// 调试日志，仅在 `debug` 选项开启时输出
    pub fn log_debug(&self, message: &str) {
        if !self.options.debug {
            return;
        }
        match &self.options.logger {
            Some(logger) => logger.debug(message),
            None => debug!(target: "config", "{}", message),
        }
    }
}
