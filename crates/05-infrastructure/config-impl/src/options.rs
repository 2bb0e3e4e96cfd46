//! 动态配置选项

use config_abstractions::{ConfigLogger, ValidationOptions, ValidationSchema};
use infrastructure_common::ConfigError;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// 文件变更后等待多久再重载
pub const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// `load` 工厂：返回部分配置对象，`None` 表示没有内容
pub type LoadFactory = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// 错误回调
pub type ErrorCallback = Arc<dyn Fn(&ConfigError) + Send + Sync>;

/// `.env` 文件路径：单个或按优先级排列的列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFilePath {
    Single(PathBuf),
    List(Vec<PathBuf>),
}

impl EnvFilePath {
    /// 展开为列表
    pub fn to_paths(&self) -> Vec<PathBuf> {
        match self {
            Self::Single(path) => vec![path.clone()],
            Self::List(paths) => paths.clone(),
        }
    }
}

impl From<&str> for EnvFilePath {
    fn from(path: &str) -> Self {
        Self::Single(PathBuf::from(path))
    }
}

impl From<&Path> for EnvFilePath {
    fn from(path: &Path) -> Self {
        Self::Single(path.to_path_buf())
    }
}

impl From<PathBuf> for EnvFilePath {
    fn from(path: PathBuf) -> Self {
        Self::Single(path)
    }
}

impl<P: Into<PathBuf>> From<Vec<P>> for EnvFilePath {
    fn from(paths: Vec<P>) -> Self {
        Self::List(paths.into_iter().map(Into::into).collect())
    }
}

/// 动态配置选项
///
/// 构造时一次性提供，之后只读。
#[derive(Clone)]
pub struct DynamicConfigOptions {
    /// 主配置文件路径，扩展名决定格式
    pub config_file: Option<PathBuf>,
    /// 根目录，`.env` 与包描述文件在此查找
    pub root_folder: Option<PathBuf>,
    /// 输出调试信息
    pub debug: bool,
    /// 日志器
    pub logger: Option<Arc<dyn ConfigLogger>>,
    /// 致命错误回调，设置后不再终止进程
    pub on_load_error_callback: Option<ErrorCallback>,
    /// 重载成功后不输出日志
    pub no_log_on_reload: bool,
    /// 校验 schema
    pub validation_schema: Option<Arc<dyn ValidationSchema>>,
    /// 校验失败回调，设置后校验失败不视为致命错误
    pub validation_callback: Option<ErrorCallback>,
    /// 校验选项
    pub validation_options: ValidationOptions,
    /// 覆盖默认的 `.env` 候选列表
    pub env_file_path: Option<EnvFilePath>,
    /// 不加载 `.env` 文件
    pub ignore_env_file: bool,
    /// 额外的配置工厂，按声明顺序合并在主配置文件之上
    pub load: Vec<LoadFactory>,
    /// 文件变更后的防抖等待
    pub debounce: Duration,
}

impl Default for DynamicConfigOptions {
    fn default() -> Self {
        Self {
            config_file: None,
            root_folder: None,
            debug: false,
            logger: None,
            on_load_error_callback: None,
            no_log_on_reload: false,
            validation_schema: None,
            validation_callback: None,
            validation_options: ValidationOptions::default(),
            env_file_path: None,
            ignore_env_file: false,
            load: Vec::new(),
            debounce: DEFAULT_RELOAD_DEBOUNCE,
        }
    }
}

impl fmt::Debug for DynamicConfigOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicConfigOptions")
            .field("config_file", &self.config_file)
            .field("root_folder", &self.root_folder)
            .field("debug", &self.debug)
            .field("has_logger", &self.logger.is_some())
            .field("has_error_callback", &self.on_load_error_callback.is_some())
            .field("no_log_on_reload", &self.no_log_on_reload)
            .field(
                "validation_schema",
                &self.validation_schema.as_ref().map(|schema| schema.name().to_string()),
            )
            .field("has_validation_callback", &self.validation_callback.is_some())
            .field("validation_options", &self.validation_options)
            .field("env_file_path", &self.env_file_path)
            .field("ignore_env_file", &self.ignore_env_file)
            .field("load_factories", &self.load.len())
            .field("debounce", &self.debounce)
            .finish()
    }
}

impl DynamicConfigOptions {
    /// 创建默认选项
    pub fn new() -> Self {
        Self::default()
    }

    /// 主配置文件，`.js` 或 `.json`
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// `.env` 与 package.json 所在目录
    pub fn with_root_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_folder = Some(path.into());
        self
    }

    /// 开启后缺失的占位符、`.env` 解析失败等信息会输出到日志器的 `debug`
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// 注入日志器
    pub fn with_logger(mut self, logger: Arc<dyn ConfigLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 致命错误回调
    ///
    /// 设置后致命错误不会终止进程。回调在运行锁释放后调用，可以在回调中再次触发重载。
    pub fn with_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ConfigError) + Send + Sync + 'static,
    {
        self.on_load_error_callback = Some(Arc::new(callback));
        self
    }

    /// 重载成功时不输出 `Config file reloaded`
    pub fn with_no_log_on_reload(mut self, no_log: bool) -> Self {
        self.no_log_on_reload = no_log;
        self
    }

    /// 校验 schema，每次运行在合并工厂之后执行
    pub fn with_validation_schema(mut self, schema: Arc<dyn ValidationSchema>) -> Self {
        self.validation_schema = Some(schema);
        self
    }

    /// 校验失败回调
    ///
    /// 设置后校验失败只放弃本次运行，不走致命错误策略。
    /// 与错误回调一样在运行锁释放后调用。
    pub fn with_validation_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ConfigError) + Send + Sync + 'static,
    {
        self.validation_callback = Some(Arc::new(callback));
        self
    }

    /// 校验选项，默认收集全部错误并应用默认值
    pub fn with_validation_options(mut self, options: ValidationOptions) -> Self {
        self.validation_options = options;
        self
    }

    /// 覆盖默认的 `.{NODE_ENV}.env`、`.env` 候选
    pub fn with_env_file_path(mut self, path: impl Into<EnvFilePath>) -> Self {
        self.env_file_path = Some(path.into());
        self
    }

    /// 跳过 `.env` 加载
    pub fn with_ignore_env_file(mut self, ignore: bool) -> Self {
        self.ignore_env_file = ignore;
        self
    }

    /// 追加一个 `load` 工厂
    pub fn with_load<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Option<Value> + Send + Sync + 'static,
    {
        self.load.push(Arc::new(factory));
        self
    }

    /// 文件变更防抖时间，窗口内的多次变更合并为一次重载
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}
