//! 文件加载器
//!
//! 所有文件系统读取和进程退出都集中在这里，流水线本身不直接接触外部世界。
//! 加载器有两种来源：真实文件系统和注入内容（测试使用）。

use crate::package::{PackageDescriptor, PackageFormat};
use config_abstractions::EnvironmentStore;
use infrastructure_common::ConfigError;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// 未设置 `NODE_ENV` 时使用的环境名
pub const DEFAULT_NODE_ENV: &str = "development";

const PACKAGE_CANDIDATES: [(&str, PackageFormat); 3] = [
    ("package.json", PackageFormat::Json),
    ("../package.json", PackageFormat::Json),
    ("Cargo.toml", PackageFormat::CargoToml),
];

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFileFormat {
    /// `.js`，由受限求值器处理
    Script,
    /// `.json`，严格 JSON
    Json,
    /// 其它扩展名（致命错误）
    Unsupported,
    /// 没有主配置文件，仅依赖 `load` 工厂
    None,
}

impl ConfigFileFormat {
    /// 根据路径扩展名判断格式
    pub fn from_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::None;
        };
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("js") | Some("cjs") | Some("mjs") => Self::Script,
            Some("json") => Self::Json,
            _ => Self::Unsupported,
        }
    }

    /// 格式名称
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "js",
            Self::Json => "json",
            Self::Unsupported => "other",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ConfigFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 真实文件系统来源
#[derive(Debug, Clone, Default)]
pub struct RealSource {
    /// 主配置文件路径
    pub config_file: Option<PathBuf>,
    /// 根目录，`.env` 与包描述文件在此查找
    pub root_folder: Option<PathBuf>,
    /// 显式指定的 `.env` 候选列表（按优先级）
    pub env_file_path: Option<Vec<PathBuf>>,
}

/// 注入内容来源
#[derive(Debug, Clone)]
pub struct InjectedContent {
    /// `.env` 内容，空串视为文件不存在
    pub env_content: String,
    /// 包描述文件内容（JSON），空串视为不存在
    pub pkg_content: String,
    /// 主配置内容
    pub config_content: String,
    /// 主配置格式
    pub config_format: ConfigFileFormat,
    /// 读取主配置时返回的预置错误
    pub config_error: Option<String>,
}

impl InjectedContent {
    /// 以配置内容和格式构建，其余内容为空
    pub fn new(config_content: impl Into<String>, config_format: ConfigFileFormat) -> Self {
        Self {
            env_content: String::new(),
            pkg_content: String::new(),
            config_content: config_content.into(),
            config_format,
            config_error: None,
        }
    }

    /// 设置 `.env` 内容
    pub fn with_env(mut self, content: impl Into<String>) -> Self {
        self.env_content = content.into();
        self
    }

    /// 设置包描述文件内容
    pub fn with_package(mut self, content: impl Into<String>) -> Self {
        self.pkg_content = content.into();
        self
    }

    /// 读取主配置时返回该错误
    pub fn with_config_error(mut self, message: impl Into<String>) -> Self {
        self.config_error = Some(message.into());
        self
    }
}

/// 加载器来源
#[derive(Debug)]
pub enum LoaderSource {
    /// 真实文件系统
    Real(RealSource),
    /// 注入内容，可在运行期间替换
    Injected(RwLock<InjectedContent>),
}

/// 进程终止处理函数
pub type ExitHandler = Arc<dyn Fn(&ConfigError) + Send + Sync>;

/// 文件加载器
pub struct FileLoader {
    source: LoaderSource,
    node_env: OnceCell<String>,
    exit_handler: Option<ExitHandler>,
    exit_count: AtomicUsize,
}

impl fmt::Debug for FileLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLoader")
            .field("source", &self.source)
            .field("node_env", &self.node_env.get())
            .field("has_exit_handler", &self.exit_handler.is_some())
            .field("exit_count", &self.exit_count())
            .finish()
    }
}

impl FileLoader {
    /// 真实文件系统加载器
    pub fn real(source: RealSource) -> Self {
        Self {
            source: LoaderSource::Real(source),
            node_env: OnceCell::new(),
            exit_handler: None,
            exit_count: AtomicUsize::new(0),
        }
    }

    /// 注入内容加载器
    ///
    /// 注入模式下终止进程只记录次数，不会真正退出。
    pub fn injected(content: InjectedContent) -> Self {
        Self {
            source: LoaderSource::Injected(RwLock::new(content)),
            node_env: OnceCell::new(),
            exit_handler: Some(Arc::new(|_: &ConfigError| {})),
            exit_count: AtomicUsize::new(0),
        }
    }

    /// 覆盖进程终止行为
    pub fn with_exit_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ConfigError) + Send + Sync + 'static,
    {
        self.exit_handler = Some(Arc::new(handler));
        self
    }

    /// 加载器来源
    pub fn source(&self) -> &LoaderSource {
        &self.source
    }

    /// 替换注入内容，下一次运行读取新内容
    ///
    /// 真实文件系统加载器不受影响，返回 `false`。
    pub fn set_injected_config(&self, content: InjectedContent) -> bool {
        match &self.source {
            LoaderSource::Injected(injected) => {
                *injected.write() = content;
                debug!("注入内容已替换");
                true
            }
            LoaderSource::Real(_) => false,
        }
    }

    /// 确定 `.env` 候选使用的环境名
    ///
    /// 只在第一次调用时读取 `NODE_ENV`，之后 `.env` 写入的值不会改变候选文件。
    pub fn resolve_node_env(&self, env: &dyn EnvironmentStore) -> &str {
        self.node_env.get_or_init(|| {
            env.get("NODE_ENV")
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_NODE_ENV.to_string())
        })
    }

    /// 是否为注入内容
    pub fn is_injected(&self) -> bool {
        matches!(self.source, LoaderSource::Injected(_))
    }

    /// 主配置文件路径（注入模式下为空）
    pub fn config_file(&self) -> Option<&Path> {
        match &self.source {
            LoaderSource::Real(real) => real.config_file.as_deref(),
            LoaderSource::Injected(_) => None,
        }
    }

    /// 主配置文件格式
    pub fn config_file_format(&self) -> ConfigFileFormat {
        match &self.source {
            LoaderSource::Real(real) => ConfigFileFormat::from_path(real.config_file.as_deref()),
            LoaderSource::Injected(injected) => injected.read().config_format,
        }
    }

    /// 按优先级读取所有存在的 `.env` 文件内容
    ///
    /// 没有任何文件时返回空列表，这不是错误。
    pub fn load_env_file_contents(&self, env: &dyn EnvironmentStore) -> Vec<String> {
        match &self.source {
            LoaderSource::Injected(injected) => {
                let injected = injected.read();
                if injected.env_content.is_empty() {
                    Vec::new()
                } else {
                    vec![injected.env_content.clone()]
                }
            }
            LoaderSource::Real(real) => {
                let node_env = self.resolve_node_env(env);
                let mut contents = Vec::new();
                for path in env_file_candidates(real, node_env) {
                    if !path.is_file() {
                        continue;
                    }
                    match std::fs::read_to_string(&path) {
                        Ok(content) => {
                            debug!("读取环境文件: {}", path.display());
                            contents.push(content);
                        }
                        Err(e) => debug!("环境文件读取失败: {}: {}", path.display(), e),
                    }
                }
                contents
            }
        }
    }

    /// 读取包描述文件
    pub fn load_package_metadata(&self) -> Option<PackageDescriptor> {
        match &self.source {
            LoaderSource::Injected(injected) => {
                let injected = injected.read();
                if injected.pkg_content.is_empty() {
                    None
                } else {
                    Some(PackageDescriptor::json(injected.pkg_content.clone()))
                }
            }
            LoaderSource::Real(real) => {
                let root = real.root_folder.as_deref()?;
                PACKAGE_CANDIDATES.iter().find_map(|(name, format)| {
                    let path = root.join(name);
                    if !path.is_file() {
                        return None;
                    }
                    match std::fs::read_to_string(&path) {
                        Ok(content) => Some(PackageDescriptor {
                            format: *format,
                            path: Some(path),
                            content,
                        }),
                        Err(e) => {
                            debug!("包描述文件读取失败: {}: {}", path.display(), e);
                            None
                        }
                    }
                })
            }
        }
    }

    /// 读取主配置文件
    pub fn load_config_file_content(&self) -> Result<String, ConfigError> {
        match &self.source {
            LoaderSource::Injected(injected) => {
                let injected = injected.read();
                match &injected.config_error {
                    Some(message) => Err(ConfigError::InjectedLoadError {
                        message: message.clone(),
                    }),
                    None => Ok(injected.config_content.clone()),
                }
            }
            LoaderSource::Real(real) => {
                let path = real
                    .config_file
                    .as_deref()
                    .ok_or_else(|| ConfigError::FileNotFound {
                        path: String::new(),
                    })?;
                std::fs::read_to_string(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ConfigError::FileNotFound {
                            path: path.display().to_string(),
                        }
                    } else {
                        ConfigError::FileReadError {
                            path: path.to_path_buf(),
                            source: e,
                        }
                    }
                })
            }
        }
    }

    /// 请求终止进程
    ///
    /// 这是唯一可能退出进程的地方。设置了终止处理函数时调用它，
    /// 否则以退出码 1 结束进程。
    pub fn terminate_process(&self, error: &ConfigError) {
        self.exit_count.fetch_add(1, Ordering::SeqCst);
        match &self.exit_handler {
            Some(handler) => handler(error),
            None => {
                error!("配置加载失败，进程退出: {}", error);
                std::process::exit(1);
            }
        }
    }

    /// 终止请求次数
    pub fn exit_count(&self) -> usize {
        self.exit_count.load(Ordering::SeqCst)
    }
}

/// `.env` 候选路径
///
/// 显式列表中的相对路径相对于根目录解析；没有根目录时只保留绝对路径。
/// 默认候选为 `.{NODE_ENV}.env`、`.env`。
fn env_file_candidates(source: &RealSource, node_env: &str) -> Vec<PathBuf> {
    let root = source.root_folder.as_deref();
    let candidates = match &source.env_file_path {
        Some(paths) => paths.clone(),
        None => {
            vec![
                PathBuf::from(format!(".{node_env}.env")),
                PathBuf::from(".env"),
            ]
        }
    };

    candidates
        .into_iter()
        .filter_map(|path| {
            if path.is_absolute() {
                Some(path)
            } else {
                root.map(|root| root.join(path))
            }
        })
        .collect()
}
