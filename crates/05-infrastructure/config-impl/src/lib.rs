//! # Configuration Implementation
//!
//! 动态配置的具体实现：从 `.env`、包元数据与主配置文件（`.json` 或受限的 `.js`）
//! 加载配置，进行模板替换、合并与校验，并在文件变更时热重载。
//!
//! ## 主要组件
//!
//! - [`ConfigService`] - 配置服务，读取入口与重载控制
//! - [`Pipeline`] - 加载流水线与错误策略
//! - [`FileLoader`] - 文件加载器（真实文件系统或注入内容）
//! - [`TemplateSubstitution`] - `{{ENV_X}}` / `{{pkg.x}}` 模板替换
//! - [`SchemaValidator`] - 基于字段规则的配置校验器
//! - [`ConfigFileWatcher`] - 配置文件监控器
//! - [`ReloadNotifier`] - 重载事件分发

pub mod environment;
pub mod event_handler;
pub mod loader;
pub mod merge;
pub mod options;
pub mod package;
pub mod pipeline;
pub mod script;
pub mod service;
pub mod substitution;
pub mod validation;
pub mod watcher;

pub use environment::*;
pub use event_handler::*;
pub use loader::*;
pub use merge::*;
pub use options::*;
pub use package::*;
pub use pipeline::*;
pub use script::{evaluate as evaluate_script, ScriptError};
pub use service::*;
pub use substitution::*;
pub use validation::*;
pub use watcher::*;
