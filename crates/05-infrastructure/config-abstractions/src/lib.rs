//! # Configuration Abstractions
//!
//! 动态配置的抽象层，定义配置读取、日志、环境变量、校验和监控的核心接口。
//!
//! ## 核心接口
//!
//! - [`ConfigProvider`] / [`ConfigProviderExt`] - 配置读取接口
//! - [`ConfigLogger`] - 日志能力接口
//! - [`EnvironmentStore`] - 环境变量存储接口
//! - [`ValidationSchema`] - 配置校验接口
//! - [`ConfigWatcher`] - 配置监控接口
//! - [`ConfigEventListener`] - 配置事件监听接口

pub mod environment;
pub mod events;
pub mod key;
pub mod logger;
pub mod provider;
pub mod snapshot;
pub mod validator;
pub mod watcher;

pub use environment::*;
pub use events::*;
pub use key::*;
pub use logger::*;
pub use provider::*;
pub use snapshot::*;
pub use validator::*;
pub use watcher::*;
