//! # Infrastructure Common
//!
//! 这个 crate 提供了 Lorn ADSP 配置基础设施的公共错误类型和工具。
//!
//! ## 核心组件
//!
//! - [`ConfigError`] - 配置加载/读取错误
//! - [`ValidationError`] - 配置校验错误
//! - [`ConfigSection`] - 配置节及类型化绑定

pub mod configuration;
pub mod errors;

pub use configuration::*;
pub use errors::*;
