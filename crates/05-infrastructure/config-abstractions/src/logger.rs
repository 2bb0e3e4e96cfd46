//! 日志能力接口

use tracing::{debug, error, info, warn};

/// 配置日志器 trait
///
/// 由使用方注入，用于输出重载提示、致命错误以及调试信息。
/// `debug` 为可选能力，默认转发到 `tracing`。
pub trait ConfigLogger: Send + Sync {
    /// 常规信息
    fn log(&self, message: &str);

    /// 警告
    fn warn(&self, message: &str);

    /// 错误
    fn error(&self, message: &str);

    /// 致命错误，调用后进程通常会被终止
    fn fatal(&self, message: &str);

    /// 调试信息
    fn debug(&self, message: &str) {
        debug!(target: "config", "{}", message);
    }
}

/// 基于 `tracing` 的默认日志器
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ConfigLogger for TracingLogger {
    fn log(&self, message: &str) {
        info!(target: "config", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "config", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "config", "{}", message);
    }

    fn fatal(&self, message: &str) {
        error!(target: "config", fatal = true, "{}", message);
    }
}
