//! 错误类型定义

use std::path::PathBuf;
use thiserror::Error;

/// 配置错误类型
///
/// 流水线中的致命错误统一以此类型交给错误策略处理；
/// 读取接口（`get_or_fail` 等）同样返回此类型。
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported config file type - only .js and JSON files are supported ({path})")]
    UnsupportedFileType { path: String },

    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置文件读取失败: {}: {}", .path.display(), .source)]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("配置内容加载失败: {message}")]
    InjectedLoadError { message: String },

    #[error("{format} 配置解析失败: {source}")]
    ParseError {
        format: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置根节点必须是对象, 实际为 {actual}")]
    InvalidRoot { actual: String },

    #[error("One of the factories you provided in the `load` option returned no content (index {index})")]
    FactoryWithoutContent { index: usize },

    #[error("`load` 选项中的第 {index} 个工厂返回的不是对象")]
    InvalidFactoryContent { index: usize },

    #[error("配置验证失败: {}", .errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("key {key} not found in the configuration")]
    KeyNotFound { key: String },

    #[error("配置类型转换失败: {message}")]
    TypeConversionError { message: String },

    #[error("配置序列化失败: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("配置文件监控失败: {message}")]
    WatchError { message: String },
}

impl ConfigError {
    /// 创建解析错误
    pub fn parse(
        format: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ParseError {
            format,
            source: source.into(),
        }
    }

    /// 是否为键不存在错误
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}

impl From<Vec<ValidationError>> for ConfigError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::ValidationFailed {
            errors: errors.iter().map(ToString::to_string).collect(),
        }
    }
}

/// 验证错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("验证失败: {message}")]
    ValidationFailed { message: String },

    #[error("必需字段缺失: {field_name}")]
    RequiredFieldMissing { field_name: String },

    #[error("字段值无效: {field_name}, 值: {value}, 原因: {reason}")]
    InvalidFieldValue {
        field_name: String,
        value: String,
        reason: String,
    },

    #[error("字段值超出范围: {field_name}, 值: {value}, 范围: {range}")]
    ValueOutOfRange {
        field_name: String,
        value: String,
        range: String,
    },

    #[error("格式错误: {field_name}, 期望格式: {expected_format}")]
    FormatError {
        field_name: String,
        expected_format: String,
    },

    #[error("未知字段: {field_name}")]
    UnknownField { field_name: String },
}

impl ValidationError {
    /// 创建新的验证错误
    pub fn new(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// 创建必需字段缺失错误
    pub fn required_field_missing(field_name: impl Into<String>) -> Self {
        Self::RequiredFieldMissing {
            field_name: field_name.into(),
        }
    }

    /// 创建字段值无效错误
    pub fn invalid_field_value(
        field_name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldValue {
            field_name: field_name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 创建值超出范围错误
    pub fn value_out_of_range(
        field_name: impl Into<String>,
        value: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self::ValueOutOfRange {
            field_name: field_name.into(),
            value: value.into(),
            range: range.into(),
        }
    }

    /// 创建格式错误
    pub fn format_error(field_name: impl Into<String>, expected_format: impl Into<String>) -> Self {
        Self::FormatError {
            field_name: field_name.into(),
            expected_format: expected_format.into(),
        }
    }

    /// 创建未知字段错误
    pub fn unknown_field(field_name: impl Into<String>) -> Self {
        Self::UnknownField {
            field_name: field_name.into(),
        }
    }
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
