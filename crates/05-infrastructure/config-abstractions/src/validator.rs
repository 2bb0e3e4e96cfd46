//! 配置验证抽象接口

use infrastructure_common::{ConfigError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 配置校验 schema trait
///
/// 外部校验引擎的调用约定：输入合并后的配置对象，输出校验结果。
/// 校验通过时 [`ValidationResult::value`] 为校验/转换后的值
/// （可能补充了默认值），该值将作为最终提交的配置。
pub trait ValidationSchema: Send + Sync {
    /// 校验配置
    fn validate(&self, config: &Value, options: &ValidationOptions) -> ValidationResult;

    /// 获取 schema 名称
    fn name(&self) -> &str {
        "ValidationSchema"
    }
}

/// 校验选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationOptions {
    /// 遇到第一个错误即停止
    pub abort_early: bool,
    /// 允许 schema 未声明的顶层键
    pub allow_unknown: bool,
    /// 为缺失字段补充默认值
    pub apply_defaults: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            abort_early: false,
            allow_unknown: true,
            apply_defaults: true,
        }
    }
}

/// 验证结果
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// 是否验证通过
    pub is_valid: bool,
    /// 校验后的值（仅在通过时有意义）
    pub value: Value,
    /// 验证错误列表
    pub errors: Vec<ValidationError>,
    /// 验证警告列表
    pub warnings: Vec<ValidationWarning>,
    /// 验证的配置项数量
    pub validated_count: usize,
    /// 验证耗时
    pub duration: std::time::Duration,
    /// 验证时间
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

impl ValidationResult {
    /// 创建成功的验证结果
    pub fn success(value: Value) -> Self {
        Self {
            is_valid: true,
            value,
            errors: Vec::new(),
            warnings: Vec::new(),
            validated_count: 0,
            duration: std::time::Duration::ZERO,
            validated_at: chrono::Utc::now(),
        }
    }

    /// 创建失败的验证结果
    pub fn failure(value: Value, errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: false,
            value,
            errors,
            warnings: Vec::new(),
            validated_count: 0,
            duration: std::time::Duration::ZERO,
            validated_at: chrono::Utc::now(),
        }
    }

    /// 添加错误
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
        self.is_valid = false;
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// 转换为 `Result`，失败时产出 [`ConfigError::ValidationFailed`]
    pub fn into_result(self) -> Result<Value, ConfigError> {
        if self.is_valid {
            Ok(self.value)
        } else {
            Err(ConfigError::from(self.errors))
        }
    }
}

/// 验证警告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// 警告字段
    pub field: String,
    /// 警告消息
    pub message: String,
    /// 建议修复方法
    pub suggestion: Option<String>,
}

impl ValidationWarning {
    /// 创建新的验证警告
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// 添加建议
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}
