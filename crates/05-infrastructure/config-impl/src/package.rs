//! 包元数据

use crate::merge::flatten;
use infrastructure_common::ConfigError;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// 包元数据缺失时名称和版本的占位值
pub const UNKNOWN_PACKAGE_FIELD: &str = "<unknown>";

/// 包描述文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// `package.json`
    Json,
    /// `Cargo.toml` 的 `[package]` 表
    CargoToml,
}

/// 读取到的包描述文件原文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// 文件格式
    pub format: PackageFormat,
    /// 文件路径（注入内容时为空）
    pub path: Option<PathBuf>,
    /// 原始内容
    pub content: String,
}

impl PackageDescriptor {
    /// 以 JSON 原文构建（注入内容使用）
    pub fn json(content: impl Into<String>) -> Self {
        Self {
            format: PackageFormat::Json,
            path: None,
            content: content.into(),
        }
    }
}

/// 包元数据
///
/// `fields` 为描述文件扁平化后的点分键视图，`{{pkg.<field>}}` 占位符据此解析。
#[derive(Debug, Clone, PartialEq)]
pub struct PackageInfo {
    name: String,
    version: String,
    fields: Map<String, Value>,
}

impl PackageInfo {
    /// 未知包（描述文件缺失或无法解析）
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_PACKAGE_FIELD.to_string(),
            version: UNKNOWN_PACKAGE_FIELD.to_string(),
            fields: Map::new(),
        }
    }

    /// 解析描述文件
    pub fn parse(descriptor: &PackageDescriptor) -> Result<Self, ConfigError> {
        let value = match descriptor.format {
            PackageFormat::Json => serde_json::from_str::<Value>(&descriptor.content)
                .map_err(|e| ConfigError::parse("package.json", e))?,
            PackageFormat::CargoToml => {
                let manifest: toml::Value = toml::from_str(&descriptor.content)
                    .map_err(|e| ConfigError::parse("Cargo.toml", e))?;
                manifest
                    .get("package")
                    .map(toml_to_json)
                    .unwrap_or_else(|| Value::Object(Map::new()))
            }
        };

        if !value.is_object() {
            return Err(ConfigError::InvalidRoot {
                actual: value_kind(&value).to_string(),
            });
        }
        Ok(Self::from_value(&value))
    }

    /// 由 JSON 对象构建
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_PACKAGE_FIELD)
                .to_string()
        };
        Self {
            name: text("name"),
            version: text("version"),
            fields: flatten(value),
        }
    }

    /// 包名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 版本
    pub fn version(&self) -> &str {
        &self.version
    }

    /// 扁平化后的全部字段
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// 获取字段
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// 获取字段并转换为插值用的字符串
    pub fn field_as_string(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// 是否没有任何字段
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for PackageInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

/// 将 TOML 值转换为 JSON 值
fn toml_to_json(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::Number(serde_json::Number::from(*i)),
        toml::Value::Float(f) => {
            serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number)
        }
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Array(arr) => Value::Array(arr.iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
