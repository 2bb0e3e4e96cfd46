//! 基于字段规则的配置校验器

use config_abstractions::{
    ConfigKey, ValidationOptions, ValidationResult, ValidationSchema, ValidationWarning,
};
use infrastructure_common::ValidationError;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 字段值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ValueType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    /// 将字符串转换为目标类型
    ///
    /// 模板替换的结果总是字符串，`"8080"` 这类值需要转换为数字。
    fn coerce(self, value: &Value) -> Option<Value> {
        let text = value.as_str()?.trim();
        match self {
            Self::Integer => text.parse::<i64>().ok().map(Value::from),
            Self::Number => text
                .parse::<i64>()
                .map(Value::from)
                .ok()
                .or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                }),
            Self::Boolean => match text {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个字段的校验规则
#[derive(Debug, Clone, Default)]
pub struct FieldRule {
    required: bool,
    value_type: Option<ValueType>,
    min: Option<f64>,
    max: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    allowed: Vec<Value>,
    default: Option<Value>,
}

impl FieldRule {
    /// 创建空规则（任何值都通过）
    pub fn new() -> Self {
        Self::default()
    }

    /// 必需字段
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// 限定类型
    pub fn of_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// 数值范围（闭区间）
    pub fn between(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// 数值下限
    pub fn min_value(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// 数值上限
    pub fn max_value(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// 字符串长度（字符数）或数组长度范围
    pub fn length_range(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    /// 字符串需匹配的正则
    pub fn pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// 允许的取值
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    /// 缺失时的默认值
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// 校验单个值，返回转换后的值（若发生转换）
    fn check(
        &self,
        field: &str,
        value: &Value,
        errors: &mut Vec<ValidationError>,
        warnings: &mut Vec<ValidationWarning>,
    ) -> Option<Value> {
        let mut coerced = None;

        if let Some(value_type) = self.value_type {
            if !value_type.matches(value) {
                match value_type.coerce(value) {
                    Some(converted) => coerced = Some(converted),
                    None => {
                        errors.push(ValidationError::invalid_field_value(
                            field,
                            value.to_string(),
                            format!("期望类型 {value_type}"),
                        ));
                        return None;
                    }
                }
            }
        }
        let value = coerced.as_ref().unwrap_or(value);

        if self.min.is_some() || self.max.is_some() {
            match value.as_f64() {
                Some(num) => {
                    let below = self.min.is_some_and(|min| num < min);
                    let above = self.max.is_some_and(|max| num > max);
                    if below || above {
                        errors.push(ValidationError::value_out_of_range(
                            field,
                            num.to_string(),
                            format_range(self.min, self.max),
                        ));
                    }
                }
                None => warnings.push(
                    ValidationWarning::new(field, "值不是数字类型，跳过范围验证")
                        .with_suggestion("请确保值为数字类型"),
                ),
            }
        }

        if self.min_length.is_some() || self.max_length.is_some() {
            let length = match value {
                Value::String(s) => Some(s.chars().count()),
                Value::Array(items) => Some(items.len()),
                _ => None,
            };
            match length {
                Some(length) => {
                    let too_short = self.min_length.is_some_and(|min| length < min);
                    let too_long = self.max_length.is_some_and(|max| length > max);
                    if too_short || too_long {
                        errors.push(ValidationError::value_out_of_range(
                            field,
                            format!("长度 {length}"),
                            format_range(self.min_length, self.max_length),
                        ));
                    }
                }
                None => warnings.push(ValidationWarning::new(
                    field,
                    "值不是字符串或数组，跳过长度验证",
                )),
            }
        }

        if let Some(pattern) = &self.pattern {
            match value.as_str() {
                Some(s) if !pattern.is_match(s) => {
                    errors.push(ValidationError::format_error(field, pattern.as_str()));
                }
                Some(_) => {}
                None => warnings.push(ValidationWarning::new(
                    field,
                    "值不是字符串类型，跳过正则表达式验证",
                )),
            }
        }

        if !self.allowed.is_empty() && !self.allowed.contains(value) {
            let allowed: Vec<String> = self.allowed.iter().map(Value::to_string).collect();
            errors.push(ValidationError::invalid_field_value(
                field,
                value.to_string(),
                format!("取值必须为 [{}] 之一", allowed.join(", ")),
            ));
        }

        coerced
    }
}

fn format_range<T: fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{min}-{max}"),
        (Some(min), None) => format!(">= {min}"),
        (None, Some(max)) => format!("<= {max}"),
        (None, None) => String::new(),
    }
}

/// 规则校验器
///
/// 规则按点分路径注册，按路径字典序依次执行。
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    name: String,
    rules: BTreeMap<String, FieldRule>,
}

impl SchemaValidator {
    /// 创建校验器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: BTreeMap::new(),
        }
    }

    /// 添加字段规则（构建器形式）
    pub fn field(mut self, path: impl Into<String>, rule: FieldRule) -> Self {
        self.add_rule(path, rule);
        self
    }

    /// 添加字段规则
    pub fn add_rule(&mut self, path: impl Into<String>, rule: FieldRule) {
        let path = path.into();
        debug!("注册校验规则: {}", path);
        self.rules.insert(path, rule);
    }

    /// 规则数量
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn top_level_fields(&self) -> HashSet<&str> {
        self.rules
            .keys()
            .filter_map(|path| path.split(['.', '[']).next())
            .collect()
    }
}

impl ValidationSchema for SchemaValidator {
    fn validate(&self, config: &Value, options: &ValidationOptions) -> ValidationResult {
        let started = Instant::now();
        let mut value = config.clone();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut validated = 0;

        for (path, rule) in &self.rules {
            if options.abort_early && !errors.is_empty() {
                break;
            }
            let key = ConfigKey::parse(path);
            validated += 1;

            let current = key.lookup(&value).filter(|v| !v.is_null()).cloned();
            match current {
                None => match &rule.default {
                    Some(default) if options.apply_defaults => {
                        debug!("字段 {} 缺失，使用默认值", path);
                        if let Err(parent) = set_path(&mut value, key.segments(), default.clone()) {
                            errors.push(blocked_by_scalar(&value, path, &parent));
                        }
                    }
                    _ if rule.required => {
                        errors.push(ValidationError::required_field_missing(path.as_str()));
                    }
                    _ => {}
                },
                Some(current) => {
                    let converted = rule.check(path, &current, &mut errors, &mut warnings);
                    if let Some(converted) = converted {
                        if let Err(parent) = set_path(&mut value, key.segments(), converted) {
                            errors.push(blocked_by_scalar(&value, path, &parent));
                        }
                    }
                }
            }
        }

        if !options.allow_unknown && !(options.abort_early && !errors.is_empty()) {
            let known = self.top_level_fields();
            if let Value::Object(map) = &value {
                for field in map.keys() {
                    if !known.contains(field.as_str()) {
                        errors.push(ValidationError::unknown_field(field.as_str()));
                        if options.abort_early {
                            break;
                        }
                    }
                }
            }
        }

        let mut result = if errors.is_empty() {
            ValidationResult::success(value)
        } else {
            warn!("{} 校验失败，错误数: {}", self.name, errors.len());
            ValidationResult::failure(value, errors)
        };
        for warning in warnings {
            result.add_warning(warning);
        }
        result.validated_count = validated;
        result.duration = started.elapsed();

        if result.is_valid {
            info!("{} 校验通过，校验字段数: {}", self.name, validated);
        }
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 按路径写入值，沿途缺失（或为 `null`）的中间节点创建为对象
///
/// 中间节点已有标量值时不写入，返回该节点的路径。
fn set_path(root: &mut Value, segments: &[String], new_value: Value) -> Result<(), String> {
    let Some((last, parents)) = segments.split_last() else {
        *root = new_value;
        return Ok(());
    };

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index = segment.parse::<usize>().ok().filter(|i| *i < items.len());
                match index {
                    Some(index) => &mut items[index],
                    None => return Err(segments[..depth].join(".")),
                }
            }
            _ => return Err(segments[..depth].join(".")),
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(last.clone(), new_value);
            Ok(())
        }
        Value::Array(items) => match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => {
                *slot = new_value;
                Ok(())
            }
            None => Err(parents.join(".")),
        },
        _ => Err(parents.join(".")),
    }
}

/// 父节点为标量、无法写入时的错误
fn blocked_by_scalar(value: &Value, field: &str, parent: &str) -> ValidationError {
    let found = ConfigKey::parse(parent)
        .lookup(value)
        .map(Value::to_string)
        .unwrap_or_default();
    ValidationError::invalid_field_value(
        parent,
        found,
        format!("节点不是对象，无法写入字段 {field}"),
    )
}
