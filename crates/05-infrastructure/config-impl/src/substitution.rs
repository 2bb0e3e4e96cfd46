//! 模板占位符替换
//!
//! 支持两种占位符：
//!
//! - `{{ENV_<NAME>}}` - 环境变量 `NAME`
//! - `{{pkg.<field>}}` - 包元数据的扁平化字段
//!
//! 替换在解析之前对原始文本进行，与配置语法无关。
//! 未能解析的占位符保持原样。

use crate::package::PackageInfo;
use config_abstractions::EnvironmentStore;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{(?:ENV_(\w+)|pkg\.([\w.\-]+))\}\}").expect("placeholder pattern is valid")
});

/// 占位符
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `{{ENV_<NAME>}}`
    Env(String),
    /// `{{pkg.<field>}}`
    Package(String),
}

impl Placeholder {
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        if let Some(name) = caps.get(1) {
            Some(Self::Env(name.as_str().to_string()))
        } else {
            caps.get(2).map(|field| Self::Package(field.as_str().to_string()))
        }
    }

    /// 占位符未定义时的调试信息
    pub fn missing_message(&self) -> String {
        match self {
            Self::Env(name) => format!("{name} is not a defined environment variable"),
            Self::Package(field) => format!("{field} is not defined in package.json"),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(name) => write!(f, "{{{{ENV_{name}}}}}"),
            Self::Package(field) => write!(f, "{{{{pkg.{field}}}}}"),
        }
    }
}

/// 替换结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// 替换后的文本
    pub text: String,
    /// 未能解析的占位符（按首次出现顺序，去重）
    pub unresolved: Vec<Placeholder>,
}

/// 模板替换引擎
pub struct TemplateSubstitution<'a> {
    env: &'a dyn EnvironmentStore,
    package: &'a PackageInfo,
}

impl<'a> TemplateSubstitution<'a> {
    /// 创建替换引擎
    pub fn new(env: &'a dyn EnvironmentStore, package: &'a PackageInfo) -> Self {
        Self { env, package }
    }

    fn resolve(&self, placeholder: &Placeholder) -> Option<String> {
        match placeholder {
            Placeholder::Env(name) => self.env.get(name),
            Placeholder::Package(field) => self.package.field_as_string(field),
        }
    }

    /// 替换文本中的全部占位符
    ///
    /// 先一次扫描收集所有不同的键，每个键只查找一次，再统一替换。
    pub fn substitute(&self, content: &str) -> Substitution {
        let mut order = Vec::new();
        let mut resolved: HashMap<Placeholder, Option<String>> = HashMap::new();

        for caps in PLACEHOLDER.captures_iter(content) {
            let Some(placeholder) = Placeholder::from_captures(&caps) else {
                continue;
            };
            if !resolved.contains_key(&placeholder) {
                let value = self.resolve(&placeholder);
                order.push(placeholder.clone());
                resolved.insert(placeholder, value);
            }
        }

        if resolved.is_empty() {
            return Substitution {
                text: content.to_string(),
                unresolved: Vec::new(),
            };
        }

        let text = PLACEHOLDER
            .replace_all(content, |caps: &Captures<'_>| {
                Placeholder::from_captures(caps)
                    .and_then(|placeholder| resolved.get(&placeholder).cloned().flatten())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        let unresolved = order
            .into_iter()
            .filter(|placeholder| matches!(resolved.get(placeholder), Some(None)))
            .collect();

        Substitution { text, unresolved }
    }

    /// 替换 JSON 树中所有字符串叶子里的占位符
    ///
    /// 返回未能解析的占位符。
    pub fn substitute_value(&self, value: &mut Value) -> Vec<Placeholder> {
        let mut unresolved = Vec::new();
        self.walk(value, &mut unresolved);
        unresolved
    }

    fn walk(&self, value: &mut Value, unresolved: &mut Vec<Placeholder>) {
        match value {
            Value::String(s) => {
                let result = self.substitute(s);
                *s = result.text;
                for placeholder in result.unresolved {
                    if !unresolved.contains(&placeholder) {
                        unresolved.push(placeholder);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, unresolved);
                }
            }
            Value::Object(map) => {
                for (_, item) in map.iter_mut() {
                    self.walk(item, unresolved);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::InMemoryEnvironment;
    use crate::package::PackageDescriptor;
    use serde_json::json;

    fn package() -> PackageInfo {
        PackageInfo::parse(&PackageDescriptor::json(
            r#"{ "name": "app", "version": "1.2.30", "port": 8080, "repository": {"url": "git://x"} }"#,
        ))
        .unwrap()
    }

    #[test]
    fn test_substitutes_env_and_package() {
        let env = InMemoryEnvironment::with_vars([("KEY", "VALUE")]);
        let pkg = package();
        let engine = TemplateSubstitution::new(&env, &pkg);

        let result = engine.substitute(
            "{env: '{{ENV_KEY}}', again: '{{ENV_KEY}}', name: '{{pkg.name}}', port: {{pkg.port}}, url: '{{pkg.repository.url}}'}",
        );
        assert_eq!(
            result.text,
            "{env: 'VALUE', again: 'VALUE', name: 'app', port: 8080, url: 'git://x'}"
        );
        assert!(result.unresolved.is_empty());
    }

    #[test]
    fn test_unresolved_left_verbatim() {
        let env = InMemoryEnvironment::new();
        let pkg = PackageInfo::unknown();
        let engine = TemplateSubstitution::new(&env, &pkg);

        let result = engine.substitute(r#"{"a": "{{ENV_MISSING}}", "b": "{{pkg.author}}", "c": "{{ENV_MISSING}}"}"#);
        assert_eq!(
            result.text,
            r#"{"a": "{{ENV_MISSING}}", "b": "{{pkg.author}}", "c": "{{ENV_MISSING}}"}"#
        );
        assert_eq!(
            result.unresolved,
            vec![
                Placeholder::Env("MISSING".to_string()),
                Placeholder::Package("author".to_string())
            ]
        );
        assert_eq!(
            result.unresolved[0].missing_message(),
            "MISSING is not a defined environment variable"
        );
        assert_eq!(
            result.unresolved[1].missing_message(),
            "author is not defined in package.json"
        );
    }

    #[test]
    fn test_empty_env_value_is_defined() {
        let env = InMemoryEnvironment::with_vars([("EMPTY", "")]);
        let pkg = PackageInfo::unknown();
        let engine = TemplateSubstitution::new(&env, &pkg);
        assert_eq!(engine.substitute("x{{ENV_EMPTY}}y").text, "xy");
    }

    #[test]
    fn test_substitute_value_tree() {
        let env = InMemoryEnvironment::with_vars([("HOST", "db.local")]);
        let pkg = package();
        let engine = TemplateSubstitution::new(&env, &pkg);

        let mut value = json!({"db": {"host": "{{ENV_HOST}}", "tags": ["{{pkg.name}}", 1]}, "x": "{{ENV_NOPE}}"});
        let unresolved = engine.substitute_value(&mut value);
        assert_eq!(
            value,
            json!({"db": {"host": "db.local", "tags": ["app", 1]}, "x": "{{ENV_NOPE}}"})
        );
        assert_eq!(unresolved, vec![Placeholder::Env("NOPE".to_string())]);
    }

    #[test]
    fn test_placeholder_display() {
        assert_eq!(Placeholder::Env("A".to_string()).to_string(), "{{ENV_A}}");
        assert_eq!(Placeholder::Package("b.c".to_string()).to_string(), "{{pkg.b.c}}");
    }
}
