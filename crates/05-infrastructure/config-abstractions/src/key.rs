//! 配置键路径

use std::fmt;

/// 配置键路径
///
/// 支持点分字符串 (`"db.host"`)、方括号下标 (`"servers[0].port"`)
/// 以及分段数组 (`["db", "host"]`)。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    segments: Vec<String>,
}

impl ConfigKey {
    /// 解析点分键
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        for part in path.split('.') {
            let mut rest = part;
            // `name[0][1]` 拆成 name / 0 / 1
            while let Some(open) = rest.find('[') {
                let Some(close) = rest[open..].find(']').map(|i| open + i) else {
                    break;
                };
                if open > 0 {
                    segments.push(rest[..open].to_string());
                }
                segments.push(rest[open + 1..close].trim().to_string());
                rest = &rest[close + 1..];
            }
            if !rest.is_empty() {
                segments.push(rest.to_string());
            }
        }
        Self { segments }
    }

    /// 由分段构建
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// 键的各个分段
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// 是否为空键（指向根节点）
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// 在 JSON 树中查找此键
    pub fn lookup<'a>(&self, root: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<&str> for ConfigKey {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for ConfigKey {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<&String> for ConfigKey {
    fn from(path: &String) -> Self {
        Self::parse(path)
    }
}

impl From<&[&str]> for ConfigKey {
    fn from(segments: &[&str]) -> Self {
        Self::from_segments(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for ConfigKey {
    fn from(segments: [&str; N]) -> Self {
        Self::from_segments(segments)
    }
}

impl From<Vec<String>> for ConfigKey {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}

impl From<&ConfigKey> for ConfigKey {
    fn from(key: &ConfigKey) -> Self {
        key.clone()
    }
}
