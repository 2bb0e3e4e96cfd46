//! JSON 树的深度合并与扁平化

use serde_json::{Map, Value};

/// 深度合并
///
/// 两侧均为对象时逐键递归合并，其余情况由 `overlay` 覆盖 `base`。
/// 数组整体替换，不做逐项合并。
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            merge_maps(base_map, overlay_map);
        }
        (base, overlay) => *base = overlay,
    }
}

/// 对象级深度合并
pub fn merge_maps(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// 扁平化为点分键
///
/// 嵌套对象和数组展开为 `a.b` / `list.0` 形式的键，
/// 空对象和空数组保留为叶子值。
pub fn flatten(value: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, prefix: String, out: &mut Map<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(nested, child_key(&prefix, key), out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(nested, child_key(&prefix, &index.to_string()), out);
            }
        }
        leaf => {
            if !prefix.is_empty() {
                out.insert(prefix, leaf.clone());
            }
        }
    }
}

fn child_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
