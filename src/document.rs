use serde_json::{Map, Value};

pub type DocumentId = u64;

/// Resolve a dot-notation path against a document.
///
/// When a step lands on an array, the rest of the path is resolved against
/// each object element and the results are collected into a new array, so
/// `reviews.rating` on a product yields the list of its ratings. A numeric
/// step indexes into the array instead.
pub fn resolve_path(doc: &Value, path: &str) -> Option<Value> {
    let parts: Vec<&str> = path.split('.').collect();
    resolve_parts(doc, &parts)
}

fn resolve_parts(current: &Value, parts: &[&str]) -> Option<Value> {
    let Some((head, rest)) = parts.split_first() else {
        return Some(current.clone());
    };
    match current {
        Value::Object(map) => resolve_parts(map.get(*head)?, rest),
        Value::Array(items) => {
            if let Ok(idx) = head.parse::<usize>() {
                return resolve_parts(items.get(idx)?, rest);
            }
            let collected = items
                .iter()
                .filter(|item| item.is_object())
                .filter_map(|item| resolve_parts(item, parts))
                .collect();
            Some(Value::Array(collected))
        }
        _ => None,
    }
}

/// Like [`resolve_path`] but treats a missing field as `null`.
pub(crate) fn resolve_or_null(doc: &Value, path: &str) -> Value {
    resolve_path(doc, path).unwrap_or(Value::Null)
}

/// Set a field by dot path, creating intermediate objects as needed.
/// Intermediate non-object values are replaced.
pub(crate) fn set_field(doc: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };
    let mut current = doc;
    for part in parents {
        let Value::Object(map) = current else {
            return;
        };
        let entry = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry;
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}

/// Remove a field by dot path. Returns true if something was removed.
pub(crate) fn remove_field(doc: &mut Value, path: &str) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };
    let mut current = doc;
    for part in parents {
        match current {
            Value::Object(map) => match map.get_mut(*part) {
                Some(v) => current = v,
                None => return false,
            },
            _ => return false,
        }
    }
    match current {
        Value::Object(map) => map.shift_remove(*last).is_some(),
        _ => false,
    }
}
