//! JSON accessors
//!
//! Lookups over parsed API payloads. Every accessor returns an `Option`, so a
//! missing field stays visible to the caller, who picks the default.

use crate::error::Error;
use serde_json::Value;

/// Walk a dot-notation path (`relationships.space.data.guid`, `errors.0`)
pub fn at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = value;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }

    Some(current)
}

/// String at `path`, if present and a string
pub fn str_at<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    at_path(value, path).and_then(Value::as_str)
}

/// Owned string at `path`, or `default` when absent
pub fn string_or(value: &Value, path: &str, default: &str) -> String {
    str_at(value, path).unwrap_or(default).to_string()
}

/// Array at `path`, if present and an array
pub fn array_at<'a>(value: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    at_path(value, path).and_then(Value::as_array)
}

/// Array of strings at `path`; non-string entries are skipped
pub fn strings_at(value: &Value, path: &str) -> Vec<String> {
    array_at(value, path)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Find the entry with a matching `guid` in a side-car array such as
/// `included.service_plans`
pub fn find_by_guid<'a>(items: Option<&'a Value>, guid: &str) -> Option<&'a Value> {
    items?
        .as_array()?
        .iter()
        .find(|item| str_at(item, "guid") == Some(guid))
}

/// First entry of an `errors` array as a typed error
pub fn first_api_error(value: &Value) -> Option<Error> {
    let first = array_at(value, "errors")?.first()?;

    let code = match first.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Some(Error::Api {
        detail: string_or(first, "detail", ""),
        code,
        title: string_or(first, "title", ""),
    })
}
