//! Named-parameter extraction helpers for method handlers.
//!
//! A `null` value is treated the same as an absent key, matching the wire
//! behavior of optional parameters.

use crate::error::RpcError;
use serde_json::{Map, Value};

pub type Params = Map<String, Value>;

fn present<'a>(params: &'a Params, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|v| !v.is_null())
}

fn wrong_type(key: &str, expected: &str) -> RpcError {
    RpcError::InvalidParams(format!("Parameter '{key}' must be a {expected}"))
}

pub fn require_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, RpcError> {
    present(params, key)
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing required parameters: {key}")))?
        .as_str()
        .ok_or_else(|| wrong_type(key, "string"))
}

pub fn opt_str<'a>(params: &'a Params, key: &str) -> Result<Option<&'a str>, RpcError> {
    present(params, key)
        .map(|v| v.as_str().ok_or_else(|| wrong_type(key, "string")))
        .transpose()
}

pub fn opt_string(params: &Params, key: &str) -> Result<Option<String>, RpcError> {
    Ok(opt_str(params, key)?.map(str::to_string))
}

pub fn opt_bool(params: &Params, key: &str, default: bool) -> Result<bool, RpcError> {
    present(params, key)
        .map(|v| v.as_bool().ok_or_else(|| wrong_type(key, "boolean")))
        .transpose()
        .map(|v| v.unwrap_or(default))
}

pub fn opt_u64(params: &Params, key: &str, default: u64) -> Result<u64, RpcError> {
    present(params, key)
        .map(|v| v.as_u64().ok_or_else(|| wrong_type(key, "non-negative integer")))
        .transpose()
        .map(|v| v.unwrap_or(default))
}

pub fn opt_f64(params: &Params, key: &str, default: f64) -> Result<f64, RpcError> {
    present(params, key)
        .map(|v| v.as_f64().ok_or_else(|| wrong_type(key, "number")))
        .transpose()
        .map(|v| v.unwrap_or(default))
}

/// A required list of id strings.
pub fn require_string_list(params: &Params, key: &str) -> Result<Vec<String>, RpcError> {
    let value = present(params, key)
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing required parameters: {key}")))?;
    string_list(value, key)
}

/// An optional list of strings; `None` when absent.
pub fn opt_string_list(params: &Params, key: &str) -> Result<Option<Vec<String>>, RpcError> {
    present(params, key)
        .map(|value| string_list(value, key))
        .transpose()
}

/// A single id string or a list of them, normalized to a list.
pub fn string_or_list(params: &Params, key: &str) -> Result<Vec<String>, RpcError> {
    let value = present(params, key)
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing required parameters: {key}")))?;
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(_) => string_list(value, key),
        _ => Err(wrong_type(key, "string or list of strings")),
    }
}

/// A required object-valued parameter.
pub fn require_object<'a>(
    params: &'a Params,
    key: &str,
) -> Result<&'a Map<String, Value>, RpcError> {
    present(params, key)
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing required parameters: {key}")))?
        .as_object()
        .ok_or_else(|| wrong_type(key, "object"))
}

pub fn opt_object<'a>(
    params: &'a Params,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, RpcError> {
    present(params, key)
        .map(|v| v.as_object().ok_or_else(|| wrong_type(key, "object")))
        .transpose()
}

fn string_list(value: &Value, key: &str) -> Result<Vec<String>, RpcError> {
    value
        .as_array()
        .ok_or_else(|| wrong_type(key, "list of strings"))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| wrong_type(key, "list of strings"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn required_string() {
        let p = params(json!({"file_path": "doc.md", "nullish": null}));
        assert_eq!(require_str(&p, "file_path").unwrap(), "doc.md");
        assert!(require_str(&p, "missing").is_err());
        // null counts as absent
        assert!(require_str(&p, "nullish").is_err());
    }

    #[test]
    fn optional_scalars_with_defaults() {
        let p = params(json!({"limit": 10, "recursive": false, "threshold": 0.5}));
        assert_eq!(opt_u64(&p, "limit", 100).unwrap(), 10);
        assert_eq!(opt_u64(&p, "offset", 0).unwrap(), 0);
        assert!(!opt_bool(&p, "recursive", true).unwrap());
        assert_eq!(opt_f64(&p, "threshold", 0.7).unwrap(), 0.5);

        let p = params(json!({"limit": "ten"}));
        assert!(opt_u64(&p, "limit", 100).is_err());
    }

    #[test]
    fn string_or_list_normalizes() {
        let p = params(json!({"ids": "one"}));
        assert_eq!(string_or_list(&p, "ids").unwrap(), vec!["one"]);

        let p = params(json!({"ids": ["a", "b"]}));
        assert_eq!(string_or_list(&p, "ids").unwrap(), vec!["a", "b"]);

        let p = params(json!({"ids": 7}));
        assert!(string_or_list(&p, "ids").is_err());

        let p = params(json!({"ids": ["a", 7]}));
        assert!(string_or_list(&p, "ids").is_err());
    }

    #[test]
    fn optional_lists() {
        let p = params(json!({"types": ["x"]}));
        assert_eq!(opt_string_list(&p, "types").unwrap(), Some(vec!["x".to_string()]));
        assert_eq!(opt_string_list(&p, "missing").unwrap(), None);
    }
}
