//! Validator findings: one observation each, categorized and severity-tagged.

use mdcheck_store::Severity;
use serde::Serialize;
use serde_json::{Map, Value, json};

/// A single validator observation.
///
/// Serializes flat: `{"type": ..., "severity": ..., "message": ..., <extra>}`
/// with type-specific fields alongside the common ones.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A header value in the shape rule checks care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderValue {
    String,
    Int,
    Float,
    Bool,
    List,
    Map,
    Null,
}

impl HeaderValue {
    pub fn of(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::String(_) => Self::String,
            serde_yaml::Value::Number(n) if n.is_i64() || n.is_u64() => Self::Int,
            serde_yaml::Value::Number(_) => Self::Float,
            serde_yaml::Value::Bool(_) => Self::Bool,
            serde_yaml::Value::Sequence(_) => Self::List,
            serde_yaml::Value::Mapping(_) => Self::Map,
            _ => Self::Null,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Map => "map",
            Self::Null => "null",
        }
    }

    /// Whether a value of this shape satisfies the rule's expected type
    /// name. Unknown expectations pass.
    pub fn matches(self, expected: &str) -> bool {
        match expected {
            "string" => self == Self::String,
            "int" => self == Self::Int,
            // An int is an acceptable float.
            "float" => matches!(self, Self::Float | Self::Int),
            "bool" => self == Self::Bool,
            "list" => self == Self::List,
            "dict" | "map" => self == Self::Map,
            _ => true,
        }
    }
}

fn extra(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl Finding {
    pub fn missing_required_field(field: &str) -> Self {
        Self {
            kind: "missing_required_field".to_string(),
            severity: Severity::Error,
            message: format!("Required field '{field}' is missing"),
            extra: extra(vec![("field", json!(field))]),
        }
    }

    pub fn invalid_field_type(field: &str, expected: &str, actual: &str) -> Self {
        Self {
            kind: "invalid_field_type".to_string(),
            severity: Severity::Error,
            message: format!("Field '{field}' should be {expected}"),
            extra: extra(vec![
                ("field", json!(field)),
                ("expected_type", json!(expected)),
                ("actual_type", json!(actual)),
            ]),
        }
    }

    pub fn invalid_enum_value(field: &str, value: &Value, valid_values: &[Value]) -> Self {
        Self {
            kind: "invalid_enum_value".to_string(),
            severity: Severity::Error,
            message: format!(
                "Field '{field}' value '{value}' not in allowed values: {}",
                Value::Array(valid_values.to_vec())
            ),
            extra: extra(vec![
                ("field", json!(field)),
                ("value", value.clone()),
                ("valid_values", Value::Array(valid_values.to_vec())),
            ]),
        }
    }

    pub fn forbidden_field(field: &str) -> Self {
        Self {
            kind: "forbidden_field".to_string(),
            severity: Severity::Warning,
            message: format!("Field '{field}' is not allowed"),
            extra: extra(vec![("field", json!(field))]),
        }
    }

    pub fn invalid_header_syntax(reason: &str) -> Self {
        Self {
            kind: "invalid_header_syntax".to_string(),
            severity: Severity::Error,
            message: format!("Header is not valid YAML: {reason}"),
            extra: Map::new(),
        }
    }

    pub fn external_links(links: Vec<String>) -> Self {
        let count = links.len();
        Self {
            kind: "external_links".to_string(),
            severity: Severity::Warning,
            message: format!("Found {count} external links. Only internal links are allowed."),
            extra: extra(vec![("links", json!(links)), ("count", json!(count))]),
        }
    }

    pub fn missing_code_language(block_index: usize) -> Self {
        Self {
            kind: "missing_code_language".to_string(),
            severity: Severity::Info,
            message: format!("Code block {} missing language specification", block_index + 1),
            extra: extra(vec![("block_index", json!(block_index))]),
        }
    }

    pub fn heading_structure(heading: &str, prev_level: usize, level: usize) -> Self {
        Self {
            kind: "heading_structure".to_string(),
            severity: Severity::Info,
            message: format!("Heading '{heading}' skips levels (h{prev_level} -> h{level})"),
            extra: extra(vec![("heading", json!(heading)), ("level", json!(level))]),
        }
    }

    pub fn title_consistency(title: &str) -> Self {
        Self {
            kind: "title_consistency".to_string(),
            severity: Severity::Info,
            message: "Title from front-matter not found in markdown content".to_string(),
            extra: extra(vec![("header_title", json!(title))]),
        }
    }
}
