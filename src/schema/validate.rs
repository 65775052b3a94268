use std::fmt;

use chrono::DateTime;
use serde_json::Value;

use super::{Schema, TypeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Checks a value against a schema and collects every mismatch instead
/// of stopping at the first one.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();
    check(schema, value, "$", &mut violations);
    violations
}

fn check(schema: &Schema, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match schema {
        Schema::Empty {} => {}
        Schema::Type { kind, nullable } => {
            if value.is_null() {
                if !nullable {
                    report(out, path, format!("expected {}, found null", kind_name(*kind)));
                }
                return;
            }
            let matches = match kind {
                TypeKind::Boolean => value.is_boolean(),
                TypeKind::String => value.is_string(),
                TypeKind::Timestamp => value
                    .as_str()
                    .is_some_and(|text| DateTime::parse_from_rfc3339(text).is_ok()),
                TypeKind::Int32 => value
                    .as_i64()
                    .is_some_and(|n| i32::try_from(n).is_ok()),
                TypeKind::Float64 => value.is_number(),
            };
            if !matches {
                report(
                    out,
                    path,
                    format!("expected {}, found {}", kind_name(*kind), value_name(value)),
                );
            }
        }
        Schema::Array { elements, nullable } => {
            if value.is_null() {
                if !nullable {
                    report(out, path, "expected array, found null".to_string());
                }
                return;
            }
            let Some(items) = value.as_array() else {
                report(
                    out,
                    path,
                    format!("expected array, found {}", value_name(value)),
                );
                return;
            };
            for (index, item) in items.iter().enumerate() {
                check(elements, item, &format!("{path}[{index}]"), out);
            }
        }
        Schema::Object {
            properties,
            optional_properties,
            nullable,
        } => {
            if value.is_null() {
                if !nullable {
                    report(out, path, "expected object, found null".to_string());
                }
                return;
            }
            let Some(map) = value.as_object() else {
                report(
                    out,
                    path,
                    format!("expected object, found {}", value_name(value)),
                );
                return;
            };
            for (key, field_schema) in properties {
                match map.get(key) {
                    Some(field) => check(field_schema, field, &format!("{path}.{key}"), out),
                    None => report(out, path, format!("missing required field `{key}`")),
                }
            }
            for (key, field_schema) in optional_properties {
                if let Some(field) = map.get(key) {
                    check(field_schema, field, &format!("{path}.{key}"), out);
                }
            }
            for key in map.keys() {
                if !properties.contains_key(key) && !optional_properties.contains_key(key) {
                    report(out, path, format!("unexpected field `{key}`"));
                }
            }
        }
    }
}

fn report(out: &mut Vec<Violation>, path: &str, message: String) {
    out.push(Violation {
        path: path.to_string(),
        message,
    });
}

fn kind_name(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Boolean => "boolean",
        TypeKind::String => "string",
        TypeKind::Timestamp => "timestamp",
        TypeKind::Int32 => "int32",
        TypeKind::Float64 => "float64",
    }
}

fn value_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
