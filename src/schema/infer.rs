use std::collections::BTreeMap;

use chrono::DateTime;
use serde_json::Value;

use super::{Schema, TypeKind};

/// Derives a schema from a single sample value. Arrays merge the
/// schemas of their items; objects mark every sampled key required.
pub fn infer(value: &Value) -> Schema {
    match value {
        Value::Null => Schema::Empty {},
        Value::Bool(_) => scalar(TypeKind::Boolean),
        Value::Number(number) => {
            let fits_i32 = number
                .as_i64()
                .is_some_and(|n| i32::try_from(n).is_ok());
            if fits_i32 {
                scalar(TypeKind::Int32)
            } else {
                scalar(TypeKind::Float64)
            }
        }
        Value::String(text) => {
            if DateTime::parse_from_rfc3339(text).is_ok() {
                scalar(TypeKind::Timestamp)
            } else {
                scalar(TypeKind::String)
            }
        }
        Value::Array(items) => {
            let non_null: Vec<&Value> = items.iter().filter(|item| !item.is_null()).collect();
            let saw_null = non_null.len() != items.len();
            let mut elements = non_null
                .into_iter()
                .map(infer)
                .reduce(merge)
                .unwrap_or(Schema::Empty {});
            if saw_null {
                elements = mark_nullable(elements);
            }
            Schema::Array {
                elements: Box::new(elements),
                nullable: false,
            }
        }
        Value::Object(map) => Schema::Object {
            properties: map
                .iter()
                .map(|(key, item)| (key.clone(), infer(item)))
                .collect(),
            optional_properties: BTreeMap::new(),
            nullable: false,
        },
    }
}

fn scalar(kind: TypeKind) -> Schema {
    Schema::Type {
        kind,
        nullable: false,
    }
}

fn mark_nullable(schema: Schema) -> Schema {
    match schema {
        Schema::Type { kind, .. } => Schema::Type {
            kind,
            nullable: true,
        },
        Schema::Array { elements, .. } => Schema::Array {
            elements,
            nullable: true,
        },
        Schema::Object {
            properties,
            optional_properties,
            ..
        } => Schema::Object {
            properties,
            optional_properties,
            nullable: true,
        },
        Schema::Empty {} => Schema::Empty {},
    }
}

/// Widens two sampled schemas into one that accepts both. Numeric kinds
/// widen to float64 and timestamps decay to plain strings; anything
/// irreconcilable collapses to the empty form.
fn merge(a: Schema, b: Schema) -> Schema {
    match (a, b) {
        (
            Schema::Type {
                kind: ka,
                nullable: na,
            },
            Schema::Type {
                kind: kb,
                nullable: nb,
            },
        ) => {
            let kind = match (ka, kb) {
                _ if ka == kb => ka,
                (TypeKind::Int32, TypeKind::Float64) | (TypeKind::Float64, TypeKind::Int32) => {
                    TypeKind::Float64
                }
                (TypeKind::String, TypeKind::Timestamp)
                | (TypeKind::Timestamp, TypeKind::String) => TypeKind::String,
                _ => return Schema::Empty {},
            };
            Schema::Type {
                kind,
                nullable: na || nb,
            }
        }
        (
            Schema::Array {
                elements: ea,
                nullable: na,
            },
            Schema::Array {
                elements: eb,
                nullable: nb,
            },
        ) => Schema::Array {
            elements: Box::new(merge(*ea, *eb)),
            nullable: na || nb,
        },
        (
            Schema::Object {
                properties: a_required,
                optional_properties: a_optional,
                nullable: na,
            },
            Schema::Object {
                properties: b_required,
                optional_properties: b_optional,
                nullable: nb,
            },
        ) => {
            let mut keys: Vec<&String> = a_required
                .keys()
                .chain(a_optional.keys())
                .chain(b_required.keys())
                .chain(b_optional.keys())
                .collect();
            keys.sort();
            keys.dedup();

            let mut properties = BTreeMap::new();
            let mut optional_properties = BTreeMap::new();
            for key in keys {
                let in_a = a_required.get(key).or_else(|| a_optional.get(key));
                let in_b = b_required.get(key).or_else(|| b_optional.get(key));
                let merged = match (in_a, in_b) {
                    (Some(x), Some(y)) => merge(x.clone(), y.clone()),
                    (Some(x), None) | (None, Some(x)) => x.clone(),
                    (None, None) => continue,
                };
                // A key stays required only when every sample carried it.
                if a_required.contains_key(key) && b_required.contains_key(key) {
                    properties.insert(key.clone(), merged);
                } else {
                    optional_properties.insert(key.clone(), merged);
                }
            }
            Schema::Object {
                properties,
                optional_properties,
                nullable: na || nb,
            }
        }
        _ => Schema::Empty {},
    }
}
