use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

mod infer;
mod validate;

pub use infer::infer;
pub use validate::{validate, Violation};

/// Structural schema for response contract checks, in a small
/// JSON-Typedef-flavored dialect. `Empty` matches anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schema {
    Type {
        #[serde(rename = "type")]
        kind: TypeKind,
        #[serde(default, skip_serializing_if = "is_false")]
        nullable: bool,
    },
    Array {
        elements: Box<Schema>,
        #[serde(default, skip_serializing_if = "is_false")]
        nullable: bool,
    },
    Object {
        properties: BTreeMap<String, Schema>,
        #[serde(
            default,
            rename = "optionalProperties",
            skip_serializing_if = "BTreeMap::is_empty"
        )]
        optional_properties: BTreeMap<String, Schema>,
        #[serde(default, skip_serializing_if = "is_false")]
        nullable: bool,
    },
    Empty {},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Boolean,
    String,
    Timestamp,
    Int32,
    Float64,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

pub fn store_schema(path: &Path, schema: &Schema) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating schema directory {}", parent.display()))?;
    }
    let mut contents = serde_json::to_string_pretty(schema).context("serializing schema")?;
    contents.push('\n');
    fs::write(path, contents).with_context(|| format!("writing schema {}", path.display()))
}

pub fn load_schema(path: &Path) -> Result<Schema> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing schema {}", path.display()))
}
