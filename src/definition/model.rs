use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::env::{EnvMap, LoginPolicy};

use super::RequestId;

/// One request definition document as stored on disk. Field validation
/// beyond shape happens in the loader.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestDocument {
    pub method: Option<String>,
    pub url: Option<String>,
    pub headers: EnvMap,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub body: Option<BodyDocument>,
    #[serde(rename = "set-env-var", with = "serde_yaml::with::singleton_map_recursive")]
    pub set_env_var: BTreeMap<String, CaptureSource>,
    #[serde(rename = "pre-flight")]
    pub pre_flight: Option<String>,
    #[serde(rename = "post-flight")]
    pub post_flight: Option<String>,
    pub login: Option<LoginPolicy>,
}

/// Body as written in the document. The single-key map encoding makes
/// "exactly one variant" a parse-level guarantee.
#[derive(Debug, Clone, Deserialize)]
pub enum BodyDocument {
    #[serde(rename = "json")]
    Json(Map<String, Value>),
    #[serde(rename = "form-urlencoded")]
    FormUrlencoded(EnvMap),
    #[serde(rename = "form-data")]
    FormData(MultipartDocument),
    #[serde(rename = "text")]
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MultipartDocument {
    pub fields: EnvMap,
    pub files: EnvMap,
}

/// Where a captured variable comes from: a response header or a
/// top-level field of a JSON response body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    Header(String),
    Body(String),
}

/// Validated, immutable request definition.
#[derive(Debug, Clone)]
pub struct RequestDefinition {
    pub id: RequestId,
    pub url: String,
    pub headers: EnvMap,
    pub body: RequestBody,
    pub captures: BTreeMap<String, CaptureSource>,
    pub pre_flight: Option<String>,
    pub post_flight: Option<String>,
    pub login: Option<LoginPolicy>,
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    None,
    Json(Map<String, Value>),
    Form(EnvMap),
    Multipart { fields: EnvMap, files: EnvMap },
    Text(String),
}

impl RequestBody {
    pub fn is_none(&self) -> bool {
        matches!(self, RequestBody::None)
    }

    /// Content type implied by the populated variant.
    pub fn expected_content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::None => None,
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Form(_) => Some("application/x-www-form-urlencoded"),
            RequestBody::Multipart { .. } => Some("multipart/form-data"),
            RequestBody::Text(_) => Some("text/plain"),
        }
    }
}

impl From<BodyDocument> for RequestBody {
    fn from(doc: BodyDocument) -> Self {
        // Empty variants carry nothing and are treated as no body.
        match doc {
            BodyDocument::Json(map) if map.is_empty() => RequestBody::None,
            BodyDocument::Json(map) => RequestBody::Json(map),
            BodyDocument::FormUrlencoded(map) if map.is_empty() => RequestBody::None,
            BodyDocument::FormUrlencoded(map) => RequestBody::Form(map),
            BodyDocument::FormData(doc) if doc.fields.is_empty() && doc.files.is_empty() => {
                RequestBody::None
            }
            BodyDocument::FormData(doc) => RequestBody::Multipart {
                fields: doc.fields,
                files: doc.files,
            },
            BodyDocument::Text(text) if text.is_empty() => RequestBody::None,
            BodyDocument::Text(text) => RequestBody::Text(text),
        }
    }
}
