use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use url::form_urlencoded;
use uuid::Uuid;

use crate::definition::RequestBody;
use crate::env::{resolve, EnvMap};

use super::error::EngineError;

/// Wire-ready request body plus the content type it mandates. A `None`
/// content type leaves the definition's headers untouched.
#[derive(Debug, Clone, Default)]
pub struct EncodedBody {
    pub content_type: Option<String>,
    pub payload: Option<Vec<u8>>,
}

/// Substitutes placeholders and encodes the body for the wire. The
/// explicit `Content-Type` header must agree with the populated variant;
/// the check runs before any file or network I/O.
pub async fn encode_body(
    body: &RequestBody,
    explicit_content_type: Option<&str>,
    vars: &EnvMap,
) -> Result<EncodedBody, EngineError> {
    let Some(expected) = body.expected_content_type() else {
        return Ok(EncodedBody::default());
    };

    if let Some(explicit) = explicit_content_type {
        if media_type(explicit) != expected {
            return Err(EngineError::UnsupportedBodyEncoding {
                content_type: explicit.to_string(),
            });
        }
    }

    // An explicit header survives verbatim so parameters like charset are
    // kept; multipart always gets the generated boundary instead.
    let keep_explicit =
        || explicit_content_type.map(str::to_string).unwrap_or_else(|| expected.to_string());

    match body {
        RequestBody::None => Ok(EncodedBody::default()),
        RequestBody::Json(map) => {
            let substituted = resolve_json_map(map, vars);
            let payload = serde_json::to_vec(&Value::Object(substituted))
                .expect("json object serializes");
            Ok(EncodedBody {
                content_type: Some(keep_explicit()),
                payload: Some(payload),
            })
        }
        RequestBody::Form(fields) => {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (name, value) in fields {
                serializer.append_pair(name, &resolve(value, vars));
            }
            Ok(EncodedBody {
                content_type: Some(keep_explicit()),
                payload: Some(serializer.finish().into_bytes()),
            })
        }
        RequestBody::Multipart { fields, files } => {
            let boundary = format!("----repost-{}", Uuid::new_v4().simple());
            let mut payload = Vec::new();
            for (name, value) in fields {
                let value = resolve(value, vars);
                payload.extend_from_slice(
                    format!(
                        "--{boundary}\r\nContent-Disposition: form-data; \
                         name=\"{name}\"\r\n\r\n{value}\r\n"
                    )
                    .as_bytes(),
                );
            }
            for (field, path_template) in files {
                let path = PathBuf::from(resolve(path_template, vars));
                let bytes = tokio::fs::read(&path).await.map_err(|source| {
                    EngineError::FileAccess {
                        path: path.clone(),
                        source,
                    }
                })?;
                let filename = file_name(&path);
                payload.extend_from_slice(
                    format!(
                        "--{boundary}\r\nContent-Disposition: form-data; \
                         name=\"{field}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                payload.extend_from_slice(&bytes);
                payload.extend_from_slice(b"\r\n");
            }
            payload.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
            Ok(EncodedBody {
                content_type: Some(format!("multipart/form-data; boundary={boundary}")),
                payload: Some(payload),
            })
        }
        RequestBody::Text(text) => Ok(EncodedBody {
            content_type: Some(keep_explicit()),
            payload: Some(resolve(text, vars).into_bytes()),
        }),
    }
}

/// Substitution recurses into string leaves only; keys and non-string
/// values pass through untouched.
fn resolve_json_map(map: &Map<String, Value>, vars: &EnvMap) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), resolve_json_value(value, vars)))
        .collect()
}

fn resolve_json_value(value: &Value, vars: &EnvMap) -> Value {
    match value {
        Value::String(text) => Value::String(resolve(text, vars)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_json_value(item, vars))
                .collect(),
        ),
        Value::Object(map) => Value::Object(resolve_json_map(map, vars)),
        other => other.clone(),
    }
}

fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn vars(entries: &[(&str, &str)]) -> EnvMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn json_body(raw: &str) -> RequestBody {
        RequestBody::Json(serde_json::from_str(raw).unwrap())
    }

    #[tokio::test]
    async fn json_bodies_substitute_string_leaves_only() {
        let body = json_body(r#"{"name":"{NAME}","count":3,"tags":["{TAG}"],"nested":{"note":"{NAME}"}}"#);
        let env = vars(&[("NAME", "widget"), ("TAG", "new")]);

        let encoded = encode_body(&body, None, &env).await.unwrap();
        assert_eq!(encoded.content_type.as_deref(), Some("application/json"));

        let sent: Value =
            serde_json::from_slice(encoded.payload.as_deref().unwrap()).unwrap();
        assert_eq!(sent["name"], "widget");
        assert_eq!(sent["count"], 3);
        assert_eq!(sent["tags"][0], "new");
        assert_eq!(sent["nested"]["note"], "widget");
    }

    #[tokio::test]
    async fn explicit_content_type_with_parameters_is_kept() {
        let body = json_body(r#"{"ok":true}"#);
        let encoded = encode_body(&body, Some("application/json; charset=utf-8"), &EnvMap::new())
            .await
            .unwrap();
        assert_eq!(
            encoded.content_type.as_deref(),
            Some("application/json; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn incompatible_content_type_is_rejected() {
        let body = json_body(r#"{"ok":true}"#);
        let err = encode_body(&body, Some("application/xml"), &EnvMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnsupportedBodyEncoding { content_type } if content_type == "application/xml"
        ));
    }

    #[tokio::test]
    async fn form_bodies_are_percent_encoded() {
        let body = RequestBody::Form(vars(&[("q", "{TERM}"), ("page", "1")]));
        let env = vars(&[("TERM", "rust & yaml")]);

        let encoded = encode_body(&body, None, &env).await.unwrap();
        assert_eq!(
            encoded.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        let wire = String::from_utf8(encoded.payload.unwrap()).unwrap();
        assert_eq!(wire, "page=1&q=rust+%26+yaml");
    }

    #[tokio::test]
    async fn multipart_bodies_carry_fields_and_files() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("avatar.png");
        tokio::fs::write(&file_path, b"PNG-DATA").await.unwrap();

        let body = RequestBody::Multipart {
            fields: vars(&[("kind", "{KIND}")]),
            files: vars(&[("avatar", file_path.to_str().unwrap())]),
        };
        let env = vars(&[("KIND", "profile")]);

        let encoded = encode_body(&body, None, &env).await.unwrap();
        let content_type = encoded.content_type.unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));

        let boundary = content_type.split('=').next_back().unwrap();
        let wire = String::from_utf8_lossy(encoded.payload.as_deref().unwrap()).into_owned();
        assert!(wire.contains(&format!("--{boundary}\r\n")));
        assert!(wire.contains("name=\"kind\"\r\n\r\nprofile\r\n"));
        assert!(wire.contains("name=\"avatar\"; filename=\"avatar.png\""));
        assert!(wire.contains("PNG-DATA"));
        assert!(wire.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[tokio::test]
    async fn missing_multipart_file_names_the_path() {
        let body = RequestBody::Multipart {
            fields: EnvMap::new(),
            files: vars(&[("doc", "/definitely/absent.pdf")]),
        };
        let err = encode_body(&body, None, &EnvMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::FileAccess { ref path, .. } if path == Path::new("/definitely/absent.pdf")
        ));
    }

    #[tokio::test]
    async fn text_bodies_are_sent_verbatim() {
        let body = RequestBody::Text("hello {NAME}".to_string());
        let env = vars(&[("NAME", "world")]);

        let encoded = encode_body(&body, None, &env).await.unwrap();
        assert_eq!(encoded.content_type.as_deref(), Some("text/plain"));
        assert_eq!(encoded.payload.as_deref(), Some(b"hello world".as_slice()));
    }

    #[tokio::test]
    async fn absent_body_skips_the_compatibility_check() {
        let encoded = encode_body(&RequestBody::None, Some("application/xml"), &EnvMap::new())
            .await
            .unwrap();
        assert!(encoded.content_type.is_none());
        assert!(encoded.payload.is_none());
    }
}
