use std::{collections::HashSet, fmt, path::PathBuf};

use once_cell::sync::Lazy;

use super::DefinitionError;

static HTTP_METHODS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD", "TRACE",
    ]
    .into_iter()
    .collect()
});

/// Canonical request address: a relative path under the requests
/// directory, without extension, whose final segment is `METHOD_name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId {
    ident: String,
    method: String,
}

impl RequestId {
    pub fn parse(raw: &str) -> Result<Self, DefinitionError> {
        let trimmed = raw.trim().trim_start_matches("./");
        let trimmed = trimmed.strip_suffix(".yaml").unwrap_or(trimmed);

        let invalid = |reason: String| DefinitionError::Invalid {
            ident: raw.trim().to_string(),
            reason,
        };

        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        let Some(last) = segments.last() else {
            return Err(invalid("empty request identifier".to_string()));
        };
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(invalid(
                "identifier must stay inside the requests directory".to_string(),
            ));
        }

        let Some((prefix, name)) = last.split_once('_') else {
            return Err(invalid(format!(
                "final segment `{last}` must look like METHOD_name"
            )));
        };
        if name.is_empty() {
            return Err(invalid(format!(
                "final segment `{last}` is missing a name after the method"
            )));
        }
        if !HTTP_METHODS.contains(prefix) {
            let upper = prefix.to_ascii_uppercase();
            return Err(if HTTP_METHODS.contains(upper.as_str()) {
                invalid(format!("method prefix must be upper-case (saw `{prefix}`)"))
            } else {
                invalid(format!("unknown method prefix `{prefix}`"))
            });
        }

        Ok(Self {
            ident: segments.join("/"),
            method: prefix.to_string(),
        })
    }

    /// Identifier for a file path relative to the requests directory.
    pub fn from_relative_path(path: &std::path::Path) -> Result<Self, DefinitionError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component.as_os_str().to_str() {
                Some(segment) => segments.push(segment),
                None => {
                    return Err(DefinitionError::Invalid {
                        ident: path.display().to_string(),
                        reason: "path is not valid UTF-8".to_string(),
                    })
                }
            }
        }
        Self::parse(&segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.ident
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path of the definition file, relative to the requests directory.
    pub fn definition_file(&self) -> PathBuf {
        PathBuf::from(format!("{}.yaml", self.ident))
    }

    /// Path of the schema artifact, relative to the schemas directory.
    pub fn schema_file(&self) -> PathBuf {
        PathBuf::from(format!("{}.jtd.json", self.ident))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ident)
    }
}
