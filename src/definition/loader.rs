use std::{io, path::Path};

use tokio::fs;

use super::{
    model::{RequestDefinition, RequestDocument},
    DefinitionError, RequestId,
};

/// Reads and validates one definition file. Definitions are re-parsed on
/// every execution; there is no cache to invalidate.
pub async fn load_definition(
    path: &Path,
    id: &RequestId,
) -> Result<RequestDefinition, DefinitionError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DefinitionError::NotFound {
                ident: id.to_string(),
            })
        }
        Err(source) => {
            return Err(DefinitionError::Io {
                ident: id.to_string(),
                source,
            })
        }
    };
    parse_definition(&raw, id)
}

pub fn parse_definition(raw: &str, id: &RequestId) -> Result<RequestDefinition, DefinitionError> {
    let invalid = |reason: String| DefinitionError::Invalid {
        ident: id.to_string(),
        reason,
    };

    let doc: RequestDocument =
        serde_yaml::from_str(raw).map_err(|err| invalid(err.to_string()))?;

    if let Some(method) = &doc.method {
        if method != id.method() {
            return Err(invalid(format!(
                "method field `{method}` does not match identifier method `{}`",
                id.method()
            )));
        }
    }

    let url = match doc.url {
        Some(url) if !url.trim().is_empty() => url,
        _ => return Err(invalid("missing required field `url`".to_string())),
    };

    Ok(RequestDefinition {
        id: id.clone(),
        url,
        headers: doc.headers,
        body: doc.body.map(Into::into).unwrap_or_default(),
        captures: doc.set_env_var,
        pre_flight: doc.pre_flight,
        post_flight: doc.post_flight,
        login: doc.login,
    })
}
