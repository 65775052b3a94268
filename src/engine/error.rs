use std::{io, path::PathBuf};

use thiserror::Error;

use crate::definition::DefinitionError;
use crate::env::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("resolved URL `{url}` must start with http:// or https://")]
    InvalidUrl { url: String },
    #[error("unresolved placeholder `{{{token}}}` in URL `{url}`")]
    PlaceholderUnresolved { token: String, url: String },
    #[error("body cannot be sent with content type `{content_type}`")]
    UnsupportedBodyEncoding { content_type: String },
    #[error("opening multipart file {path}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("login request `{request}` failed")]
    LoginFailed {
        request: String,
        #[source]
        source: Box<EngineError>,
    },
    #[error("pre-flight request `{request}` failed")]
    PreFlightFailed {
        request: String,
        #[source]
        source: Box<EngineError>,
    },
    #[error("post-flight request `{request}` failed")]
    PostFlightFailed {
        request: String,
        #[source]
        source: Box<EngineError>,
    },
    #[error("too many nested login/pre-flight/post-flight calls at `{request}`")]
    NestedTooDeep { request: String },
}
