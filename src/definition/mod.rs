use std::io;

use thiserror::Error;

mod ident;
mod loader;
mod model;

pub use ident::RequestId;
pub use loader::{load_definition, parse_definition};
pub use model::{
    BodyDocument, CaptureSource, MultipartDocument, RequestBody, RequestDefinition,
    RequestDocument,
};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("request definition not found: {ident}")]
    NotFound { ident: String },
    #[error("invalid request definition {ident}: {reason}")]
    Invalid { ident: String, reason: String },
    #[error("reading request definition {ident}")]
    Io {
        ident: String,
        #[source]
        source: io::Error,
    },
}
