mod body;
mod error;
mod models;
mod printer;
mod runner;

pub use error::EngineError;
pub use models::{ExecutionOptions, Response};
pub use printer::print_response;
pub use runner::Engine;
