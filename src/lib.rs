pub mod batch;
pub mod definition;
pub mod engine;
pub mod env;
pub mod interactive;
pub mod project;
pub mod schema;
