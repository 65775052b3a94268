use std::collections::BTreeMap;

pub type EnvMap = BTreeMap<String, String>;

mod model;
mod placeholders;
mod store;

pub use model::{EnvEntry, Environment, LoginPolicy, StoreDocument};
pub use placeholders::{resolve, resolve_url, unresolved_token};
pub use store::{EnvStore, StoreError};
