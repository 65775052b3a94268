use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::env::EnvMap;

pub const DEFAULT_ENV: &str = "dev";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maps response status codes to a re-authentication request. The
/// referenced request runs once, then the original request is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginPolicy {
    pub request: String,
    #[serde(default)]
    pub triggered_by: Vec<u16>,
}

/// One environment entry as persisted: variables are inline keys,
/// `login`, `timeout` and `cookies` are reserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: EnvMap,
    #[serde(flatten)]
    pub variables: EnvMap,
}

/// The whole store document: the active environment name plus every
/// named environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    pub env: String,
    pub envs: BTreeMap<String, EnvEntry>,
}

impl StoreDocument {
    pub fn bootstrap() -> Self {
        let mut envs = BTreeMap::new();
        envs.insert(DEFAULT_ENV.to_string(), EnvEntry::default());
        Self {
            env: DEFAULT_ENV.to_string(),
            envs,
        }
    }

    pub fn active_name(&self) -> &str {
        if self.env.is_empty() {
            DEFAULT_ENV
        } else {
            &self.env
        }
    }

    /// Active environment; a name without an entry yields an empty one.
    pub fn active(&self) -> Environment {
        let name = self.active_name();
        match self.envs.get(name) {
            Some(entry) => Environment::from_entry(name, entry),
            None => Environment {
                name: name.to_string(),
                ..Environment::default()
            },
        }
    }

    pub fn active_entry_mut(&mut self) -> &mut EnvEntry {
        let name = self.active_name().to_string();
        self.envs.entry(name).or_default()
    }
}

/// Runtime view of the active environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    pub name: String,
    pub variables: EnvMap,
    pub cookies: EnvMap,
    pub login: Option<LoginPolicy>,
    pub timeout: Option<u64>,
}

impl Environment {
    pub fn from_entry(name: &str, entry: &EnvEntry) -> Self {
        Self {
            name: name.to_string(),
            variables: entry.variables.clone(),
            cookies: entry.cookies.clone(),
            login: entry.login.clone(),
            timeout: entry.timeout,
        }
    }

    /// `name=value` pairs joined with `"; "`, or None without cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn timeout_seconds(&self) -> u64 {
        match self.timeout {
            Some(secs) if secs > 0 => secs,
            _ => DEFAULT_TIMEOUT_SECS,
        }
    }
}
