use std::time::Duration;

use crate::env::EnvMap;

/// Outcome of one executed request, owned by the caller.
#[derive(Debug, Clone)]
pub struct Response {
    pub ident: String,
    pub method: String,
    pub url: String,
    pub request_headers: EnvMap,
    pub request_body: Option<String>,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub elapsed: Duration,
}

impl Response {
    /// First value of a response header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_cookies(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    /// Persist an inferred schema after a successful JSON response.
    pub infer_schema: bool,
    /// Allow the one-shot login retry; batch mode turns this off.
    pub login_retry: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            infer_schema: false,
            login_retry: true,
        }
    }
}
