use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::future::BoxFuture;
use reqwest::{header::HeaderMap, Client, Method};
use serde_json::Value;

use crate::definition::{
    load_definition, CaptureSource, DefinitionError, RequestDefinition, RequestId,
};
use crate::env::{resolve, resolve_url, unresolved_token, EnvMap, EnvStore, LoginPolicy};
use crate::project::Project;
use crate::schema;

use super::{
    body::encode_body,
    error::EngineError,
    models::{ExecutionOptions, Response},
};

const MAX_CALL_DEPTH: u32 = 8;

/// Recursion budget threaded through pre-flight, post-flight and login
/// calls. `login_spent` makes the login retry one-shot per frame and
/// keeps a login request from triggering another login.
#[derive(Debug, Clone, Copy)]
struct CallBudget {
    depth: u32,
    login_spent: bool,
}

impl CallBudget {
    fn root(login_allowed: bool) -> Self {
        Self {
            depth: 0,
            login_spent: !login_allowed,
        }
    }

    fn nested(self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self
        }
    }

    fn for_login(self) -> Self {
        Self {
            depth: self.depth + 1,
            login_spent: true,
        }
    }
}

/// Executes request definitions against the active environment. Clones
/// share the underlying store handle, so captured variables and cookies
/// are visible across concurrently running requests.
#[derive(Clone)]
pub struct Engine {
    project: Project,
    store: Arc<EnvStore>,
    options: ExecutionOptions,
}

impl Engine {
    pub fn new(project: Project, options: ExecutionOptions) -> Self {
        let store = Arc::new(EnvStore::new(project.store_path()));
        Self {
            project,
            store,
            options,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn store(&self) -> &EnvStore {
        &self.store
    }

    pub async fn execute(&self, id: &RequestId) -> Result<Response, EngineError> {
        self.execute_nested(id.clone(), CallBudget::root(self.options.login_retry))
            .await
    }

    fn execute_nested(
        &self,
        id: RequestId,
        budget: CallBudget,
    ) -> BoxFuture<'_, Result<Response, EngineError>> {
        Box::pin(async move {
            if budget.depth >= MAX_CALL_DEPTH {
                return Err(EngineError::NestedTooDeep {
                    request: id.to_string(),
                });
            }

            let definition = load_definition(&self.project.definition_path(&id), &id).await?;

            if let Some(raw) = &definition.pre_flight {
                let hook = RequestId::parse(raw).map_err(|err| EngineError::PreFlightFailed {
                    request: raw.clone(),
                    source: Box::new(err.into()),
                })?;
                self.execute_nested(hook, budget.nested())
                    .await
                    .map_err(|err| EngineError::PreFlightFailed {
                        request: raw.clone(),
                        source: Box::new(err),
                    })?;
            }

            let (mut response, login) = self.attempt(&definition).await?;

            if let Some(policy) = login {
                if !budget.login_spent && policy.triggered_by.contains(&response.status) {
                    log::debug!(
                        "status {} triggered login `{}` for {}",
                        response.status,
                        policy.request,
                        response.ident
                    );
                    let login_id = RequestId::parse(&policy.request).map_err(|err| {
                        EngineError::LoginFailed {
                            request: policy.request.clone(),
                            source: Box::new(err.into()),
                        }
                    })?;
                    self.execute_nested(login_id, budget.for_login())
                        .await
                        .map_err(|err| EngineError::LoginFailed {
                            request: policy.request.clone(),
                            source: Box::new(err),
                        })?;
                    // The retry re-reads the store, so it sees whatever
                    // the login call captured or set as cookies.
                    let (retried, _) = self.attempt(&definition).await?;
                    response = retried;
                }
            }

            self.apply_captures(&definition, &response)?;
            self.store_cookies(&response)?;

            if let Some(raw) = &definition.post_flight {
                let hook = RequestId::parse(raw).map_err(|err| EngineError::PostFlightFailed {
                    request: raw.clone(),
                    source: Box::new(err.into()),
                })?;
                self.execute_nested(hook, budget.nested())
                    .await
                    .map_err(|err| EngineError::PostFlightFailed {
                        request: raw.clone(),
                        source: Box::new(err),
                    })?;
            }

            if self.options.infer_schema {
                if response.is_success() {
                    self.persist_schema(&definition.id, &response);
                } else {
                    log::warn!(
                        "skipping schema inference for {} (status {})",
                        response.ident,
                        response.status
                    );
                }
            }

            Ok(response)
        })
    }

    /// One wire round trip. The environment is re-read per attempt so a
    /// retry picks up state persisted by the login call in between.
    async fn attempt(
        &self,
        definition: &RequestDefinition,
    ) -> Result<(Response, Option<LoginPolicy>), EngineError> {
        let env = self.store.load_active()?;

        let url = resolve_url(&definition.url, &env.variables);
        if let Some(token) = unresolved_token(&url) {
            return Err(EngineError::PlaceholderUnresolved { token, url });
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::InvalidUrl { url });
        }

        let mut headers: EnvMap = definition
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), resolve(value, &env.variables)))
            .collect();

        let explicit_content_type = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone());

        let encoded =
            encode_body(&definition.body, explicit_content_type.as_deref(), &env.variables)
                .await?;

        if let Some(content_type) = &encoded.content_type {
            headers.retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
            headers.insert("Content-Type".to_string(), content_type.clone());
        }
        // Stored cookies replace any Cookie header written in the file.
        if let Some(cookie) = env.cookie_header() {
            headers.retain(|name, _| !name.eq_ignore_ascii_case("cookie"));
            headers.insert("Cookie".to_string(), cookie);
        }

        let method = Method::from_bytes(definition.id.method().as_bytes()).map_err(|_| {
            DefinitionError::Invalid {
                ident: definition.id.to_string(),
                reason: format!("invalid HTTP method `{}`", definition.id.method()),
            }
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(env.timeout_seconds()))
            .build()
            .map_err(|source| EngineError::Transport {
                url: url.clone(),
                source,
            })?;

        let mut request = client.request(method, &url);
        for (name, value) in &headers {
            request = request.header(name, value);
        }
        let request_body = encoded
            .payload
            .as_deref()
            .map(|payload| String::from_utf8_lossy(payload).into_owned());
        if let Some(payload) = encoded.payload {
            request = request.body(payload);
        }

        let started = Instant::now();
        let http_response = request.send().await.map_err(|source| EngineError::Transport {
            url: url.clone(),
            source,
        })?;
        let elapsed = started.elapsed();

        let status = http_response.status().as_u16();
        let header_map = http_response.headers().clone();
        let bytes = http_response
            .bytes()
            .await
            .map_err(|source| EngineError::Transport {
                url: url.clone(),
                source,
            })?;

        let response = Response {
            ident: definition.id.to_string(),
            method: definition.id.method().to_string(),
            url,
            request_headers: headers,
            request_body,
            status,
            headers: collect_headers(&header_map),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            elapsed,
        };
        let login = definition.login.clone().or(env.login);
        Ok((response, login))
    }

    fn apply_captures(
        &self,
        definition: &RequestDefinition,
        response: &Response,
    ) -> Result<(), EngineError> {
        for (key, source) in &definition.captures {
            let value = match source {
                CaptureSource::Header(name) => response
                    .header(name)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string),
                CaptureSource::Body(field) => capture_body_field(&response.body, field),
            };
            match value {
                Some(value) => {
                    self.store.set_variable(key, &value)?;
                }
                None => log::warn!(
                    "capture `{key}` for {} yielded no value",
                    response.ident
                ),
            }
        }
        Ok(())
    }

    fn store_cookies(&self, response: &Response) -> Result<(), EngineError> {
        for header in response.set_cookies() {
            match cookie_pair(header) {
                Some((name, value)) => {
                    self.store.set_cookie(name, value)?;
                }
                None => log::debug!("ignoring malformed set-cookie `{header}`"),
            }
        }
        Ok(())
    }

    fn persist_schema(&self, id: &RequestId, response: &Response) {
        let value: Value = match serde_json::from_str(&response.body) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("response for {id} is not JSON, skipping schema inference: {err}");
                return;
            }
        };
        let path = self.project.schema_path(id);
        match schema::store_schema(&path, &schema::infer(&value)) {
            Ok(()) => log::info!("schema written to {}", path.display()),
            Err(err) => log::warn!("failed to store schema for {id}: {err:#}"),
        }
    }
}

/// Top-level field of a JSON response body. Strings are captured raw;
/// other values keep their JSON encoding. Null and empty strings count
/// as no value.
fn capture_body_field(body: &str, field: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get(field)? {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// `name=value` before the first `;` of a Set-Cookie header. Attributes
/// like Path or HttpOnly are dropped; the store only replays pairs.
fn cookie_pair(header: &str) -> Option<(&str, &str)> {
    let leading = header.split(';').next()?;
    let (name, value) = leading.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}
