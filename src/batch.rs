use std::{error::Error as _, fmt, time::Duration};

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar};
use serde_json::Value;

use crate::definition::RequestId;
use crate::engine::{Engine, EngineError, Response};
use crate::schema::{self, Violation};

/// Runs every stored request concurrently and checks each response
/// against its stored schema. Cookies are wiped first and the
/// environment's login request, when configured, runs once up front;
/// per-request login retries stay off so a broken credential cannot
/// trigger a login stampede.
pub async fn run_all(engine: &Engine) -> Result<BatchReport> {
    let store = engine.store();
    store.clear_cookies().context("clearing stored cookies")?;
    let env = store.load_active().context("reading environment store")?;

    let mut login_ident = None;
    if let Some(policy) = &env.login {
        let login_id = RequestId::parse(&policy.request).with_context(|| {
            format!("login request `{}` is not a valid identifier", policy.request)
        })?;
        engine
            .execute(&login_id)
            .await
            .with_context(|| format!("login request `{}` failed", policy.request))?;
        login_ident = Some(login_id.to_string());
    }

    let discovered = engine.project().discover()?;

    let progress = MultiProgress::new();
    let mut handles = Vec::new();
    for request in discovered {
        if Some(request.id.as_str()) == login_ident.as_deref() {
            continue;
        }
        let engine = engine.clone();
        let spinner = progress.add(ProgressBar::new_spinner());
        spinner.set_message(request.id.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        handles.push(tokio::spawn(async move {
            let outcome = check_request(&engine, request.id).await;
            spinner.finish_and_clear();
            outcome
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.context("batch task panicked")?);
    }
    outcomes.sort_by(|a, b| a.ident.cmp(&b.ident));
    Ok(BatchReport { outcomes })
}

async fn check_request(engine: &Engine, id: RequestId) -> BatchOutcome {
    let ident = id.to_string();
    let response = match engine.execute(&id).await {
        Ok(response) => response,
        Err(err) => {
            return BatchOutcome {
                ident,
                status: None,
                elapsed_ms: None,
                failure: Some(BatchFailure::Execution(err)),
            }
        }
    };
    let failure = validate_response(engine, &id, &response);
    BatchOutcome {
        ident,
        status: Some(response.status),
        elapsed_ms: Some(response.elapsed_ms()),
        failure,
    }
}

fn validate_response(engine: &Engine, id: &RequestId, response: &Response) -> Option<BatchFailure> {
    let path = engine.project().schema_path(id);
    if !path.exists() {
        return Some(BatchFailure::SchemaMissing);
    }
    let stored = match schema::load_schema(&path) {
        Ok(stored) => stored,
        Err(err) => return Some(BatchFailure::SchemaUnreadable(format!("{err:#}"))),
    };
    let value: Value = match serde_json::from_str(&response.body) {
        Ok(value) => value,
        Err(_) => return Some(BatchFailure::ResponseNotJson),
    };
    let violations = schema::validate(&stored, &value);
    if violations.is_empty() {
        None
    } else {
        Some(BatchFailure::SchemaMismatch(violations))
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub ident: String,
    pub status: Option<u16>,
    pub elapsed_ms: Option<f64>,
    pub failure: Option<BatchFailure>,
}

impl BatchOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
pub enum BatchFailure {
    Execution(EngineError),
    SchemaMissing,
    SchemaUnreadable(String),
    ResponseNotJson,
    SchemaMismatch(Vec<Violation>),
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchFailure::Execution(err) => {
                write!(f, "{err}")?;
                let mut source = err.source();
                while let Some(cause) = source {
                    write!(f, ": {cause}")?;
                    source = cause.source();
                }
                Ok(())
            }
            BatchFailure::SchemaMissing => {
                write!(f, "no stored schema; run `repost run --infer-schema` for it first")
            }
            BatchFailure::SchemaUnreadable(err) => write!(f, "stored schema is unreadable: {err}"),
            BatchFailure::ResponseNotJson => write!(f, "response body is not JSON"),
            BatchFailure::SchemaMismatch(violations) => {
                let plural = if violations.len() == 1 { "" } else { "s" };
                write!(
                    f,
                    "response violates the stored schema ({} problem{plural})",
                    violations.len()
                )
            }
        }
    }
}

pub fn print_report(report: &BatchReport) {
    println!();
    for outcome in &report.outcomes {
        match &outcome.failure {
            None => {
                let timing = match (outcome.status, outcome.elapsed_ms) {
                    (Some(status), Some(ms)) => format!("({status} in {ms:.1} ms)"),
                    _ => String::new(),
                };
                println!(
                    "  {} {} {}",
                    "PASS".green().bold(),
                    outcome.ident,
                    timing.dimmed()
                );
            }
            Some(failure) => {
                println!("  {} {}", "FAIL".red().bold(), outcome.ident);
                println!("       {}", failure.to_string().red());
                if let BatchFailure::SchemaMismatch(violations) = failure {
                    for violation in violations {
                        println!("       {}", violation.to_string().dimmed());
                    }
                }
            }
        }
    }
    println!();
    let summary = format!("{} passed, {} failed", report.passed(), report.failed());
    if report.all_passed() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.red().bold());
    }
}
