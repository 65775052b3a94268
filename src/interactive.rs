use std::fs;

use anyhow::{anyhow, Result};
use inquire::{Confirm, InquireError, Select, Text};

use crate::definition::RequestId;
use crate::project::Project;

const METHODS: [&str; 8] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD", "TRACE",
];
const BODY_KINDS: [&str; 5] = ["none", "json", "form-urlencoded", "form-data", "text"];

/// Interactive scaffolding for a new request definition.
pub fn run_new(project: &Project) -> Result<Option<RequestId>> {
    let mut ui = InquireUi;
    run_new_with_ui(project, &mut ui)
}

pub(crate) fn run_new_with_ui(
    project: &Project,
    ui: &mut dyn InteractiveUi,
) -> Result<Option<RequestId>> {
    let name = match ui.input("Request name (folders allowed, e.g. users/profile)", None)? {
        Some(name) if !name.trim().is_empty() => name.trim().trim_matches('/').to_string(),
        _ => {
            ui.print("Cancelled.");
            return Ok(None);
        }
    };

    let methods: Vec<String> = METHODS.iter().map(|m| m.to_string()).collect();
    let method = METHODS[ui.select("Method", &methods, 0)?];
    let id = RequestId::parse(&ident_for(&name, method))?;

    let default_url = format!("{{BASE_URL}}/{name}");
    let url = match ui.input("URL", Some(&default_url))? {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => {
            ui.print("Cancelled.");
            return Ok(None);
        }
    };

    let kinds: Vec<String> = BODY_KINDS.iter().map(|k| k.to_string()).collect();
    let body_kind = BODY_KINDS[ui.select("Body", &kinds, 0)?];

    let path = project.definition_path(&id);
    if path.exists() && !ui.confirm("Definition exists. Overwrite?", false)? {
        ui.print("Cancelled.");
        return Ok(None);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, starter_document(&id, &url, body_kind))?;

    let display = path
        .strip_prefix(project.root())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.display().to_string());
    ui.print(&format!("Request written to {display}"));
    Ok(Some(id))
}

fn ident_for(name: &str, method: &str) -> String {
    match name.rsplit_once('/') {
        Some((dirs, last)) => format!("{dirs}/{method}_{last}"),
        None => format!("{method}_{name}"),
    }
}

fn starter_document(id: &RequestId, url: &str, body_kind: &str) -> String {
    let mut doc = String::new();
    doc.push_str(&format!("url: \"{url}\"\n"));
    doc.push_str(&format!("method: {}\n", id.method()));
    doc.push_str("headers:\n  Accept: application/json\n");
    match body_kind {
        "json" => doc.push_str("body:\n  json:\n    example: \"{VALUE}\"\n"),
        "form-urlencoded" => doc.push_str("body:\n  form-urlencoded:\n    field: \"{VALUE}\"\n"),
        "form-data" => doc.push_str(
            "body:\n  form-data:\n    fields:\n      field: value\n    files:\n      upload: ./path/to/file\n",
        ),
        "text" => doc.push_str("body:\n  text: |\n    payload\n"),
        _ => {}
    }
    doc.push_str(concat!(
        "# set-env-var:\n",
        "#   TOKEN:\n",
        "#     body: token\n",
        "# pre-flight: GET_health\n",
        "# post-flight: DELETE_cleanup\n",
    ));
    doc
}

pub(crate) trait InteractiveUi {
    fn print(&mut self, message: &str);
    fn select(&mut self, prompt: &str, items: &[String], start: usize) -> Result<usize>;
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<Option<String>>;
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;
}

struct InquireUi;

impl InteractiveUi for InquireUi {
    fn print(&mut self, message: &str) {
        println!("{}", message);
    }

    fn select(&mut self, prompt: &str, items: &[String], start: usize) -> Result<usize> {
        let choice = Select::new(prompt, items.to_vec())
            .with_page_size(10)
            .with_starting_cursor(start)
            .prompt()?;
        items
            .iter()
            .position(|item| item == &choice)
            .ok_or_else(|| anyhow!("selection not found"))
    }

    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<Option<String>> {
        let mut builder = Text::new(prompt);
        if let Some(value) = default {
            builder = builder.with_default(value);
        }
        match builder.prompt() {
            Ok(value) => Ok(Some(value)),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        match Confirm::new(prompt).with_default(default).prompt() {
            Ok(value) => Ok(value),
            Err(other) => Err(other.into()),
        }
    }
}
