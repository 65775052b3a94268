use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use walkdir::WalkDir;

use crate::definition::RequestId;
use crate::env::{EnvEntry, LoginPolicy, StoreDocument};

pub const PROJECT_DIR: &str = "repost";
pub const REQUESTS_DIR: &str = "requests";
pub const SCHEMAS_DIR: &str = "schemas";
pub const STORE_FILE: &str = "config.yaml";

/// Filesystem layout of one project: the `repost/` directory holding the
/// store file, request definitions, and schema artifacts.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project under `base`, typically the current working directory.
    pub fn locate(base: &Path) -> Result<Self> {
        let root = base.join(PROJECT_DIR);
        if !root.is_dir() {
            bail!(
                "no {PROJECT_DIR}/ directory under {}; run `repost init` first",
                base.display()
            );
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.root.join(REQUESTS_DIR)
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.root.join(SCHEMAS_DIR)
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    pub fn definition_path(&self, id: &RequestId) -> PathBuf {
        self.requests_dir().join(id.definition_file())
    }

    pub fn schema_path(&self, id: &RequestId) -> PathBuf {
        self.schemas_dir().join(id.schema_file())
    }

    /// Every definition under `requests/`, in identifier order. Files that
    /// do not follow the `METHOD_name.yaml` convention are skipped with a
    /// warning.
    pub fn discover(&self) -> Result<Vec<DiscoveredRequest>> {
        let requests_dir = self.requests_dir();
        let mut found = Vec::new();
        for entry in WalkDir::new(&requests_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().map(|ext| ext != "yaml").unwrap_or(true) {
                continue;
            }
            let relative = entry.path().strip_prefix(&requests_dir).unwrap_or(entry.path());
            let id = match RequestId::from_relative_path(relative) {
                Ok(id) => id,
                Err(err) => {
                    log::warn!("skipping {}: {err}", relative.display());
                    continue;
                }
            };
            let metadata = fs::metadata(entry.path())
                .with_context(|| format!("reading metadata for {}", entry.path().display()))?;
            found.push(DiscoveredRequest {
                id,
                path: entry.path().to_path_buf(),
                modified: metadata.modified().unwrap_or(SystemTime::now()),
                size: metadata.len(),
            });
        }
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    /// Scaffolds the project layout under `base`. Existing pieces are left
    /// untouched and reported as such.
    pub fn init(base: &Path) -> Result<(Self, InitReport)> {
        let project = Self::at(base.join(PROJECT_DIR));
        let mut report = InitReport::default();

        for dir in [
            project.root.clone(),
            project.requests_dir(),
            project.schemas_dir(),
        ] {
            if dir.is_dir() {
                report.existing.push(dir);
            } else {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
                report.created.push(dir);
            }
        }

        let store_path = project.store_path();
        if store_path.exists() {
            report.existing.push(store_path);
        } else {
            let doc = default_store_document();
            let contents = serde_yaml::to_string(&doc).context("serializing default store")?;
            fs::write(&store_path, contents)
                .with_context(|| format!("writing {}", store_path.display()))?;
            report.created.push(store_path);
        }

        Ok((project, report))
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveredRequest {
    pub id: RequestId,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

impl fmt::Display for DiscoveredRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.id,
            format_size(self.size),
            format_relative(self.modified)
        )
    }
}

fn format_size(bytes: u64) -> String {
    match bytes {
        0..=1024 => format!("{} B", bytes),
        1025..=1_048_576 => format!("{:.1} KiB", bytes as f64 / 1024.0),
        _ => format!("{:.1} MiB", bytes as f64 / 1024.0 / 1024.0),
    }
}

fn format_relative(time: SystemTime) -> String {
    let now = SystemTime::now();
    let delta = now.duration_since(time).unwrap_or(Duration::ZERO);
    if delta < Duration::from_secs(60) {
        return format!("{}s ago", delta.as_secs());
    }
    if delta < Duration::from_secs(3600) {
        return format!("{}m ago", delta.as_secs() / 60);
    }
    if delta < Duration::from_secs(86400) {
        return format!("{}h ago", delta.as_secs() / 3600);
    }
    let datetime: DateTime<Local> = DateTime::<Local>::from(time);
    datetime.format("%Y-%m-%d %H:%M").to_string()
}

#[derive(Debug, Default)]
pub struct InitReport {
    pub created: Vec<PathBuf>,
    pub existing: Vec<PathBuf>,
}

/// Fresh projects start on `dev` with a login policy wired to the
/// conventional `POST_login` request and a 401 trigger.
fn default_store_document() -> StoreDocument {
    let mut doc = StoreDocument::bootstrap();
    doc.envs.insert(
        "dev".to_string(),
        EnvEntry {
            login: Some(LoginPolicy {
                request: "POST_login".to_string(),
                triggered_by: vec![401],
            }),
            ..EnvEntry::default()
        },
    );
    doc
}
