use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;

use crate::env::model::{Environment, StoreDocument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading environment store {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("writing environment store {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing environment store {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("serializing environment store")]
    Serialize {
        #[source]
        source: serde_yaml::Error,
    },
}

/// Persisted environment state behind serialized read-modify-write
/// operations. The mutex is in-process only; concurrent CLI processes
/// against the same file can still lose updates.
pub struct EnvStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EnvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Active environment; bootstraps and persists a default store with a
    /// single `dev` environment when the file does not exist yet.
    pub fn load_active(&self) -> Result<Environment, StoreError> {
        let _guard = self.guard();
        let doc = self.read_or_bootstrap()?;
        Ok(doc.active())
    }

    pub fn set_active(&self, name: &str) -> Result<Environment, StoreError> {
        let _guard = self.guard();
        let mut doc = self.read_or_bootstrap()?;
        doc.env = name.to_string();
        doc.envs.entry(name.to_string()).or_default();
        self.write_document(&doc)?;
        Ok(doc.active())
    }

    pub fn set_variable(&self, key: &str, value: &str) -> Result<Environment, StoreError> {
        let _guard = self.guard();
        let mut doc = self.read_or_bootstrap()?;
        doc.active_entry_mut()
            .variables
            .insert(key.to_string(), value.to_string());
        self.write_document(&doc)?;
        Ok(doc.active())
    }

    pub fn set_cookie(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.guard();
        let mut doc = self.read_or_bootstrap()?;
        doc.active_entry_mut()
            .cookies
            .insert(name.to_string(), value.to_string());
        self.write_document(&doc)
    }

    pub fn clear_cookies(&self) -> Result<(), StoreError> {
        let _guard = self.guard();
        let mut doc = self.read_or_bootstrap()?;
        doc.active_entry_mut().cookies.clear();
        self.write_document(&doc)
    }

    /// Verbatim store content for diagnostic display; empty if absent.
    pub fn read_raw(&self) -> Result<String, StoreError> {
        let _guard = self.guard();
        if !self.path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_or_bootstrap(&self) -> Result<StoreDocument, StoreError> {
        if !self.path.exists() {
            let doc = StoreDocument::bootstrap();
            self.write_document(&doc)?;
            return Ok(doc);
        }
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(StoreDocument::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write_document(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        let contents =
            serde_yaml::to_string(doc).map_err(|source| StoreError::Serialize { source })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, contents).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
