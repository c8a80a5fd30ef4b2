//! Disk-persisted control-loop position
//!
//! A service rewrites its state file after every transition so that a
//! restart resumes where the previous process stopped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::Result;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    stage: T,
}

/// JSON file holding a single `{"stage": ...}` field
#[derive(Debug, Clone)]
pub struct StateFile<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> StateFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted value, or None when no state has been written yet
    pub fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let envelope: Envelope<T> = serde_json::from_str(&content)?;
        Ok(Some(envelope.stage))
    }

    /// Persisted value, falling back to `default` when absent or unreadable
    pub fn load_or(&self, default: T) -> T {
        match self.load() {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable state file, starting from default");
                default
            }
        }
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn save(&self, value: &T) -> Result<()> {
        write_json_atomic(&self.path, &Envelope { stage: value })?;
        debug!(path = %self.path.display(), "State persisted");
        Ok(())
    }
}

/// Serialize `value` to `path` through a sibling temp file and a rename
pub fn write_json_atomic<V: Serialize + ?Sized>(path: &Path, value: &V) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read and deserialize a JSON file
pub fn read_json<V: DeserializeOwned>(path: &Path) -> Result<V> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
