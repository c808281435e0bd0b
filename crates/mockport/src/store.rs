//! YAML persistence for endpoint definitions.

use crate::endpoint::EndpointDefinition;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("failed to serialize endpoints: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    endpoints: Vec<EndpointDefinition>,
}

/// Snapshot store for the full set of endpoint definitions.
pub struct EndpointStore {
    path: PathBuf,
    /// Serializes writers so a temp file is never shared.
    write_lock: Mutex<()>,
}

impl EndpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every persisted definition. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<EndpointDefinition>, StoreError> {
        if !self.path.exists() {
            debug!("Store file {:?} does not exist, starting fresh", self.path);
            return Ok(Vec::new());
        }

        let yaml = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        if yaml.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: StoreDocument =
            serde_yaml::from_str(&yaml).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        info!(
            "Loaded {} endpoint definitions from {:?}",
            document.endpoints.len(),
            self.path
        );
        Ok(document.endpoints)
    }

    /// Replace the persisted set with `endpoints`.
    ///
    /// The document is written to a sibling temp file and renamed over the
    /// target so readers never observe a half-written file.
    pub fn save(&self, endpoints: &[EndpointDefinition]) -> Result<(), StoreError> {
        let document = StoreDocument {
            endpoints: endpoints.to_vec(),
        };
        let yaml = serde_yaml::to_string(&document)?;

        let _guard = self.write_lock.lock();
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!("Saved {} endpoint definitions to {:?}", endpoints.len(), self.path);
        Ok(())
    }
}
