//! Runtime settings loaded from TOML.
//!
//! ```toml
//! [executor]
//! poll_interval_ms = 1000
//! max_wait_secs = 900
//! failure_policy = "strict"
//!
//! [warehouse]
//! url = "postgres://loader@warehouse.internal:5439/dev"
//!
//! [storage]
//! root = "/mnt/lake"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LoadError, LoadResult};
use crate::loader::FailurePolicy;
use crate::warehouse::executor::PollPolicy;

/// File name searched in the working directory.
pub const LOCAL_SETTINGS_FILE: &str = "salesload.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobSettings {
    pub executor: ExecutorSettings,
    pub warehouse: WarehouseSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorSettings {
    pub poll_interval_ms: u64,
    /// Zero or absent means wait forever.
    pub max_wait_secs: Option<u64>,
    pub failure_policy: FailurePolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_wait_secs: None,
            failure_policy: FailurePolicy::CopyOnly,
        }
    }
}

impl ExecutorSettings {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: self
                .max_wait_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WarehouseSettings {
    /// Postgres-wire connection URL of the warehouse endpoint.
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    /// Local directory that mirrors object storage buckets.
    pub root: Option<PathBuf>,
}

impl JobSettings {
    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> LoadResult<Self> {
        toml::from_str(content).map_err(|e| LoadError::Settings(e.to_string()))
    }

    /// Load settings from an explicit path.
    pub fn from_path(path: &Path) -> LoadResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Settings(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Load settings from the first file found, or defaults.
    ///
    /// Search order: `explicit`, `./salesload.toml`,
    /// `<config dir>/salesload/config.toml`. An explicit path that does not
    /// exist is an error; the implicit locations are optional.
    pub fn discover(explicit: Option<&Path>) -> LoadResult<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        let local = Path::new(LOCAL_SETTINGS_FILE);
        if local.exists() {
            return Self::from_path(local);
        }

        if let Some(path) = dirs::config_dir().map(|d| d.join("salesload").join("config.toml")) {
            if path.exists() {
                return Self::from_path(&path);
            }
        }

        Ok(Self::default())
    }
}
