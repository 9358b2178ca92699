// src/config.rs

//! Store configuration
//!
//! Configuration is read from a small TOML file. Every key is optional.
//!
//! ```toml
//! # Entries kept in the (parent, name) -> path resolution cache
//! path_cache_capacity = 40000
//!
//! # Open the store in fast (deferred durability) mode, for bulk imports
//! fast_access = false
//!
//! # Native location of the @workspace root
//! workspace_native = "/home/user/src/project"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default size of the path-name resolution cache
pub const DEFAULT_PATH_CACHE_CAPACITY: usize = 40_000;

/// Configuration applied when a store is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Capacity of the (parent, name) resolution cache
    #[serde(default = "default_path_cache_capacity")]
    pub path_cache_capacity: usize,

    /// Start in fast access mode (one long transaction, no fsync)
    #[serde(default)]
    pub fast_access: bool,

    /// Native directory backing the workspace root
    #[serde(default)]
    pub workspace_native: Option<PathBuf>,
}

fn default_path_cache_capacity() -> usize {
    DEFAULT_PATH_CACHE_CAPACITY
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path_cache_capacity: DEFAULT_PATH_CACHE_CAPACITY,
            fast_access: false,
            workspace_native: None,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.path_cache_capacity == 0 {
            return Err(Error::Config(
                "path_cache_capacity must be greater than zero".to_string(),
            ));
        }
        if let Some(native) = &self.workspace_native
            && !native.is_absolute()
        {
            return Err(Error::Config(format!(
                "workspace_native must be absolute: {}",
                native.display()
            )));
        }
        Ok(())
    }
}
