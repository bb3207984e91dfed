//! Server configuration
//!
//! One TOML document with a section per concern. Every section has compiled
//! defaults, so an absent file or a partial one is fine. Secrets can come from
//! the environment instead of the file.

use msa_common::config::{env_override, load_toml};
use msa_common::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::services::{ArchivePolicy, HousekeepingSettings, ProgressSettings, UploadSettings};
use crate::storage::StorageSettings;

/// Storage base URL override
pub const STORAGE_URL_ENV_VAR: &str = "MSA_STORAGE_URL";
/// Storage service key override
pub const STORAGE_KEY_ENV_VAR: &str = "MSA_STORAGE_KEY";
/// Cleanup endpoint secret override
pub const CLEANUP_SECRET_ENV_VAR: &str = "MSA_CLEANUP_SECRET";

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:5740";

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub root_folder: Option<PathBuf>,
    /// Database file; relative paths are resolved against the root folder
    pub database_path: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            root_folder: None,
            database_path: PathBuf::from("musicasua.db"),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub archive: ArchivePolicy,
    pub retry: RetryPolicy,
    pub progress: ProgressSettings,
    pub housekeeping: HousekeepingSettings,
    pub upload: UploadSettings,
}

impl ServerConfig {
    /// Load the file at `path` (defaults when `None`) and apply env overrides
    pub fn load(path: Option<&Path>) -> msa_common::Result<Self> {
        let mut config: ServerConfig = load_toml(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Secrets from the environment win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_override(STORAGE_URL_ENV_VAR) {
            self.storage.base_url = url;
        }
        if let Some(key) = env_override(STORAGE_KEY_ENV_VAR) {
            self.storage.service_key = key;
        }
        if let Some(secret) = env_override(CLEANUP_SECRET_ENV_VAR) {
            self.housekeeping.cleanup_secret = secret;
        }
    }

    /// Database file location under `root_folder`
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        if self.server.database_path.is_absolute() {
            self.server.database_path.clone()
        } else {
            root_folder.join(&self.server.database_path)
        }
    }
}
