//! Configuration file loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "MSA_CONFIG";

/// Environment variable naming the root folder (database, scratch files)
pub const ROOT_FOLDER_ENV_VAR: &str = "MSA_ROOT_FOLDER";

/// Directory name used under the platform config/data directories
const APP_DIR: &str = "musicasua";

/// Configuration file resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `MSA_CONFIG`
/// 3. User config file (`~/.config/musicasua/config.toml` on Linux)
/// 4. System config file (`/etc/musicasua/config.toml`, Linux only)
///
/// Returns `None` when no file applies; callers fall back to compiled defaults.
/// An explicitly requested path (tiers 1 and 2) is returned even if it does
/// not exist, so that loading reports the mistake instead of silently
/// ignoring it.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Some(path) = env_override(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: Per-user config file
    if let Some(user_config) = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System-wide config file
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML configuration document
///
/// `None` yields `T::default()`. A path that cannot be read or parsed is a
/// configuration error.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No configuration file found, using compiled defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
    })?;

    let config = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Cannot parse config file {}: {}", path.display(), e))
    })?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable `MSA_ROOT_FOLDER`
/// 3. `root_folder` value from the TOML config
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = env_override(ROOT_FOLDER_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// Create the root folder if it does not exist yet
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created root folder: {}", path.display());
    } else {
        debug!("Root folder exists: {}", path.display());
    }
    Ok(())
}

/// Read a non-empty environment variable
///
/// Blank values are treated as unset, with a warning, so that an exported but
/// empty secret does not silently override a configured one.
pub fn env_override(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        Ok(_) => {
            warn!("Environment variable {} is set but empty, ignoring", name);
            None
        }
        Err(_) => None,
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/musicasua (or /var/lib/musicasua for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib").join(APP_DIR))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/musicasua
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support").join(APP_DIR))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\musicasua
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData").join(APP_DIR))
    } else {
        PathBuf::from("./musicasua_data")
    }
}
