//! Configuration loading for the plsort client
//!
//! Every setting is resolved independently in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is normal and silently falls through to defaults.
//! A config file that exists but cannot be parsed is reported with a warning
//! and ignored, so a typo never prevents the client from starting.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// Compiled default remote service address
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001";

/// Compiled default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_SERVER_URL: &str = "PLSORT_SERVER_URL";
pub const ENV_STATE_DIR: &str = "PLSORT_STATE_DIR";
pub const ENV_LOG_LEVEL: &str = "PLSORT_LOG_LEVEL";
pub const ENV_CONFIG_PATH: &str = "PLSORT_CONFIG";

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "plsort";

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub server_url: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    /// Parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the remote sorting service (no trailing slash)
    pub server_url: String,
    /// Directory holding persisted client state (overrides, session credential)
    pub state_dir: PathBuf,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl ClientConfig {
    /// Resolve configuration from CLI, environment, config file and defaults.
    ///
    /// A broken config file is logged at `warn` here. Callers that install
    /// their subscriber from the resolved log level use
    /// [`ClientConfig::resolve_collecting`] and log the warnings afterwards.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let (config, warnings) = Self::resolve_collecting(cli)?;
        for warning in &warnings {
            warning.log();
        }
        Ok(config)
    }

    /// Like [`ClientConfig::resolve`], but returns config file problems
    /// instead of logging them.
    pub fn resolve_collecting(cli: &CliOverrides) -> Result<(Self, Vec<ConfigWarning>)> {
        let mut warnings = Vec::new();
        let file = match config_file_path() {
            Some(path) => read_config_file(&path).unwrap_or_else(|warning| {
                warnings.push(warning);
                None
            }),
            None => None,
        };
        let config = Self::resolve_with(cli, file.unwrap_or_default())?;
        Ok((config, warnings))
    }

    /// Resolve against an already-loaded config file.
    pub fn resolve_with(cli: &CliOverrides, file: TomlConfig) -> Result<Self> {
        let server_url = cli
            .server_url
            .clone()
            .or_else(|| env_value(ENV_SERVER_URL))
            .or(file.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let state_dir = cli
            .state_dir
            .clone()
            .or_else(|| env_value(ENV_STATE_DIR).map(PathBuf::from))
            .or(file.state_dir)
            .unwrap_or_else(default_state_dir);

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| env_value(ENV_LOG_LEVEL))
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            server_url: validate_server_url(&server_url)?,
            state_dir,
            log_level,
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            state_dir: default_state_dir(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Check that a server URL is an absolute http(s) URL and strip trailing slashes.
pub fn validate_server_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    // The URL parser silently drops embedded tabs and newlines
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidInput(format!(
            "server URL contains whitespace: {raw:?}"
        )));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| Error::InvalidInput(format!("invalid server URL {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "server URL must use http or https: {raw}"
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidInput(format!("server URL has no host: {raw}")));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Location of the config file: `PLSORT_CONFIG`, else the platform config dir
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = env_value(ENV_CONFIG_PATH) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// OS-dependent default state directory
pub fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./plsort_data"))
}

/// Config file that exists but was ignored
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning {
    pub path: PathBuf,
    pub error: String,
}

impl ConfigWarning {
    pub fn log(&self) {
        warn!(path = %self.path.display(), error = %self.error, "Ignoring unreadable config file");
    }
}

/// `Ok(None)` for a missing file, `Err` for one that cannot be used
fn read_config_file(path: &Path) -> std::result::Result<Option<TomlConfig>, ConfigWarning> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(None);
    }
    TomlConfig::load(path).map(Some).map_err(|e| ConfigWarning {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
