use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::fs_atomic::atomic_write_file;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode yaml for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("settings validation failed: {0}")]
    Settings(String),
    #[error("failed to resolve home directory for state root")]
    HomeDirectoryUnavailable,
}

pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10_485_760;
pub const DEFAULT_MAX_RESULT_BYTES: usize = 16_384;
pub const DEFAULT_MAX_STEPS: u32 = 24;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_retry_backoff_seconds")]
    pub retry_backoff_seconds: u64,
    #[serde(default = "default_scan_timeout_seconds")]
    pub scan_timeout_seconds: u64,
    #[serde(default = "default_tool_timeout_seconds")]
    pub tool_timeout_seconds: u64,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_max_result_bytes")]
    pub max_result_bytes: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_allow_roots")]
    pub allow_roots: Vec<PathBuf>,
    #[serde(default = "default_deny_roots")]
    pub deny_roots: Vec<PathBuf>,
    #[serde(default)]
    pub state_root: Option<PathBuf>,
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_retry_backoff_seconds() -> u64 {
    2
}

fn default_scan_timeout_seconds() -> u64 {
    30
}

fn default_tool_timeout_seconds() -> u64 {
    10
}

fn default_max_file_size_bytes() -> u64 {
    DEFAULT_MAX_FILE_SIZE_BYTES
}

fn default_max_result_bytes() -> usize {
    DEFAULT_MAX_RESULT_BYTES
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

fn default_allow_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/Users"),
        PathBuf::from("/Applications"),
        PathBuf::from("/tmp"),
        PathBuf::from("/home"),
    ]
}

fn default_deny_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/System"),
        PathBuf::from("/Library"),
        PathBuf::from("/bin"),
        PathBuf::from("/sbin"),
        PathBuf::from("/usr"),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            request_timeout_seconds: default_request_timeout_seconds(),
            retry_backoff_seconds: default_retry_backoff_seconds(),
            scan_timeout_seconds: default_scan_timeout_seconds(),
            tool_timeout_seconds: default_tool_timeout_seconds(),
            max_file_size_bytes: default_max_file_size_bytes(),
            max_result_bytes: default_max_result_bytes(),
            max_steps: default_max_steps(),
            allow_roots: default_allow_roots(),
            deny_roots: default_deny_roots(),
            state_root: None,
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let body = serde_yaml::to_string(self).map_err(|source| ConfigError::Encode {
            path: path.display().to_string(),
            source,
        })?;
        atomic_write_file(path, body.as_bytes()).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Settings("model must be non-empty".to_string()));
        }
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::Settings(
                "api_base must be non-empty".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Settings(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::Settings(
                "max_file_size_bytes must be positive".to_string(),
            ));
        }
        if self.max_result_bytes == 0 {
            return Err(ConfigError::Settings(
                "max_result_bytes must be positive".to_string(),
            ));
        }
        for root in self.allow_roots.iter().chain(self.deny_roots.iter()) {
            if !root.is_absolute() {
                return Err(ConfigError::Settings(format!(
                    "path root `{}` must be absolute",
                    root.display()
                )));
            }
        }
        Ok(())
    }

    pub fn resolve_state_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = &self.state_root {
            return Ok(root.clone());
        }
        default_state_root_path()
    }
}

pub fn default_state_root_path() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or(ConfigError::HomeDirectoryUnavailable)?;
    Ok(home.join(".autoav"))
}

pub fn default_settings_path() -> Result<PathBuf, ConfigError> {
    Ok(default_state_root_path()?.join("settings.yaml"))
}

pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let settings = if path.exists() {
        Settings::from_path(path)?
    } else {
        Settings::default()
    };
    settings.validate()?;
    Ok(settings)
}
