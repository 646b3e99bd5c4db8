//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/musa/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/musa/` (~/.config/musa/)
//! - Data: `$XDG_DATA_HOME/musa/` (~/.local/share/musa/)
//! - State/Logs: `$XDG_STATE_HOME/musa/` (~/.local/state/musa/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the backend base URL (client and proxy upstream)
pub const BACKEND_URL_ENV: &str = "MUSA_BACKEND_URL";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Farm backend (guest usage and analysis endpoints)
    #[serde(default)]
    pub backend: BackendConfig,

    /// Local proxy routes (client base URL and server settings)
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Task completion behaviour
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Farm backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Backend base URL (e.g., `https://api.example.com`)
    pub url: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl BackendConfig {
    /// Returns the backend URL, failing if it is not configured
    pub fn require_url(&self) -> Result<&str> {
        self.url.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "backend.url is required (or set {})",
                BACKEND_URL_ENV
            ))
        })
    }
}

/// Proxy configuration
///
/// `url` is where clients reach the proxy routes; `listen` and
/// `upstream_url` are only read by the proxy server itself.
#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Base URL of the running proxy, used by clients
    #[serde(default = "default_proxy_url")]
    pub url: String,

    /// Address the proxy server binds to
    #[serde(default = "default_proxy_listen")]
    pub listen: String,

    /// Backend base URL the proxy forwards to
    pub upstream_url: Option<String>,

    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: default_proxy_url(),
            listen: default_proxy_listen(),
            upstream_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_proxy_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Task completion configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TasksConfig {
    /// Re-fetch the planting after a successful completion
    #[serde(default = "default_refetch")]
    pub refetch_after_complete: bool,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            refetch_after_complete: default_refetch(),
        }
    }
}

fn default_refetch() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// `MUSA_BACKEND_URL` fills the backend URL and the proxy upstream when set
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if url.trim().is_empty() {
                return;
            }
            self.backend.url = Some(url.clone());
            self.proxy.upstream_url = Some(url);
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/musa/config.toml` (~/.config/musa/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("musa").join("config.toml")
    }

    /// Returns the data directory path (for the local store)
    ///
    /// `$XDG_DATA_HOME/musa/` (~/.local/share/musa/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("musa")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/musa/` (~/.local/state/musa/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("musa")
    }

    /// Returns the local store file path
    ///
    /// `$XDG_DATA_HOME/musa/musa.db` (~/.local/share/musa/musa.db)
    pub fn store_path() -> PathBuf {
        Self::data_dir().join("musa.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/musa/musa.log` (~/.local/state/musa/musa.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("musa.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.backend.url.is_none());
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.proxy.url, "http://127.0.0.1:3000");
        assert_eq!(config.proxy.listen, "127.0.0.1:3000");
        assert!(config.proxy.upstream_url.is_none());
        assert!(config.tasks.refetch_after_complete);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[backend]
url = "https://farm.example.com"
timeout_secs = 10

[proxy]
listen = "0.0.0.0:8080"
upstream_url = "https://farm.example.com"

[tasks]
refetch_after_complete = false

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.backend.url.as_deref(),
            Some("https://farm.example.com")
        );
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.proxy.listen, "0.0.0.0:8080");
        assert_eq!(config.proxy.url, "http://127.0.0.1:3000");
        assert!(!config.tasks.refetch_after_complete);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_require_backend_url() {
        let config = BackendConfig::default();
        assert!(matches!(config.require_url(), Err(Error::Config(_))));

        let config = BackendConfig {
            url: Some("https://farm.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(config.require_url().unwrap(), "https://farm.example.com");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nurl = \"http://localhost:8081\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backend.url.as_deref(), Some("http://localhost:8081"));
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend\nurl = ").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
