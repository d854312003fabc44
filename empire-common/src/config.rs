//! Configuration loading for Empire services
//!
//! Bootstrap configuration comes from a single TOML file. Every field has a
//! built-in default, so a missing file is a warning and never fatal.
//!
//! # Config file resolution
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/empire/<file_name>`)
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,

    /// Upstream endpoint that receives synced items (optional)
    ///
    /// When absent, items are only logged.
    pub upstream_url: Option<String>,

    /// Connectivity probe interval in milliseconds (probe disabled if absent)
    pub probe_interval_ms: Option<u64>,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Deferred dispatch queue configuration
    pub queue: QueueConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            upstream_url: None,
            probe_interval_ms: None,
            logging: LoggingConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Retry queue and dispatch policy
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of pending items (unbounded if absent)
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Dispatch attempts before an item is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound on a single processor call
    #[serde(default = "default_processing_timeout_ms")]
    pub processing_timeout_ms: u64,

    /// Periodic retry of pending items while ready (disabled if absent)
    #[serde(default)]
    pub retry_interval_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            max_attempts: default_max_attempts(),
            processing_timeout_ms: default_processing_timeout_ms(),
            retry_interval_ms: None,
        }
    }
}

impl QueueConfig {
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        self.retry_interval_ms.map(Duration::from_millis)
    }

    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("queue.max_attempts must be at least 1".to_string()));
        }
        if self.capacity == Some(0) {
            return Err(Error::Config("queue.capacity must be at least 1".to_string()));
        }
        if self.processing_timeout_ms == 0 {
            return Err(Error::Config(
                "queue.processing_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_processing_timeout_ms() -> u64 {
    30_000
}

impl TomlConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.queue.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve and load configuration, falling back to defaults
    ///
    /// A file that is found but malformed is an error; a file that cannot be
    /// found at all yields built-in defaults with a warning.
    pub fn resolve(cli_arg: Option<&Path>, env_var_name: &str, file_name: &str) -> Result<Self> {
        match resolve_config_path(cli_arg, env_var_name, file_name) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Config path resolution following the priority order in the module docs
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("empire").join(file_name))
        .filter(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5780);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.capacity, None);
        assert_eq!(config.queue.processing_timeout(), Duration::from_secs(30));
        assert!(config.queue.retry_interval().is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 6000

            [queue]
            capacity = 100
            "#,
        )
        .expect("valid TOML");

        assert_eq!(config.port, 6000);
        assert_eq!(config.queue.capacity, Some(100));
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let result = TomlConfig::from_toml_str("[queue]\nmax_attempts = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = TomlConfig::from_toml_str("[queue]\ncapacity = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = TomlConfig::from_toml_str("port = \"not a number\"");
        assert!(matches!(result, Err(Error::Toml(_))));
    }
}
