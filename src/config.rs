//! Service configuration.
//!
//! Loaded in three steps, each optional except the last:
//!
//! 1. TOML file (every field has a default, so an empty file is valid)
//! 2. Environment overrides
//! 3. Semantic validation
//!
//! ```toml
//! listen = "0.0.0.0:3000"
//! maxBodyBytes = 1048576
//!
//! [rateLimit]
//! permitLimit = 10
//! window = 60        # seconds
//! queueLimit = 5
//!
//! [log]
//! level = "info"
//! format = "text"    # or "json"
//! ```
//!
//! ## Environment overrides
//!
//! - `LISTEN` - bind address
//! - `MAX_BODY_BYTES` - request body cap
//! - `RUST_LOG` - log filter
//! - `LOG_FORMAT` - `text` or `json`
//! - `RATE_LIMIT_PERMIT_LIMIT`, `RATE_LIMIT_WINDOW_SECS`, `RATE_LIMIT_QUEUE_LIMIT`

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::limiter::{MAX_WINDOW, RateLimitOptions};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{var} must be a non-negative integer, got `{value}`")]
    Env { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Bind address (`host:port`).
    pub listen: String,
    /// Largest request body accepted, in bytes. Larger bodies get `413`.
    pub max_body_bytes: u64,
    pub rate_limit: RateLimitConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            rate_limit: RateLimitConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// `[rateLimit]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub permit_limit: u32,
    /// Window length in seconds.
    pub window: u64,
    pub queue_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let defaults = RateLimitOptions::default();
        Self {
            permit_limit: defaults.permit_limit,
            window: defaults.window.as_secs(),
            queue_limit: defaults.queue_limit,
        }
    }
}

impl RateLimitConfig {
    pub fn options(&self) -> RateLimitOptions {
        RateLimitOptions {
            permit_limit: self.permit_limit,
            window: Duration::from_secs(self.window),
            queue_limit: self.queue_limit,
        }
    }
}

/// `[log]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `tollgate=debug,info`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Text }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Parses a TOML document. Missing fields take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Applies environment overrides on top of `self`.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(listen) = env::var("LISTEN") {
            self.listen = listen;
        }
        if let Some(v) = env_number("MAX_BODY_BYTES")? {
            self.max_body_bytes = v;
        }
        if let Ok(level) = env::var("RUST_LOG") {
            self.log.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.log.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "LOG_FORMAT must be 'text' or 'json', got '{other}'"
                    )));
                }
            };
        }
        if let Some(v) = env_number("RATE_LIMIT_PERMIT_LIMIT")? {
            self.rate_limit.permit_limit = v;
        }
        if let Some(v) = env_number("RATE_LIMIT_WINDOW_SECS")? {
            self.rate_limit.window = v;
        }
        if let Some(v) = env_number("RATE_LIMIT_QUEUE_LIMIT")? {
            self.rate_limit.queue_limit = v;
        }
        Ok(self)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `rateLimit.permitLimit` is 0
    /// - `rateLimit.window` is 0 or longer than one day
    /// - `listen` is not in `host:port` form
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.permit_limit == 0 {
            return Err(ConfigError::Invalid("rateLimit.permitLimit must be at least 1".into()));
        }
        if self.rate_limit.window == 0 {
            return Err(ConfigError::Invalid("rateLimit.window must be at least 1 second".into()));
        }
        if self.rate_limit.window > MAX_WINDOW.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "rateLimit.window must be at most {} seconds, got {}",
                MAX_WINDOW.as_secs(),
                self.rate_limit.window
            )));
        }
        if !self.listen.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "listen must be in format 'host:port', got '{}'",
                self.listen
            )));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
        Err(_) => Ok(None),
    }
}

/// Loads the file at `path` (if any), applies environment overrides and
/// validates the result.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let config = config.apply_env()?;
    config.validate()?;
    Ok(config)
}
