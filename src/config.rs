//! # Configuration Module
//!
//! Application settings loaded from a YAML or TOML file (chosen by
//! extension), then adjusted from environment variables.
//!
//! ## Environment Variables
//!
//! | variable                   | field                 |
//! |----------------------------|-----------------------|
//! | `ROUTESCOPE_ADDR`          | `server.addr`         |
//! | `ROUTESCOPE_BASE_PATH`     | `server.base_path`    |
//! | `ROUTESCOPE_PRINT_ERRORS`  | `server.print_errors` |
//! | `ROUTESCOPE_WORKERS`       | `server.workers`      |
//!
//! ## Example
//!
//! ```yaml
//! server:
//!   addr: 127.0.0.1:8080
//!   base_path: /app
//!   print_errors: true
//! static_dirs:
//!   - path: ./public
//!     url_prefix: /assets
//! logging:
//!   level: debug
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::server::http_server::MAX_BODY_BYTES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config format `{0}` (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(String),
    #[error("invalid value `{value}` for {var}")]
    InvalidEnv { var: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub static_dirs: Vec<StaticMount>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Prefix stripped from every request path before route matching.
    pub base_path: String,
    /// Show error chains on the default 500 page.
    pub print_errors: bool,
    pub workers: usize,
    /// Larger request bodies are answered with 413 and never dispatched.
    pub max_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            base_path: String::new(),
            print_errors: false,
            workers: 4,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

/// A directory served under a URL prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMount {
    pub path: PathBuf,
    pub url_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Read a config file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// I/O, parse, unknown extension or bad override values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Read a config file without looking at the environment.
    ///
    /// # Errors
    ///
    /// I/O, parse or unknown extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        Self::parse(&text, &ext)
    }

    /// Parse config text in the given format (`yaml`, `yml` or `toml`).
    ///
    /// # Errors
    ///
    /// Parse errors or an unknown format.
    pub fn parse(text: &str, format: &str) -> Result<Self, ConfigError> {
        match format {
            "yaml" | "yml" => Ok(serde_yaml::from_str(text)?),
            "toml" => Ok(toml::from_str(text)?),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Apply `ROUTESCOPE_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| env::var(var).ok())
    }

    /// Apply overrides from any lookup function.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("ROUTESCOPE_ADDR") {
            self.server.addr = addr;
        }
        if let Some(base) = lookup("ROUTESCOPE_BASE_PATH") {
            self.server.base_path = base;
        }
        if let Some(val) = lookup("ROUTESCOPE_PRINT_ERRORS") {
            self.server.print_errors = match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "ROUTESCOPE_PRINT_ERRORS".to_string(),
                        value: val,
                    })
                }
            };
        }
        if let Some(val) = lookup("ROUTESCOPE_WORKERS") {
            self.server.workers = match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "ROUTESCOPE_WORKERS".to_string(),
                        value: val,
                    })
                }
            };
        }
        if let Some(val) = lookup("ROUTESCOPE_MAX_BODY_BYTES") {
            self.server.max_body_bytes = val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                var: "ROUTESCOPE_MAX_BODY_BYTES".to_string(),
                value: val.clone(),
            })?;
        }
        Ok(())
    }
}
