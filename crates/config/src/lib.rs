#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for modsmith
//!
//! This crate handles loading and merging the orchestrator defaults from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/modsmith/config.toml)
//! - Environment variables
//!
//! CLI flags and per-build requests are layered on top by the callers.

pub mod constants;
pub mod host;

pub use host::{host_cpu, host_os, npm_arch};

use modsmith_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub build: BuildConfig,

    /// Extra default environment for every build
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Runtime selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Candidate runtime versions, empty means "probe the host"
    #[serde(default)]
    pub versions: Vec<String>,
    /// Constraint used when a manifest declares no engines string
    #[serde(default = "default_engine")]
    pub default_engine: String,
    /// Runtime installation root; `<root>/runtime` when unset
    pub runtime_dir: Option<PathBuf>,
    /// Native header root; the resolved version is appended to it
    pub headers_dir: Option<PathBuf>,
}

/// Identity the package manager runs as
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_group")]
    pub group: String,
}

/// Build behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
    #[serde(default = "default_passthrough_output")]
    pub passthrough_output: bool,
    pub os: Option<String>,
    pub cpu: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            default_engine: default_engine(),
            runtime_dir: None,
            headers_dir: None,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            group: default_group(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            package_manager: default_package_manager(),
            passthrough_output: default_passthrough_output(),
            os: None,
            cpu: None,
        }
    }
}

// Default value functions for serde
fn default_engine() -> String {
    "*".to_string()
}

fn default_user() -> String {
    "nobody".to_string()
}

fn default_group() -> String {
    "nobody".to_string()
}

fn default_command() -> String {
    "install".to_string()
}

fn default_package_manager() -> String {
    "npm".to_string()
}

fn default_passthrough_output() -> bool {
    true
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("modsmith").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;
        if fs::try_exists(&config_path).await.unwrap_or(false) {
            tracing::debug!(path = %config_path.display(), "loading configuration");
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from an explicit path if given, else the default location
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or either file is
    /// not valid TOML.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::load_from_file(path).await,
            None => Self::load().await,
        }
    }

    /// Merge environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if any environment variable has an invalid value.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(versions) = std::env::var("MODSMITH_VERSIONS") {
            self.runtime.versions = versions
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(engine) = std::env::var("MODSMITH_DEFAULT_ENGINE") {
            if engine.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "MODSMITH_DEFAULT_ENGINE".to_string(),
                    value: engine,
                }
                .into());
            }
            self.runtime.default_engine = engine;
        }

        if let Ok(user) = std::env::var("MODSMITH_USER") {
            self.identity.user = user;
        }

        if let Ok(group) = std::env::var("MODSMITH_GROUP") {
            self.identity.group = group;
        }

        if let Ok(manager) = std::env::var("MODSMITH_PACKAGE_MANAGER") {
            self.build.package_manager = manager;
        }

        if let Ok(passthrough) = std::env::var("MODSMITH_PASSTHROUGH") {
            self.build.passthrough_output = match passthrough.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "MODSMITH_PASSTHROUGH".to_string(),
                        value: passthrough,
                    }
                    .into())
                }
            };
        }

        Ok(())
    }

    /// Target platform tag, configured or from the host
    #[must_use]
    pub fn target_os(&self) -> String {
        self.build.os.clone().unwrap_or_else(host_os)
    }

    /// Target architecture tag, configured or from the host
    #[must_use]
    pub fn target_cpu(&self) -> String {
        self.build.cpu.clone().unwrap_or_else(host_cpu)
    }
}
