//! Configuration loading from files and the environment

use super::model::SupervisorConfig;
use crate::error::{HostError, HostResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding `backend.program`
pub const ENV_BACKEND_PROGRAM: &str = "TERMHOST_BACKEND_PROGRAM";
/// Environment variable overriding `logging.level`
pub const ENV_LOG_LEVEL: &str = "TERMHOST_LOG_LEVEL";
/// Environment variable overriding `restart.max_attempts`
pub const ENV_MAX_RESTARTS: &str = "TERMHOST_MAX_RESTARTS";
/// Environment variable that disables the shared buffer path when truthy
pub const ENV_DISABLE_SHARED_BUFFERS: &str = "TERMHOST_DISABLE_SHARED_BUFFERS";

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Configuration from a file
    File(PathBuf),
    /// Overrides from `TERMHOST_*` environment variables
    Environment,
    /// Built-in defaults
    Default,
}

/// Layered configuration loader
///
/// Sources are applied in the order they were added; later sources win.
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
    env_lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader that reads the process environment
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            env_lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the environment lookup (used by tests)
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Box::new(lookup);
        self
    }

    /// Add a configuration source
    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    /// Add environment variables source
    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    /// Add default configuration source
    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    /// Load configuration from all sources and validate the result
    pub fn load(self) -> HostResult<SupervisorConfig> {
        let mut config = SupervisorConfig::default();

        for source in &self.sources {
            match source {
                ConfigSource::Default => config = SupervisorConfig::default(),
                ConfigSource::File(path) => {
                    tracing::debug!(path = %path.display(), "loading configuration file");
                    config = load_from_file(path)?;
                }
                ConfigSource::Environment => self.apply_env(&mut config)?,
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&self, config: &mut SupervisorConfig) -> HostResult<()> {
        let lookup = &self.env_lookup;

        if let Some(program) = lookup(ENV_BACKEND_PROGRAM) {
            config.backend.program = program;
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.logging.level = level;
        }

        if let Some(raw) = lookup(ENV_MAX_RESTARTS) {
            config.restart.max_attempts = raw.trim().parse().map_err(|_| {
                HostError::config_with_context(
                    format!("invalid restart count '{}'", raw),
                    format!("reading {}", ENV_MAX_RESTARTS),
                )
            })?;
        }

        if let Some(raw) = lookup(ENV_DISABLE_SHARED_BUFFERS) {
            if matches!(raw.trim(), "1" | "true" | "yes") {
                config.shared_buffers.enabled = false;
            }
        }

        Ok(())
    }
}

/// Default configuration file location (`<config dir>/termhost/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("termhost").join("config.toml"))
}

/// Load configuration from a file
///
/// Supports JSON, TOML, and YAML formats based on file extension.
/// Returns default config if the file doesn't exist.
pub fn load_from_file(path: &Path) -> HostResult<SupervisorConfig> {
    if !path.exists() {
        return Ok(SupervisorConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        HostError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| {
            HostError::config_with_context(
                format!("Failed to parse TOML config: {}", e),
                format!("Deserializing TOML configuration from '{}'", path.display()),
            )
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
            HostError::config_with_context(
                format!("Failed to parse YAML config: {}", e),
                format!("Deserializing YAML configuration from '{}'", path.display()),
            )
        })?,
        _ => serde_json::from_str(&content).map_err(|e| {
            HostError::config_with_context(
                format!("Failed to parse JSON config: {}", e),
                format!("Deserializing JSON configuration from '{}'", path.display()),
            )
        })?,
    };

    Ok(config)
}
