//! Configuration management for the supervisor

mod loader;
mod logging_config;
mod model;

pub mod timeouts;

pub use loader::{
    ConfigLoader, ConfigSource, ENV_BACKEND_PROGRAM, ENV_DISABLE_SHARED_BUFFERS, ENV_LOG_LEVEL,
    ENV_MAX_RESTARTS, default_config_path, load_from_file,
};
pub use logging_config::{LogFormat, LoggingConfig};
pub use model::{
    BackendCommandConfig, OrphanConfig, RequestTimeouts, RestartConfig, SharedBufferConfig,
    ShutdownConfig, SupervisorConfig, WatchdogConfig,
};
