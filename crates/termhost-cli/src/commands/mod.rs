//! CLI command implementations

pub mod check;
pub mod config;
pub mod input;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use termhost_core::backend::ProcessLauncher;
use termhost_core::config::{ConfigLoader, SupervisorConfig, default_config_path};
use termhost_core::error::HostResult;
use termhost_core::supervisor::HostSupervisor;

use crate::notifier::ConsoleNotifier;

/// Where configuration comes from for this invocation
pub struct ConfigFile {
    path: Option<PathBuf>,
    explicit: bool,
}

impl ConfigFile {
    /// An explicit `--config` wins over the per-user default location
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        match explicit {
            Some(path) => Self {
                path: Some(path),
                explicit: true,
            },
            None => Self {
                path: default_config_path(),
                explicit: false,
            },
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.path.as_deref().is_some_and(Path::exists)
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Defaults, then the file (if present), then `TERMHOST_*` overrides
    pub fn load(&self) -> HostResult<SupervisorConfig> {
        self.loader().load()
    }

    pub fn describe(&self) -> String {
        match &self.path {
            Some(path) if self.exists() => path.display().to_string(),
            Some(path) => format!("{} (not found, using defaults)", path.display()),
            None => "built-in defaults".to_string(),
        }
    }

    fn loader(&self) -> ConfigLoader {
        let loader = ConfigLoader::new().with_defaults();
        let loader = match &self.path {
            Some(path) => loader.with_file(path),
            None => loader,
        };
        loader.with_env()
    }
}

/// The one supervisor this process runs
pub fn build_supervisor(config: SupervisorConfig) -> HostResult<HostSupervisor> {
    let launcher = Arc::new(ProcessLauncher::new(config.backend.clone()));
    HostSupervisor::builder(config, launcher)
        .notifier(Arc::new(ConsoleNotifier))
        .build()
}
