//! Error types for the termhost supervisor

use thiserror::Error;

/// Result type alias for supervisor operations
pub type HostResult<T> = Result<T, HostError>;

/// Main error type for the supervisor
///
/// Request timeouts are deliberately absent: query operations degrade to a
/// neutral default instead of surfacing an error.
#[derive(Error, Debug, Clone)]
pub enum HostError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// The backend process could not be launched
    #[error("Failed to spawn backend '{program}': {message}")]
    Spawn { program: String, message: String },

    /// Writing to or reading from the backend channel failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The supervisor has been disposed and will not start again
    #[error("Supervisor has been disposed")]
    Disposed,

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// JSON/TOML/YAML serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HostError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with additional context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new spawn error
    pub fn spawn(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Stable machine-readable code for the error family
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "HOST_CONFIG",
            Self::Spawn { .. } => "HOST_SPAWN",
            Self::Transport(_) => "HOST_TRANSPORT",
            Self::Disposed => "HOST_DISPOSED",
            Self::Io(_) => "HOST_IO",
            Self::Serialization(_) => "HOST_SERIALIZATION",
        }
    }

    /// Context attached to the error, if any
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HostError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for HostError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for HostError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for HostError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<serde_yaml::Error> for HostError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(HostError::config("x").error_code(), "HOST_CONFIG");
        assert_eq!(HostError::Disposed.error_code(), "HOST_DISPOSED");
        assert_eq!(HostError::transport("pipe").error_code(), "HOST_TRANSPORT");
    }

    #[test]
    fn test_config_context() {
        let err = HostError::config_with_context("bad value", "reading config.toml");
        assert_eq!(err.context(), Some("reading config.toml"));
        assert!(err.to_string().contains("bad value"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: HostError = io.into();
        assert!(matches!(err, HostError::Io(ref m) if m.contains("pipe closed")));
    }
}
