//! Error types for autobuild
//!
//! All modules use `AutobuildResult<T>` as their return type.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for autobuild operations
pub type AutobuildResult<T> = Result<T, AutobuildError>;

/// All errors that can occur in autobuild
#[derive(Error, Debug)]
pub enum AutobuildError {
    // Pipeline errors
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to locate runtime \u{201c}{0}\u{201d}")]
    RuntimeMissing(String),

    #[error("{stage} failed: {command} exited with {code}\n{output}")]
    ProcessFailed {
        stage: String,
        command: String,
        code: i32,
        output: String,
    },

    #[error("Failed to populate {cache} cache: {source}")]
    PopulationFailed {
        cache: String,
        #[source]
        source: Arc<AutobuildError>,
    },

    #[error("Population of {0} cache was abandoned before completion")]
    PopulationAbandoned(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Build configuration not found: {0}")]
    ConfigurationNotFound(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid glob in {path}: {source}")]
    Glob {
        path: PathBuf,
        #[source]
        source: globset::Error,
    },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl AutobuildError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether the error stems from a cancellation, including a cancelled
    /// cache population shared with joined callers.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::PopulationFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the error is a missing file or directory
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::ConfigNotFound(_) => true,
            Self::PopulationFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeMissing(_) => {
                Some("Declare the runtime under [runtimes] in config.toml or use \"host\"")
            }
            Self::ConfigurationNotFound(_) => {
                Some("List configurations with [[configuration]] entries in autobuild.toml")
            }
            Self::ProcessFailed { stage, .. } if stage == "Bootstrap" => {
                Some("Make sure autoconf, automake and libtool are installed")
            }
            Self::PopulationFailed { source, .. } => source.hint(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = AutobuildError::RuntimeMissing("flatpak:org.gnome.Sdk".to_string());
        assert!(err.to_string().contains("flatpak:org.gnome.Sdk"));
    }

    #[test]
    fn cancelled_is_seen_through_population_failure() {
        let err = AutobuildError::PopulationFailed {
            cache: "makecache".to_string(),
            source: Arc::new(AutobuildError::Cancelled),
        };
        assert!(err.is_cancelled());
        assert!(!AutobuildError::Internal("x".to_string()).is_cancelled());
    }

    #[test]
    fn error_hint() {
        let err = AutobuildError::ProcessFailed {
            stage: "Bootstrap".to_string(),
            command: "autoreconf -fiv".to_string(),
            code: 1,
            output: String::new(),
        };
        assert!(err.hint().unwrap().contains("autoconf"));
        assert_eq!(AutobuildError::Cancelled.hint(), None);
    }
}
