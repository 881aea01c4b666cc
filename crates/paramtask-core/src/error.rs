//! Error types for paramtask

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ParamError
pub type Result<T> = std::result::Result<T, ParamError>;

/// Main error type for parameter parsing and task declaration
#[derive(Debug, Error)]
pub enum ParamError {
    /// Task or composition declared with arguments of the wrong kinds
    #[error("wrong argument types: {}", received.join(","))]
    ArgumentShape { received: Vec<String> },

    /// Task or composition declared with the wrong number of arguments
    #[error("wrong number of arguments: {0}")]
    ArgumentCount(usize),

    /// Parameter source is not a string, token list or mapping
    #[error("cannot parse arguments of type {0}")]
    UnsupportedInputType(String),

    /// Flag value outside its declared choices
    #[error("Invalid values: Argument: {key}, Given: {given:?}, Choices: {}", format_choices(choices))]
    InvalidChoice {
        key: String,
        given: String,
        choices: Vec<String>,
    },

    /// No scheduler instance could be obtained
    #[error("no task scheduler available: {0}")]
    SchedulerUnavailable(String),

    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

fn format_choices(choices: &[String]) -> String {
    choices
        .iter()
        .map(|c| format!("{c:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ParamError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Build a shape error from the kinds of the received arguments
    pub fn argument_shape<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ArgumentShape {
            received: kinds.into_iter().map(Into::into).collect(),
        }
    }
}
