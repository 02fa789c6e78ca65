use thiserror::Error;

/// Main error type for the Slack workflow binding
///
/// These errors only travel along internal fallible paths (persistence,
/// settings, file loading). The adapter surface never returns them; it
/// reports failures as [`crate::models::ErrorDescriptor`] values instead.
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, BindingError>;
