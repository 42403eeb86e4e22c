//! Configuration-level errors shared by the pipeline components

/// Invalid values handed to a component entry point.
///
/// These are always fatal: no pipeline run is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid filter pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid command template {template:?}: {message}")]
    InvalidCommand { template: String, message: String },

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
