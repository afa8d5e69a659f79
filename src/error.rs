//! Error types for Kubeform

use thiserror::Error;

/// Result type for Kubeform operations
pub type Result<T> = std::result::Result<T, KubeformError>;

/// Kubeform error types
#[derive(Error, Debug)]
pub enum KubeformError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed '{directive}' directive: expected {expected}")]
    MalformedDirective {
        directive: String,
        expected: &'static str,
    },

    #[error("Compose file parse error: {0}")]
    ComposeParse(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}

impl KubeformError {
    /// Shorthand for a directive whose value has the wrong shape
    pub fn malformed(directive: &str, expected: &'static str) -> Self {
        Self::MalformedDirective {
            directive: directive.to_string(),
            expected,
        }
    }
}

impl From<serde_yaml::Error> for KubeformError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}
