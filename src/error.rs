//! Error types for tabreg

use thiserror::Error;

/// Result type alias for tabreg operations
pub type Result<T> = std::result::Result<T, TabregError>;

/// Main error type
#[derive(Error, Debug)]
pub enum TabregError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Schema mismatch: column '{0}' is missing from the table")]
    SchemaMismatch(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl TabregError {
    /// Configuration error for a model kind outside the supported set
    pub fn invalid_model_type(model_type: &str) -> Self {
        TabregError::ConfigError(format!("Invalid model type: {}", model_type))
    }

    /// Configuration error for a hyperparameter the regressor does not accept
    pub fn invalid_param(model: &str, name: &str, reason: impl std::fmt::Display) -> Self {
        TabregError::ConfigError(format!("Invalid parameter '{}' for {}: {}", name, model, reason))
    }
}

impl From<polars::error::PolarsError> for TabregError {
    fn from(err: polars::error::PolarsError) -> Self {
        TabregError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for TabregError {
    fn from(err: serde_json::Error) -> Self {
        TabregError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TabregError {
    fn from(err: ndarray::ShapeError) -> Self {
        TabregError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for TabregError {
    fn from(err: config::ConfigError) -> Self {
        TabregError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TabregError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_invalid_model_type_message() {
        let err = TabregError::invalid_model_type("anything_else");
        assert!(err.to_string().contains("Invalid model type: anything_else"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TabregError = io_err.into();
        assert!(matches!(err, TabregError::IoError(_)));
    }
}
