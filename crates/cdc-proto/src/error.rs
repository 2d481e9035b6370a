//! Error types for cdc-proto
//!
//! Every failure the pipeline can produce surfaces as a [`ConverterError`].
//! The layer-specific enums are kept separate so callers can tell a bad
//! option from an unreachable registry or a record that does not fit the
//! target schema.

use thiserror::Error;

use crate::protobuf::ProtobufError;
use crate::registry::RegistryError;

/// Result type alias for converter operations
pub type Result<T> = std::result::Result<T, ConverterError>;

/// Invalid or missing configuration option.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required option is absent
    #[error("missing required option '{0}'")]
    Missing(&'static str),

    /// An option is present but does not parse
    #[error("invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// A record value that has no canonical JSON form.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The value's type has no JSON mapping
    #[error("cannot map field '{field}' to JSON: {reason}")]
    Unmappable { field: String, reason: String },

    /// The record handed to the projector is not a struct
    #[error("expected a struct record, got {0}")]
    NotAStruct(&'static str),
}

/// Top-level error for the transcoding pipeline
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Configuration is unusable; nothing can be processed until fixed
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Schema resolution against the registry failed
    #[error("schema resolution failed: {0}")]
    Registry(#[from] RegistryError),

    /// The record could not be projected to JSON
    #[error("projection failed: {0}")]
    Projection(#[from] ProjectionError),

    /// The JSON tree did not fit the descriptor, or encoding failed
    #[error(transparent)]
    Protobuf(#[from] ProtobufError),

    /// Serialization was attempted for a subject that was never resolved
    #[error("no resolved schema cached for subject '{0}'")]
    MissingSchema(String),

    /// JSON rendering failed
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConverterError {
    /// Whether the same record may succeed if retried later.
    ///
    /// Only registry round trips are transient; every other failure is a
    /// property of the configuration or of the record itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConverterError::Registry(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Missing("protobuf.schema.registry.url");
        assert_eq!(
            err.to_string(),
            "missing required option 'protobuf.schema.registry.url'"
        );

        let err = ConfigError::invalid("protobuf.schema.cache.capacity", "must be at least 1");
        assert!(err.to_string().contains("protobuf.schema.cache.capacity"));
    }

    #[test]
    fn test_retryable_classification() {
        let err: ConverterError = RegistryError::Network("connection refused".into()).into();
        assert!(err.is_retryable());

        let err: ConverterError = ProjectionError::NotAStruct("array").into();
        assert!(!err.is_retryable());

        let err = ConverterError::MissingSchema("orders-value".into());
        assert!(!err.is_retryable());
    }
}
