//! Schema registry access
//!
//! Resolution turns a topic and role into a Protobuf descriptor:
//!
//! - [`SubjectNameStrategy`] derives the registry subject
//! - [`SchemaCache`] holds recently resolved schemas, bounded by capacity
//! - [`SchemaRegistryClient`] performs the two registry round trips on a miss
//! - [`SchemaResolver`] ties them together and applies cache expiry
//!
//! The HTTP client speaks the Confluent REST API, which Apicurio and
//! Redpanda also implement.

mod cache;
mod client;
mod resolver;
mod types;

pub use cache::{CachedSchema, SchemaCache};
pub use client::{HttpRegistryClient, SchemaRegistryClient};
pub use resolver::{SchemaResolver, SubjectNameStrategy, TopicNameStrategy};
pub use types::{Schema, SchemaId, SchemaMetadata, SchemaReference, SchemaType, Subject};

use thiserror::Error;

use crate::protobuf::ProtobufError;

/// Schema registry error types
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// The registry could not be reached or the request timed out
    #[error("Network error: {0}")]
    Network(String),

    /// Any other non-success response
    #[error("Registry returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Subject '{subject}' has schema type {schema_type}, expected PROTOBUF")]
    NonProtobuf {
        subject: String,
        schema_type: SchemaType,
    },

    #[error("Schema for subject '{subject}' is not usable: {source}")]
    InvalidSchema {
        subject: String,
        #[source]
        source: ProtobufError,
    },

    #[error("Malformed registry response: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// Transport failures, throttling and server errors may clear up on
    /// their own; lookups that found nothing or returned the wrong kind of
    /// schema will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Network(_) => true,
            RegistryError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RegistryError::Serialization(err.to_string())
        } else {
            RegistryError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(RegistryError::Network("timeout".into()).is_retryable());
        assert!(RegistryError::Http {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!RegistryError::Http {
            status: 401,
            message: "unauthorized".into()
        }
        .is_retryable());
        assert!(!RegistryError::SubjectNotFound("orders-value".into()).is_retryable());
    }

    #[test]
    fn test_non_protobuf_display() {
        let err = RegistryError::NonProtobuf {
            subject: "orders-value".into(),
            schema_type: SchemaType::Avro,
        };
        assert_eq!(
            err.to_string(),
            "Subject 'orders-value' has schema type AVRO, expected PROTOBUF"
        );
    }
}
