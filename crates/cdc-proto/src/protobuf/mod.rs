//! Dynamic Protobuf support
//!
//! Schemas arrive from the registry as `.proto` text and are only known at
//! runtime, so nothing here is generated code:
//!
//! - [`parser`] turns `.proto` text into a `FileDescriptorProto`
//! - [`ProtobufSchema`] loads it into a `prost_reflect::DescriptorPool` and
//!   selects the target message
//! - [`build_message`] merges a JSON tree into a `DynamicMessage`
//! - [`wire`] frames encoded messages in the Confluent wire format
//! - [`message_to_json`] renders decoded messages for inspection

pub mod builder;
pub mod json;
pub mod parser;
pub mod schema;
pub mod wire;

pub use builder::build_message;
pub use json::message_to_json;
pub use schema::ProtobufSchema;
pub use wire::{decode_framed, encode_framed, WireHeader, WireSerializer, MAGIC_BYTE};

use thiserror::Error;

/// Protobuf-specific errors.
#[derive(Debug, Error)]
pub enum ProtobufError {
    #[error("Parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// The descriptor pool rejected the parsed file
    #[error("Invalid descriptor: {0}")]
    Descriptor(String),

    #[error("Unresolved import: {0}")]
    UnresolvedImport(String),

    #[error("Schema declares no message types")]
    NoMessages,

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// A JSON value does not fit the declared field type
    #[error("Cannot set field '{field}': {message}")]
    Coercion { field: String, message: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),
}

impl ProtobufError {
    pub(crate) fn coercion(field: &str, message: impl Into<String>) -> Self {
        ProtobufError::Coercion {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for Protobuf operations.
pub type ProtobufResult<T> = Result<T, ProtobufError>;
