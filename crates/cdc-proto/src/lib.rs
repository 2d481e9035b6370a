//! # cdc-proto
//!
//! Transcodes change-data-capture records into Protobuf messages whose
//! schema lives in a Confluent-compatible schema registry.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌────────────┐
//! │  Struct  │──▶│ Projector │──▶│  Builder  │──▶│ Serializer │──▶ bytes
//! └──────────┘   └───────────┘   └─────▲─────┘   └─────▲──────┘
//!                                      │               │
//!                               ┌──────┴───────────────┴──┐
//!                               │ SchemaResolver + Cache  │◀── registry
//!                               └─────────────────────────┘
//! ```
//!
//! - [`project`] renames fields, prunes skip paths, converts date fields
//!   and inlines JSON-encoded strings
//! - [`registry`] derives the subject and resolves it to a descriptor,
//!   caching the result with capacity and expiry bounds
//! - [`protobuf`] parses `.proto` text, merges the JSON tree into a
//!   `DynamicMessage` and frames it in the Confluent wire format
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use cdc_proto::{ConverterConfig, ProtobufConverter, RecordConverter, Struct};
//!
//! let props = HashMap::from([
//!     ("protobuf.schema.registry.url".to_string(), "http://localhost:8081".to_string()),
//!     ("protobuf.json.exclude.properties".to_string(), "source.txid".to_string()),
//! ]);
//! let config = ConverterConfig::from_props(&props)?;
//! let converter = ProtobufConverter::new(&config, false)?;
//!
//! let record = Struct::new().with("op", "u").with("ts_ms", 1695335328950i64);
//! let bytes = converter.from_record("inventory.customers", &record)?;
//! ```

pub mod config;
pub mod converter;
pub mod error;
pub mod project;
pub mod protobuf;
pub mod record;
pub mod registry;
pub mod rules;

pub use config::{
    BasicAuth, CacheConfig, ConverterConfig, ProjectionConfig, RegistryConfig, VersionSelection,
};
pub use converter::{JsonConverter, ProtobufConverter, RecordConverter};
pub use error::{ConfigError, ConverterError, ProjectionError, Result};
pub use project::Projector;
pub use protobuf::{ProtobufError, ProtobufSchema, WireHeader};
pub use record::{Struct, Value};
pub use registry::{
    HttpRegistryClient, RegistryError, SchemaCache, SchemaRegistryClient, SchemaResolver,
    Subject,
};
pub use rules::{CaseConversion, DateConversion, DateRule, SkipRule};
