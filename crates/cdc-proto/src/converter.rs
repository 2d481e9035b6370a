//! Record converters
//!
//! [`RecordConverter`] is the seam the host calls once per record. Two
//! implementations exist:
//!
//! - [`JsonConverter`] stops after projection and emits the canonical JSON
//! - [`ProtobufConverter`] runs the full pipeline: project, resolve, build
//!   and frame
//!
//! A converter serves one role. Hosts that transcode keys and values create
//! two converters, optionally sharing one [`SchemaCache`].

use std::sync::Arc;

use bytes::Bytes;
use prost_reflect::DynamicMessage;
use serde_json::Value as JsonValue;

use crate::config::{ConverterConfig, ProjectionConfig};
use crate::error::Result;
use crate::project::Projector;
use crate::protobuf::{build_message, decode_framed, WireHeader, WireSerializer};
use crate::record::Struct;
use crate::registry::{
    HttpRegistryClient, SchemaCache, SchemaId, SchemaRegistryClient, SchemaResolver,
};

/// Turns one structured record into bytes for its topic.
pub trait RecordConverter: Send + Sync {
    fn from_record(&self, topic: &str, record: &Struct) -> Result<Bytes>;
}

/// Emits the projected JSON tree as UTF-8.
#[derive(Debug, Clone, Default)]
pub struct JsonConverter {
    projector: Projector,
}

impl JsonConverter {
    pub fn new(config: &ProjectionConfig) -> Self {
        Self {
            projector: Projector::new(config),
        }
    }

    pub fn project(&self, record: &Struct) -> Result<JsonValue> {
        Ok(self.projector.project(record)?)
    }
}

impl RecordConverter for JsonConverter {
    fn from_record(&self, _topic: &str, record: &Struct) -> Result<Bytes> {
        let tree = self.project(record)?;
        Ok(Bytes::from(serde_json::to_vec(&tree)?))
    }
}

/// Transcodes records to Confluent-framed Protobuf.
#[derive(Debug, Clone)]
pub struct ProtobufConverter {
    projector: Projector,
    resolver: SchemaResolver,
    serializer: WireSerializer,
    is_key: bool,
}

impl ProtobufConverter {
    /// Converter talking to the configured registry over HTTP.
    pub fn new(config: &ConverterConfig, is_key: bool) -> Result<Self> {
        let client = HttpRegistryClient::new(&config.registry)?;
        Ok(Self::with_client(config, Arc::new(client), is_key))
    }

    pub fn with_client(
        config: &ConverterConfig,
        client: Arc<dyn SchemaRegistryClient>,
        is_key: bool,
    ) -> Self {
        Self::with_resolver(&config.projection, SchemaResolver::new(client, config), is_key)
    }

    /// Converter around an existing resolver, sharing its cache.
    pub fn with_resolver(projection: &ProjectionConfig, resolver: SchemaResolver, is_key: bool) -> Self {
        Self {
            projector: Projector::new(projection),
            serializer: WireSerializer::new(Arc::clone(resolver.cache())),
            resolver,
            is_key,
        }
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        self.resolver.cache()
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    /// Transcode a tree that is already in canonical form, skipping
    /// projection.
    pub fn from_json(&self, topic: &str, tree: &JsonValue) -> Result<Bytes> {
        let subject = self.resolver.subject_for(topic, self.is_key);
        let entry = self.resolver.resolve_subject(&subject)?;
        let message = build_message(tree, entry.schema.descriptor())?;
        let bytes = WireSerializer::frame(&entry, &message)?;

        tracing::trace!(
            topic = %topic,
            subject = %subject,
            schema_id = %entry.metadata.id,
            bytes = bytes.len(),
            "Transcoded record"
        );
        Ok(bytes)
    }

    /// Frame a message built outside the pipeline. The topic's subject
    /// must already be resolved and still cached.
    pub fn serialize(&self, topic: &str, message: &DynamicMessage) -> Result<Bytes> {
        let subject = self.resolver.subject_for(topic, self.is_key);
        self.serializer.serialize(&subject, message)
    }

    /// Decode a frame produced for `topic`, fetching its schema by the id
    /// in the frame when it is not the one cached for the subject.
    pub fn decode(&self, topic: &str, frame: &[u8]) -> Result<DynamicMessage> {
        let (header, _) = WireHeader::parse(frame)?;
        let subject = self.resolver.subject_for(topic, self.is_key);

        let schema = match self.cache().get(&subject) {
            Some(entry) if entry.metadata.id.0 == header.schema_id => entry.schema,
            _ => Arc::new(
                self.resolver
                    .fetch_by_id(&subject, SchemaId::new(header.schema_id))?,
            ),
        };
        let (_, message) = decode_framed(frame, &schema)?;
        Ok(message)
    }
}

impl RecordConverter for ProtobufConverter {
    fn from_record(&self, topic: &str, record: &Struct) -> Result<Bytes> {
        let tree = self.projector.project(record)?;
        self.from_json(topic, &tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConverterError;
    use crate::registry::{RegistryError, RegistryResult, Schema, SchemaMetadata, SchemaType, Subject};
    use crate::config::VersionSelection;
    use url::Url;

    struct DownRegistry;

    impl SchemaRegistryClient for DownRegistry {
        fn get_metadata(&self, _: &Subject, _: VersionSelection) -> RegistryResult<SchemaMetadata> {
            Err(RegistryError::Network("connection refused".into()))
        }

        fn get_schema(&self, _: &Subject, _: SchemaId) -> RegistryResult<Schema> {
            Err(RegistryError::Network("connection refused".into()))
        }
    }

    struct StaticRegistry(&'static str);

    impl SchemaRegistryClient for StaticRegistry {
        fn get_metadata(&self, subject: &Subject, _: VersionSelection) -> RegistryResult<SchemaMetadata> {
            Ok(SchemaMetadata {
                subject: subject.clone(),
                id: SchemaId::new(3),
                version: 1,
                schema_type: SchemaType::Protobuf,
            })
        }

        fn get_schema(&self, _: &Subject, id: SchemaId) -> RegistryResult<Schema> {
            Ok(Schema {
                id,
                schema_type: SchemaType::Protobuf,
                schema: self.0.to_string(),
                references: Vec::new(),
            })
        }
    }

    fn config() -> ConverterConfig {
        ConverterConfig::new(Url::parse("http://localhost:8081").unwrap())
    }

    #[test]
    fn test_json_converter() {
        let converter = JsonConverter::new(&ProjectionConfig::default());
        let record = Struct::new().with("first_name", "Sally").with("ts_ms", 5);
        let bytes = converter.from_record("users", &record).unwrap();
        assert_eq!(bytes.as_ref(), br#"{"firstName":"Sally","tsMs":5}"#);
    }

    #[test]
    fn test_registry_failure_is_retryable_and_produces_nothing() {
        let converter = ProtobufConverter::with_client(&config(), Arc::new(DownRegistry), false);
        let err = converter
            .from_record("users", &Struct::new().with("id", 1))
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(converter.cache().is_empty());
    }

    #[test]
    fn test_coercion_failure_is_not_retryable() {
        let registry = StaticRegistry(r#"syntax = "proto3"; message User { int64 id = 1; }"#);
        let converter = ProtobufConverter::with_client(&config(), Arc::new(registry), false);
        let err = converter
            .from_record("users", &Struct::new().with("id", "not a number"))
            .unwrap_err();
        assert!(matches!(err, ConverterError::Protobuf(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_key_role_and_decode() {
        let registry = StaticRegistry(r#"syntax = "proto3"; message UserKey { int64 id = 1; }"#);
        let converter = ProtobufConverter::with_client(&config(), Arc::new(registry), true);
        assert!(converter.is_key());

        let bytes = converter
            .from_record("users", &Struct::new().with("id", 1001))
            .unwrap();
        assert!(converter.cache().get(&Subject::new("users-key")).is_some());
        assert_eq!(&bytes[..6], &[0x00, 0, 0, 0, 3, 0x00]);

        let decoded = converter.decode("users", &bytes).unwrap();
        assert_eq!(
            decoded.get_field_by_name("id").unwrap().as_i64(),
            Some(1001)
        );

        assert_eq!(converter.serialize("users", &decoded).unwrap(), bytes);
        let err = converter.serialize("orders", &decoded).unwrap_err();
        assert!(matches!(err, ConverterError::MissingSchema(ref s) if s == "orders-key"));
    }
}
