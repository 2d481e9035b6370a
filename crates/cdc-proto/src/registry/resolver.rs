//! Topic to descriptor resolution
//!
//! A cache hit younger than the expiry window is returned as is. An expired
//! entry is removed and treated as a miss. A miss costs two registry calls,
//! after which the parsed schema is cached.
//!
//! Two threads missing on the same subject both fetch and the later insert
//! wins. Registry reads are idempotent, so no per-subject lock is taken.

use std::sync::Arc;
use std::time::Duration;

use super::cache::{CachedSchema, SchemaCache};
use super::client::SchemaRegistryClient;
use super::types::{SchemaId, SchemaType, Subject};
use super::{RegistryError, RegistryResult};
use crate::config::{ConverterConfig, VersionSelection};
use crate::protobuf::ProtobufSchema;

/// Maps a topic and role to a registry subject.
pub trait SubjectNameStrategy: Send + Sync + std::fmt::Debug {
    fn subject(&self, topic: &str, is_key: bool) -> Subject;
}

/// `<topic>-key` / `<topic>-value`
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicNameStrategy;

impl SubjectNameStrategy for TopicNameStrategy {
    fn subject(&self, topic: &str, is_key: bool) -> Subject {
        if is_key {
            Subject::key(topic)
        } else {
            Subject::value(topic)
        }
    }
}

/// Resolves subjects through a shared [`SchemaCache`].
#[derive(Clone)]
pub struct SchemaResolver {
    client: Arc<dyn SchemaRegistryClient>,
    cache: Arc<SchemaCache>,
    strategy: Arc<dyn SubjectNameStrategy>,
    version: VersionSelection,
    message_name: Option<String>,
    expiry: Duration,
}

impl std::fmt::Debug for SchemaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaResolver")
            .field("strategy", &self.strategy)
            .field("version", &self.version)
            .field("message_name", &self.message_name)
            .field("expiry", &self.expiry)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl SchemaResolver {
    pub fn new(client: Arc<dyn SchemaRegistryClient>, config: &ConverterConfig) -> Self {
        Self {
            client,
            cache: Arc::new(SchemaCache::new(config.cache.capacity)),
            strategy: Arc::new(TopicNameStrategy),
            version: config.version,
            message_name: config.message_name.clone(),
            expiry: config.cache.expiry,
        }
    }

    /// Share an existing cache, e.g. between the key and value converters.
    pub fn with_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_strategy(mut self, strategy: impl SubjectNameStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub fn subject_for(&self, topic: &str, is_key: bool) -> Subject {
        self.strategy.subject(topic, is_key)
    }

    /// Resolve the schema for a topic and role.
    pub fn resolve(&self, topic: &str, is_key: bool) -> RegistryResult<CachedSchema> {
        let subject = self.subject_for(topic, is_key);
        self.resolve_subject(&subject)
    }

    pub fn resolve_subject(&self, subject: &Subject) -> RegistryResult<CachedSchema> {
        if let Some(entry) = self.cache.get(subject) {
            if entry.resolved_at.elapsed() < self.expiry {
                tracing::debug!(subject = %subject, schema_id = %entry.metadata.id, "Schema cache hit");
                return Ok(entry);
            }
            tracing::debug!(subject = %subject, "Schema cache entry expired");
            self.cache.remove(subject);
        }

        tracing::debug!(subject = %subject, "Schema cache miss");
        let entry = self.fetch(subject)?;
        self.cache.put(subject.clone(), entry.clone());
        Ok(entry)
    }

    /// Fetch a schema by id without touching the cache.
    ///
    /// The message selection is ignored; the caller picks the message from
    /// the frame's message indexes.
    pub fn fetch_by_id(&self, subject: &Subject, id: SchemaId) -> RegistryResult<ProtobufSchema> {
        let schema = self.client.get_schema(subject, id)?;
        ensure_protobuf(subject, schema.schema_type)?;
        ProtobufSchema::parse(&schema.schema).map_err(|source| RegistryError::InvalidSchema {
            subject: subject.to_string(),
            source,
        })
    }

    fn fetch(&self, subject: &Subject) -> RegistryResult<CachedSchema> {
        let metadata = self.client.get_metadata(subject, self.version)?;
        ensure_protobuf(subject, metadata.schema_type)?;

        let schema = self.client.get_schema(subject, metadata.id)?;
        ensure_protobuf(subject, schema.schema_type)?;
        if !schema.references.is_empty() {
            tracing::warn!(
                subject = %subject,
                references = schema.references.len(),
                "Schema references are not followed"
            );
        }

        let parsed = ProtobufSchema::parse_with_target(&schema.schema, self.message_name.as_deref())
            .map_err(|source| RegistryError::InvalidSchema {
                subject: subject.to_string(),
                source,
            })?;

        tracing::info!(
            subject = %subject,
            schema_id = %metadata.id,
            version = metadata.version,
            message = %parsed.descriptor().full_name(),
            "Resolved schema from registry"
        );

        Ok(CachedSchema::new(parsed, metadata))
    }
}

fn ensure_protobuf(subject: &Subject, schema_type: SchemaType) -> RegistryResult<()> {
    if schema_type == SchemaType::Protobuf {
        Ok(())
    } else {
        Err(RegistryError::NonProtobuf {
            subject: subject.to_string(),
            schema_type,
        })
    }
}
