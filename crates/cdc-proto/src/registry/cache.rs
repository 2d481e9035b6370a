//! Bounded schema cache
//!
//! A plain map behind a `parking_lot::RwLock`. Reads take the shared lock;
//! inserts take the exclusive lock and evict the oldest entry when the map
//! is full. Expiry is not a property of the cache: callers read
//! [`CachedSchema::resolved_at`] and decide.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use super::types::{SchemaMetadata, Subject};
use crate::protobuf::ProtobufSchema;

/// A resolved schema as stored in the cache.
#[derive(Debug, Clone)]
pub struct CachedSchema {
    pub schema: Arc<ProtobufSchema>,
    pub metadata: SchemaMetadata,
    pub resolved_at: Instant,
}

impl CachedSchema {
    pub fn new(schema: ProtobufSchema, metadata: SchemaMetadata) -> Self {
        Self {
            schema: Arc::new(schema),
            metadata,
            resolved_at: Instant::now(),
        }
    }
}

/// Subject-keyed cache holding at most `capacity` entries.
#[derive(Debug)]
pub struct SchemaCache {
    entries: RwLock<HashMap<Subject, CachedSchema>>,
    capacity: usize,
}

impl SchemaCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn get(&self, subject: &Subject) -> Option<CachedSchema> {
        self.entries.read().get(subject).cloned()
    }

    /// Insert or replace an entry, evicting the oldest entries first when
    /// a new subject would exceed capacity. Entries resolved at the same
    /// instant go in subject order.
    pub fn put(&self, subject: Subject, entry: CachedSchema) {
        let mut entries = self.entries.write();
        if !entries.contains_key(&subject) {
            while entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by(|a, b| {
                        a.1.resolved_at
                            .cmp(&b.1.resolved_at)
                            .then_with(|| a.0.as_str().cmp(b.0.as_str()))
                    })
                    .map(|(s, _)| s.clone());
                match oldest {
                    Some(evicted) => {
                        entries.remove(&evicted);
                        tracing::debug!(subject = %evicted, "Evicted schema from cache");
                    }
                    None => break,
                }
            }
        }
        entries.insert(subject, entry);
    }

    pub fn remove(&self, subject: &Subject) -> Option<CachedSchema> {
        self.entries.write().remove(subject)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SchemaId, SchemaType};
    use std::time::Duration;

    const PROTO: &str = r#"syntax = "proto3"; message Row { int64 id = 1; }"#;

    fn entry(subject: &str, id: u32) -> CachedSchema {
        CachedSchema::new(
            ProtobufSchema::parse(PROTO).unwrap(),
            SchemaMetadata {
                subject: Subject::new(subject),
                id: SchemaId::new(id),
                version: 1,
                schema_type: SchemaType::Protobuf,
            },
        )
    }

    #[test]
    fn test_get_put_remove() {
        let cache = SchemaCache::new(4);
        assert!(cache.get(&Subject::new("a-value")).is_none());

        cache.put(Subject::new("a-value"), entry("a-value", 1));
        assert_eq!(cache.get(&Subject::new("a-value")).unwrap().metadata.id, SchemaId(1));

        cache.put(Subject::new("a-value"), entry("a-value", 2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&Subject::new("a-value")).unwrap().metadata.id, SchemaId(2));

        assert!(cache.remove(&Subject::new("a-value")).is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = SchemaCache::new(2);
        cache.put(Subject::new("a"), entry("a", 1));
        std::thread::sleep(Duration::from_millis(2));
        cache.put(Subject::new("b"), entry("b", 2));
        std::thread::sleep(Duration::from_millis(2));
        cache.put(Subject::new("c"), entry("c", 3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&Subject::new("a")).is_none());
        assert!(cache.get(&Subject::new("b")).is_some());
        assert!(cache.get(&Subject::new("c")).is_some());
    }

    #[test]
    fn test_eviction_ties_break_on_subject() {
        let shared = entry("x", 1);
        let cache = SchemaCache::new(2);
        cache.put(Subject::new("b"), shared.clone());
        cache.put(Subject::new("a"), shared);
        cache.put(Subject::new("c"), entry("c", 3));

        assert!(cache.get(&Subject::new("a")).is_none());
        assert!(cache.get(&Subject::new("b")).is_some());
        assert!(cache.get(&Subject::new("c")).is_some());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = SchemaCache::new(0);
        cache.put(Subject::new("a"), entry("a", 1));
        cache.put(Subject::new("b"), entry("b", 2));
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
    }
}
