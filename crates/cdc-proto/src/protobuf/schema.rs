//! A parsed registry schema and its target message

use prost_reflect::{DescriptorPool, FileDescriptor, MessageDescriptor};

use super::parser::{self, FILE_NAME};
use super::{ProtobufError, ProtobufResult};

/// A parsed Protobuf schema with the message records are encoded as.
#[derive(Clone)]
pub struct ProtobufSchema {
    raw: String,
    pool: DescriptorPool,
    file: FileDescriptor,
    target: MessageDescriptor,
    message_indexes: Vec<i32>,
}

impl std::fmt::Debug for ProtobufSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtobufSchema")
            .field("package", &self.file.package_name())
            .field("target", &self.target.full_name())
            .field("message_indexes", &self.message_indexes)
            .finish()
    }
}

impl ProtobufSchema {
    /// Parse `.proto` text, targeting the first top-level message.
    pub fn parse(proto_content: &str) -> ProtobufResult<Self> {
        Self::parse_with_target(proto_content, None)
    }

    /// Parse `.proto` text, targeting `message_name` when given.
    ///
    /// The name may be simple (`Row`), relative to the package
    /// (`Envelope.Row`) or fully qualified (`cdc.Envelope.Row`).
    pub fn parse_with_target(proto_content: &str, message_name: Option<&str>) -> ProtobufResult<Self> {
        // well-known types are preloaded in the global pool
        let mut pool = DescriptorPool::global();
        let file_proto = parser::parse(proto_content, &pool)?;
        pool.add_file_descriptor_proto(file_proto)
            .map_err(|e| ProtobufError::Descriptor(e.to_string()))?;

        let file = pool
            .get_file_by_name(FILE_NAME)
            .ok_or_else(|| ProtobufError::Descriptor(format!("{} missing from pool", FILE_NAME)))?;

        let target = match message_name {
            Some(name) => find_message(&file, name)?,
            None => file.messages().next().ok_or(ProtobufError::NoMessages)?,
        };
        let message_indexes = message_index_path(&target);

        Ok(Self {
            raw: proto_content.to_string(),
            pool,
            file,
            target,
            message_indexes,
        })
    }

    /// Same schema, different target message.
    pub fn select(&self, message_name: &str) -> ProtobufResult<Self> {
        let target = find_message(&self.file, message_name)?;
        Ok(Self {
            message_indexes: message_index_path(&target),
            target,
            ..self.clone()
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn package(&self) -> Option<&str> {
        Some(self.file.package_name()).filter(|p| !p.is_empty())
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Fully-qualified names of the messages declared at file level.
    pub fn top_level_messages(&self) -> Vec<String> {
        self.file
            .messages()
            .map(|m| m.full_name().to_string())
            .collect()
    }

    /// The target message descriptor.
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.target
    }

    /// Path of the target message within the file, outermost first.
    pub fn message_indexes(&self) -> &[i32] {
        &self.message_indexes
    }

    /// Look up a message by its index path, as carried in a wire frame.
    pub fn message_by_indexes(&self, indexes: &[i32]) -> Option<MessageDescriptor> {
        let (first, rest) = indexes.split_first()?;
        let mut current = self.file.messages().nth(usize::try_from(*first).ok()?)?;
        for index in rest {
            let child = current.child_messages().nth(usize::try_from(*index).ok()?)?;
            current = child;
        }
        Some(current)
    }
}

fn find_message(file: &FileDescriptor, name: &str) -> ProtobufResult<MessageDescriptor> {
    let pool = file.parent_pool();
    let name = name.trim_start_matches('.');
    let package = file.package_name();

    let qualified = if package.is_empty() {
        None
    } else {
        Some(format!("{}.{}", package, name))
    };

    qualified
        .as_deref()
        .and_then(|q| pool.get_message_by_name(q))
        .or_else(|| pool.get_message_by_name(name))
        .filter(|m| m.parent_file() == *file)
        .or_else(|| file.messages().find(|m| m.name() == name))
        .ok_or_else(|| ProtobufError::MessageNotFound(name.to_string()))
}

fn message_index_path(message: &MessageDescriptor) -> Vec<i32> {
    let file = message.parent_file();
    let mut path = Vec::new();
    let mut current = message.clone();
    loop {
        let parent = current.parent_message();
        let index = match &parent {
            Some(p) => p.child_messages().position(|m| m == current),
            None => file.messages().position(|m| m == current),
        }
        .unwrap_or(0);
        path.push(i32::try_from(index).unwrap_or(i32::MAX));
        match parent {
            Some(p) => current = p,
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTO: &str = r#"
        syntax = "proto3";
        package cdc;

        message Key { int64 id = 1; }

        message Envelope {
            message Row {
                int64 id = 1;
                string first_name = 2;
            }
            message Source {
                string connector = 1;
                int64 txid = 2;
            }
            Row before = 1;
            Row after = 2;
            Source source = 3;
            string op = 4;
            int64 ts_ms = 5;
        }
    "#;

    #[test]
    fn test_first_message_is_default() {
        let schema = ProtobufSchema::parse(PROTO).unwrap();
        assert_eq!(schema.descriptor().full_name(), "cdc.Key");
        assert_eq!(schema.message_indexes(), &[0]);
        assert_eq!(schema.package(), Some("cdc"));
        assert_eq!(schema.top_level_messages(), vec!["cdc.Key", "cdc.Envelope"]);
    }

    #[test]
    fn test_select_by_name() {
        let schema = ProtobufSchema::parse_with_target(PROTO, Some("Envelope")).unwrap();
        assert_eq!(schema.descriptor().full_name(), "cdc.Envelope");
        assert_eq!(schema.message_indexes(), &[1]);

        let nested = schema.select("cdc.Envelope.Source").unwrap();
        assert_eq!(nested.message_indexes(), &[1, 1]);
        assert_eq!(
            nested.message_by_indexes(&[1, 1]).unwrap().full_name(),
            "cdc.Envelope.Source"
        );

        assert!(matches!(
            schema.select("Nope"),
            Err(ProtobufError::MessageNotFound(_))
        ));
    }

    #[test]
    fn test_field_json_names() {
        let schema = ProtobufSchema::parse_with_target(PROTO, Some("Envelope")).unwrap();
        let field = schema.descriptor().get_field_by_name("ts_ms").unwrap();
        assert_eq!(field.json_name(), "tsMs");
    }

    #[test]
    fn test_well_known_import() {
        let schema = ProtobufSchema::parse(
            r#"
            syntax = "proto3";
            import "google/protobuf/timestamp.proto";
            message Event { google.protobuf.Timestamp at = 1; }
            "#,
        )
        .unwrap();
        assert!(schema.package().is_none());
        assert!(schema.descriptor().get_field_by_name("at").is_some());
    }

    #[test]
    fn test_fully_qualified_field_types() {
        let schema = ProtobufSchema::parse_with_target(
            r#"
            syntax = "proto3";
            package cdc;
            import "google/protobuf/timestamp.proto";
            message Envelope {
                message Row { int64 id = 1; }
                .cdc.Envelope.Row after = 2;
                repeated .cdc.Envelope.Row history = 3;
                .google.protobuf.Timestamp ts = 4;
            }
            "#,
            Some("Envelope"),
        )
        .unwrap();

        let after = schema.descriptor().get_field_by_name("after").unwrap();
        match after.kind() {
            prost_reflect::Kind::Message(row) => assert_eq!(row.full_name(), "cdc.Envelope.Row"),
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(schema.descriptor().get_field_by_name("history").unwrap().is_list());
        let ts = schema.descriptor().get_field_by_name("ts").unwrap();
        assert!(matches!(
            ts.kind(),
            prost_reflect::Kind::Message(m) if m.full_name() == "google.protobuf.Timestamp"
        ));
    }

    #[test]
    fn test_empty_schema() {
        assert!(matches!(
            ProtobufSchema::parse("syntax = \"proto3\";"),
            Err(ProtobufError::NoMessages)
        ));
    }
}
