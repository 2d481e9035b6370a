//! Confluent wire format
//!
//! ```text
//! +-------+----------------+-----------------+------------------+
//! | 0x00  | schema id      | message indexes | protobuf payload |
//! | 1 B   | u32 big-endian | zig-zag varints | ...              |
//! +-------+----------------+-----------------+------------------+
//! ```
//!
//! Message indexes locate the encoded message inside its `.proto` file:
//! a count followed by one index per nesting level. The common case of the
//! first top-level message (`[0]`) is written as a single `0x00`.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost_reflect::prost::Message;
use prost_reflect::DynamicMessage;

use super::{ProtobufError, ProtobufResult, ProtobufSchema};
use crate::error::{ConverterError, Result};
use crate::registry::{CachedSchema, SchemaCache, Subject};

/// Leading byte of every framed record.
pub const MAGIC_BYTE: u8 = 0x00;

/// Frame an encoded message.
pub fn encode_framed(schema_id: u32, message_indexes: &[i32], message: &DynamicMessage) -> ProtobufResult<Bytes> {
    let mut buf = BytesMut::with_capacity(16 + message.encoded_len());
    buf.put_u8(MAGIC_BYTE);
    buf.put_u32(schema_id);
    write_message_indexes(message_indexes, &mut buf);
    message
        .encode(&mut buf)
        .map_err(|e| ProtobufError::Encode(e.to_string()))?;
    Ok(buf.freeze())
}

fn write_message_indexes(indexes: &[i32], buf: &mut BytesMut) {
    if indexes == [0] {
        buf.put_u8(0x00);
        return;
    }
    put_varint(zigzag(indexes.len() as i64), buf);
    for index in indexes {
        put_varint(zigzag(i64::from(*index)), buf);
    }
}

/// Parsed frame prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireHeader {
    pub schema_id: u32,
    pub message_indexes: Vec<i32>,
}

impl WireHeader {
    /// Split a frame into its header and the protobuf payload.
    pub fn parse(frame: &[u8]) -> ProtobufResult<(WireHeader, &[u8])> {
        if frame.len() < 6 {
            return Err(ProtobufError::InvalidWireFormat(format!(
                "frame of {} bytes is too short",
                frame.len()
            )));
        }

        let mut buf = frame;
        let magic = buf.get_u8();
        if magic != MAGIC_BYTE {
            return Err(ProtobufError::InvalidWireFormat(format!(
                "Invalid magic byte: expected 0x00, got 0x{:02x}",
                magic
            )));
        }
        let schema_id = buf.get_u32();

        let count = unzigzag(decode_varint(&mut buf)?);
        let message_indexes = if count == 0 {
            vec![0]
        } else {
            if count < 0 || count as usize > buf.remaining() {
                return Err(ProtobufError::InvalidWireFormat(format!(
                    "invalid message index count {}",
                    count
                )));
            }
            (0..count)
                .map(|_| {
                    let index = unzigzag(decode_varint(&mut buf)?);
                    i32::try_from(index).map_err(|_| {
                        ProtobufError::InvalidWireFormat(format!("message index {} out of range", index))
                    })
                })
                .collect::<ProtobufResult<Vec<_>>>()?
        };

        Ok((
            WireHeader {
                schema_id,
                message_indexes,
            },
            buf,
        ))
    }
}

/// Decode a frame with the message its indexes select in `schema`.
pub fn decode_framed(frame: &[u8], schema: &ProtobufSchema) -> ProtobufResult<(WireHeader, DynamicMessage)> {
    let (header, payload) = WireHeader::parse(frame)?;
    let descriptor = schema
        .message_by_indexes(&header.message_indexes)
        .ok_or_else(|| {
            ProtobufError::InvalidWireFormat(format!(
                "message indexes {:?} do not match the schema",
                header.message_indexes
            ))
        })?;
    let message = DynamicMessage::decode(descriptor, payload)
        .map_err(|e| ProtobufError::Decode(e.to_string()))?;
    Ok((header, message))
}

/// Frames messages using the schema id cached for their subject.
#[derive(Debug, Clone)]
pub struct WireSerializer {
    cache: Arc<SchemaCache>,
}

impl WireSerializer {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self { cache }
    }

    /// Frame `message` for `subject`.
    ///
    /// The subject must have been resolved first; a missing cache entry is
    /// an ordering error, not a recoverable one.
    pub fn serialize(&self, subject: &Subject, message: &DynamicMessage) -> Result<Bytes> {
        let entry = self
            .cache
            .get(subject)
            .ok_or_else(|| ConverterError::MissingSchema(subject.to_string()))?;
        Ok(Self::frame(&entry, message)?)
    }

    /// Frame `message` with an entry the caller already holds, so an
    /// eviction after resolution cannot fail the record.
    pub fn frame(entry: &CachedSchema, message: &DynamicMessage) -> ProtobufResult<Bytes> {
        encode_framed(
            entry.metadata.id.0,
            entry.schema.message_indexes(),
            message,
        )
    }
}

fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

fn put_varint(mut value: u64, buf: &mut BytesMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Returns an error if the varint exceeds 10 bytes or the buffer is exhausted.
fn decode_varint(buf: &mut &[u8]) -> ProtobufResult<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    for _ in 0..10 {
        if !buf.has_remaining() {
            return Err(ProtobufError::InvalidWireFormat("varint truncated".to_string()));
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(ProtobufError::InvalidWireFormat("varint too long".to_string()))
}
