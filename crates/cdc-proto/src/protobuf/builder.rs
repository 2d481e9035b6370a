//! JSON tree to `DynamicMessage`
//!
//! The descriptor is the authority. Each object key is matched against a
//! field by proto name, then by JSON name; keys without a field are
//! ignored so that extra upstream metadata never breaks a record. A JSON
//! `null` leaves its field unset.
//!
//! Values are coerced following the proto3 JSON mapping. String fields
//! also take numbers and booleans in their textual form. Objects and arrays
//! never coerce to a scalar, and bytes fields only take base64 text.

use std::collections::HashMap;
use std::str::FromStr;

use base64::Engine;
use bytes::Bytes;
use chrono::DateTime;
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, ReflectMessage, Value,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};

use super::{ProtobufError, ProtobufResult};

/// Build a message of type `descriptor` from a JSON object.
///
/// Any value that cannot be coerced fails the whole message; nothing is
/// returned half-populated.
pub fn build_message(tree: &JsonValue, descriptor: &MessageDescriptor) -> ProtobufResult<DynamicMessage> {
    to_message(tree, descriptor, "")
}

fn to_message(json: &JsonValue, desc: &MessageDescriptor, path: &str) -> ProtobufResult<DynamicMessage> {
    if let Some(msg) = well_known(json, desc, path)? {
        return Ok(msg);
    }
    match json {
        JsonValue::Object(obj) => merge_object(obj, desc, path),
        other => Err(mismatch(path, desc.full_name(), other)),
    }
}

fn merge_object(
    obj: &Map<String, JsonValue>,
    desc: &MessageDescriptor,
    path: &str,
) -> ProtobufResult<DynamicMessage> {
    let mut msg = DynamicMessage::new(desc.clone());
    let mut oneofs_set: HashMap<String, String> = HashMap::new();

    for (key, value) in obj {
        let Some(field) = desc
            .get_field_by_name(key)
            .or_else(|| desc.get_field_by_json_name(key))
        else {
            tracing::trace!(message = %desc.full_name(), field = %key, "Ignoring unknown field");
            continue;
        };
        if value.is_null() {
            continue;
        }

        let field_path = join_path(path, key);
        // proto3 `optional` fields sit in a synthetic oneof of their own
        let real_oneof = field
            .containing_oneof()
            .filter(|_| !field.field_descriptor_proto().proto3_optional());
        if let Some(oneof) = real_oneof {
            if let Some(previous) = oneofs_set.insert(oneof.name().to_string(), key.clone()) {
                return Err(ProtobufError::coercion(
                    &field_path,
                    format!("oneof '{}' already set by '{}'", oneof.name(), previous),
                ));
            }
        }

        let proto_value = to_field_value(value, &field, &field_path)?;
        msg.try_set_field(&field, proto_value)
            .map_err(|e| ProtobufError::coercion(&field_path, e.to_string()))?;
    }

    Ok(msg)
}

fn to_field_value(json: &JsonValue, field: &FieldDescriptor, path: &str) -> ProtobufResult<Value> {
    if field.is_map() {
        let Kind::Message(entry) = field.kind() else {
            return Err(ProtobufError::coercion(path, "map field without entry type"));
        };
        let JsonValue::Object(obj) = json else {
            return Err(mismatch(path, "object", json));
        };
        let key_kind = entry.map_entry_key_field().kind();
        let value_kind = entry.map_entry_value_field().kind();

        let mut map = HashMap::with_capacity(obj.len());
        for (k, v) in obj {
            let entry_path = join_path(path, k);
            if v.is_null() && !is_value_kind(&value_kind) {
                return Err(ProtobufError::coercion(&entry_path, "null map value"));
            }
            map.insert(
                to_map_key(k, &key_kind, &entry_path)?,
                to_single_value(v, &value_kind, &entry_path)?,
            );
        }
        return Ok(Value::Map(map));
    }

    if field.is_list() {
        let JsonValue::Array(items) = json else {
            return Err(mismatch(path, "array", json));
        };
        let kind = field.kind();
        let values = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let item_path = format!("{path}[{i}]");
                if item.is_null() && !is_value_kind(&kind) {
                    return Err(ProtobufError::coercion(&item_path, "null list element"));
                }
                to_single_value(item, &kind, &item_path)
            })
            .collect::<ProtobufResult<Vec<_>>>()?;
        return Ok(Value::List(values));
    }

    to_single_value(json, &field.kind(), path)
}

fn to_single_value(json: &JsonValue, kind: &Kind, path: &str) -> ProtobufResult<Value> {
    Ok(match kind {
        Kind::Double => Value::F64(float(json).ok_or_else(|| mismatch(path, "double", json))?),
        Kind::Float => {
            let v = float(json).ok_or_else(|| mismatch(path, "float", json))?;
            let narrowed = v as f32;
            if v.is_finite() && !narrowed.is_finite() {
                return Err(ProtobufError::coercion(path, format!("{v} is out of float range")));
            }
            Value::F32(narrowed)
        }
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Value::I32(ranged(json, path, "int32")?),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Value::I64(ranged(json, path, "int64")?),
        Kind::Uint32 | Kind::Fixed32 => Value::U32(ranged(json, path, "uint32")?),
        Kind::Uint64 | Kind::Fixed64 => Value::U64(ranged(json, path, "uint64")?),
        Kind::Bool => Value::Bool(match json {
            JsonValue::Bool(b) => *b,
            JsonValue::String(s) if s == "true" => true,
            JsonValue::String(s) if s == "false" => false,
            other => return Err(mismatch(path, "bool", other)),
        }),
        Kind::String => Value::String(match json {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            other => return Err(mismatch(path, "string", other)),
        }),
        Kind::Bytes => {
            let JsonValue::String(text) = json else {
                return Err(mismatch(path, "base64 string", json));
            };
            Value::Bytes(decode_base64(text).ok_or_else(|| {
                ProtobufError::coercion(path, format!("'{text}' is not valid base64"))
            })?)
        }
        Kind::Enum(enum_desc) => match json {
            JsonValue::String(s) => {
                let value = enum_desc.get_value_by_name(s).ok_or_else(|| {
                    ProtobufError::coercion(
                        path,
                        format!("unknown value '{}' for enum {}", s, enum_desc.full_name()),
                    )
                })?;
                Value::EnumNumber(value.number())
            }
            JsonValue::Number(_) => Value::EnumNumber(ranged(json, path, "enum")?),
            other => return Err(mismatch(path, "enum name or number", other)),
        },
        Kind::Message(desc) => Value::Message(to_message(json, desc, path)?),
    })
}

/// `google.protobuf.Value` is the one message kind that maps JSON `null`.
fn is_value_kind(kind: &Kind) -> bool {
    matches!(kind, Kind::Message(m) if m.full_name() == "google.protobuf.Value")
}

fn to_map_key(key: &str, kind: &Kind, path: &str) -> ProtobufResult<MapKey> {
    let json = JsonValue::String(key.to_string());
    Ok(match kind {
        Kind::String => MapKey::String(key.to_string()),
        Kind::Bool => match key {
            "true" => MapKey::Bool(true),
            "false" => MapKey::Bool(false),
            _ => return Err(mismatch(path, "bool map key", &json)),
        },
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => MapKey::I32(ranged(&json, path, "int32")?),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => MapKey::I64(ranged(&json, path, "int64")?),
        Kind::Uint32 | Kind::Fixed32 => MapKey::U32(ranged(&json, path, "uint32")?),
        Kind::Uint64 | Kind::Fixed64 => MapKey::U64(ranged(&json, path, "uint64")?),
        _ => return Err(ProtobufError::coercion(path, "unsupported map key type")),
    })
}

/// Well-known types with a non-object JSON form.
fn well_known(
    json: &JsonValue,
    desc: &MessageDescriptor,
    path: &str,
) -> ProtobufResult<Option<DynamicMessage>> {
    let name = desc.full_name();
    match (name, json) {
        ("google.protobuf.Timestamp", JsonValue::String(s)) => {
            let ts = DateTime::parse_from_rfc3339(s).map_err(|e| {
                ProtobufError::coercion(path, format!("'{s}' is not an RFC 3339 timestamp: {e}"))
            })?;
            let mut msg = DynamicMessage::new(desc.clone());
            set(&mut msg, "seconds", Value::I64(ts.timestamp()), path)?;
            set(&mut msg, "nanos", Value::I32(subsec_nanos(ts.timestamp_subsec_nanos())), path)?;
            Ok(Some(msg))
        }
        ("google.protobuf.Duration", JsonValue::String(s)) => {
            let (seconds, nanos) = parse_duration(s).ok_or_else(|| {
                ProtobufError::coercion(path, format!("'{s}' is not a duration"))
            })?;
            let mut msg = DynamicMessage::new(desc.clone());
            set(&mut msg, "seconds", Value::I64(seconds), path)?;
            set(&mut msg, "nanos", Value::I32(nanos), path)?;
            Ok(Some(msg))
        }
        ("google.protobuf.Value", _) => Ok(Some(struct_value(json, desc, path)?)),
        ("google.protobuf.Struct", JsonValue::Object(obj)) => Ok(Some(struct_message(obj, desc, path)?)),
        ("google.protobuf.ListValue", JsonValue::Array(items)) => {
            Ok(Some(list_value(items, desc, path)?))
        }
        (
            "google.protobuf.DoubleValue"
            | "google.protobuf.FloatValue"
            | "google.protobuf.Int64Value"
            | "google.protobuf.UInt64Value"
            | "google.protobuf.Int32Value"
            | "google.protobuf.UInt32Value"
            | "google.protobuf.BoolValue"
            | "google.protobuf.StringValue"
            | "google.protobuf.BytesValue",
            v,
        ) if !v.is_object() => {
            let field = desc
                .get_field_by_name("value")
                .ok_or_else(|| ProtobufError::coercion(path, format!("{name} has no value field")))?;
            let value = to_single_value(v, &field.kind(), path)?;
            let mut msg = DynamicMessage::new(desc.clone());
            msg.try_set_field(&field, value)
                .map_err(|e| ProtobufError::coercion(path, e.to_string()))?;
            Ok(Some(msg))
        }
        _ => Ok(None),
    }
}

fn struct_value(json: &JsonValue, desc: &MessageDescriptor, path: &str) -> ProtobufResult<DynamicMessage> {
    let mut msg = DynamicMessage::new(desc.clone());
    match json {
        JsonValue::Null => set(&mut msg, "null_value", Value::EnumNumber(0), path)?,
        JsonValue::Bool(b) => set(&mut msg, "bool_value", Value::Bool(*b), path)?,
        JsonValue::Number(_) => {
            let n = float(json).ok_or_else(|| mismatch(path, "number", json))?;
            set(&mut msg, "number_value", Value::F64(n), path)?
        }
        JsonValue::String(s) => set(&mut msg, "string_value", Value::String(s.clone()), path)?,
        JsonValue::Array(items) => {
            let list = list_value(items, &sibling(desc, "google.protobuf.ListValue", path)?, path)?;
            set(&mut msg, "list_value", Value::Message(list), path)?
        }
        JsonValue::Object(obj) => {
            let inner = struct_message(obj, &sibling(desc, "google.protobuf.Struct", path)?, path)?;
            set(&mut msg, "struct_value", Value::Message(inner), path)?
        }
    }
    Ok(msg)
}

fn struct_message(
    obj: &Map<String, JsonValue>,
    desc: &MessageDescriptor,
    path: &str,
) -> ProtobufResult<DynamicMessage> {
    let value_desc = sibling(desc, "google.protobuf.Value", path)?;
    let mut fields = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        let entry = struct_value(v, &value_desc, &join_path(path, k))?;
        fields.insert(MapKey::String(k.clone()), Value::Message(entry));
    }
    let mut msg = DynamicMessage::new(desc.clone());
    set(&mut msg, "fields", Value::Map(fields), path)?;
    Ok(msg)
}

fn list_value(items: &[JsonValue], desc: &MessageDescriptor, path: &str) -> ProtobufResult<DynamicMessage> {
    let value_desc = sibling(desc, "google.protobuf.Value", path)?;
    let values = items
        .iter()
        .enumerate()
        .map(|(i, item)| struct_value(item, &value_desc, &format!("{path}[{i}]")).map(Value::Message))
        .collect::<ProtobufResult<Vec<_>>>()?;
    let mut msg = DynamicMessage::new(desc.clone());
    set(&mut msg, "values", Value::List(values), path)?;
    Ok(msg)
}

fn sibling(desc: &MessageDescriptor, name: &str, path: &str) -> ProtobufResult<MessageDescriptor> {
    desc.parent_pool()
        .get_message_by_name(name)
        .ok_or_else(|| ProtobufError::coercion(path, format!("{name} is not in the pool")))
}

fn set(msg: &mut DynamicMessage, name: &str, value: Value, path: &str) -> ProtobufResult<()> {
    let field = msg
        .descriptor()
        .get_field_by_name(name)
        .ok_or_else(|| ProtobufError::coercion(path, format!("no field '{name}'")))?;
    msg.try_set_field(&field, value)
        .map_err(|e| ProtobufError::coercion(path, e.to_string()))
}

/// Integral value of a JSON number or numeric string, range-checked
/// against the target width.
fn ranged<T: TryFrom<i128>>(json: &JsonValue, path: &str, expected: &str) -> ProtobufResult<T> {
    let value = integer(json).ok_or_else(|| mismatch(path, expected, json))?;
    T::try_from(value)
        .map_err(|_| ProtobufError::coercion(path, format!("{value} is out of range for {expected}")))
}

fn integer(json: &JsonValue) -> Option<i128> {
    let text = match json {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if let Ok(i) = text.parse::<i128>() {
        return Some(i);
    }
    let d = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;
    if d.fract().is_zero() {
        d.to_i128()
    } else {
        None
    }
}

fn float(json: &JsonValue) -> Option<f64> {
    match json {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.trim().parse().ok(),
        },
        _ => None,
    }
}

fn decode_base64(text: &str) -> Option<Bytes> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
    [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
        .map(Bytes::from)
}

/// `"1.5s"` to seconds and nanos with matching signs.
fn parse_duration(text: &str) -> Option<(i64, i32)> {
    let d = Decimal::from_str(text.strip_suffix('s')?).ok()?;
    let seconds = d.trunc();
    let nanos = ((d - seconds) * Decimal::from(1_000_000_000)).trunc();
    Some((seconds.to_i64()?, nanos.to_i32()?))
}

fn subsec_nanos(nanos: u32) -> i32 {
    // chrono reports leap seconds as nanos >= 1e9
    i32::try_from(nanos.min(999_999_999)).unwrap_or(0)
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn json_type(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &str, got: &JsonValue) -> ProtobufError {
    let field = if path.is_empty() { "<root>" } else { path };
    ProtobufError::coercion(field, format!("expected {expected}, got {}", json_type(got)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protobuf::ProtobufSchema;
    use serde_json::json;

    const PROTO: &str = r#"
        syntax = "proto3";
        package test;
        import "google/protobuf/timestamp.proto";
        import "google/protobuf/wrappers.proto";
        import "google/protobuf/struct.proto";

        enum Status { STATUS_UNSPECIFIED = 0; ACTIVE = 1; }

        message Record {
            message Inner { int32 n = 1; }
            int32 small = 1;
            int64 big = 2;
            uint32 count = 3;
            double ratio = 4;
            float weight = 5;
            bool flag = 6;
            string name = 7;
            bytes blob = 8;
            Status status = 9;
            Inner inner = 10;
            repeated int64 ids = 11;
            map<string, int32> scores = 12;
            google.protobuf.Timestamp at = 13;
            google.protobuf.StringValue label = 14;
            google.protobuf.Struct attrs = 15;
            oneof choice {
                string text = 16;
                int32 code = 17;
            }
            optional string note = 18;
            string first_name = 19;
            repeated string tags = 20;
            repeated google.protobuf.Value vs = 21;
            map<string, google.protobuf.Value> extras = 22;
        }
    "#;

    fn descriptor() -> MessageDescriptor {
        ProtobufSchema::parse_with_target(PROTO, Some("Record"))
            .unwrap()
            .descriptor()
            .clone()
    }

    fn get(msg: &DynamicMessage, name: &str) -> Value {
        msg.get_field_by_name(name).unwrap().into_owned()
    }

    #[test]
    fn test_scalars() {
        let msg = build_message(
            &json!({
                "small": 7,
                "big": "9007199254740993",
                "count": 3.0,
                "ratio": "NaN",
                "weight": 1.5,
                "flag": "true",
                "name": 42,
                "blob": "3q2+7w==",
                "status": "ACTIVE"
            }),
            &descriptor(),
        )
        .unwrap();

        assert_eq!(get(&msg, "small"), Value::I32(7));
        assert_eq!(get(&msg, "big"), Value::I64(9_007_199_254_740_993));
        assert_eq!(get(&msg, "count"), Value::U32(3));
        assert!(get(&msg, "ratio").as_f64().unwrap().is_nan());
        assert_eq!(get(&msg, "weight"), Value::F32(1.5));
        assert_eq!(get(&msg, "flag"), Value::Bool(true));
        assert_eq!(get(&msg, "name"), Value::String("42".into()));
        assert_eq!(get(&msg, "blob"), Value::Bytes(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef])));
        assert_eq!(get(&msg, "status"), Value::EnumNumber(1));
    }

    #[test]
    fn test_unknown_and_null_fields() {
        let msg = build_message(
            &json!({ "small": 1, "not_in_schema": { "x": 1 }, "name": null }),
            &descriptor(),
        )
        .unwrap();
        assert_eq!(get(&msg, "small"), Value::I32(1));
        assert!(!msg.has_field_by_name("name"));
    }

    #[test]
    fn test_json_name_lookup() {
        let msg = build_message(&json!({ "firstName": "Sally" }), &descriptor()).unwrap();
        assert_eq!(get(&msg, "first_name"), Value::String("Sally".into()));
    }

    #[test]
    fn test_nested_repeated_and_map() {
        let msg = build_message(
            &json!({
                "inner": { "n": 5 },
                "ids": [1, 2, 3],
                "scores": { "a": 1, "b": 2 }
            }),
            &descriptor(),
        )
        .unwrap();

        let inner = get(&msg, "inner");
        let inner = inner.as_message().unwrap();
        assert_eq!(get(inner, "n"), Value::I32(5));
        assert_eq!(get(&msg, "ids").as_list().unwrap().len(), 3);
        let scores = get(&msg, "scores");
        let scores = scores.as_map().unwrap();
        assert_eq!(scores.get(&MapKey::String("b".into())), Some(&Value::I32(2)));
    }

    #[test]
    fn test_well_known_types() {
        let msg = build_message(
            &json!({
                "at": "2023-10-02T19:07:27.694+00:00",
                "label": "hello",
                "attrs": { "k": [1, "two", null, { "deep": true }] }
            }),
            &descriptor(),
        )
        .unwrap();

        let at = get(&msg, "at");
        let at = at.as_message().unwrap();
        assert_eq!(get(at, "seconds"), Value::I64(1_696_273_647));
        assert_eq!(get(at, "nanos"), Value::I32(694_000_000));

        let label = get(&msg, "label");
        assert_eq!(get(label.as_message().unwrap(), "value"), Value::String("hello".into()));
        assert!(msg.has_field_by_name("attrs"));
        assert_eq!(msg.descriptor().full_name(), "test.Record");
    }

    #[test]
    fn test_coercion_errors() {
        let desc = descriptor();

        let err = build_message(&json!({ "small": "abc" }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { ref field, .. } if field == "small"));

        let err = build_message(&json!({ "small": 3_000_000_000i64 }), &desc).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let err = build_message(&json!({ "count": -1 }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { .. }));

        let err = build_message(&json!({ "inner": { "n": 1.5 } }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { ref field, .. } if field == "inner.n"));

        let err = build_message(&json!({ "ids": [1, "x"] }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { ref field, .. } if field == "ids[1]"));

        assert!(build_message(&json!({ "status": "GONE" }), &desc).is_err());
        assert!(build_message(&json!({ "flag": 1 }), &desc).is_err());
        assert!(build_message(&json!([1, 2]), &desc).is_err());
    }

    #[test]
    fn test_structured_values_do_not_coerce_to_scalars() {
        let desc = descriptor();

        let err = build_message(&json!({ "name": { "a": 1 } }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { ref field, .. } if field == "name"));

        let err = build_message(&json!({ "name": [1, 2] }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { ref field, .. } if field == "name"));

        let err = build_message(&json!({ "tags": ["ok", { "x": true }] }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { ref field, .. } if field == "tags[1]"));

        let err = build_message(&json!({ "blob": 1234 }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { ref field, .. } if field == "blob"));

        let msg = build_message(&json!({ "name": true, "tags": [1, false] }), &desc).unwrap();
        assert_eq!(get(&msg, "name"), Value::String("true".into()));
        assert_eq!(
            get(&msg, "tags"),
            Value::List(vec![Value::String("1".into()), Value::String("false".into())])
        );
    }

    #[test]
    fn test_null_inside_dynamic_values() {
        let desc = descriptor();
        let msg = build_message(
            &json!({ "vs": [1, null], "extras": { "gone": null, "n": 2 } }),
            &desc,
        )
        .unwrap();

        let vs = get(&msg, "vs");
        let vs = vs.as_list().unwrap();
        assert_eq!(vs.len(), 2);
        let second = vs[1].as_message().unwrap();
        assert!(second.has_field_by_name("null_value"));
        assert!(!second.has_field_by_name("number_value"));

        let extras = get(&msg, "extras");
        let gone = &extras.as_map().unwrap()[&MapKey::String("gone".into())];
        assert!(gone.as_message().unwrap().has_field_by_name("null_value"));

        // other element kinds still reject null
        let err = build_message(&json!({ "ids": [1, null] }), &desc).unwrap_err();
        assert!(matches!(err, ProtobufError::Coercion { ref field, .. } if field == "ids[1]"));
        assert!(build_message(&json!({ "scores": { "a": null } }), &desc).is_err());
    }

    #[test]
    fn test_oneof_conflict() {
        let desc = descriptor();
        assert!(build_message(&json!({ "text": "a" }), &desc).is_ok());
        let err = build_message(&json!({ "text": "a", "code": 1 }), &desc).unwrap_err();
        assert!(err.to_string().contains("oneof 'choice'"));

        // proto3 optional fields sit in synthetic oneofs and never conflict
        assert!(build_message(&json!({ "note": "n", "text": "a" }), &desc).is_ok());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(integer(&json!("12")), Some(12));
        assert_eq!(integer(&json!(1e3)), Some(1000));
        assert_eq!(integer(&json!(1.5)), None);
        assert_eq!(parse_duration("1.5s"), Some((1, 500_000_000)));
        assert_eq!(parse_duration("-0.25s"), Some((0, -250_000_000)));
        assert!(parse_duration("10m").is_none());
        assert_eq!(decode_base64("3q2-7w").as_deref(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
    }
}
