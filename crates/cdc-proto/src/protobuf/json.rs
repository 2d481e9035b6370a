//! `DynamicMessage` back to JSON, for inspecting decoded frames.

use base64::Engine;
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MapKey, ReflectMessage, Value};
use serde_json::{Map, Number, Value as JsonValue};

/// Render a message with proto field names. Unset singular fields are
/// omitted; enums are written by name when the number is known.
pub fn message_to_json(msg: &DynamicMessage) -> JsonValue {
    let mut obj = Map::new();
    for field in msg.descriptor().fields() {
        if msg.has_field(&field) || field.is_list() || field.is_map() {
            let value = msg.get_field(&field);
            obj.insert(field.name().to_string(), value_to_json(&value, &field));
        }
    }
    JsonValue::Object(obj)
}

fn value_to_json(value: &Value, field: &FieldDescriptor) -> JsonValue {
    match value {
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::I32(v) => JsonValue::Number((*v).into()),
        Value::I64(v) => JsonValue::Number((*v).into()),
        Value::U32(v) => JsonValue::Number((*v).into()),
        Value::U64(v) => JsonValue::Number((*v).into()),
        Value::F32(v) => float_to_json(f64::from(*v)),
        Value::F64(v) => float_to_json(*v),
        Value::String(v) => JsonValue::String(v.clone()),
        Value::Bytes(v) => JsonValue::String(base64::engine::general_purpose::STANDARD.encode(v)),
        Value::EnumNumber(v) => {
            let name = match field.kind() {
                Kind::Enum(enum_desc) => enum_desc.get_value(*v).map(|ev| ev.name().to_string()),
                _ => None,
            };
            name.map(JsonValue::String)
                .unwrap_or_else(|| JsonValue::Number((*v).into()))
        }
        Value::Message(m) => message_to_json(m),
        Value::List(items) => {
            JsonValue::Array(items.iter().map(|item| value_to_json(item, field)).collect())
        }
        Value::Map(map) => {
            let value_field = match field.kind() {
                Kind::Message(entry) => Some(entry.map_entry_value_field()),
                _ => None,
            };
            let mut obj = Map::new();
            for (k, v) in map {
                let key = match k {
                    MapKey::Bool(b) => b.to_string(),
                    MapKey::I32(i) => i.to_string(),
                    MapKey::I64(i) => i.to_string(),
                    MapKey::U32(u) => u.to_string(),
                    MapKey::U64(u) => u.to_string(),
                    MapKey::String(s) => s.clone(),
                };
                obj.insert(key, value_to_json(v, value_field.as_ref().unwrap_or(field)));
            }
            JsonValue::Object(obj)
        }
    }
}

/// Non-finite floats use the proto3 JSON string forms.
fn float_to_json(v: f64) -> JsonValue {
    match Number::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None if v.is_nan() => JsonValue::String("NaN".into()),
        None if v > 0.0 => JsonValue::String("Infinity".into()),
        None => JsonValue::String("-Infinity".into()),
    }
}
