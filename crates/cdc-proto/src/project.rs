//! Structured record to canonical JSON projection
//!
//! Projection runs in three passes over one record:
//!
//! 1. **Build**: every field is renamed with the configured
//!    [`CaseConversion`] and mapped to JSON. Fields whose projected name
//!    matches the [`DateRule`] are run through the date conversion instead
//!    of the default scalar mapping.
//! 2. **Skip**: each [`SkipRule`] removes one field from the object at its
//!    path. Paths that do not resolve to an object are ignored.
//! 3. **Inline**: every string leaf that parses as JSON is replaced by the
//!    parsed tree. Inlined trees are not scanned again.
//!
//! The projector holds no mutable state; the same record and rules always
//! produce the same tree.

use base64::Engine;
use serde_json::{Map, Number, Value as JsonValue};

use crate::config::ProjectionConfig;
use crate::error::ProjectionError;
use crate::record::{Struct, Value};
use crate::rules::{CaseConversion, DateRule, FieldRule, SkipRule};

/// Projects records to canonical JSON trees.
#[derive(Debug, Clone, Default)]
pub struct Projector {
    case: CaseConversion,
    skip: Vec<SkipRule>,
    date: DateRule,
}

impl Projector {
    pub fn new(config: &ProjectionConfig) -> Self {
        let mut projector = Self {
            case: config.case,
            ..Self::default()
        };
        for rule in config.rules() {
            match rule {
                FieldRule::Skip(skip) => projector.skip.push(skip),
                FieldRule::DateFormat(date) => projector.date = date,
            }
        }
        projector
    }

    pub fn skip_rules(&self) -> &[SkipRule] {
        &self.skip
    }

    /// Project a record into its canonical JSON tree.
    pub fn project(&self, record: &Struct) -> Result<JsonValue, ProjectionError> {
        let mut tree = JsonValue::Object(self.struct_to_json(record, "")?);
        self.apply_skip_rules(&mut tree);
        inline_json_strings(&mut tree);
        Ok(tree)
    }

    /// Project any value; only structs are accepted as records.
    pub fn project_value(&self, value: &Value) -> Result<JsonValue, ProjectionError> {
        match value {
            Value::Struct(s) => self.project(s),
            other => Err(ProjectionError::NotAStruct(other.type_name())),
        }
    }

    fn struct_to_json(
        &self,
        record: &Struct,
        parent: &str,
    ) -> Result<Map<String, JsonValue>, ProjectionError> {
        let mut node = Map::new();
        for (source_name, value) in record.fields() {
            let name = self.case.apply(source_name);
            let path = join_path(parent, &name);
            let json = match self.convert_date(&name, value) {
                Some(converted) => converted,
                None => self.value_to_json(value, &path)?,
            };
            node.insert(name, json);
        }
        Ok(node)
    }

    /// Date conversion only applies to integer values of matching fields.
    fn convert_date(&self, name: &str, value: &Value) -> Option<JsonValue> {
        if !self.date.matches(name) {
            return None;
        }
        let raw = match value {
            Value::Int(i) => *i,
            Value::UInt(u) => i64::try_from(*u).ok()?,
            _ => return None,
        };
        self.date.mode.convert(raw).map(JsonValue::String)
    }

    fn value_to_json(&self, value: &Value, path: &str) -> Result<JsonValue, ProjectionError> {
        Ok(match value {
            Value::Null => JsonValue::Null,
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::UInt(u) => JsonValue::Number((*u).into()),
            Value::Float(f) => JsonValue::Number(Number::from_f64(*f).ok_or_else(|| {
                ProjectionError::Unmappable {
                    field: path.to_string(),
                    reason: format!("non-finite float {f}"),
                }
            })?),
            Value::Decimal(d) => JsonValue::Number(decimal_to_number(d, path)?),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bytes(b) => {
                JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::Struct(s) => JsonValue::Object(self.struct_to_json(s, path)?),
            Value::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.value_to_json(item, &format!("{path}[{i}]")))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => {
                let mut obj = Map::new();
                for (key, item) in entries {
                    let key = map_key_to_string(key, path)?;
                    let json = self.value_to_json(item, &join_path(path, &key))?;
                    obj.insert(key, json);
                }
                JsonValue::Object(obj)
            }
        })
    }

    fn apply_skip_rules(&self, tree: &mut JsonValue) {
        for rule in &self.skip {
            let mut node = Some(&mut *tree);
            for segment in &rule.path {
                node = node.and_then(|n| n.get_mut(segment.as_str()));
            }
            if let Some(JsonValue::Object(obj)) = node {
                if obj.remove(&rule.field).is_some() {
                    tracing::trace!(rule = %rule, "Skipped field");
                }
            }
        }
    }
}

/// Replace string leaves that hold JSON with the parsed value.
///
/// Single pass: a freshly inlined subtree is not visited again, so a string
/// nested inside an inlined document stays a string.
pub fn inline_json_strings(node: &mut JsonValue) {
    match node {
        JsonValue::Object(obj) => obj.values_mut().for_each(inline_json_strings),
        JsonValue::Array(items) => items.iter_mut().for_each(inline_json_strings),
        JsonValue::String(text) => {
            if let Ok(parsed) = serde_json::from_str::<JsonValue>(text) {
                *node = parsed;
            }
        }
        _ => {}
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn decimal_to_number(d: &rust_decimal::Decimal, path: &str) -> Result<Number, ProjectionError> {
    serde_json::from_str::<Number>(&d.normalize().to_string()).map_err(|e| {
        ProjectionError::Unmappable {
            field: path.to_string(),
            reason: format!("decimal {d}: {e}"),
        }
    })
}

fn map_key_to_string(key: &Value, path: &str) -> Result<String, ProjectionError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::UInt(u) => Ok(u.to_string()),
        Value::Decimal(d) => Ok(d.to_string()),
        Value::Float(f) if f.is_finite() => Ok(f.to_string()),
        other => Err(ProjectionError::Unmappable {
            field: path.to_string(),
            reason: format!("map key of type {} has no JSON form", other.type_name()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::DateConversion;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn projector(skip: &str) -> Projector {
        Projector::new(&ProjectionConfig {
            case: CaseConversion::LowerCamel,
            skip: SkipRule::parse_list("skip", skip).unwrap(),
            date: DateRule::default(),
        })
    }

    fn cdc_record() -> Struct {
        let row = Struct::new()
            .with("id", 1001)
            .with("first_name", "Sally")
            .with("last_name", "Thomas");
        let source = Struct::new()
            .with("version", "2.4.0.Beta2")
            .with("connector", "postgresql")
            .with("ts_ms", 1_695_335_029_254i64)
            .with("txid", 869)
            .with("lsn", 35_492_272i64)
            .with("xmin", Value::Null);
        Struct::new()
            .with("before", Value::Null)
            .with("after", row)
            .with("source", source)
            .with("op", "u")
            .with("ts_ms", 1_695_335_328_950i64)
            .with("transaction", Value::Null)
    }

    #[test]
    fn test_camel_case_rename() {
        let tree = projector("").project(&cdc_record()).unwrap();
        assert_eq!(tree["after"]["firstName"], "Sally");
        assert_eq!(tree["tsMs"], 1_695_335_328_950i64);
        assert!(tree.get("ts_ms").is_none());
        assert_eq!(tree["source"]["tsMs"], 1_695_335_029_254i64);
    }

    #[test]
    fn test_null_is_explicit() {
        let tree = projector("").project(&cdc_record()).unwrap();
        assert!(tree.as_object().unwrap().contains_key("before"));
        assert!(tree["before"].is_null());
    }

    #[test]
    fn test_skip_nested_leaf() {
        let tree = projector("source.txid").project(&cdc_record()).unwrap();
        let source = tree["source"].as_object().unwrap();
        assert!(!source.contains_key("txid"));
        assert!(source.contains_key("lsn"));
        assert!(source.contains_key("connector"));
        assert_eq!(tree["op"], "u");
    }

    #[test]
    fn test_skip_root_and_missing_paths() {
        let tree = projector("transaction,missing.field,op.inner,source.nope")
            .project(&cdc_record())
            .unwrap();
        assert!(tree.get("transaction").is_none());
        assert_eq!(tree["op"], "u");
        assert_eq!(tree["source"].as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_skip_through_null_parent() {
        // "before" is null: not an object, so the rule is a no-op
        let tree = projector("before.id").project(&cdc_record()).unwrap();
        assert!(tree["before"].is_null());
    }

    #[test]
    fn test_projection_is_deterministic() {
        let p = projector("source.txid");
        let record = cdc_record();
        let first = p.project(&record).unwrap();
        for _ in 0..5 {
            assert_eq!(p.project(&record).unwrap(), first);
        }
    }

    #[test]
    fn test_date_conversion() {
        let p = Projector::new(&ProjectionConfig {
            case: CaseConversion::LowerCamel,
            skip: Vec::new(),
            date: DateRule {
                mode: DateConversion::MicrosToRfc3339,
                prefix: Some("date".into()),
                suffix: None,
            },
        });
        let record = Struct::new()
            .with("date_created", 1_696_273_647_694_046i64)
            .with("date_note", "not a number")
            .with("id", 1_696_273_647_694_046i64);
        let tree = p.project(&record).unwrap();
        assert_eq!(tree["dateCreated"], "2023-10-02T19:07:27.694+00:00");
        assert_eq!(tree["dateNote"], "not a number");
        assert_eq!(tree["id"], 1_696_273_647_694_046i64);
    }

    #[test]
    fn test_nested_json_strings() {
        let record = Struct::new()
            .with("payload", r#"{"a":1,"b":"{\"c\":2}"}"#)
            .with("plain", "hello")
            .with("list", Value::Array(vec![Value::from("[1,2]"), Value::from("x")]));
        let tree = projector("").project(&record).unwrap();

        assert_eq!(tree["payload"]["a"], 1);
        // single pass: the inner document is left as text
        assert_eq!(tree["payload"]["b"], r#"{"c":2}"#);
        assert_eq!(tree["plain"], "hello");
        assert_eq!(tree["list"], json!([[1, 2], "x"]));
    }

    #[test]
    fn test_scalar_mapping() {
        let record = Struct::new()
            .with("small", 7i8)
            .with("big", u64::MAX)
            .with("ratio", 0.5f64)
            .with("price", Decimal::from_str("12.30").unwrap())
            .with("flag", true)
            .with("raw", vec![0xde_u8, 0xad, 0xbe, 0xef]);
        let tree = projector("").project(&record).unwrap();

        assert_eq!(tree["small"], 7);
        assert_eq!(tree["big"].as_u64(), Some(u64::MAX));
        assert_eq!(tree["ratio"].as_f64(), Some(0.5));
        assert_eq!(tree["price"].as_f64(), Some(12.3));
        assert_eq!(tree["flag"], true);
        assert_eq!(tree["raw"], "3q2+7w==");
    }

    #[test]
    fn test_map_values() {
        let record = Struct::new().with(
            "attrs",
            Value::Map(vec![
                (Value::from("color"), Value::from("red")),
                (Value::Int(3), Value::Boolean(true)),
            ]),
        );
        let tree = projector("").project(&record).unwrap();
        assert_eq!(tree["attrs"], json!({"color": "red", "3": true}));
    }

    #[test]
    fn test_unmappable_values() {
        let record = Struct::new().with("bad", f64::NAN);
        let err = projector("").project(&record).unwrap_err();
        assert!(matches!(err, ProjectionError::Unmappable { ref field, .. } if field == "bad"));

        let record = Struct::new().with(
            "nested",
            Struct::new().with("m", Value::Map(vec![(Value::Null, Value::Int(1))])),
        );
        let err = projector("").project(&record).unwrap_err();
        assert!(matches!(err, ProjectionError::Unmappable { ref field, .. } if field == "nested.m"));

        assert!(projector("").project_value(&Value::Int(1)).is_err());
    }
}
