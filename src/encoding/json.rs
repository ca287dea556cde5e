//! JSON message codec.
//!
//! Messages serialize to JSON text; the schema tree drives field order and
//! decode typing. Arrays map to JSON arrays, time/duration to
//! `{secs, nsecs}` objects.

use serde_json::{json, Map};

use crate::core::{CodecError, MessageValue, Result, Value};
use crate::encoding::MessageCodec;
use crate::schema::{FieldType, ParsedSchema, PrimitiveType, Schema};

/// JSON message codec.
#[derive(Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    fn to_json(
        &self,
        schema: &ParsedSchema,
        current: &Schema,
        msg: &MessageValue,
    ) -> Result<serde_json::Value> {
        let mut out = Map::new();
        for (name, field) in current.fields() {
            let value = msg.get(name).ok_or_else(|| {
                CodecError::encode(
                    "JSON",
                    format!("missing field '{name}' for {}", current.name),
                )
            })?;
            out.insert(name.to_string(), self.value_to_json(schema, &field.ty, value)?);
        }
        Ok(serde_json::Value::Object(out))
    }

    fn value_to_json(
        &self,
        schema: &ParsedSchema,
        ty: &FieldType,
        value: &Value,
    ) -> Result<serde_json::Value> {
        Ok(match (ty, value) {
            (FieldType::Primitive(PrimitiveType::Bool), Value::Bool(b)) => json!(b),
            (FieldType::Primitive(_), v) if v.is_numeric() => match v {
                Value::Float32(f) => json!(f),
                Value::Float64(f) => json!(f),
                Value::UInt64(u) => json!(u),
                other => json!(other.as_i64()),
            },
            (FieldType::Str { .. }, Value::String(s)) => json!(s),
            (FieldType::Time, Value::Time { secs, nsecs }) => {
                json!({"secs": secs, "nsecs": nsecs})
            }
            (FieldType::Duration, Value::Duration { secs, nsecs }) => {
                json!({"secs": secs, "nsecs": nsecs})
            }
            (
                FieldType::Array { element, .. } | FieldType::Sequence { element },
                Value::Array(items),
            ) => {
                let mut arr = Vec::with_capacity(items.len());
                for item in items {
                    arr.push(self.value_to_json(schema, element, item)?);
                }
                serde_json::Value::Array(arr)
            }
            (FieldType::Complex(name), Value::Struct(nested)) => {
                let sub = schema
                    .resolve(name)
                    .ok_or_else(|| CodecError::type_not_found(name.clone()))?
                    .clone();
                self.to_json(schema, &sub, nested)?
            }
            (ty, value) => {
                return Err(CodecError::encode(
                    "JSON",
                    format!("value {value} does not fit field type {ty:?}"),
                ))
            }
        })
    }

    fn from_json(
        &self,
        schema: &ParsedSchema,
        current: &Schema,
        json: &serde_json::Value,
    ) -> Result<MessageValue> {
        let obj = json.as_object().ok_or_else(|| {
            CodecError::encode("JSON", format!("expected object for {}", current.name))
        })?;
        let mut msg = MessageValue::new();
        for (name, field) in current.fields() {
            let raw = obj.get(name).ok_or_else(|| {
                CodecError::encode(
                    "JSON",
                    format!("missing field '{name}' for {}", current.name),
                )
            })?;
            msg.insert(name.to_string(), self.json_to_value(schema, &field.ty, raw)?);
        }
        Ok(msg)
    }

    fn json_to_value(
        &self,
        schema: &ParsedSchema,
        ty: &FieldType,
        raw: &serde_json::Value,
    ) -> Result<Value> {
        let bad = || CodecError::encode("JSON", format!("value {raw} does not fit {ty:?}"));
        Ok(match ty {
            FieldType::Primitive(prim) => match prim {
                PrimitiveType::Bool => Value::Bool(raw.as_bool().ok_or_else(bad)?),
                PrimitiveType::Int8 => Value::Int8(raw.as_i64().ok_or_else(bad)? as i8),
                PrimitiveType::UInt8 | PrimitiveType::Byte | PrimitiveType::Char => {
                    Value::UInt8(raw.as_u64().ok_or_else(bad)? as u8)
                }
                PrimitiveType::Int16 => Value::Int16(raw.as_i64().ok_or_else(bad)? as i16),
                PrimitiveType::UInt16 => Value::UInt16(raw.as_u64().ok_or_else(bad)? as u16),
                PrimitiveType::Int32 => Value::Int32(raw.as_i64().ok_or_else(bad)? as i32),
                PrimitiveType::UInt32 => Value::UInt32(raw.as_u64().ok_or_else(bad)? as u32),
                PrimitiveType::Int64 => Value::Int64(raw.as_i64().ok_or_else(bad)?),
                PrimitiveType::UInt64 => Value::UInt64(raw.as_u64().ok_or_else(bad)?),
                PrimitiveType::Float32 => Value::Float32(raw.as_f64().ok_or_else(bad)? as f32),
                PrimitiveType::Float64 => Value::Float64(raw.as_f64().ok_or_else(bad)?),
            },
            FieldType::Str { .. } => Value::String(raw.as_str().ok_or_else(bad)?.to_string()),
            FieldType::Time => {
                let obj = raw.as_object().ok_or_else(bad)?;
                Value::Time {
                    secs: obj.get("secs").and_then(|v| v.as_u64()).ok_or_else(bad)? as u32,
                    nsecs: obj.get("nsecs").and_then(|v| v.as_u64()).ok_or_else(bad)? as u32,
                }
            }
            FieldType::Duration => {
                let obj = raw.as_object().ok_or_else(bad)?;
                Value::Duration {
                    secs: obj.get("secs").and_then(|v| v.as_i64()).ok_or_else(bad)? as i32,
                    nsecs: obj.get("nsecs").and_then(|v| v.as_i64()).ok_or_else(bad)? as i32,
                }
            }
            FieldType::Array { element, .. } | FieldType::Sequence { element } => {
                let items = raw.as_array().ok_or_else(bad)?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.json_to_value(schema, element, item)?);
                }
                Value::Array(values)
            }
            FieldType::Complex(name) => {
                let sub = schema
                    .resolve(name)
                    .ok_or_else(|| CodecError::type_not_found(name.clone()))?
                    .clone();
                Value::Struct(self.from_json(schema, &sub, raw)?)
            }
        })
    }
}

impl MessageCodec for JsonCodec {
    fn encoding(&self) -> &'static str {
        "json"
    }

    fn serialize_message(&self, schema: &ParsedSchema, msg: &MessageValue) -> Result<Vec<u8>> {
        let json = self.to_json(schema, &schema.root, msg)?;
        serde_json::to_vec(&json).map_err(|e| CodecError::encode("JSON", e.to_string()))
    }

    fn deserialize_message(&self, schema: &ParsedSchema, data: &[u8]) -> Result<MessageValue> {
        let json: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| CodecError::encode("JSON", e.to_string()))?;
        self.from_json(schema, &schema.root, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_schema, Dialect};

    #[test]
    fn test_json_roundtrip() {
        let schema = parse_schema(
            "pkg/msg/T",
            "int32 count\nstring label\nfloat64[] data",
            Dialect::Ros2,
        )
        .unwrap();
        let codec = JsonCodec::new();
        let mut msg = MessageValue::new();
        msg.insert("count".into(), Value::Int32(-5));
        msg.insert("label".into(), Value::String("ok".into()));
        msg.insert(
            "data".into(),
            Value::Array(vec![Value::Float64(1.5), Value::Float64(2.5)]),
        );

        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"count\":-5"));
        assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
    }

    #[test]
    fn test_json_time_object() {
        let schema = parse_schema("pkg/T", "time stamp", Dialect::Ros1).unwrap();
        let codec = JsonCodec::new();
        let mut msg = MessageValue::new();
        msg.insert("stamp".into(), Value::Time { secs: 5, nsecs: 6 });
        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
    }

    #[test]
    fn test_json_nested() {
        let sep = "=".repeat(80);
        let text =
            format!("pkg/Inner inner\n{sep}\nMSG: pkg/Inner\nbool flag\n");
        let schema = parse_schema("pkg/msg/Outer", &text, Dialect::Ros2).unwrap();
        let codec = JsonCodec::new();
        let mut inner = MessageValue::new();
        inner.insert("flag".into(), Value::Bool(true));
        let mut msg = MessageValue::new();
        msg.insert("inner".into(), Value::Struct(inner));
        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
    }
}
