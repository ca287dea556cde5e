//! ROS1 <-> ROS2 translation.
//!
//! Messages: the walk is schema-driven. A field declared as the ROS1
//! `time`/`duration` primitive becomes a `builtin_interfaces/Time|Duration`
//! struct and vice versa, preserving the two 32-bit words. Everything else
//! copies through, so a double translation restores the original bit-exactly.
//!
//! Schemas: text-level rewriting of type tokens, names, and sub-schema
//! blocks, including synthesizing or dropping the builtin_interfaces
//! definitions and normalizing 40-equals separators to 80.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::{CodecError, MessageValue, Result, Value};
use crate::schema::parser::is_separator;
use crate::schema::typestore::SchemaText;
use crate::schema::{FieldType, ParsedSchema, Schema};

const TIME_NAMES: &[&str] = &["builtin_interfaces/Time", "builtin_interfaces/msg/Time"];
const DURATION_NAMES: &[&str] = &[
    "builtin_interfaces/Duration",
    "builtin_interfaces/msg/Duration",
];

fn field_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+)\s+(\S+)(.*)$").unwrap())
}

// ---------------------------------------------------------------------------
// Message translation

/// Translate a decoded ROS1 message to its ROS2 shape.
///
/// `schema` is the ROS1 schema the message was decoded with.
pub fn translate_message_ros1_to_ros2(
    msg: &MessageValue,
    schema: &ParsedSchema,
) -> Result<MessageValue> {
    translate_struct(msg, &schema.root, schema, Direction::Ros1ToRos2)
}

/// Translate a decoded ROS2 message to its ROS1 shape.
///
/// `schema` is the ROS2 schema the message was decoded with.
pub fn translate_message_ros2_to_ros1(
    msg: &MessageValue,
    schema: &ParsedSchema,
) -> Result<MessageValue> {
    translate_struct(msg, &schema.root, schema, Direction::Ros2ToRos1)
}

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Ros1ToRos2,
    Ros2ToRos1,
}

fn translate_struct(
    msg: &MessageValue,
    current: &Schema,
    schema: &ParsedSchema,
    direction: Direction,
) -> Result<MessageValue> {
    let mut out = MessageValue::with_capacity(msg.len());
    for (name, field) in current.fields() {
        let value = msg.get(name).ok_or_else(|| {
            CodecError::encode(
                "translate",
                format!("missing field '{name}' for {}", current.name),
            )
        })?;
        out.insert(
            name.to_string(),
            translate_value(value, &field.ty, schema, direction)?,
        );
    }
    Ok(out)
}

fn translate_value(
    value: &Value,
    ty: &FieldType,
    schema: &ParsedSchema,
    direction: Direction,
) -> Result<Value> {
    match (ty, direction) {
        (FieldType::Time, Direction::Ros1ToRos2) => match value {
            Value::Time { secs, nsecs } => Ok(ros2_time_struct(*secs as i32, *nsecs)),
            other => Err(translate_mismatch("time", other)),
        },
        (FieldType::Duration, Direction::Ros1ToRos2) => match value {
            Value::Duration { secs, nsecs } => Ok(ros2_time_struct(*secs, *nsecs as u32)),
            other => Err(translate_mismatch("duration", other)),
        },
        (FieldType::Complex(name), Direction::Ros2ToRos1)
            if TIME_NAMES.contains(&crate::schema::short_name(name).as_str())
                || TIME_NAMES.contains(&name.as_str()) =>
        {
            let (sec, nanosec) = ros2_time_words(value)?;
            Ok(Value::Time {
                secs: sec as u32,
                nsecs: nanosec,
            })
        }
        (FieldType::Complex(name), Direction::Ros2ToRos1)
            if DURATION_NAMES.contains(&crate::schema::short_name(name).as_str())
                || DURATION_NAMES.contains(&name.as_str()) =>
        {
            let (sec, nanosec) = ros2_time_words(value)?;
            Ok(Value::Duration {
                secs: sec,
                nsecs: nanosec as i32,
            })
        }
        (FieldType::Complex(name), _) => {
            let nested = value
                .as_struct()
                .ok_or_else(|| translate_mismatch("struct", value))?;
            let sub = schema
                .resolve(name)
                .ok_or_else(|| CodecError::type_not_found(name.clone()))?
                .clone();
            Ok(Value::Struct(translate_struct(
                nested, &sub, schema, direction,
            )?))
        }
        (FieldType::Array { element, .. } | FieldType::Sequence { element }, _) => {
            let items = value
                .as_array()
                .ok_or_else(|| translate_mismatch("array", value))?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(translate_value(item, element, schema, direction)?);
            }
            Ok(Value::Array(out))
        }
        _ => Ok(value.clone()),
    }
}

fn ros2_time_struct(sec: i32, nanosec: u32) -> Value {
    let mut fields = MessageValue::with_capacity(2);
    fields.insert("sec".to_string(), Value::Int32(sec));
    fields.insert("nanosec".to_string(), Value::UInt32(nanosec));
    Value::Struct(fields)
}

fn ros2_time_words(value: &Value) -> Result<(i32, u32)> {
    let fields = value
        .as_struct()
        .ok_or_else(|| translate_mismatch("builtin_interfaces struct", value))?;
    let sec = fields
        .get("sec")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| translate_mismatch("sec", value))? as i32;
    let nanosec = fields
        .get("nanosec")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| translate_mismatch("nanosec", value))? as u32;
    Ok((sec, nanosec))
}

fn translate_mismatch(expected: &str, got: &Value) -> CodecError {
    CodecError::encode(
        "translate",
        format!("expected {expected}, got {}", got.type_name()),
    )
}

// ---------------------------------------------------------------------------
// Schema translation

/// Rewrite a ROS1 schema (name + text) into ROS2 form.
pub fn translate_schema_ros1_to_ros2(msg_name: &str, schema_text: &str) -> SchemaText {
    let ros2_name = crate::schema::normalize_name(msg_name)
        .unwrap_or_else(|_| msg_name.to_string());

    let mut out_lines: Vec<String> = Vec::new();
    let mut has_time = false;
    let mut has_duration = false;

    for line in schema_text.lines() {
        let stripped = line.trim();

        if stripped.is_empty() || stripped.starts_with('#') || stripped.starts_with("MSG:") {
            out_lines.push(line.to_string());
            continue;
        }
        if is_separator(line) {
            out_lines.push("=".repeat(80));
            continue;
        }
        if is_constant_line(stripped) {
            out_lines.push(line.to_string());
            continue;
        }

        let caps = match field_line_re().captures(stripped) {
            Some(c) => c,
            None => {
                out_lines.push(line.to_string());
                continue;
            }
        };
        let (field_type, field_name, rest) = (
            caps.get(1).unwrap().as_str(),
            caps.get(2).unwrap().as_str(),
            caps.get(3).unwrap().as_str(),
        );
        let (base, array_suffix) = split_array_suffix(field_type);

        match base {
            "time" => {
                has_time = true;
                out_lines.push(format!(
                    "builtin_interfaces/Time{array_suffix} {field_name}{rest}"
                ));
            }
            "duration" => {
                has_duration = true;
                out_lines.push(format!(
                    "builtin_interfaces/Duration{array_suffix} {field_name}{rest}"
                ));
            }
            "Header" => {
                out_lines.push(format!("std_msgs/Header{array_suffix} {field_name}{rest}"));
            }
            _ => out_lines.push(line.to_string()),
        }
    }

    let mut result = out_lines.join("\n");

    if has_time && !result.contains("MSG: builtin_interfaces/Time") {
        result.push('\n');
        result.push_str(&"=".repeat(80));
        result.push_str("\nMSG: builtin_interfaces/Time\nint32 sec\nuint32 nanosec");
    }
    if has_duration && !result.contains("MSG: builtin_interfaces/Duration") {
        result.push('\n');
        result.push_str(&"=".repeat(80));
        result.push_str("\nMSG: builtin_interfaces/Duration\nint32 sec\nuint32 nanosec");
    }

    SchemaText {
        name: ros2_name,
        text: result,
    }
}

/// Rewrite a ROS2 schema (name + text) into ROS1 form.
pub fn translate_schema_ros2_to_ros1(msg_name: &str, schema_text: &str) -> SchemaText {
    let ros1_name = crate::schema::short_name(msg_name);

    let mut out_lines: Vec<String> = Vec::new();
    let mut skip_sub_schema = false;

    for line in schema_text.lines() {
        let stripped = line.trim();

        if let Some(sub_name) = stripped.strip_prefix("MSG:") {
            let sub_name = sub_name.trim();
            if TIME_NAMES.contains(&sub_name) || DURATION_NAMES.contains(&sub_name) {
                // Drop the builtin sub-schema along with its separator.
                skip_sub_schema = true;
                if out_lines.last().map(|l| is_separator(l)).unwrap_or(false) {
                    out_lines.pop();
                }
            } else {
                skip_sub_schema = false;
                out_lines.push(format!("MSG: {}", crate::schema::short_name(sub_name)));
            }
            continue;
        }

        if is_separator(line) {
            if skip_sub_schema {
                skip_sub_schema = false;
            } else {
                out_lines.push("=".repeat(80));
            }
            continue;
        }
        if skip_sub_schema {
            continue;
        }

        if stripped.is_empty() || stripped.starts_with('#') || is_constant_line(stripped) {
            out_lines.push(line.to_string());
            continue;
        }

        let caps = match field_line_re().captures(stripped) {
            Some(c) => c,
            None => {
                out_lines.push(line.to_string());
                continue;
            }
        };
        let (field_type, field_name, rest) = (
            caps.get(1).unwrap().as_str(),
            caps.get(2).unwrap().as_str(),
            caps.get(3).unwrap().as_str(),
        );
        let (base, array_suffix) = split_array_suffix(field_type);

        if TIME_NAMES.contains(&base) {
            out_lines.push(format!("time{array_suffix} {field_name}{rest}"));
        } else if DURATION_NAMES.contains(&base) {
            out_lines.push(format!("duration{array_suffix} {field_name}{rest}"));
        } else if base.contains("/msg/") {
            let short = base.replace("/msg/", "/");
            out_lines.push(format!("{short}{array_suffix} {field_name}{rest}"));
        } else {
            out_lines.push(line.to_string());
        }
    }

    // Drop any trailing separators left by removed sub-schemas.
    while out_lines.last().map(|l| is_separator(l)).unwrap_or(false) {
        out_lines.pop();
    }

    SchemaText {
        name: ros1_name,
        text: out_lines.join("\n"),
    }
}

fn is_constant_line(stripped: &str) -> bool {
    stripped.contains('=') && !stripped.starts_with('=')
}

fn split_array_suffix(field_type: &str) -> (&str, &str) {
    match field_type.find('[') {
        Some(pos) => (&field_type[..pos], &field_type[pos..]),
        None => (field_type, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_schema, Dialect};

    #[test]
    fn test_time_value_roundtrip() {
        let schema = parse_schema("pkg/Stamped", "time stamp", Dialect::Ros1).unwrap();
        let mut msg = MessageValue::new();
        msg.insert(
            "stamp".into(),
            Value::Time {
                secs: 1_234_567_890,
                nsecs: 123_456_789,
            },
        );

        let ros2 = translate_message_ros1_to_ros2(&msg, &schema).unwrap();
        let stamp = ros2.get("stamp").unwrap().as_struct().unwrap();
        assert_eq!(stamp.get("sec"), Some(&Value::Int32(1_234_567_890)));
        assert_eq!(stamp.get("nanosec"), Some(&Value::UInt32(123_456_789)));

        // The reverse walk runs against the translated (ROS2) schema.
        let translated = translate_schema_ros1_to_ros2("pkg/Stamped", "time stamp");
        let ros2_schema =
            parse_schema(&translated.name, &translated.text, Dialect::Ros2).unwrap();
        let back = translate_message_ros2_to_ros1(&ros2, &ros2_schema).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_duration_negative_roundtrip() {
        let schema = parse_schema("pkg/T", "duration elapsed", Dialect::Ros1).unwrap();
        let mut msg = MessageValue::new();
        msg.insert(
            "elapsed".into(),
            Value::Duration {
                secs: -3,
                nsecs: 250_000_000,
            },
        );
        let ros2 = translate_message_ros1_to_ros2(&msg, &schema).unwrap();
        let translated = translate_schema_ros1_to_ros2("pkg/T", "duration elapsed");
        let ros2_schema =
            parse_schema(&translated.name, &translated.text, Dialect::Ros2).unwrap();
        let back = translate_message_ros2_to_ros1(&ros2, &ros2_schema).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_non_temporal_fields_copy_through() {
        let schema = parse_schema(
            "pkg/T",
            "int32 x\nstring s\nfloat64[] data",
            Dialect::Ros1,
        )
        .unwrap();
        let mut msg = MessageValue::new();
        msg.insert("x".into(), Value::Int32(9));
        msg.insert("s".into(), Value::String("hi".into()));
        msg.insert(
            "data".into(),
            Value::Array(vec![Value::Float64(0.5)]),
        );
        let ros2 = translate_message_ros1_to_ros2(&msg, &schema).unwrap();
        assert_eq!(ros2, msg);
    }

    #[test]
    fn test_schema_ros1_to_ros2() {
        let text = "uint32 seq\ntime stamp\nstring frame_id";
        let translated = translate_schema_ros1_to_ros2("std_msgs/Header", text);
        assert_eq!(translated.name, "std_msgs/msg/Header");
        assert!(translated.text.contains("builtin_interfaces/Time stamp"));
        assert!(translated.text.contains("MSG: builtin_interfaces/Time"));
        assert!(translated.text.contains("int32 sec"));
        // Must parse as a valid ROS2 schema.
        parse_schema(&translated.name, &translated.text, Dialect::Ros2).unwrap();
    }

    #[test]
    fn test_schema_ros2_to_ros1_drops_builtins() {
        let sep = "=".repeat(80);
        let text = format!(
            "builtin_interfaces/Time stamp\nstring frame_id\n{sep}\nMSG: builtin_interfaces/Time\nint32 sec\nuint32 nanosec"
        );
        let translated = translate_schema_ros2_to_ros1("std_msgs/msg/Header", &text);
        assert_eq!(translated.name, "std_msgs/Header");
        assert!(translated.text.contains("time stamp"));
        assert!(!translated.text.contains("builtin_interfaces"));
        assert!(!translated.text.contains('='));
        parse_schema(&translated.name, &translated.text, Dialect::Ros1).unwrap();
    }

    #[test]
    fn test_schema_roundtrip() {
        let text = "uint32 seq\ntime stamp\nstring frame_id";
        let ros2 = translate_schema_ros1_to_ros2("std_msgs/Header", text);
        let ros1 = translate_schema_ros2_to_ros1(&ros2.name, &ros2.text);
        assert_eq!(ros1.name, "std_msgs/Header");

        let original = parse_schema("std_msgs/Header", text, Dialect::Ros1).unwrap();
        let back = parse_schema(&ros1.name, &ros1.text, Dialect::Ros1).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn test_40_equals_separator_normalized() {
        let sep40 = "=".repeat(40);
        let text = format!(
            "geometry_msgs/msg/Point p\n{sep40}\nMSG: geometry_msgs/msg/Point\nfloat64 x\nfloat64 y\nfloat64 z"
        );
        let translated = translate_schema_ros2_to_ros1("pkg/msg/T", &text);
        assert!(translated.text.contains(&"=".repeat(80)));
        assert!(translated.text.contains("geometry_msgs/Point p"));
        assert!(translated.text.contains("MSG: geometry_msgs/Point"));
    }

    #[test]
    fn test_complex_nesting_translates() {
        let sep = "=".repeat(80);
        let text = format!(
            "pkg/Inner inner\n{sep}\nMSG: pkg/Inner\ntime stamp\n"
        );
        let schema = parse_schema("pkg/Outer", &text, Dialect::Ros1).unwrap();
        let mut inner = MessageValue::new();
        inner.insert("stamp".into(), Value::Time { secs: 1, nsecs: 2 });
        let mut msg = MessageValue::new();
        msg.insert("inner".into(), Value::Struct(inner));

        let ros2 = translate_message_ros1_to_ros2(&msg, &schema).unwrap();
        let stamp = ros2
            .get("inner")
            .unwrap()
            .as_struct()
            .unwrap()
            .get("stamp")
            .unwrap()
            .as_struct()
            .unwrap();
        assert_eq!(stamp.get("sec"), Some(&Value::Int32(1)));
    }
}
