//! Parser for ros1msg / ros2msg schema text.
//!
//! Schema text is line-oriented: the root definition first, then one block
//! per referenced sub-schema, each introduced by a separator line of `=`
//! characters (80 per the convention, 40 tolerated) and a `MSG: pkg/Short`
//! header. A line is a comment, a constant (`TYPE NAME=VALUE`), or a field
//! (`TYPE name [default]`).

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::core::{CodecError, Result, Value};
use crate::schema::ast::{
    normalize_name, short_name, FieldType, ParsedSchema, PrimitiveType, Schema, SchemaEntry,
    SchemaField, StringKind,
};

/// Which .msg dialect a schema is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Ros1,
    Ros2,
}

impl Dialect {
    /// Detect the dialect from a schema encoding string.
    pub fn from_schema_encoding(encoding: &str) -> Result<Self> {
        match encoding {
            "ros1msg" | "ros1" => Ok(Dialect::Ros1),
            "ros2msg" | "ros2" | "cdr" => Ok(Dialect::Ros2),
            other => Err(CodecError::unknown_encoding(other)),
        }
    }

    /// Detect the dialect from a type name and the schema body.
    ///
    /// ROS2 names carry the `/msg/` infix; ROS1 text is betrayed by the
    /// `time`/`duration` primitives or by the short `pkg/Short` name form.
    /// Defaults to ROS2 when no signal is present.
    pub fn detect(name: &str, text: &str) -> Self {
        if name.contains("/msg/") {
            return Dialect::Ros2;
        }
        for line in text.lines() {
            let line = strip_comment(line);
            let mut tokens = line.split_whitespace();
            if let Some(ty) = tokens.next() {
                let base = ty.split(['[', '<']).next().unwrap_or(ty);
                if (base == "time" || base == "duration") && tokens.next().is_some() {
                    return Dialect::Ros1;
                }
            }
        }
        if name.split('/').count() == 2 {
            Dialect::Ros1
        } else {
            Dialect::Ros2
        }
    }

    /// The schema encoding string written into container records.
    pub fn schema_encoding(self) -> &'static str {
        match self {
            Dialect::Ros1 => "ros1msg",
            Dialect::Ros2 => "ros2msg",
        }
    }
}

fn constant_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+)\s+([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*)$").unwrap())
}

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+)\s+([A-Za-z_][A-Za-z0-9_]*)\s*(.*)$").unwrap())
}

fn upper_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap())
}

fn field_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap())
}

/// Remove an inline `#` comment, ignoring `#` inside quoted strings.
pub fn strip_comment(line: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return line[..i].trim_end(),
            _ => {}
        }
    }
    line.trim_end()
}

/// True if the line is a schema-block separator (a run of `=` characters;
/// 80 is canonical, 40 appears in the wild).
pub fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 40 && trimmed.bytes().all(|b| b == b'=')
}

/// Parse schema text into a root schema and its sub-schema map.
pub fn parse_schema(name: &str, text: &str, dialect: Dialect) -> Result<ParsedSchema> {
    let mut blocks: Vec<(Option<String>, Vec<&str>)> = vec![(None, Vec::new())];
    for line in text.lines() {
        if is_separator(line) {
            blocks.push((None, Vec::new()));
            continue;
        }
        let current = blocks.last_mut().unwrap();
        if current.0.is_none() && current.1.is_empty() {
            if let Some(rest) = line.trim().strip_prefix("MSG:") {
                let sub_name = rest.trim();
                if sub_name.is_empty() {
                    return Err(CodecError::malformed_schema(name, "empty MSG: header"));
                }
                current.0 = Some(sub_name.to_string());
                continue;
            }
        }
        current.1.push(line);
    }

    let mut root = None;
    let mut subs = BTreeMap::new();
    for (block_name, lines) in blocks {
        match block_name {
            None => {
                if root.is_none() {
                    root = Some(parse_block(name, &lines, dialect)?);
                } else if !lines.iter().all(|l| strip_comment(l).trim().is_empty()) {
                    return Err(CodecError::malformed_schema(
                        name,
                        "sub-schema block is missing its MSG: header",
                    ));
                }
            }
            Some(sub_name) => {
                let schema = parse_block(&sub_name, &lines, dialect)?;
                subs.insert(sub_name, schema);
            }
        }
    }

    let parsed = ParsedSchema {
        root: root.unwrap_or_else(|| Schema::new(name)),
        subs,
    };
    validate(&parsed)?;
    Ok(parsed)
}

/// Parse a schema, detecting the dialect from the name and body.
pub fn parse_schema_auto(name: &str, text: &str) -> Result<ParsedSchema> {
    parse_schema(name, text, Dialect::detect(name, text))
}

fn parse_block(name: &str, lines: &[&str], dialect: Dialect) -> Result<Schema> {
    let mut schema = Schema::new(name);
    let package = schema.package().map(|p| p.to_string());

    for raw in lines {
        let line = strip_comment(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = constant_re().captures(line) {
            let ty_token = caps.get(1).unwrap().as_str();
            let const_name = caps.get(2).unwrap().as_str();
            let literal = caps.get(3).unwrap().as_str();
            if !upper_name_re().is_match(const_name) {
                return Err(CodecError::malformed_schema(
                    name,
                    format!("constant name '{const_name}' must be uppercase"),
                ));
            }
            let ty = parse_type(ty_token, package.as_deref(), dialect, name)?;
            let value = parse_literal(literal, &ty, name)?;
            schema
                .entries
                .push((const_name.to_string(), SchemaEntry::Constant { ty, value }));
            continue;
        }

        let caps = field_re().captures(line).ok_or_else(|| {
            CodecError::malformed_schema(name, format!("unparseable line: '{line}'"))
        })?;
        let ty_token = caps.get(1).unwrap().as_str();
        let field_name = caps.get(2).unwrap().as_str();
        let rest = caps.get(3).unwrap().as_str().trim();

        if !field_name_re().is_match(field_name)
            || field_name.ends_with('_')
            || field_name.contains("__")
        {
            return Err(CodecError::malformed_schema(
                name,
                format!("invalid field name '{field_name}'"),
            ));
        }

        let ty = parse_type(ty_token, package.as_deref(), dialect, name)?;
        let default = if rest.is_empty() {
            None
        } else {
            Some(parse_literal(rest, &ty, name)?)
        };
        schema.entries.push((
            field_name.to_string(),
            SchemaEntry::Field(SchemaField { ty, default }),
        ));
    }

    Ok(schema)
}

/// Parse a type token: base type, optional string bound, optional array marker.
fn parse_type(
    token: &str,
    package: Option<&str>,
    dialect: Dialect,
    schema_name: &str,
) -> Result<FieldType> {
    // Array suffix comes last: [], [N], or [<=N].
    if let Some(open) = token.rfind('[') {
        if !token.ends_with(']') {
            return Err(CodecError::malformed_schema(
                schema_name,
                format!("malformed array suffix in '{token}'"),
            ));
        }
        let element = parse_type(&token[..open], package, dialect, schema_name)?;
        let spec = &token[open + 1..token.len() - 1];
        return if spec.is_empty() {
            Ok(FieldType::Sequence {
                element: Box::new(element),
            })
        } else if let Some(bound) = spec.strip_prefix("<=") {
            let length = bound.parse::<u64>().map_err(|_| {
                CodecError::malformed_schema(schema_name, format!("bad array bound '{spec}'"))
            })?;
            Ok(FieldType::Array {
                element: Box::new(element),
                length,
                bounded: true,
            })
        } else {
            let length = spec.parse::<u64>().map_err(|_| {
                CodecError::malformed_schema(schema_name, format!("bad array length '{spec}'"))
            })?;
            Ok(FieldType::Array {
                element: Box::new(element),
                length,
                bounded: false,
            })
        };
    }

    // String bound: string<=N / wstring<=N.
    if let Some((base, bound)) = token.split_once("<=") {
        let kind = match base {
            "string" => StringKind::Utf8,
            "wstring" => StringKind::Wide,
            _ => {
                return Err(CodecError::malformed_schema(
                    schema_name,
                    format!("length bound on non-string type '{token}'"),
                ))
            }
        };
        let max_length = bound.parse::<u64>().map_err(|_| {
            CodecError::malformed_schema(schema_name, format!("bad string bound '{token}'"))
        })?;
        return Ok(FieldType::Str {
            kind,
            max_length: Some(max_length),
        });
    }

    match token {
        "string" => Ok(FieldType::Str {
            kind: StringKind::Utf8,
            max_length: None,
        }),
        "wstring" => Ok(FieldType::Str {
            kind: StringKind::Wide,
            max_length: None,
        }),
        "time" => match dialect {
            Dialect::Ros1 => Ok(FieldType::Time),
            Dialect::Ros2 => Err(CodecError::malformed_schema(
                schema_name,
                "ROS1 primitive 'time' cannot be used in a ros2msg schema; use builtin_interfaces/Time",
            )),
        },
        "duration" => match dialect {
            Dialect::Ros1 => Ok(FieldType::Duration),
            Dialect::Ros2 => Err(CodecError::malformed_schema(
                schema_name,
                "ROS1 primitive 'duration' cannot be used in a ros2msg schema; use builtin_interfaces/Duration",
            )),
        },
        _ => {
            if let Some(prim) = PrimitiveType::try_from_str(token) {
                Ok(FieldType::Primitive(prim))
            } else {
                Ok(FieldType::Complex(resolve_complex(
                    token, package, dialect,
                )))
            }
        }
    }
}

/// Canonicalize a complex type reference for the given dialect.
fn resolve_complex(token: &str, package: Option<&str>, dialect: Dialect) -> String {
    let qualified = if token == "Header" {
        "std_msgs/Header".to_string()
    } else if !token.contains('/') {
        match package {
            Some(pkg) => format!("{pkg}/{token}"),
            None => token.to_string(),
        }
    } else {
        token.to_string()
    };
    match dialect {
        Dialect::Ros2 => normalize_name(&qualified).unwrap_or(qualified),
        Dialect::Ros1 => short_name(&qualified),
    }
}

/// Parse a default or constant literal against its declared type.
fn parse_literal(text: &str, ty: &FieldType, schema_name: &str) -> Result<Value> {
    let text = text.trim();
    match ty {
        FieldType::Array { element, .. } | FieldType::Sequence { element } => {
            let inner = text
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .ok_or_else(|| {
                    CodecError::malformed_schema(
                        schema_name,
                        format!("array literal must be bracketed: '{text}'"),
                    )
                })?;
            let mut values = Vec::new();
            for part in split_list(inner) {
                let part = part.trim();
                if !part.is_empty() {
                    values.push(parse_literal(part, element, schema_name)?);
                }
            }
            Ok(Value::Array(values))
        }
        FieldType::Str { .. } => Ok(Value::String(unquote(text))),
        FieldType::Primitive(prim) => parse_scalar(text, *prim, schema_name),
        _ => Err(CodecError::malformed_schema(
            schema_name,
            format!("type does not accept a literal: '{text}'"),
        )),
    }
}

fn parse_scalar(text: &str, prim: PrimitiveType, schema_name: &str) -> Result<Value> {
    let bad = |t: &str| {
        CodecError::malformed_schema(schema_name, format!("bad {} literal '{t}'", prim.as_str()))
    };
    Ok(match prim {
        PrimitiveType::Bool => match text {
            "true" | "True" | "1" => Value::Bool(true),
            "false" | "False" | "0" => Value::Bool(false),
            _ => return Err(bad(text)),
        },
        PrimitiveType::Int8 => Value::Int8(text.parse().map_err(|_| bad(text))?),
        PrimitiveType::UInt8 | PrimitiveType::Byte | PrimitiveType::Char => {
            Value::UInt8(text.parse().map_err(|_| bad(text))?)
        }
        PrimitiveType::Int16 => Value::Int16(text.parse().map_err(|_| bad(text))?),
        PrimitiveType::UInt16 => Value::UInt16(text.parse().map_err(|_| bad(text))?),
        PrimitiveType::Int32 => Value::Int32(text.parse().map_err(|_| bad(text))?),
        PrimitiveType::UInt32 => Value::UInt32(text.parse().map_err(|_| bad(text))?),
        PrimitiveType::Int64 => Value::Int64(text.parse().map_err(|_| bad(text))?),
        PrimitiveType::UInt64 => Value::UInt64(text.parse().map_err(|_| bad(text))?),
        PrimitiveType::Float32 => Value::Float32(text.parse().map_err(|_| bad(text))?),
        PrimitiveType::Float64 => Value::Float64(text.parse().map_err(|_| bad(text))?),
    })
}

/// Split a bracketed list body on top-level commas, respecting quotes.
fn split_list(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    for ch in text.chars() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(ch);
            }
            ',' if !in_single && !in_double => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Strip matching surrounding quotes from a string literal.
fn unquote(text: &str) -> String {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return text[1..text.len() - 1].to_string();
        }
    }
    text.to_string()
}

/// Check resolvability of every complex reference and reject cycles.
fn validate(parsed: &ParsedSchema) -> Result<()> {
    fn collect_refs(ty: &FieldType, out: &mut Vec<String>) {
        match ty {
            FieldType::Complex(name) => out.push(name.clone()),
            FieldType::Array { element, .. } | FieldType::Sequence { element } => {
                collect_refs(element, out)
            }
            _ => {}
        }
    }

    fn visit(
        parsed: &ParsedSchema,
        schema: &Schema,
        stack: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> Result<()> {
        if done.contains(&schema.name) {
            return Ok(());
        }
        if stack.contains(&schema.name) {
            return Err(CodecError::malformed_schema(
                &schema.name,
                "circular complex reference",
            ));
        }
        stack.push(schema.name.clone());
        let mut refs = Vec::new();
        for (_, field) in schema.fields() {
            collect_refs(&field.ty, &mut refs);
        }
        for reference in refs {
            let sub = parsed.resolve(&reference).ok_or_else(|| {
                CodecError::malformed_schema(
                    &schema.name,
                    format!("unresolved complex reference '{reference}'"),
                )
            })?;
            let sub = sub.clone();
            visit(parsed, &sub, stack, done)?;
        }
        stack.pop();
        done.insert(schema.name.clone());
        Ok(())
    }

    let mut done = HashSet::new();
    visit(parsed, &parsed.root, &mut Vec::new(), &mut done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_fields() {
        let parsed =
            parse_schema("geometry_msgs/msg/Point", "float64 x\nfloat64 y\nfloat64 z", Dialect::Ros2)
                .unwrap();
        let fields: Vec<_> = parsed.root.fields().collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].0, "x");
        assert_eq!(
            fields[0].1.ty,
            FieldType::Primitive(PrimitiveType::Float64)
        );
    }

    #[test]
    fn test_parse_constants() {
        let text = "byte OK=0\nbyte WARN=1\nbyte level";
        let parsed = parse_schema("diagnostic_msgs/msg/DiagnosticStatus", text, Dialect::Ros2)
            .unwrap();
        assert_eq!(parsed.root.constants().count(), 2);
        assert_eq!(parsed.root.fields().count(), 1);
        assert_eq!(parsed.root.constant("OK"), Some(&Value::UInt8(0)));
    }

    #[test]
    fn test_constant_name_must_be_uppercase() {
        let result = parse_schema("pkg/msg/T", "int32 bad_name=1", Dialect::Ros2);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_arrays_and_sequences() {
        let text = "float64[36] covariance\nint32[] values\nuint8[<=16] bounded";
        let parsed = parse_schema("pkg/msg/T", text, Dialect::Ros2).unwrap();
        let fields: Vec<_> = parsed.root.fields().collect();
        assert_eq!(
            fields[0].1.ty,
            FieldType::Array {
                element: Box::new(FieldType::Primitive(PrimitiveType::Float64)),
                length: 36,
                bounded: false,
            }
        );
        assert!(matches!(fields[1].1.ty, FieldType::Sequence { .. }));
        assert!(matches!(
            fields[2].1.ty,
            FieldType::Array { bounded: true, length: 16, .. }
        ));
    }

    #[test]
    fn test_parse_string_bounds() {
        let parsed = parse_schema("pkg/msg/T", "string<=10 name", Dialect::Ros2).unwrap();
        let (_, field) = parsed.root.fields().next().unwrap();
        assert_eq!(
            field.ty,
            FieldType::Str {
                kind: StringKind::Utf8,
                max_length: Some(10)
            }
        );
    }

    #[test]
    fn test_parse_defaults() {
        let text = "int32 x 42\nstring label \"hello #world\"\nfloat64[] data [1.0, 2.0]";
        let parsed = parse_schema("pkg/msg/T", text, Dialect::Ros2).unwrap();
        let fields: Vec<_> = parsed.root.fields().collect();
        assert_eq!(fields[0].1.default, Some(Value::Int32(42)));
        assert_eq!(
            fields[1].1.default,
            Some(Value::String("hello #world".into()))
        );
        assert_eq!(
            fields[2].1.default,
            Some(Value::Array(vec![Value::Float64(1.0), Value::Float64(2.0)]))
        );
    }

    #[test]
    fn test_sub_schema_blocks() {
        let text = format!(
            "geometry_msgs/Point position\n{}\nMSG: geometry_msgs/Point\nfloat64 x\nfloat64 y\nfloat64 z\n",
            "=".repeat(80)
        );
        let parsed = parse_schema("geometry_msgs/msg/Pose", &text, Dialect::Ros2).unwrap();
        assert_eq!(parsed.subs.len(), 1);
        let (_, field) = parsed.root.fields().next().unwrap();
        assert_eq!(
            field.ty,
            FieldType::Complex("geometry_msgs/msg/Point".into())
        );
        assert!(parsed.resolve("geometry_msgs/msg/Point").is_some());
        assert!(parsed.resolve("geometry_msgs/Point").is_some());
    }

    #[test]
    fn test_40_equals_separator_tolerated() {
        let text = format!(
            "pkg/Sub child\n{}\nMSG: pkg/Sub\nint32 v\n",
            "=".repeat(40)
        );
        let parsed = parse_schema("pkg/msg/T", &text, Dialect::Ros2).unwrap();
        assert_eq!(parsed.subs.len(), 1);
    }

    #[test]
    fn test_unresolved_reference_rejected() {
        let result = parse_schema("pkg/msg/T", "other_pkg/Missing field", Dialect::Ros2);
        assert!(result.is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let sep = "=".repeat(80);
        let text = format!(
            "pkg/A child\n{sep}\nMSG: pkg/A\npkg/B inner\n{sep}\nMSG: pkg/B\npkg/A back\n"
        );
        let result = parse_schema("pkg/msg/T", &text, Dialect::Ros2);
        assert!(result.is_err());
    }

    #[test]
    fn test_ros1_time_duration() {
        let parsed =
            parse_schema("std_msgs/Header", "uint32 seq\ntime stamp\nstring frame_id", Dialect::Ros1)
                .unwrap();
        let fields: Vec<_> = parsed.root.fields().collect();
        assert_eq!(fields[1].1.ty, FieldType::Time);
    }

    #[test]
    fn test_time_rejected_in_ros2() {
        let result = parse_schema("pkg/msg/T", "time stamp", Dialect::Ros2);
        assert!(result.is_err());
    }

    #[test]
    fn test_bare_header_resolves_to_std_msgs() {
        let sep = "=".repeat(80);
        let text = format!(
            "Header header\n{sep}\nMSG: std_msgs/Header\nbuiltin_interfaces/Time stamp\nstring frame_id\n{sep}\nMSG: builtin_interfaces/Time\nint32 sec\nuint32 nanosec\n"
        );
        let parsed = parse_schema("sensor_msgs/msg/Imu", &text, Dialect::Ros2).unwrap();
        let (_, field) = parsed.root.fields().next().unwrap();
        assert_eq!(field.ty, FieldType::Complex("std_msgs/msg/Header".into()));
    }

    #[test]
    fn test_bare_name_resolves_to_package() {
        let sep = "=".repeat(80);
        let text = format!("Point position\n{sep}\nMSG: geometry_msgs/Point\nfloat64 x\n");
        let parsed = parse_schema("geometry_msgs/msg/Pose", &text, Dialect::Ros2).unwrap();
        let (_, field) = parsed.root.fields().next().unwrap();
        assert_eq!(
            field.ty,
            FieldType::Complex("geometry_msgs/msg/Point".into())
        );
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let text = "# leading comment\n\nint32 x # trailing comment\n";
        let parsed = parse_schema("pkg/msg/T", text, Dialect::Ros2).unwrap();
        assert_eq!(parsed.root.fields().count(), 1);
    }

    #[test]
    fn test_field_name_rules() {
        assert!(parse_schema("pkg/msg/T", "int32 Bad", Dialect::Ros2).is_err());
        assert!(parse_schema("pkg/msg/T", "int32 trailing_", Dialect::Ros2).is_err());
        assert!(parse_schema("pkg/msg/T", "int32 dou__ble", Dialect::Ros2).is_err());
    }

    #[test]
    fn test_dialect_detection() {
        assert_eq!(Dialect::detect("std_msgs/msg/Header", ""), Dialect::Ros2);
        assert_eq!(
            Dialect::detect("std_msgs/Header", "uint32 seq\ntime stamp"),
            Dialect::Ros1
        );
        assert_eq!(
            Dialect::detect("std_msgs/String", "string data"),
            Dialect::Ros1
        );
        assert_eq!(Dialect::detect("Standalone", "int32 x"), Dialect::Ros2);
    }
}
