//! Schema tree for parsed ROS .msg definitions.

use std::collections::BTreeMap;

use crate::core::{CodecError, Result, Value};

/// Fixed-width primitive field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    /// Opaque octet (ROS2 `byte`)
    Byte,
    /// Single character (ROS2 `char`, wire-compatible with uint8)
    Char,
}

impl PrimitiveType {
    /// Wire width in bytes.
    pub const fn width(self) -> usize {
        match self {
            PrimitiveType::Bool
            | PrimitiveType::Int8
            | PrimitiveType::UInt8
            | PrimitiveType::Byte
            | PrimitiveType::Char => 1,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64 | PrimitiveType::UInt64 | PrimitiveType::Float64 => 8,
        }
    }

    /// CDR natural alignment. Equal to the width for every fixed primitive.
    pub const fn alignment(self) -> usize {
        self.width()
    }

    /// Parse a primitive type token.
    pub fn try_from_str(s: &str) -> Option<Self> {
        match s {
            "bool" => Some(PrimitiveType::Bool),
            "int8" => Some(PrimitiveType::Int8),
            "uint8" => Some(PrimitiveType::UInt8),
            "int16" => Some(PrimitiveType::Int16),
            "uint16" => Some(PrimitiveType::UInt16),
            "int32" => Some(PrimitiveType::Int32),
            "uint32" => Some(PrimitiveType::UInt32),
            "int64" => Some(PrimitiveType::Int64),
            "uint64" => Some(PrimitiveType::UInt64),
            "float32" => Some(PrimitiveType::Float32),
            "float64" => Some(PrimitiveType::Float64),
            "byte" => Some(PrimitiveType::Byte),
            "char" => Some(PrimitiveType::Char),
            _ => None,
        }
    }

    /// The .msg type token for this primitive.
    pub const fn as_str(self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int8 => "int8",
            PrimitiveType::UInt8 => "uint8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::UInt16 => "uint16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::UInt32 => "uint32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::UInt64 => "uint64",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
        }
    }
}

/// String flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    /// UTF-8 string
    Utf8,
    /// UTF-16 wide string (ROS2 `wstring`)
    Wide,
}

/// A field type in the schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Primitive(PrimitiveType),
    Str {
        kind: StringKind,
        /// Optional `<=N` bound. Informational; does not change the wire format.
        max_length: Option<u64>,
    },
    /// Fixed-size (`[N]`) or bounded (`[<=N]`) array.
    Array {
        element: Box<FieldType>,
        length: u64,
        bounded: bool,
    },
    /// Dynamic-length sequence (`[]`).
    Sequence { element: Box<FieldType> },
    /// Reference to another message type by fully-qualified name.
    Complex(String),
    /// ROS1 `time` primitive (secs: uint32, nsecs: uint32)
    Time,
    /// ROS1 `duration` primitive (secs: int32, nsecs: int32)
    Duration,
}

impl FieldType {
    /// True for ROS1-only time/duration primitives.
    pub fn is_ros1_temporal(&self) -> bool {
        matches!(self, FieldType::Time | FieldType::Duration)
    }
}

/// A data-carrying field.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub ty: FieldType,
    /// Default literal from the schema text, if any. Only used when building
    /// in-memory values; never affects the wire format.
    pub default: Option<Value>,
}

/// One entry in a schema: either a wire field or a declared constant.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaEntry {
    Field(SchemaField),
    /// Constants never appear on the wire.
    Constant { ty: FieldType, value: Value },
}

/// A parsed message schema: a fully-qualified name plus an insertion-ordered
/// list of entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Fully-qualified name (`pkg/msg/Short` for ROS2, `pkg/Short` for ROS1)
    pub name: String,
    /// Entries in declaration order
    pub entries: Vec<(String, SchemaEntry)>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Package component of the schema name.
    pub fn package(&self) -> Option<&str> {
        self.name.split('/').next().filter(|p| !p.is_empty())
    }

    /// Iterate wire fields (skipping constants) in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &SchemaField)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            SchemaEntry::Field(f) => Some((name.as_str(), f)),
            SchemaEntry::Constant { .. } => None,
        })
    }

    /// Iterate declared constants in declaration order.
    pub fn constants(&self) -> impl Iterator<Item = (&str, &FieldType, &Value)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            SchemaEntry::Constant { ty, value } => Some((name.as_str(), ty, value)),
            SchemaEntry::Field(_) => None,
        })
    }

    /// Look up a constant by name.
    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants()
            .find(|(n, _, _)| *n == name)
            .map(|(_, _, v)| v)
    }
}

/// Normalize a message name to the ROS2 key form (`pkg/msg/Short`).
pub fn normalize_name(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        [pkg, short] => Ok(format!("{pkg}/msg/{short}")),
        [_, infix, _] if *infix == "msg" => Ok(name.to_string()),
        _ => Err(CodecError::malformed_schema(
            name,
            "expected pkg/Short or pkg/msg/Short",
        )),
    }
}

/// Collapse a message name to the short form (`pkg/Short`), as used by
/// `MSG:` separators and ROS1 references.
pub fn short_name(name: &str) -> String {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        [pkg, infix, short] if *infix == "msg" => format!("{pkg}/{short}"),
        _ => name.to_string(),
    }
}

/// A root schema plus the transitively referenced sub-schemas.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSchema {
    pub root: Schema,
    /// Sub-schemas keyed by the name they were declared with
    pub subs: BTreeMap<String, Schema>,
}

impl ParsedSchema {
    /// Resolve a complex type reference against the sub-schema map, treating
    /// `pkg/Short` and `pkg/msg/Short` as equivalent keys.
    pub fn resolve(&self, name: &str) -> Option<&Schema> {
        if name == self.root.name {
            return Some(&self.root);
        }
        if let Some(schema) = self.subs.get(name) {
            return Some(schema);
        }
        if let Ok(normalized) = normalize_name(name) {
            if normalized == self.root.name {
                return Some(&self.root);
            }
            if let Some(schema) = self.subs.get(&normalized) {
                return Some(schema);
            }
        }
        let short = short_name(name);
        if short == self.root.name {
            return Some(&self.root);
        }
        self.subs.get(&short)
    }

    /// Build an in-memory message for this schema with declared defaults
    /// applied and zero values elsewhere.
    pub fn default_message(&self) -> Result<crate::core::MessageValue> {
        self.default_message_for(&self.root)
    }

    fn default_message_for(&self, schema: &Schema) -> Result<crate::core::MessageValue> {
        let mut msg = crate::core::MessageValue::new();
        for (name, field) in schema.fields() {
            let value = match &field.default {
                Some(default) => default.clone(),
                None => self.zero_value(&field.ty)?,
            };
            msg.insert(name.to_string(), value);
        }
        Ok(msg)
    }

    fn zero_value(&self, ty: &FieldType) -> Result<Value> {
        Ok(match ty {
            FieldType::Primitive(p) => match p {
                PrimitiveType::Bool => Value::Bool(false),
                PrimitiveType::Int8 => Value::Int8(0),
                PrimitiveType::UInt8 | PrimitiveType::Byte | PrimitiveType::Char => {
                    Value::UInt8(0)
                }
                PrimitiveType::Int16 => Value::Int16(0),
                PrimitiveType::UInt16 => Value::UInt16(0),
                PrimitiveType::Int32 => Value::Int32(0),
                PrimitiveType::UInt32 => Value::UInt32(0),
                PrimitiveType::Int64 => Value::Int64(0),
                PrimitiveType::UInt64 => Value::UInt64(0),
                PrimitiveType::Float32 => Value::Float32(0.0),
                PrimitiveType::Float64 => Value::Float64(0.0),
            },
            FieldType::Str { .. } => Value::String(String::new()),
            FieldType::Time => Value::Time { secs: 0, nsecs: 0 },
            FieldType::Duration => Value::Duration { secs: 0, nsecs: 0 },
            FieldType::Sequence { .. } => Value::Array(Vec::new()),
            FieldType::Array {
                element,
                length,
                bounded,
            } => {
                if *bounded {
                    Value::Array(Vec::new())
                } else {
                    let zero = self.zero_value(element)?;
                    Value::Array(vec![zero; *length as usize])
                }
            }
            FieldType::Complex(name) => {
                let sub = self
                    .resolve(name)
                    .ok_or_else(|| CodecError::type_not_found(name.clone()))?
                    .clone();
                Value::Struct(self.default_message_for(&sub)?)
            }
        })
    }
}
