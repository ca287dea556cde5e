//! Dynamic message value model.
//!
//! Decoded messages are maps from field name to [`Value`]. The model covers
//! every type the .msg grammar can express, including the ROS1 split-word
//! time and duration primitives, which keep their two 32-bit components so
//! translation between ROS1 and ROS2 round-trips bit-exactly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A decoded message: field name to value.
pub type MessageValue = HashMap<String, Value>;

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),

    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),

    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),

    Float32(f32),
    Float64(f64),

    String(String),

    /// ROS1 `time` primitive (secs: uint32, nsecs: uint32)
    Time { secs: u32, nsecs: u32 },

    /// ROS1 `duration` primitive (secs: int32, nsecs: int32)
    Duration { secs: i32, nsecs: i32 },

    /// Fixed array or sequence of values
    Array(Vec<Value>),

    /// Nested message
    Struct(MessageValue),
}

impl Value {
    /// Check if this value is a numeric type (integers or floats).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int8(_)
                | Value::Int16(_)
                | Value::Int32(_)
                | Value::Int64(_)
                | Value::UInt8(_)
                | Value::UInt16(_)
                | Value::UInt32(_)
                | Value::UInt64(_)
                | Value::Float32(_)
                | Value::Float64(_)
        )
    }

    /// Check if this value is a container type (array or struct).
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Struct(_))
    }

    /// Try to convert this value to i64 (integer types only).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::UInt8(v) => Some(*v as i64),
            Value::UInt16(v) => Some(*v as i64),
            Value::UInt32(v) => Some(*v as i64),
            Value::UInt64(v) => {
                if *v <= i64::MAX as u64 {
                    Some(*v as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Try to convert this value to f64 (numeric types only).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Try to get the inner string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the inner array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to get the inner struct.
    pub fn as_struct(&self) -> Option<&MessageValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get a mutable reference to the inner struct.
    pub fn as_struct_mut(&mut self) -> Option<&mut MessageValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Total nanoseconds of a time value.
    pub fn as_time_nanos(&self) -> Option<u64> {
        match self {
            Value::Time { secs, nsecs } => {
                Some(*secs as u64 * 1_000_000_000 + *nsecs as u64)
            }
            _ => None,
        }
    }

    /// Total nanoseconds of a duration value (can be negative).
    pub fn as_duration_nanos(&self) -> Option<i64> {
        match self {
            Value::Duration { secs, nsecs } => {
                Some(*secs as i64 * 1_000_000_000 + *nsecs as i64)
            }
            _ => None,
        }
    }

    /// Get the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt8(_) => "uint8",
            Value::UInt16(_) => "uint16",
            Value::UInt32(_) => "uint32",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Time { .. } => "time",
            Value::Duration { .. } => "duration",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::Time { secs, nsecs } => write!(f, "Time({secs}s {nsecs}ns)"),
            Value::Duration { secs, nsecs } => write!(f, "Duration({secs}s {nsecs}ns)"),
            Value::Array(v) => write!(f, "[{} elements]", v.len()),
            Value::Struct(v) => write!(f, "{{{} fields}}", v.len()),
        }
    }
}
