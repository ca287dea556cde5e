//! Message codecs.
//!
//! A codec binds the schema compiler's plans to a concrete wire format.
//! The two binary formats share one plan executor ([`exec`]) and differ only
//! in their payload cursors: CDR has an encapsulation header, origin-relative
//! alignment and null-terminated strings; rosmsg has none of those. JSON
//! rides on the same schema tree through `serde_json`.

pub mod cdr;
pub mod exec;
pub mod json;
pub mod rosmsg;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::{CodecError, MessageValue, Result};
use crate::schema::{compile, CompiledSchema, ParsedSchema};

pub use cdr::{CdrCodec, CdrReader, CdrWriter, CDR_HEADER_SIZE};
pub use json::JsonCodec;
pub use rosmsg::{RosmsgCodec, RosmsgReader, RosmsgWriter};

/// Read cursor over a message payload.
///
/// Implementations define what alignment means (origin-relative for CDR,
/// a no-op for rosmsg) and their string conventions.
pub trait PayloadReader {
    /// Advance so the next read starts on a `size`-byte boundary relative to
    /// the format's alignment origin.
    fn align(&mut self, size: usize) -> Result<()>;
    /// Read exactly `n` bytes.
    fn read_bytes(&mut self, n: usize) -> Result<&[u8]>;
    /// Read a string in the format's convention.
    fn read_string(&mut self) -> Result<String>;
    /// Read a wide string in the format's convention.
    fn read_wstring(&mut self) -> Result<String>;
    /// Multibyte values are little-endian when true.
    fn is_little_endian(&self) -> bool;
    /// Current cursor position.
    fn position(&self) -> u64;
    /// Bytes left.
    fn remaining(&self) -> usize;
}

/// Write cursor over a message payload. Mirrors [`PayloadReader`].
pub trait PayloadWriter {
    /// Pad with zero bytes to a `size`-byte boundary relative to the
    /// format's alignment origin.
    fn align(&mut self, size: usize) -> Result<()>;
    /// Append raw bytes.
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;
    /// Append a string in the format's convention.
    fn write_string(&mut self, s: &str) -> Result<()>;
    /// Append a wide string in the format's convention.
    fn write_wstring(&mut self, s: &str) -> Result<()>;
    /// Multibyte values are little-endian when true.
    fn is_little_endian(&self) -> bool;
    /// Current length of the payload.
    fn position(&self) -> u64;
}

/// A message serializer/deserializer for one wire encoding.
pub trait MessageCodec: Send + Sync {
    /// The `message_encoding` string this codec serves.
    fn encoding(&self) -> &'static str;

    /// Serialize a message value against its schema.
    fn serialize_message(&self, schema: &ParsedSchema, msg: &MessageValue) -> Result<Vec<u8>>;

    /// Deserialize a payload against its schema.
    fn deserialize_message(&self, schema: &ParsedSchema, data: &[u8]) -> Result<MessageValue>;

    /// Emit the textual schema for embedding in a container.
    fn serialize_schema(&self, schema: &ParsedSchema) -> Vec<u8> {
        crate::schema::emit_schema(schema).into_bytes()
    }
}

/// Compiled-plan cache keyed by root type name, shared by the codecs.
#[derive(Default)]
pub struct PlanCache {
    plans: Mutex<HashMap<String, Arc<CompiledSchema>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or compile the plan set for a schema.
    pub fn get(&self, schema: &ParsedSchema) -> Result<Arc<CompiledSchema>> {
        let mut cache = self
            .plans
            .lock()
            .map_err(|_| CodecError::encode("codec", "plan cache poisoned"))?;
        if let Some(plan) = cache.get(&schema.root.name) {
            return Ok(Arc::clone(plan));
        }
        let compiled = Arc::new(compile(schema)?);
        cache.insert(schema.root.name.clone(), Arc::clone(&compiled));
        Ok(compiled)
    }
}

/// Pick the codec an MCAP profile implies, if any.
///
/// Files with an empty or foreign profile defer to per-channel encodings.
pub fn codec_for_profile(profile: &str) -> Option<Box<dyn MessageCodec>> {
    match profile {
        "ros2" | "cdr" => Some(Box::new(CdrCodec::new())),
        "ros1" => Some(Box::new(RosmsgCodec::new())),
        "json" => Some(Box::new(JsonCodec::new())),
        _ => None,
    }
}

/// Pick the codec for a channel's `message_encoding`.
pub fn codec_for_encoding(encoding: &str) -> Result<Box<dyn MessageCodec>> {
    match encoding {
        "cdr" => Ok(Box::new(CdrCodec::new())),
        "ros1" | "ros1msg" | "rosmsg" => Ok(Box::new(RosmsgCodec::new())),
        "json" => Ok(Box::new(JsonCodec::new())),
        other => Err(CodecError::unknown_encoding(other)),
    }
}
