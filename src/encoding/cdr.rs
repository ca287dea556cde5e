//! CDR (Common Data Representation) payload codec, as used by ROS 2.
//!
//! Payload layout: `0x00, endian_flag, 0x00, 0x00 | payload`. The endian
//! flag is 1 for little-endian. Natural alignment is measured from byte 4
//! (the alignment origin). Strings carry a length that includes a trailing
//! null byte; wstrings are UTF-16-BE with a code-unit count and no
//! terminator.

use crate::core::{CodecError, MessageValue, Result};
use crate::encoding::{exec, MessageCodec, PayloadReader, PayloadWriter, PlanCache};
use crate::schema::ParsedSchema;

/// Size of the CDR encapsulation header.
pub const CDR_HEADER_SIZE: usize = 4;

/// Byte order of an encoded CDR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Read cursor over a CDR payload.
pub struct CdrReader<'a> {
    data: &'a [u8],
    pos: usize,
    origin: usize,
    little_endian: bool,
}

impl<'a> CdrReader<'a> {
    /// Create a reader over a payload that includes the 4-byte header.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < CDR_HEADER_SIZE {
            return Err(CodecError::encode(
                "CDR",
                format!(
                    "payload of {} bytes cannot hold the 4-byte encapsulation header",
                    data.len()
                ),
            ));
        }
        Ok(Self {
            data,
            pos: CDR_HEADER_SIZE,
            origin: CDR_HEADER_SIZE,
            little_endian: data[1] == 1,
        })
    }

    fn check(&self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() {
            return Err(CodecError::buffer_too_short(
                n,
                self.remaining(),
                self.pos as u64,
            ));
        }
        Ok(())
    }

    fn read_u32_prim(&mut self) -> Result<u32> {
        self.align(4)?;
        self.check(4)?;
        let bytes = [
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ];
        self.pos += 4;
        Ok(if self.little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }
}

impl PayloadReader for CdrReader<'_> {
    fn align(&mut self, size: usize) -> Result<()> {
        if size > 1 {
            let misalign = (self.pos - self.origin) % size;
            if misalign > 0 {
                let padding = size - misalign;
                self.check(padding)?;
                self.pos += padding;
            }
        }
        Ok(())
    }

    fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.check(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    fn read_string(&mut self) -> Result<String> {
        // Length includes the null terminator; <= 1 means empty.
        let len = self.read_u32_prim()? as usize;
        if len <= 1 {
            self.read_bytes(len)?;
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len)?;
        let text = &bytes[..len - 1];
        std::str::from_utf8(text)
            .map(|s| s.to_string())
            .map_err(|e| CodecError::encode("CDR", format!("invalid utf-8 in string: {e}")))
    }

    fn read_wstring(&mut self) -> Result<String> {
        // Length counts UTF-16 code units; no terminator.
        let units = self.read_u32_prim()? as usize;
        let bytes = self.read_bytes(units * 2)?;
        let code_units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&code_units)
            .map_err(|e| CodecError::encode("CDR", format!("invalid utf-16 in wstring: {e}")))
    }

    fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}

/// Write cursor building a CDR payload.
pub struct CdrWriter {
    buf: Vec<u8>,
    origin: usize,
    little_endian: bool,
}

impl CdrWriter {
    /// Start a payload with the encapsulation header for the given order.
    pub fn new(endianness: Endianness) -> Self {
        let little_endian = endianness == Endianness::Little;
        Self {
            buf: vec![0x00, little_endian as u8, 0x00, 0x00],
            origin: CDR_HEADER_SIZE,
            little_endian,
        }
    }

    /// Finish and return the payload bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn write_u32_prim(&mut self, v: u32) -> Result<()> {
        self.align(4)?;
        let bytes = if self.little_endian {
            v.to_le_bytes()
        } else {
            v.to_be_bytes()
        };
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }
}

impl PayloadWriter for CdrWriter {
    fn align(&mut self, size: usize) -> Result<()> {
        if size > 1 {
            let misalign = (self.buf.len() - self.origin) % size;
            if misalign > 0 {
                self.buf.resize(self.buf.len() + size - misalign, 0);
            }
        }
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_u32_prim(s.len() as u32 + 1)?;
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    fn write_wstring(&mut self, s: &str) -> Result<()> {
        let code_units: Vec<u16> = s.encode_utf16().collect();
        self.write_u32_prim(code_units.len() as u32)?;
        for unit in code_units {
            self.buf.extend_from_slice(&unit.to_be_bytes());
        }
        Ok(())
    }

    fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    fn position(&self) -> u64 {
        self.buf.len() as u64
    }
}

/// CDR message codec.
pub struct CdrCodec {
    plans: PlanCache,
    write_endianness: Endianness,
}

impl CdrCodec {
    /// Codec writing little-endian payloads (the ROS 2 default).
    pub fn new() -> Self {
        Self::with_endianness(Endianness::Little)
    }

    /// Codec writing payloads in the given byte order. Reads always honor
    /// the payload's own endian flag.
    pub fn with_endianness(endianness: Endianness) -> Self {
        Self {
            plans: PlanCache::new(),
            write_endianness: endianness,
        }
    }

    fn check_dialect(&self, schema: &ParsedSchema, compiled: &crate::schema::CompiledSchema) -> Result<()> {
        if compiled.uses_ros1_time {
            return Err(CodecError::malformed_schema(
                &schema.root.name,
                "ROS1 time/duration primitives cannot be encoded as CDR",
            ));
        }
        Ok(())
    }
}

impl Default for CdrCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCodec for CdrCodec {
    fn encoding(&self) -> &'static str {
        "cdr"
    }

    fn serialize_message(&self, schema: &ParsedSchema, msg: &MessageValue) -> Result<Vec<u8>> {
        let compiled = self.plans.get(schema)?;
        self.check_dialect(schema, &compiled)?;
        let mut writer = CdrWriter::new(self.write_endianness);
        exec::encode_message(&compiled, &mut writer, msg)?;
        Ok(writer.finish())
    }

    fn deserialize_message(&self, schema: &ParsedSchema, data: &[u8]) -> Result<MessageValue> {
        let compiled = self.plans.get(schema)?;
        self.check_dialect(schema, &compiled)?;
        let mut reader = CdrReader::new(data)?;
        exec::decode_message(&compiled, &mut reader)
    }
}
