//! rosmsg payload codec, the ROS 1 wire format.
//!
//! No encapsulation header, no alignment padding, always little-endian.
//! Strings are length-prefixed with no terminator. `time` is two uint32
//! words, `duration` two int32 words.

use crate::core::{CodecError, MessageValue, Result};
use crate::encoding::{exec, MessageCodec, PayloadReader, PayloadWriter, PlanCache};
use crate::schema::ParsedSchema;

/// Read cursor over a rosmsg payload.
pub struct RosmsgReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RosmsgReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
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
        self.check(4)?;
        let bytes = [
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ];
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }
}

impl PayloadReader for RosmsgReader<'_> {
    fn align(&mut self, _size: usize) -> Result<()> {
        // rosmsg has no alignment.
        Ok(())
    }

    fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.check(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32_prim()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|e| CodecError::encode("rosmsg", format!("invalid utf-8 in string: {e}")))
    }

    fn read_wstring(&mut self) -> Result<String> {
        Err(CodecError::unsupported(
            "wstring is not a ROS1 type and has no rosmsg wire format",
        ))
    }

    fn is_little_endian(&self) -> bool {
        true
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}

/// Write cursor building a rosmsg payload.
#[derive(Default)]
pub struct RosmsgWriter {
    buf: Vec<u8>,
}

impl RosmsgWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish and return the payload bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

impl PayloadWriter for RosmsgWriter {
    fn align(&mut self, _size: usize) -> Result<()> {
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.buf
            .extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn write_wstring(&mut self, _s: &str) -> Result<()> {
        Err(CodecError::unsupported(
            "wstring is not a ROS1 type and has no rosmsg wire format",
        ))
    }

    fn is_little_endian(&self) -> bool {
        true
    }

    fn position(&self) -> u64 {
        self.buf.len() as u64
    }
}

/// rosmsg message codec.
#[derive(Default)]
pub struct RosmsgCodec {
    plans: PlanCache,
}

impl RosmsgCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageCodec for RosmsgCodec {
    fn encoding(&self) -> &'static str {
        "ros1"
    }

    fn serialize_message(&self, schema: &ParsedSchema, msg: &MessageValue) -> Result<Vec<u8>> {
        let compiled = self.plans.get(schema)?;
        let mut writer = RosmsgWriter::new();
        exec::encode_message(&compiled, &mut writer, msg)?;
        Ok(writer.finish())
    }

    fn deserialize_message(&self, schema: &ParsedSchema, data: &[u8]) -> Result<MessageValue> {
        let compiled = self.plans.get(schema)?;
        let mut reader = RosmsgReader::new(data);
        exec::decode_message(&compiled, &mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::schema::{parse_schema, Dialect};

    #[test]
    fn test_no_alignment_padding() {
        // uint8 then uint32: CDR would pad three bytes, rosmsg none.
        let schema = parse_schema("pkg/T", "uint8 a\nuint32 b", Dialect::Ros1).unwrap();
        let codec = RosmsgCodec::new();
        let mut msg = MessageValue::new();
        msg.insert("a".into(), Value::UInt8(7));
        msg.insert("b".into(), Value::UInt32(0x01020304));

        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[0], 7);
        assert_eq!(&bytes[1..], &0x01020304u32.to_le_bytes());
        assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
    }

    #[test]
    fn test_empty_string_is_four_zero_bytes() {
        let schema = parse_schema("std_msgs/String", "string data", Dialect::Ros1).unwrap();
        let codec = RosmsgCodec::new();
        let mut msg = MessageValue::new();
        msg.insert("data".into(), Value::String(String::new()));

        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x00]);
        let decoded = codec.deserialize_message(&schema, &bytes).unwrap();
        assert_eq!(decoded.get("data"), Some(&Value::String(String::new())));
    }

    #[test]
    fn test_string_has_no_null_terminator() {
        let schema = parse_schema("std_msgs/String", "string data", Dialect::Ros1).unwrap();
        let codec = RosmsgCodec::new();
        let mut msg = MessageValue::new();
        msg.insert("data".into(), Value::String("hello".into()));

        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        assert_eq!(bytes.len(), 4 + 5);
        assert_eq!(&bytes[4..], b"hello");
    }

    #[test]
    fn test_time_and_duration_words() {
        let schema = parse_schema(
            "pkg/Stamped",
            "time stamp\nduration elapsed",
            Dialect::Ros1,
        )
        .unwrap();
        let codec = RosmsgCodec::new();
        let mut msg = MessageValue::new();
        msg.insert(
            "stamp".into(),
            Value::Time {
                secs: 1_234_567_890,
                nsecs: 123_456_789,
            },
        );
        msg.insert(
            "elapsed".into(),
            Value::Duration {
                secs: -2,
                nsecs: 500_000_000,
            },
        );

        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &1_234_567_890u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &123_456_789u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &(-2i32).to_le_bytes());
        assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
    }

    #[test]
    fn test_sequence_roundtrip() {
        let schema = parse_schema("pkg/T", "float64[] data\nstring[] names", Dialect::Ros1)
            .unwrap();
        let codec = RosmsgCodec::new();
        let mut msg = MessageValue::new();
        msg.insert(
            "data".into(),
            Value::Array(vec![Value::Float64(1.5), Value::Float64(-2.5)]),
        );
        msg.insert(
            "names".into(),
            Value::Array(vec![
                Value::String("a".into()),
                Value::String("bc".into()),
            ]),
        );
        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
    }

    #[test]
    fn test_header_style_message() {
        let schema = parse_schema(
            "std_msgs/Header",
            "uint32 seq\ntime stamp\nstring frame_id",
            Dialect::Ros1,
        )
        .unwrap();
        let codec = RosmsgCodec::new();
        let mut msg = MessageValue::new();
        msg.insert("seq".into(), Value::UInt32(10));
        msg.insert(
            "stamp".into(),
            Value::Time {
                secs: 100,
                nsecs: 200,
            },
        );
        msg.insert("frame_id".into(), Value::String("map".into()));

        let bytes = codec.serialize_message(&schema, &msg).unwrap();
        // 4 seq + 8 stamp + 4 len + 3 text, no padding anywhere.
        assert_eq!(bytes.len(), 19);
        assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
    }
}
