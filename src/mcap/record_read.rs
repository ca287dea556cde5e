//! MCAP record parsing.
//!
//! [`RecordReader`] walks a byte view record by record. Unknown opcodes are
//! skipped by their length prefix rather than treated as errors; structural
//! violations (bad magic, truncated bodies, a footer that is not 20 bytes)
//! are `MalformedContainer`.

use std::collections::BTreeMap;

use crate::core::{CodecError, Result};
use crate::io::read::ByteReader;
use crate::mcap::records::*;

/// Record-level reader over an in-memory MCAP byte view.
pub struct RecordReader<'a> {
    reader: ByteReader<'a>,
}

impl<'a> RecordReader<'a> {
    /// Create a reader positioned at the start of the buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(data),
        }
    }

    /// Current byte offset.
    pub fn tell(&self) -> u64 {
        self.reader.tell()
    }

    /// Move to an absolute offset.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.reader.seek(pos)
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }

    /// Read and validate the 8-byte magic.
    pub fn read_magic(&mut self) -> Result<()> {
        let magic = self.reader.read(MCAP_MAGIC.len())?;
        if magic != MCAP_MAGIC {
            return Err(CodecError::malformed(
                "mcap",
                format!("invalid magic bytes: {magic:02x?}"),
            ));
        }
        Ok(())
    }

    /// Peek at the next record's opcode without advancing. Returns `None` at
    /// end of data.
    pub fn peek_opcode(&self) -> Option<u8> {
        self.reader.peek(1).first().copied()
    }

    /// Skip one record (opcode + length + body).
    pub fn skip_record(&mut self) -> Result<()> {
        let _opcode = self.reader.read_u8()?;
        let length = self.reader.read_u64()?;
        self.check_body(length)?;
        self.reader.skip(length as usize)
    }

    fn check_body(&self, length: u64) -> Result<()> {
        if length > self.reader.remaining() as u64 {
            return Err(CodecError::malformed(
                "mcap",
                format!(
                    "record body of {length} bytes exceeds remaining {} bytes",
                    self.reader.remaining()
                ),
            ));
        }
        Ok(())
    }

    /// Parse the next record, whatever its kind.
    pub fn next_record(&mut self) -> Result<Record> {
        let opcode = self.reader.read_u8()?;
        let length = self.reader.read_u64()?;
        self.check_body(length)?;
        let body = self.reader.read(length as usize)?;
        parse_record_body(opcode, body, length)
    }
}

/// Parse a record body for a given opcode.
pub fn parse_record_body(opcode: u8, body: &[u8], length: u64) -> Result<Record> {
    let mut r = ByteReader::new(body);
    let record = match opcode {
        op::HEADER => Record::Header(HeaderRecord {
            profile: read_string(&mut r)?,
            library: read_string(&mut r)?,
        }),
        op::FOOTER => {
            if length != 20 {
                return Err(CodecError::malformed(
                    "mcap",
                    format!("footer body must be 20 bytes, found {length}"),
                ));
            }
            Record::Footer(FooterRecord {
                summary_start: r.read_u64()?,
                summary_offset_start: r.read_u64()?,
                summary_crc: r.read_u32()?,
            })
        }
        op::SCHEMA => {
            let id = r.read_u16()?;
            let name = read_string(&mut r)?;
            let encoding = read_string(&mut r)?;
            let data_len = r.read_u32()? as usize;
            let data = r.read(data_len)?.to_vec();
            Record::Schema(SchemaRecord {
                id,
                name,
                encoding,
                data,
            })
        }
        op::CHANNEL => Record::Channel(ChannelRecord {
            id: r.read_u16()?,
            schema_id: r.read_u16()?,
            topic: read_string(&mut r)?,
            message_encoding: read_string(&mut r)?,
            metadata: read_string_map(&mut r)?,
        }),
        op::MESSAGE => {
            if length < 22 {
                return Err(CodecError::malformed(
                    "mcap",
                    format!("message body of {length} bytes is shorter than its fixed fields"),
                ));
            }
            Record::Message(MessageRecord {
                channel_id: r.read_u16()?,
                sequence: r.read_u32()?,
                log_time: r.read_u64()?,
                publish_time: r.read_u64()?,
                data: r.read(length as usize - 22)?.to_vec(),
            })
        }
        op::CHUNK => {
            let message_start_time = r.read_u64()?;
            let message_end_time = r.read_u64()?;
            let uncompressed_size = r.read_u64()?;
            let uncompressed_crc = r.read_u32()?;
            let compression = read_string(&mut r)?;
            let records_len = r.read_u64()? as usize;
            let records = r.read(records_len)?.to_vec();
            Record::Chunk(ChunkRecord {
                message_start_time,
                message_end_time,
                uncompressed_size,
                uncompressed_crc,
                compression,
                records,
            })
        }
        op::MESSAGE_INDEX => {
            let channel_id = r.read_u16()?;
            let byte_len = r.read_u32()? as usize;
            if byte_len % 16 != 0 {
                return Err(CodecError::malformed(
                    "mcap",
                    format!("message index array length {byte_len} is not a multiple of 16"),
                ));
            }
            let mut records = Vec::with_capacity(byte_len / 16);
            for _ in 0..byte_len / 16 {
                records.push((r.read_u64()?, r.read_u64()?));
            }
            Record::MessageIndex(MessageIndexRecord {
                channel_id,
                records,
            })
        }
        op::CHUNK_INDEX => Record::ChunkIndex(ChunkIndexRecord {
            message_start_time: r.read_u64()?,
            message_end_time: r.read_u64()?,
            chunk_start_offset: r.read_u64()?,
            chunk_length: r.read_u64()?,
            message_index_offsets: read_u16_u64_map(&mut r)?,
            message_index_length: r.read_u64()?,
            compression: read_string(&mut r)?,
            compressed_size: r.read_u64()?,
            uncompressed_size: r.read_u64()?,
        }),
        op::ATTACHMENT => {
            let log_time = r.read_u64()?;
            let create_time = r.read_u64()?;
            let name = read_string(&mut r)?;
            let media_type = read_string(&mut r)?;
            let data_len = r.read_u64()? as usize;
            let data = r.read(data_len)?.to_vec();
            let crc = r.read_u32()?;
            Record::Attachment(AttachmentRecord {
                log_time,
                create_time,
                name,
                media_type,
                data,
                crc,
            })
        }
        op::ATTACHMENT_INDEX => Record::AttachmentIndex(AttachmentIndexRecord {
            offset: r.read_u64()?,
            length: r.read_u64()?,
            log_time: r.read_u64()?,
            create_time: r.read_u64()?,
            data_size: r.read_u64()?,
            name: read_string(&mut r)?,
            media_type: read_string(&mut r)?,
        }),
        op::STATISTICS => {
            let message_count = r.read_u64()?;
            let schema_count = r.read_u16()?;
            let channel_count = r.read_u32()?;
            let attachment_count = r.read_u32()?;
            let metadata_count = r.read_u32()?;
            let chunk_count = r.read_u32()?;
            let message_start_time = r.read_u64()?;
            let message_end_time = r.read_u64()?;
            let byte_len = r.read_u32()? as usize;
            if byte_len % 10 != 0 {
                return Err(CodecError::malformed(
                    "mcap",
                    format!("channel message counts length {byte_len} is not a multiple of 10"),
                ));
            }
            let mut channel_message_counts = std::collections::HashMap::new();
            for _ in 0..byte_len / 10 {
                let channel_id = r.read_u16()?;
                let count = r.read_u64()?;
                channel_message_counts.insert(channel_id, count);
            }
            Record::Statistics(StatisticsRecord {
                message_count,
                schema_count,
                channel_count,
                attachment_count,
                metadata_count,
                chunk_count,
                message_start_time,
                message_end_time,
                channel_message_counts,
            })
        }
        op::METADATA => Record::Metadata(MetadataRecord {
            name: read_string(&mut r)?,
            metadata: read_string_map(&mut r)?,
        }),
        op::METADATA_INDEX => Record::MetadataIndex(MetadataIndexRecord {
            offset: r.read_u64()?,
            length: r.read_u64()?,
            name: read_string(&mut r)?,
        }),
        op::SUMMARY_OFFSET => Record::SummaryOffset(SummaryOffsetRecord {
            group_opcode: r.read_u8()?,
            group_start: r.read_u64()?,
            group_length: r.read_u64()?,
        }),
        op::DATA_END => Record::DataEnd(DataEndRecord {
            data_section_crc: r.read_u32()?,
        }),
        other => Record::Unknown {
            opcode: other,
            length,
        },
    };
    Ok(record)
}

fn read_string(r: &mut ByteReader) -> Result<String> {
    let len = r.read_u32()? as usize;
    let bytes = r.read(len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CodecError::malformed("mcap", format!("invalid utf-8 in string: {e}")))
}

fn read_string_map(r: &mut ByteReader) -> Result<BTreeMap<String, String>> {
    let byte_len = r.read_u32()? as usize;
    let end = r.tell() + byte_len as u64;
    let mut map = BTreeMap::new();
    while r.tell() < end {
        let key = read_string(r)?;
        let value = read_string(r)?;
        map.insert(key, value);
    }
    if r.tell() != end {
        return Err(CodecError::malformed(
            "mcap",
            format!("map overran its declared {byte_len} bytes"),
        ));
    }
    Ok(map)
}

fn read_u16_u64_map(r: &mut ByteReader) -> Result<BTreeMap<u16, u64>> {
    let byte_len = r.read_u32()? as usize;
    if byte_len % 10 != 0 {
        return Err(CodecError::malformed(
            "mcap",
            format!("u16->u64 map length {byte_len} is not a multiple of 10"),
        ));
    }
    let mut map = BTreeMap::new();
    for _ in 0..byte_len / 10 {
        let key = r.read_u16()?;
        let value = r.read_u64()?;
        map.insert(key, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcap::record_write::RecordWriter;

    #[test]
    fn test_magic_validation() {
        let mut reader = RecordReader::new(b"\x89MCAP0\r\n");
        assert!(reader.read_magic().is_ok());

        let mut reader = RecordReader::new(b"\x89MCAP1\r\n");
        assert!(reader.read_magic().is_err());
    }

    #[test]
    fn test_footer_length_enforced() {
        let mut body = Vec::new();
        body.push(op::FOOTER);
        body.extend_from_slice(&19u64.to_le_bytes());
        body.extend_from_slice(&[0u8; 19]);
        let mut reader = RecordReader::new(&body);
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn test_unknown_opcode_skipped() {
        let mut data = Vec::new();
        data.push(0x7F);
        data.extend_from_slice(&3u64.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3]);
        let mut reader = RecordReader::new(&data);
        assert_eq!(reader.peek_opcode(), Some(0x7F));
        match reader.next_record().unwrap() {
            Record::Unknown { opcode, length } => {
                assert_eq!(opcode, 0x7F);
                assert_eq!(length, 3);
            }
            other => panic!("expected unknown record, got {other:?}"),
        }
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_body_rejected() {
        let mut data = Vec::new();
        data.push(op::DATA_END);
        data.extend_from_slice(&100u64.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]);
        let mut reader = RecordReader::new(&data);
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn test_header_roundtrip() {
        let record = HeaderRecord {
            profile: "ros2".into(),
            library: "roslog 0.1.0".into(),
        };
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_header(&record).unwrap();
        let bytes = writer.into_inner().into_inner();

        let mut reader = RecordReader::new(&bytes);
        assert_eq!(reader.peek_opcode(), Some(op::HEADER));
        match reader.next_record().unwrap() {
            Record::Header(parsed) => assert_eq!(parsed, record),
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn test_message_roundtrip() {
        let record = MessageRecord {
            channel_id: 3,
            sequence: 9,
            log_time: 1000,
            publish_time: 999,
            data: vec![0xAA, 0xBB],
        };
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_message(&record).unwrap();
        let bytes = writer.into_inner().into_inner();
        let mut reader = RecordReader::new(&bytes);
        match reader.next_record().unwrap() {
            Record::Message(parsed) => assert_eq!(parsed, record),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_channel_map_roundtrip() {
        let mut metadata = BTreeMap::new();
        metadata.insert("callerid".to_string(), "/node".to_string());
        metadata.insert("latching".to_string(), "1".to_string());
        let record = ChannelRecord {
            id: 1,
            schema_id: 2,
            topic: "/points".into(),
            message_encoding: "cdr".into(),
            metadata,
        };
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_channel(&record).unwrap();
        let bytes = writer.into_inner().into_inner();
        let mut reader = RecordReader::new(&bytes);
        match reader.next_record().unwrap() {
            Record::Channel(parsed) => assert_eq!(parsed, record),
            other => panic!("expected channel, got {other:?}"),
        }
    }

    #[test]
    fn test_chunk_index_roundtrip() {
        let mut offsets = BTreeMap::new();
        offsets.insert(0u16, 512u64);
        offsets.insert(3u16, 600u64);
        let record = ChunkIndexRecord {
            message_start_time: 10,
            message_end_time: 20,
            chunk_start_offset: 100,
            chunk_length: 400,
            message_index_offsets: offsets,
            message_index_length: 64,
            compression: "zstd".into(),
            compressed_size: 300,
            uncompressed_size: 900,
        };
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_chunk_index(&record).unwrap();
        let bytes = writer.into_inner().into_inner();
        let mut reader = RecordReader::new(&bytes);
        match reader.next_record().unwrap() {
            Record::ChunkIndex(parsed) => assert_eq!(parsed, record),
            other => panic!("expected chunk index, got {other:?}"),
        }
    }

    #[test]
    fn test_statistics_roundtrip() {
        let mut counts = std::collections::HashMap::new();
        counts.insert(0u16, 10u64);
        counts.insert(1u16, 5u64);
        let record = StatisticsRecord {
            message_count: 15,
            schema_count: 2,
            channel_count: 2,
            attachment_count: 0,
            metadata_count: 1,
            chunk_count: 3,
            message_start_time: 7,
            message_end_time: 99,
            channel_message_counts: counts,
        };
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_statistics(&record).unwrap();
        let bytes = writer.into_inner().into_inner();
        let mut reader = RecordReader::new(&bytes);
        match reader.next_record().unwrap() {
            Record::Statistics(parsed) => assert_eq!(parsed, record),
            other => panic!("expected statistics, got {other:?}"),
        }
    }

    #[test]
    fn test_attachment_roundtrip() {
        let record = AttachmentRecord {
            log_time: 1,
            create_time: 2,
            name: "calib.yaml".into(),
            media_type: "text/yaml".into(),
            data: b"k: v".to_vec(),
            crc: 0,
        };
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_attachment(&record).unwrap();
        let bytes = writer.into_inner().into_inner();
        let mut reader = RecordReader::new(&bytes);
        match reader.next_record().unwrap() {
            Record::Attachment(parsed) => {
                assert_eq!(parsed.name, record.name);
                assert_eq!(parsed.data, record.data);
                // The writer computes the body CRC.
                assert_ne!(parsed.crc, 0);
            }
            other => panic!("expected attachment, got {other:?}"),
        }
    }
}
