//! MCAP record serialization.
//!
//! Bodies are assembled in memory and framed as `opcode | len:u64 | body`.
//! The writer rides on a [`CrcWriter`] so the engine can read out CRC scopes
//! (data section, summary) without re-walking the file.

use std::collections::BTreeMap;
use std::io::Write;

use crate::core::Result;
use crate::io::crc::{crc32, CrcWriter};
use crate::mcap::records::*;

/// Record-level writer.
pub struct RecordWriter<W: Write> {
    out: CrcWriter<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            out: CrcWriter::new(inner),
        }
    }

    /// Bytes written so far.
    pub fn tell(&self) -> u64 {
        self.out.tell()
    }

    /// Running CRC since the last clear.
    pub fn get_crc(&self) -> u32 {
        self.out.get_crc()
    }

    /// Restart the running CRC.
    pub fn clear_crc(&mut self) {
        self.out.clear_crc()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> CrcWriter<W> {
        self.out
    }

    /// Write the 8-byte magic.
    pub fn write_magic(&mut self) -> Result<()> {
        self.out.write_bytes(MCAP_MAGIC)
    }

    /// Frame and write one record.
    pub fn write_record(&mut self, opcode: u8, body: &[u8]) -> Result<()> {
        self.out.write_bytes(&[opcode])?;
        self.out.write_bytes(&(body.len() as u64).to_le_bytes())?;
        self.out.write_bytes(body)
    }

    pub fn write_header(&mut self, record: &HeaderRecord) -> Result<()> {
        let mut body = Vec::new();
        put_string(&mut body, &record.profile);
        put_string(&mut body, &record.library);
        self.write_record(op::HEADER, &body)
    }

    pub fn write_footer(&mut self, record: &FooterRecord) -> Result<()> {
        let mut body = Vec::with_capacity(20);
        body.extend_from_slice(&record.summary_start.to_le_bytes());
        body.extend_from_slice(&record.summary_offset_start.to_le_bytes());
        body.extend_from_slice(&record.summary_crc.to_le_bytes());
        self.write_record(op::FOOTER, &body)
    }

    /// Write the footer, computing `summary_crc` as the running CRC extended
    /// over the footer's own bytes up to the crc field.
    ///
    /// The caller must have cleared the CRC at `summary_start` (or at file
    /// start when the summary is empty).
    pub fn write_footer_with_crc(&mut self, summary_start: u64, summary_offset_start: u64) -> Result<()> {
        let mut crc = crc32fast::Hasher::new_with_initial(self.get_crc());
        crc.update(&[op::FOOTER]);
        crc.update(&20u64.to_le_bytes());
        crc.update(&summary_start.to_le_bytes());
        crc.update(&summary_offset_start.to_le_bytes());
        self.write_footer(&FooterRecord {
            summary_start,
            summary_offset_start,
            summary_crc: crc.finalize(),
        })
    }

    pub fn write_schema(&mut self, record: &SchemaRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.id.to_le_bytes());
        put_string(&mut body, &record.name);
        put_string(&mut body, &record.encoding);
        body.extend_from_slice(&(record.data.len() as u32).to_le_bytes());
        body.extend_from_slice(&record.data);
        self.write_record(op::SCHEMA, &body)
    }

    pub fn write_channel(&mut self, record: &ChannelRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.id.to_le_bytes());
        body.extend_from_slice(&record.schema_id.to_le_bytes());
        put_string(&mut body, &record.topic);
        put_string(&mut body, &record.message_encoding);
        put_string_map(&mut body, &record.metadata);
        self.write_record(op::CHANNEL, &body)
    }

    pub fn write_message(&mut self, record: &MessageRecord) -> Result<()> {
        let body = encode_message_body(record);
        self.write_record(op::MESSAGE, &body)
    }

    pub fn write_chunk(&mut self, record: &ChunkRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.message_start_time.to_le_bytes());
        body.extend_from_slice(&record.message_end_time.to_le_bytes());
        body.extend_from_slice(&record.uncompressed_size.to_le_bytes());
        body.extend_from_slice(&record.uncompressed_crc.to_le_bytes());
        put_string(&mut body, &record.compression);
        body.extend_from_slice(&(record.records.len() as u64).to_le_bytes());
        body.extend_from_slice(&record.records);
        self.write_record(op::CHUNK, &body)
    }

    pub fn write_message_index(&mut self, record: &MessageIndexRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.channel_id.to_le_bytes());
        body.extend_from_slice(&((record.records.len() * 16) as u32).to_le_bytes());
        for (log_time, offset) in &record.records {
            body.extend_from_slice(&log_time.to_le_bytes());
            body.extend_from_slice(&offset.to_le_bytes());
        }
        self.write_record(op::MESSAGE_INDEX, &body)
    }

    pub fn write_chunk_index(&mut self, record: &ChunkIndexRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.message_start_time.to_le_bytes());
        body.extend_from_slice(&record.message_end_time.to_le_bytes());
        body.extend_from_slice(&record.chunk_start_offset.to_le_bytes());
        body.extend_from_slice(&record.chunk_length.to_le_bytes());
        put_u16_u64_map(&mut body, &record.message_index_offsets);
        body.extend_from_slice(&record.message_index_length.to_le_bytes());
        put_string(&mut body, &record.compression);
        body.extend_from_slice(&record.compressed_size.to_le_bytes());
        body.extend_from_slice(&record.uncompressed_size.to_le_bytes());
        self.write_record(op::CHUNK_INDEX, &body)
    }

    /// Write an attachment; a zero `crc` field is replaced by the CRC of the
    /// preceding body bytes.
    pub fn write_attachment(&mut self, record: &AttachmentRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.log_time.to_le_bytes());
        body.extend_from_slice(&record.create_time.to_le_bytes());
        put_string(&mut body, &record.name);
        put_string(&mut body, &record.media_type);
        body.extend_from_slice(&(record.data.len() as u64).to_le_bytes());
        body.extend_from_slice(&record.data);
        let crc = if record.crc != 0 {
            record.crc
        } else {
            crc32(&body)
        };
        body.extend_from_slice(&crc.to_le_bytes());
        self.write_record(op::ATTACHMENT, &body)
    }

    pub fn write_attachment_index(&mut self, record: &AttachmentIndexRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.offset.to_le_bytes());
        body.extend_from_slice(&record.length.to_le_bytes());
        body.extend_from_slice(&record.log_time.to_le_bytes());
        body.extend_from_slice(&record.create_time.to_le_bytes());
        body.extend_from_slice(&record.data_size.to_le_bytes());
        put_string(&mut body, &record.name);
        put_string(&mut body, &record.media_type);
        self.write_record(op::ATTACHMENT_INDEX, &body)
    }

    pub fn write_statistics(&mut self, record: &StatisticsRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.message_count.to_le_bytes());
        body.extend_from_slice(&record.schema_count.to_le_bytes());
        body.extend_from_slice(&record.channel_count.to_le_bytes());
        body.extend_from_slice(&record.attachment_count.to_le_bytes());
        body.extend_from_slice(&record.metadata_count.to_le_bytes());
        body.extend_from_slice(&record.chunk_count.to_le_bytes());
        body.extend_from_slice(&record.message_start_time.to_le_bytes());
        body.extend_from_slice(&record.message_end_time.to_le_bytes());
        // Deterministic output: sort by channel id.
        let mut counts: Vec<(u16, u64)> = record
            .channel_message_counts
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();
        counts.sort_unstable();
        body.extend_from_slice(&((counts.len() * 10) as u32).to_le_bytes());
        for (channel_id, count) in counts {
            body.extend_from_slice(&channel_id.to_le_bytes());
            body.extend_from_slice(&count.to_le_bytes());
        }
        self.write_record(op::STATISTICS, &body)
    }

    pub fn write_metadata(&mut self, record: &MetadataRecord) -> Result<()> {
        let mut body = Vec::new();
        put_string(&mut body, &record.name);
        put_string_map(&mut body, &record.metadata);
        self.write_record(op::METADATA, &body)
    }

    pub fn write_metadata_index(&mut self, record: &MetadataIndexRecord) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&record.offset.to_le_bytes());
        body.extend_from_slice(&record.length.to_le_bytes());
        put_string(&mut body, &record.name);
        self.write_record(op::METADATA_INDEX, &body)
    }

    pub fn write_summary_offset(&mut self, record: &SummaryOffsetRecord) -> Result<()> {
        let mut body = Vec::with_capacity(17);
        body.push(record.group_opcode);
        body.extend_from_slice(&record.group_start.to_le_bytes());
        body.extend_from_slice(&record.group_length.to_le_bytes());
        self.write_record(op::SUMMARY_OFFSET, &body)
    }

    pub fn write_data_end(&mut self, record: &DataEndRecord) -> Result<()> {
        let body = record.data_section_crc.to_le_bytes();
        self.write_record(op::DATA_END, &body)
    }
}

/// Encode a message record body (used directly by the chunk buffer).
pub fn encode_message_body(record: &MessageRecord) -> Vec<u8> {
    let mut body = Vec::with_capacity(22 + record.data.len());
    body.extend_from_slice(&record.channel_id.to_le_bytes());
    body.extend_from_slice(&record.sequence.to_le_bytes());
    body.extend_from_slice(&record.log_time.to_le_bytes());
    body.extend_from_slice(&record.publish_time.to_le_bytes());
    body.extend_from_slice(&record.data);
    body
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn put_string_map(out: &mut Vec<u8>, map: &BTreeMap<String, String>) {
    let mut payload = Vec::new();
    for (key, value) in map {
        put_string(&mut payload, key);
        put_string(&mut payload, value);
    }
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
}

fn put_u16_u64_map(out: &mut Vec<u8>, map: &BTreeMap<u16, u64>) {
    out.extend_from_slice(&((map.len() * 10) as u32).to_le_bytes());
    for (key, value) in map {
        out.extend_from_slice(&key.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_framing() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_data_end(&DataEndRecord { data_section_crc: 7 }).unwrap();
        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes[0], op::DATA_END);
        assert_eq!(&bytes[1..9], &4u64.to_le_bytes());
        assert_eq!(&bytes[9..13], &7u32.to_le_bytes());
    }

    #[test]
    fn test_magic_bytes() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_magic().unwrap();
        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes, [0x89, b'M', b'C', b'A', b'P', 0x30, 0x0D, 0x0A]);
    }

    #[test]
    fn test_footer_is_29_bytes_total() {
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .write_footer(&FooterRecord {
                summary_start: 1,
                summary_offset_start: 2,
                summary_crc: 3,
            })
            .unwrap();
        // opcode + u64 length + 20-byte body
        assert_eq!(writer.tell(), 29);
    }

    #[test]
    fn test_crc_scope_tracking() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_magic().unwrap();
        writer.clear_crc();
        writer
            .write_data_end(&DataEndRecord { data_section_crc: 0 })
            .unwrap();
        let crc = writer.get_crc();
        let bytes = writer.into_inner().into_inner();
        assert_eq!(crc, crc32(&bytes[8..]));
    }
}
