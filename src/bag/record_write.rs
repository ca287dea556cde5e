//! ROS1 bag record serialization.
//!
//! Writers emit `op` as the first header field, then the record-specific
//! fields in a canonical order. The bag header record is padded with ASCII
//! spaces to a fixed 4096 bytes so it can be rewritten in place on close.

use std::io::Write;

use crate::core::{CodecError, Result};
use crate::bag::records::*;

/// Encode one header field: `field_len | name=value`.
pub fn encode_header_field(name: &str, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + name.len() + 1 + value.len());
    out.extend_from_slice(&((name.len() + 1 + value.len()) as u32).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(b'=');
    out.extend_from_slice(value);
    out
}

/// Record-level bag writer with manual position tracking.
pub struct BagRecordWriter<W: Write> {
    out: W,
    position: u64,
}

impl<W: Write> BagRecordWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, position: 0 }
    }

    /// Bytes written so far.
    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Access the underlying sink, e.g. to seek for the header rewrite.
    /// Position tracking is not aware of seeks on the inner writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.out.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    /// Write the `#ROSBAG V2.0\n` version line.
    pub fn write_version(&mut self) -> Result<()> {
        self.write_bytes(BAG_VERSION_LINE)
    }

    /// Write a complete record: `header_len | header | data_len | data`.
    pub fn write_record(
        &mut self,
        op: u8,
        header_fields: &[(&str, Vec<u8>)],
        data: &[u8],
    ) -> Result<()> {
        let mut header = encode_header_field("op", &[op]);
        for (name, value) in header_fields {
            header.extend_from_slice(&encode_header_field(name, value));
        }
        self.write_bytes(&(header.len() as u32).to_le_bytes())?;
        self.write_bytes(&header)?;
        self.write_bytes(&(data.len() as u32).to_le_bytes())?;
        self.write_bytes(data)
    }

    /// Write the bag header record, space-padded to 4096 bytes total.
    pub fn write_bag_header(&mut self, record: &BagHeaderRecord) -> Result<()> {
        let header_fields = [
            ("index_pos", record.index_pos.to_le_bytes().to_vec()),
            ("conn_count", record.conn_count.to_le_bytes().to_vec()),
            ("chunk_count", record.chunk_count.to_le_bytes().to_vec()),
        ];
        let mut header = encode_header_field("op", &[op::BAG_HEADER]);
        for (name, value) in &header_fields {
            header.extend_from_slice(&encode_header_field(name, value));
        }
        let framing = 4 + header.len() as u64 + 4;
        let padding = BAG_HEADER_RECORD_SIZE.checked_sub(framing).ok_or_else(|| {
            CodecError::encode("bag", "bag header fields exceed the 4096-byte record")
        })?;
        self.write_bytes(&(header.len() as u32).to_le_bytes())?;
        self.write_bytes(&header)?;
        self.write_bytes(&(padding as u32).to_le_bytes())?;
        self.write_bytes(&vec![0x20u8; padding as usize])
    }

    pub fn write_connection(&mut self, record: &ConnectionRecord) -> Result<()> {
        let header_fields = [
            ("conn", record.conn.to_le_bytes().to_vec()),
            ("topic", record.topic.as_bytes().to_vec()),
        ];
        let mut data = Vec::new();
        data.extend_from_slice(&encode_header_field(
            "topic",
            record.header.topic.as_bytes(),
        ));
        data.extend_from_slice(&encode_header_field(
            "type",
            record.header.msg_type.as_bytes(),
        ));
        data.extend_from_slice(&encode_header_field(
            "md5sum",
            record.header.md5sum.as_bytes(),
        ));
        data.extend_from_slice(&encode_header_field(
            "message_definition",
            record.header.message_definition.as_bytes(),
        ));
        if let Some(callerid) = &record.header.callerid {
            data.extend_from_slice(&encode_header_field("callerid", callerid.as_bytes()));
        }
        if let Some(latching) = &record.header.latching {
            data.extend_from_slice(&encode_header_field("latching", latching.as_bytes()));
        }
        self.write_record(op::CONNECTION, &header_fields, &data)
    }

    pub fn write_message_data(&mut self, record: &MessageDataRecord) -> Result<()> {
        let (sec, nsec) = split_time(record.time);
        let mut time = Vec::with_capacity(8);
        time.extend_from_slice(&sec.to_le_bytes());
        time.extend_from_slice(&nsec.to_le_bytes());
        let header_fields = [
            ("conn", record.conn.to_le_bytes().to_vec()),
            ("time", time),
        ];
        self.write_record(op::MSG_DATA, &header_fields, &record.data)
    }

    /// Write a chunk record holding already-compressed data.
    pub fn write_chunk(&mut self, record: &ChunkRecord) -> Result<()> {
        let header_fields = [
            ("compression", record.compression.as_bytes().to_vec()),
            ("size", record.size.to_le_bytes().to_vec()),
        ];
        self.write_record(op::CHUNK, &header_fields, &record.data)
    }

    pub fn write_index_data(&mut self, record: &IndexDataRecord) -> Result<()> {
        let header_fields = [
            ("ver", record.ver.to_le_bytes().to_vec()),
            ("conn", record.conn.to_le_bytes().to_vec()),
            ("count", (record.entries.len() as u32).to_le_bytes().to_vec()),
        ];
        let mut data = Vec::with_capacity(record.entries.len() * 12);
        for (time, offset) in &record.entries {
            let (sec, nsec) = split_time(*time);
            data.extend_from_slice(&sec.to_le_bytes());
            data.extend_from_slice(&nsec.to_le_bytes());
            data.extend_from_slice(&offset.to_le_bytes());
        }
        self.write_record(op::INDEX_DATA, &header_fields, &data)
    }

    pub fn write_chunk_info(&mut self, record: &ChunkInfoRecord) -> Result<()> {
        let (start_sec, start_nsec) = split_time(record.start_time);
        let (end_sec, end_nsec) = split_time(record.end_time);
        let mut start = Vec::with_capacity(8);
        start.extend_from_slice(&start_sec.to_le_bytes());
        start.extend_from_slice(&start_nsec.to_le_bytes());
        let mut end = Vec::with_capacity(8);
        end.extend_from_slice(&end_sec.to_le_bytes());
        end.extend_from_slice(&end_nsec.to_le_bytes());
        let header_fields = [
            ("ver", record.ver.to_le_bytes().to_vec()),
            ("chunk_pos", record.chunk_pos.to_le_bytes().to_vec()),
            ("start_time", start),
            ("end_time", end),
            (
                "count",
                (record.connection_counts.len() as u32).to_le_bytes().to_vec(),
            ),
        ];
        let mut data = Vec::with_capacity(record.connection_counts.len() * 8);
        for (conn_id, count) in &record.connection_counts {
            data.extend_from_slice(&conn_id.to_le_bytes());
            data.extend_from_slice(&count.to_le_bytes());
        }
        self.write_record(op::CHUNK_INFO, &header_fields, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_field_encoding() {
        let field = encode_header_field("op", &[0x02]);
        assert_eq!(&field[..4], &3u32.to_le_bytes());
        assert_eq!(&field[4..], b"op=\x02");
    }

    #[test]
    fn test_op_written_first() {
        let mut writer = BagRecordWriter::new(Vec::new());
        writer
            .write_message_data(&MessageDataRecord {
                conn: 1,
                time: 0,
                data: Vec::new(),
            })
            .unwrap();
        let bytes = writer.into_inner();
        // header_len, then first field must be op.
        assert_eq!(&bytes[8..11], b"op=");
    }

    #[test]
    fn test_position_tracking() {
        let mut writer = BagRecordWriter::new(Vec::new());
        writer.write_version().unwrap();
        assert_eq!(writer.tell(), 13);
        writer
            .write_bag_header(&BagHeaderRecord {
                index_pos: 0,
                conn_count: 0,
                chunk_count: 0,
            })
            .unwrap();
        assert_eq!(writer.tell(), 13 + BAG_HEADER_RECORD_SIZE);
    }
}
