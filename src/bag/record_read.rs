//! ROS1 bag record parsing.
//!
//! Headers parse into a name -> raw-bytes map; unknown header fields are
//! kept but ignored, and unknown ops are skipped rather than rejected.

use std::collections::{BTreeMap, HashMap};

use byteorder::{ByteOrder, LittleEndian};

use crate::core::{CodecError, Result};
use crate::io::read::ByteReader;
use crate::bag::records::*;

/// Parse and validate the version line. Returns the version string ("2.0").
pub fn parse_version(reader: &mut ByteReader) -> Result<String> {
    let line = reader.read(BAG_VERSION_LINE.len())?;
    if !line.starts_with(b"#ROSBAG V") {
        return Err(CodecError::malformed(
            "bag",
            format!("invalid version line: {line:02x?}"),
        ));
    }
    let version = &line[9..line.len() - 1];
    String::from_utf8(version.to_vec())
        .map_err(|_| CodecError::malformed("bag", "non-ascii version number"))
}

/// A parsed record header: field name to raw value bytes.
pub struct HeaderFields(HashMap<String, Vec<u8>>);

impl HeaderFields {
    /// Parse `field_len | name=value` entries out of header bytes.
    pub fn parse(header: &[u8]) -> Result<Self> {
        let mut fields = HashMap::new();
        let mut reader = ByteReader::new(header);
        while !reader.is_at_end() {
            let field_len = reader.read_u32()? as usize;
            let field = reader.read(field_len)?;
            let eq = field.iter().position(|b| *b == b'=').ok_or_else(|| {
                CodecError::malformed("bag", "header field has no '=' separator")
            })?;
            let name = std::str::from_utf8(&field[..eq])
                .map_err(|_| CodecError::malformed("bag", "non-ascii header field name"))?;
            fields.insert(name.to_string(), field[eq + 1..].to_vec());
        }
        Ok(Self(fields))
    }

    fn get(&self, name: &str) -> Result<&[u8]> {
        self.0
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| {
                CodecError::malformed("bag", format!("record header missing '{name}' field"))
            })
    }

    fn expect_len(&self, name: &str, value: &[u8], len: usize) -> Result<()> {
        if value.len() != len {
            return Err(CodecError::malformed(
                "bag",
                format!(
                    "header field '{name}' has {} bytes, expected {len}",
                    value.len()
                ),
            ));
        }
        Ok(())
    }

    pub fn get_u8(&self, name: &str) -> Result<u8> {
        let value = self.get(name)?;
        self.expect_len(name, value, 1)?;
        Ok(value[0])
    }

    pub fn get_u32(&self, name: &str) -> Result<u32> {
        let value = self.get(name)?;
        self.expect_len(name, value, 4)?;
        Ok(LittleEndian::read_u32(value))
    }

    pub fn get_u64(&self, name: &str) -> Result<u64> {
        let value = self.get(name)?;
        self.expect_len(name, value, 8)?;
        Ok(LittleEndian::read_u64(value))
    }

    /// A bag time field: `sec:u32 | nsec:u32`, returned as nanoseconds.
    pub fn get_time(&self, name: &str) -> Result<u64> {
        let value = self.get(name)?;
        self.expect_len(name, value, 8)?;
        Ok(join_time(
            LittleEndian::read_u32(&value[..4]),
            LittleEndian::read_u32(&value[4..]),
        ))
    }

    pub fn get_string(&self, name: &str) -> Result<String> {
        let value = self.get(name)?;
        String::from_utf8(value.to_vec())
            .map_err(|_| CodecError::malformed("bag", format!("field '{name}' is not utf-8")))
    }

    pub fn get_opt_string(&self, name: &str) -> Option<String> {
        self.0
            .get(name)
            .and_then(|v| String::from_utf8(v.clone()).ok())
    }
}

/// Parse the next record. Returns `None` cleanly at end of input.
pub fn parse_record(reader: &mut ByteReader) -> Result<Option<BagRecord>> {
    if reader.remaining() < 4 {
        return Ok(None);
    }
    let header_len = reader.read_u32()? as usize;
    let header = reader.read(header_len)?;
    let fields = HeaderFields::parse(header)?;
    let data_len = reader.read_u32()? as usize;
    let data = reader.read(data_len)?;

    let op = fields.get_u8("op")?;
    let record = match op {
        op::BAG_HEADER => BagRecord::BagHeader(BagHeaderRecord {
            index_pos: fields.get_u64("index_pos")?,
            conn_count: fields.get_u32("conn_count")?,
            chunk_count: fields.get_u32("chunk_count")?,
        }),
        op::CONNECTION => {
            let conn_fields = HeaderFields::parse(data)?;
            BagRecord::Connection(ConnectionRecord {
                conn: fields.get_u32("conn")?,
                topic: fields.get_string("topic")?,
                header: ConnectionHeader {
                    topic: conn_fields
                        .get_opt_string("topic")
                        .unwrap_or_else(|| fields.get_opt_string("topic").unwrap_or_default()),
                    msg_type: conn_fields.get_string("type")?,
                    md5sum: conn_fields.get_string("md5sum")?,
                    message_definition: conn_fields
                        .get_opt_string("message_definition")
                        .unwrap_or_default(),
                    callerid: conn_fields.get_opt_string("callerid"),
                    latching: conn_fields.get_opt_string("latching"),
                },
            })
        }
        op::MSG_DATA => BagRecord::MessageData(MessageDataRecord {
            conn: fields.get_u32("conn")?,
            time: fields.get_time("time")?,
            data: data.to_vec(),
        }),
        op::CHUNK => BagRecord::Chunk(ChunkRecord {
            compression: fields.get_string("compression")?,
            size: fields.get_u32("size")?,
            data: data.to_vec(),
        }),
        op::INDEX_DATA => {
            let ver = fields.get_u32("ver")?;
            let conn = fields.get_u32("conn")?;
            let count = fields.get_u32("count")? as usize;
            if data.len() < count * 12 {
                return Err(CodecError::malformed(
                    "bag",
                    format!(
                        "index data holds {} bytes for {count} entries",
                        data.len()
                    ),
                ));
            }
            let mut entries = Vec::with_capacity(count);
            for i in 0..count {
                let entry = &data[i * 12..(i + 1) * 12];
                let sec = LittleEndian::read_u32(&entry[..4]);
                let nsec = LittleEndian::read_u32(&entry[4..8]);
                let offset = LittleEndian::read_u32(&entry[8..12]);
                entries.push((join_time(sec, nsec), offset));
            }
            BagRecord::IndexData(IndexDataRecord { ver, conn, entries })
        }
        op::CHUNK_INFO => {
            let mut connection_counts = BTreeMap::new();
            for entry in data.chunks_exact(8) {
                let conn_id = LittleEndian::read_u32(&entry[..4]);
                let count = LittleEndian::read_u32(&entry[4..8]);
                connection_counts.insert(conn_id, count);
            }
            BagRecord::ChunkInfo(ChunkInfoRecord {
                ver: fields.get_u32("ver")?,
                chunk_pos: fields.get_u64("chunk_pos")?,
                start_time: fields.get_time("start_time")?,
                end_time: fields.get_time("end_time")?,
                connection_counts,
            })
        }
        other => {
            tracing::debug!(op = other, "skipping unknown bag record type");
            BagRecord::Unknown { op: other }
        }
    };
    Ok(Some(record))
}
