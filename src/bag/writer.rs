//! ROS1 bag file writer.
//!
//! Writes the version line, a placeholder bag header, then chunks of
//! connection and message records. Connections are written both inside
//! chunks (where their messages live) and again in the index section. On
//! close, the header placeholder is rewritten in place with the real
//! `index_pos` and counts.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::core::{CodecError, Result};
use crate::io::compression::{compress, Compression};
use crate::bag::record_write::BagRecordWriter;
use crate::bag::records::*;

/// Default chunk threshold: 768 KiB of uncompressed records, matching the
/// rosbag C++ default.
pub const DEFAULT_BAG_CHUNK_SIZE: u64 = 768 * 1024;

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct BagWriteOptions {
    /// Chunk compression; bags permit none or bz2
    pub compression: Compression,
    /// Chunk threshold in bytes; 0 flushes after every message
    pub chunk_size: u64,
}

impl Default for BagWriteOptions {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            chunk_size: DEFAULT_BAG_CHUNK_SIZE,
        }
    }
}

/// ROS1 bag file writer.
pub struct BagWriter<W: Write + Seek> {
    out: BagRecordWriter<W>,
    compression: Compression,
    chunk_size: u64,

    next_conn_id: u32,
    topics: BTreeMap<String, u32>,
    connections: BTreeMap<u32, ConnectionRecord>,

    chunk: BagRecordWriter<Vec<u8>>,
    chunk_start_time: u64,
    chunk_end_time: u64,
    chunk_counts: BTreeMap<u32, u32>,
    chunk_index_entries: BTreeMap<u32, Vec<(u64, u32)>>,
    chunk_infos: Vec<ChunkInfoRecord>,

    message_count: u64,
    finished: bool,
}

impl BagWriter<BufWriter<File>> {
    /// Create a bag at the given path.
    pub fn create<P: AsRef<Path>>(path: P, options: BagWriteOptions) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), options)
    }
}

impl<W: Write + Seek> BagWriter<W> {
    /// Start a new bag: version line plus a placeholder header record.
    pub fn new(inner: W, options: BagWriteOptions) -> Result<Self> {
        let compression = options.compression.check_bag_writable()?;
        let mut out = BagRecordWriter::new(inner);
        out.write_version()?;
        out.write_bag_header(&BagHeaderRecord {
            index_pos: 0,
            conn_count: 0,
            chunk_count: 0,
        })?;

        Ok(Self {
            out,
            compression,
            chunk_size: options.chunk_size,
            next_conn_id: 0,
            topics: BTreeMap::new(),
            connections: BTreeMap::new(),
            chunk: BagRecordWriter::new(Vec::new()),
            chunk_start_time: u64::MAX,
            chunk_end_time: 0,
            chunk_counts: BTreeMap::new(),
            chunk_index_entries: BTreeMap::new(),
            chunk_infos: Vec::new(),
            message_count: 0,
            finished: false,
        })
    }

    /// Register a topic's connection. The connection record is written into
    /// the current chunk and retained for the index section.
    pub fn add_connection(&mut self, topic: &str, header: ConnectionHeader) -> Result<u32> {
        if let Some(conn) = self.topics.get(topic) {
            return Ok(*conn);
        }
        let conn = self.next_conn_id;
        self.next_conn_id += 1;
        let record = ConnectionRecord {
            conn,
            topic: topic.to_string(),
            header,
        };
        self.chunk.write_connection(&record)?;
        self.topics.insert(topic.to_string(), conn);
        self.connections.insert(conn, record);
        Ok(conn)
    }

    /// Connection id for a topic, if registered.
    pub fn connection_for_topic(&self, topic: &str) -> Option<u32> {
        self.topics.get(topic).copied()
    }

    /// Write one serialized message.
    pub fn write_message(&mut self, conn: u32, time: u64, data: &[u8]) -> Result<()> {
        if !self.connections.contains_key(&conn) {
            return Err(CodecError::encode(
                "bag",
                format!("unknown connection id {conn}"),
            ));
        }

        self.chunk_start_time = self.chunk_start_time.min(time);
        self.chunk_end_time = self.chunk_end_time.max(time);
        *self.chunk_counts.entry(conn).or_insert(0) += 1;

        let offset = self.chunk.tell() as u32;
        self.chunk.write_message_data(&MessageDataRecord {
            conn,
            time,
            data: data.to_vec(),
        })?;
        self.chunk_index_entries
            .entry(conn)
            .or_default()
            .push((time, offset));
        self.message_count += 1;

        if self.chunk.tell() >= self.chunk_size.max(1) {
            self.flush_chunk()?;
        }
        Ok(())
    }

    /// Flush the in-flight chunk and its per-connection index records.
    pub fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk.tell() == 0 {
            return Ok(());
        }

        let chunk = std::mem::replace(&mut self.chunk, BagRecordWriter::new(Vec::new()));
        let plaintext = chunk.into_inner();
        let compressed = compress(self.compression, &plaintext)?;

        let chunk_pos = self.out.tell();
        self.out.write_chunk(&ChunkRecord {
            compression: self.compression.bag_name().to_string(),
            size: plaintext.len() as u32,
            data: compressed,
        })?;

        for (conn, mut entries) in std::mem::take(&mut self.chunk_index_entries) {
            entries.sort_unstable();
            self.out.write_index_data(&IndexDataRecord {
                ver: 1,
                conn,
                entries,
            })?;
        }

        self.chunk_infos.push(ChunkInfoRecord {
            ver: 1,
            chunk_pos,
            start_time: if self.chunk_start_time == u64::MAX {
                0
            } else {
                self.chunk_start_time
            },
            end_time: self.chunk_end_time,
            connection_counts: std::mem::take(&mut self.chunk_counts),
        });

        self.chunk_start_time = u64::MAX;
        self.chunk_end_time = 0;
        Ok(())
    }

    /// Close the bag: final chunk, index section, header rewrite.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_chunk()?;

        let index_pos = self.out.tell();
        for connection in self.connections.values() {
            self.out.write_connection(connection)?;
        }
        for chunk_info in &self.chunk_infos {
            self.out.write_chunk_info(chunk_info)?;
        }
        self.out.flush()?;

        // Rewrite the header placeholder in place.
        let header = BagHeaderRecord {
            index_pos,
            conn_count: self.connections.len() as u32,
            chunk_count: self.chunk_infos.len() as u32,
        };
        let inner = self.out.get_mut();
        inner.seek(SeekFrom::Start(BAG_VERSION_LINE.len() as u64))?;
        let mut patch = BagRecordWriter::new(&mut *inner);
        patch.write_bag_header(&header)?;
        inner.seek(SeekFrom::End(0))?;
        inner.flush()?;

        self.finished = true;
        Ok(())
    }

    /// Messages written so far.
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Chunks flushed so far.
    pub fn chunk_count(&self) -> usize {
        self.chunk_infos.len()
    }

    /// Consume the writer, returning the sink. [`finish`](Self::finish)
    /// must have been called.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header(topic: &str) -> ConnectionHeader {
        ConnectionHeader {
            topic: topic.to_string(),
            msg_type: "std_msgs/String".into(),
            md5sum: "992ce8a1687cec8c8bd883ec73ca41d1".into(),
            message_definition: "string data".into(),
            callerid: None,
            latching: None,
        }
    }

    #[test]
    fn test_connection_dedup() {
        let mut writer =
            BagWriter::new(Cursor::new(Vec::new()), BagWriteOptions::default()).unwrap();
        let a = writer.add_connection("/t", sample_header("/t")).unwrap();
        let b = writer.add_connection("/t", sample_header("/t")).unwrap();
        let c = writer.add_connection("/u", sample_header("/u")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 0);
        assert_eq!(c, 1);
        writer.finish().unwrap();
    }

    #[test]
    fn test_unknown_connection_rejected() {
        let mut writer =
            BagWriter::new(Cursor::new(Vec::new()), BagWriteOptions::default()).unwrap();
        assert!(writer.write_message(7, 0, b"x").is_err());
        writer.finish().unwrap();
    }

    #[test]
    fn test_small_chunk_size_forces_chunks() {
        let mut options = BagWriteOptions::default();
        options.chunk_size = 100;
        let mut writer = BagWriter::new(Cursor::new(Vec::new()), options).unwrap();
        let conn = writer.add_connection("/t", sample_header("/t")).unwrap();
        for i in 0..10u64 {
            writer.write_message(conn, i, &[0u8; 64]).unwrap();
        }
        writer.finish().unwrap();
        assert!(writer.chunk_count() >= 2);
        assert_eq!(writer.message_count(), 10);
    }

    #[test]
    fn test_header_rewritten_with_index_pos() {
        let mut writer =
            BagWriter::new(Cursor::new(Vec::new()), BagWriteOptions::default()).unwrap();
        let conn = writer.add_connection("/t", sample_header("/t")).unwrap();
        writer.write_message(conn, 5, b"hello").unwrap();
        writer.finish().unwrap();
        let bytes = writer.into_inner().into_inner();

        let mut reader = crate::io::read::ByteReader::new(&bytes);
        crate::bag::record_read::parse_version(&mut reader).unwrap();
        match crate::bag::record_read::parse_record(&mut reader).unwrap() {
            Some(BagRecord::BagHeader(header)) => {
                assert_ne!(header.index_pos, 0);
                assert_eq!(header.conn_count, 1);
                assert_eq!(header.chunk_count, 1);
            }
            other => panic!("expected bag header, got {other:?}"),
        }
    }

    #[test]
    fn test_bz2_chunk_compression() {
        let mut options = BagWriteOptions::default();
        options.compression = Compression::Bz2;
        let mut writer = BagWriter::new(Cursor::new(Vec::new()), options).unwrap();
        let conn = writer.add_connection("/t", sample_header("/t")).unwrap();
        writer.write_message(conn, 1, &[7u8; 256]).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_lz4_rejected_for_writing() {
        let mut options = BagWriteOptions::default();
        options.compression = Compression::Lz4;
        assert!(BagWriter::new(Cursor::new(Vec::new()), options).is_err());
    }
}
