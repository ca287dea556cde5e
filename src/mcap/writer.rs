//! MCAP file writer.
//!
//! Handles schema/channel registration with deduplication, chunk buffering
//! with per-channel message indexes, chunk compression and encryption, and
//! the summary section (schemas, channels, chunk indexes, statistics,
//! summary offsets, footer CRC).

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::core::{CodecError, Result};
use crate::io::compression::{compress, Compression};
use crate::mcap::encryption::{join_compression, EncryptionProvider};
use crate::mcap::record_write::RecordWriter;
use crate::mcap::records::*;

/// Default chunk threshold: 1 MiB of uncompressed records.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Writer configuration.
pub struct McapWriteOptions {
    /// MCAP profile ("ros1", "ros2", "json", ...)
    pub profile: String,
    /// Library string recorded in the header
    pub library: String,
    /// Chunk threshold in bytes; `None` disables chunking entirely.
    /// `Some(0)` flushes after every message.
    pub chunk_size: Option<u64>,
    /// Chunk compression (must be MCAP-writable)
    pub compression: Compression,
    /// Optional chunk encryption provider
    pub encryption: Option<Box<dyn EncryptionProvider>>,
}

impl Default for McapWriteOptions {
    fn default() -> Self {
        Self {
            profile: "ros2".to_string(),
            library: concat!("roslog ", env!("CARGO_PKG_VERSION")).to_string(),
            chunk_size: Some(DEFAULT_CHUNK_SIZE),
            compression: Compression::None,
            encryption: None,
        }
    }
}

/// MCAP file writer.
pub struct McapWriter<W: Write> {
    out: RecordWriter<W>,
    chunk_size: Option<u64>,
    compression: Compression,
    encryption: Option<Box<dyn EncryptionProvider>>,

    next_schema_id: u16,
    next_channel_id: u16,
    schema_ids: HashMap<(String, String, Vec<u8>), u16>,
    channel_ids: HashMap<(u16, String, String), u16>,
    schemas: Vec<SchemaRecord>,
    channels: Vec<ChannelRecord>,
    sequences: HashMap<u16, u32>,

    chunk: RecordWriter<Vec<u8>>,
    chunk_start_time: u64,
    chunk_end_time: u64,
    chunk_message_indexes: BTreeMap<u16, Vec<(u64, u64)>>,
    chunk_indexes: Vec<ChunkIndexRecord>,

    statistics: StatisticsRecord,
    attachment_indexes: Vec<AttachmentIndexRecord>,
    metadata_indexes: Vec<MetadataIndexRecord>,
    finished: bool,
}

impl McapWriter<BufWriter<File>> {
    /// Create a writer at the given path.
    pub fn create<P: AsRef<Path>>(path: P, options: McapWriteOptions) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), options)
    }
}

impl<W: Write> McapWriter<W> {
    /// Start a new MCAP stream: magic, header, then the data-section CRC
    /// scope opens.
    pub fn new(inner: W, options: McapWriteOptions) -> Result<Self> {
        let compression = options.compression.check_mcap_writable()?;
        let mut out = RecordWriter::new(inner);
        out.write_magic()?;
        out.write_header(&HeaderRecord {
            profile: options.profile,
            library: options.library,
        })?;
        // data_section_crc covers everything after the header record.
        out.clear_crc();

        Ok(Self {
            out,
            chunk_size: options.chunk_size,
            compression,
            encryption: options.encryption,
            next_schema_id: 1,
            next_channel_id: 0,
            schema_ids: HashMap::new(),
            channel_ids: HashMap::new(),
            schemas: Vec::new(),
            channels: Vec::new(),
            sequences: HashMap::new(),
            chunk: RecordWriter::new(Vec::new()),
            chunk_start_time: u64::MAX,
            chunk_end_time: 0,
            chunk_message_indexes: BTreeMap::new(),
            chunk_indexes: Vec::new(),
            statistics: StatisticsRecord {
                message_start_time: u64::MAX,
                ..Default::default()
            },
            attachment_indexes: Vec::new(),
            metadata_indexes: Vec::new(),
            finished: false,
        })
    }

    fn chunking(&self) -> bool {
        self.chunk_size.is_some()
    }

    /// Register a schema, deduplicating by `(name, encoding, data)`.
    ///
    /// Id 0 is reserved for "no schema" and never assigned.
    pub fn register_schema(
        &mut self,
        name: &str,
        encoding: &str,
        data: &[u8],
    ) -> Result<u16> {
        let key = (name.to_string(), encoding.to_string(), data.to_vec());
        if let Some(id) = self.schema_ids.get(&key) {
            return Ok(*id);
        }
        let id = self.next_schema_id;
        self.next_schema_id = self.next_schema_id.checked_add(1).ok_or_else(|| {
            CodecError::encode("mcap", "schema id space exhausted")
        })?;
        let record = SchemaRecord {
            id,
            name: name.to_string(),
            encoding: encoding.to_string(),
            data: data.to_vec(),
        };
        if self.chunking() {
            self.chunk.write_schema(&record)?;
        } else {
            self.out.write_schema(&record)?;
        }
        self.schema_ids.insert(key, id);
        self.schemas.push(record);
        Ok(id)
    }

    /// Register a channel, deduplicating by `(schema_id, topic, encoding)`.
    pub fn register_channel(
        &mut self,
        schema_id: u16,
        topic: &str,
        message_encoding: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<u16> {
        let key = (schema_id, topic.to_string(), message_encoding.to_string());
        if let Some(id) = self.channel_ids.get(&key) {
            return Ok(*id);
        }
        let id = self.next_channel_id;
        self.next_channel_id = self.next_channel_id.wrapping_add(1);
        let record = ChannelRecord {
            id,
            schema_id,
            topic: topic.to_string(),
            message_encoding: message_encoding.to_string(),
            metadata,
        };
        if self.chunking() {
            self.chunk.write_channel(&record)?;
        } else {
            self.out.write_channel(&record)?;
        }
        self.channel_ids.insert(key, id);
        self.channels.push(record);
        Ok(id)
    }

    /// Next sequence number for a channel.
    pub fn next_sequence(&mut self, channel_id: u16) -> u32 {
        let seq = self.sequences.entry(channel_id).or_insert(0);
        let current = *seq;
        *seq += 1;
        current
    }

    /// Write one message record.
    pub fn write_message(&mut self, record: &MessageRecord) -> Result<()> {
        self.statistics.message_count += 1;
        *self
            .statistics
            .channel_message_counts
            .entry(record.channel_id)
            .or_insert(0) += 1;
        self.statistics.message_start_time =
            self.statistics.message_start_time.min(record.log_time);
        self.statistics.message_end_time = self.statistics.message_end_time.max(record.log_time);

        if self.chunking() {
            self.chunk_start_time = self.chunk_start_time.min(record.log_time);
            self.chunk_end_time = self.chunk_end_time.max(record.log_time);
            let offset = self.chunk.tell();
            self.chunk.write_message(record)?;
            self.chunk_message_indexes
                .entry(record.channel_id)
                .or_default()
                .push((record.log_time, offset));
            if self.chunk.tell() >= self.chunk_size.unwrap_or(u64::MAX) {
                self.flush_chunk()?;
            }
        } else {
            self.out.write_message(record)?;
        }
        Ok(())
    }

    /// Write an attachment record (outside any chunk) and index it.
    pub fn add_attachment(
        &mut self,
        log_time: u64,
        create_time: u64,
        name: &str,
        media_type: &str,
        data: &[u8],
    ) -> Result<()> {
        self.flush_chunk()?;
        let offset = self.out.tell();
        self.out.write_attachment(&AttachmentRecord {
            log_time,
            create_time,
            name: name.to_string(),
            media_type: media_type.to_string(),
            data: data.to_vec(),
            crc: 0,
        })?;
        self.attachment_indexes.push(AttachmentIndexRecord {
            offset,
            length: self.out.tell() - offset,
            log_time,
            create_time,
            data_size: data.len() as u64,
            name: name.to_string(),
            media_type: media_type.to_string(),
        });
        self.statistics.attachment_count += 1;
        Ok(())
    }

    /// Write a metadata record (outside any chunk) and index it.
    pub fn add_metadata(&mut self, name: &str, metadata: BTreeMap<String, String>) -> Result<()> {
        self.flush_chunk()?;
        let offset = self.out.tell();
        self.out.write_metadata(&MetadataRecord {
            name: name.to_string(),
            metadata,
        })?;
        self.metadata_indexes.push(MetadataIndexRecord {
            offset,
            length: self.out.tell() - offset,
            name: name.to_string(),
        });
        self.statistics.metadata_count += 1;
        Ok(())
    }

    /// Flush the in-flight chunk: CRC, compress, encrypt, then the chunk
    /// record and its message indexes.
    pub fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk.tell() == 0 {
            return Ok(());
        }

        let chunk = std::mem::replace(&mut self.chunk, RecordWriter::new(Vec::new()));
        let uncompressed_crc = chunk.get_crc();
        let plaintext = chunk.into_inner().into_inner();
        let uncompressed_size = plaintext.len() as u64;

        let compressed = compress(self.compression, &plaintext)?;
        let (records, compression_field) = match &self.encryption {
            Some(provider) => (
                provider.encrypt(&compressed)?,
                join_compression(provider.algorithm(), self.compression.mcap_name()),
            ),
            None => (compressed, self.compression.mcap_name().to_string()),
        };
        let compressed_size = records.len() as u64;

        let message_start_time = if self.chunk_start_time == u64::MAX {
            0
        } else {
            self.chunk_start_time
        };
        let chunk_start_offset = self.out.tell();
        self.out.write_chunk(&ChunkRecord {
            message_start_time,
            message_end_time: self.chunk_end_time,
            uncompressed_size,
            uncompressed_crc,
            compression: compression_field.clone(),
            records,
        })?;
        let chunk_length = self.out.tell() - chunk_start_offset;

        // One message index per channel, entries sorted by log time.
        let message_index_start = self.out.tell();
        let mut message_index_offsets = BTreeMap::new();
        for (channel_id, mut entries) in std::mem::take(&mut self.chunk_message_indexes) {
            entries.sort_unstable();
            message_index_offsets.insert(channel_id, self.out.tell());
            self.out.write_message_index(&MessageIndexRecord {
                channel_id,
                records: entries,
            })?;
        }

        self.chunk_indexes.push(ChunkIndexRecord {
            message_start_time,
            message_end_time: self.chunk_end_time,
            chunk_start_offset,
            chunk_length,
            message_index_offsets,
            message_index_length: self.out.tell() - message_index_start,
            compression: compression_field,
            compressed_size,
            uncompressed_size,
        });

        self.chunk_start_time = u64::MAX;
        self.chunk_end_time = 0;
        Ok(())
    }

    /// Close the file: last chunk, DataEnd, summary section, summary
    /// offsets, footer, trailing magic.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_chunk()?;

        // The data-section CRC stops just before the DataEnd opcode.
        let data_section_crc = self.out.get_crc();
        self.out.write_data_end(&DataEndRecord { data_section_crc })?;

        // Summary section; its CRC scope opens here.
        self.out.clear_crc();
        let summary_start = self.out.tell();
        let mut groups: Vec<SummaryOffsetRecord> = Vec::new();

        macro_rules! group {
            ($opcode:expr, $records:expr, $write:ident) => {{
                let start = self.out.tell();
                for record in $records {
                    self.out.$write(record)?;
                }
                let length = self.out.tell() - start;
                if length > 0 {
                    groups.push(SummaryOffsetRecord {
                        group_opcode: $opcode,
                        group_start: start,
                        group_length: length,
                    });
                }
            }};
        }

        let schemas = std::mem::take(&mut self.schemas);
        let channels = std::mem::take(&mut self.channels);
        let chunk_indexes = std::mem::take(&mut self.chunk_indexes);
        let attachment_indexes = std::mem::take(&mut self.attachment_indexes);
        let metadata_indexes = std::mem::take(&mut self.metadata_indexes);

        group!(op::SCHEMA, schemas.iter(), write_schema);
        group!(op::CHANNEL, channels.iter(), write_channel);
        group!(op::CHUNK_INDEX, chunk_indexes.iter(), write_chunk_index);
        group!(
            op::ATTACHMENT_INDEX,
            attachment_indexes.iter(),
            write_attachment_index
        );
        group!(
            op::METADATA_INDEX,
            metadata_indexes.iter(),
            write_metadata_index
        );

        let mut statistics = std::mem::take(&mut self.statistics);
        if statistics.message_start_time == u64::MAX {
            statistics.message_start_time = 0;
        }
        statistics.schema_count = schemas.len() as u16;
        statistics.channel_count = channels.len() as u32;
        statistics.chunk_count = chunk_indexes.len() as u32;
        group!(
            op::STATISTICS,
            std::iter::once(&statistics),
            write_statistics
        );

        let summary_offset_start = self.out.tell();
        for offset in &groups {
            self.out.write_summary_offset(offset)?;
        }

        self.out
            .write_footer_with_crc(summary_start, summary_offset_start)?;
        self.out.write_magic()?;
        self.out.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Message count written so far.
    pub fn message_count(&self) -> u64 {
        self.statistics.message_count
    }

    /// Chunks flushed so far.
    pub fn chunk_count(&self) -> usize {
        self.chunk_indexes.len()
    }

    /// Consume the writer and return the underlying sink.
    ///
    /// [`finish`](Self::finish) must have been called; an unfinished file
    /// has no summary and no trailing magic.
    pub fn into_inner(self) -> W {
        self.out.into_inner().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_simple(options: McapWriteOptions) -> Vec<u8> {
        let mut writer = McapWriter::new(Vec::new(), options).unwrap();
        let schema_id = writer
            .register_schema("std_msgs/msg/String", "ros2msg", b"string data\n")
            .unwrap();
        let channel_id = writer
            .register_channel(schema_id, "/chat", "cdr", BTreeMap::new())
            .unwrap();
        for i in 0..3u64 {
            let sequence = writer.next_sequence(channel_id);
            writer
                .write_message(&MessageRecord {
                    channel_id,
                    sequence,
                    log_time: i * 10,
                    publish_time: i * 10,
                    data: vec![i as u8; 4],
                })
                .unwrap();
        }
        writer.finish().unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_file_starts_and_ends_with_magic() {
        let bytes = write_simple(McapWriteOptions::default());
        assert!(bytes.starts_with(MCAP_MAGIC));
        assert!(bytes.ends_with(MCAP_MAGIC));
    }

    #[test]
    fn test_schema_dedup() {
        let mut writer = McapWriter::new(Vec::new(), McapWriteOptions::default()).unwrap();
        let a = writer.register_schema("pkg/msg/A", "ros2msg", b"int32 x\n").unwrap();
        let b = writer.register_schema("pkg/msg/A", "ros2msg", b"int32 x\n").unwrap();
        let c = writer.register_schema("pkg/msg/A", "ros2msg", b"int64 x\n").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, 1, "schema ids start at 1; 0 means no schema");
        writer.finish().unwrap();
    }

    #[test]
    fn test_channel_dedup() {
        let mut writer = McapWriter::new(Vec::new(), McapWriteOptions::default()).unwrap();
        let schema = writer.register_schema("pkg/msg/A", "ros2msg", b"int32 x\n").unwrap();
        let a = writer
            .register_channel(schema, "/t", "cdr", BTreeMap::new())
            .unwrap();
        let b = writer
            .register_channel(schema, "/t", "cdr", BTreeMap::new())
            .unwrap();
        let c = writer
            .register_channel(schema, "/other", "cdr", BTreeMap::new())
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, 0, "channel ids start at 0");
        writer.finish().unwrap();
    }

    #[test]
    fn test_tiny_chunk_size_forces_chunk_per_message() {
        let mut options = McapWriteOptions::default();
        options.chunk_size = Some(1);
        let mut writer = McapWriter::new(Vec::new(), options).unwrap();
        let schema = writer.register_schema("pkg/msg/A", "ros2msg", b"int32 x\n").unwrap();
        let channel = writer
            .register_channel(schema, "/t", "cdr", BTreeMap::new())
            .unwrap();
        for i in 0..4u64 {
            writer
                .write_message(&MessageRecord {
                    channel_id: channel,
                    sequence: i as u32,
                    log_time: i,
                    publish_time: i,
                    data: vec![0u8; 8],
                })
                .unwrap();
        }
        assert_eq!(writer.chunk_count(), 4);
        writer.finish().unwrap();
    }

    #[test]
    fn test_sequence_counter_per_channel() {
        let mut writer = McapWriter::new(Vec::new(), McapWriteOptions::default()).unwrap();
        assert_eq!(writer.next_sequence(0), 0);
        assert_eq!(writer.next_sequence(0), 1);
        assert_eq!(writer.next_sequence(1), 0);
        writer.finish().unwrap();
    }
}
