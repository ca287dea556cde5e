//! MCAP record model.
//!
//! Every record is `opcode:u8 | body_len:u64le | body`. Strings are
//! `len:u32le | utf8`, maps are `byte_len:u32le | (key, value)*`, and the
//! message-index array is `byte_len:u32le | (timestamp:u64, offset:u64)*`.

use std::collections::{BTreeMap, HashMap};

/// File magic: `0x89 M C A P 0x30 CR LF` (0x30 is the format version digit).
pub const MCAP_MAGIC: &[u8] = b"\x89MCAP0\r\n";

/// Record opcodes.
pub mod op {
    pub const HEADER: u8 = 0x01;
    pub const FOOTER: u8 = 0x02;
    pub const SCHEMA: u8 = 0x03;
    pub const CHANNEL: u8 = 0x04;
    pub const MESSAGE: u8 = 0x05;
    pub const CHUNK: u8 = 0x06;
    pub const MESSAGE_INDEX: u8 = 0x07;
    pub const CHUNK_INDEX: u8 = 0x08;
    pub const ATTACHMENT: u8 = 0x09;
    pub const ATTACHMENT_INDEX: u8 = 0x0A;
    pub const STATISTICS: u8 = 0x0B;
    pub const METADATA: u8 = 0x0C;
    pub const METADATA_INDEX: u8 = 0x0D;
    pub const SUMMARY_OFFSET: u8 = 0x0E;
    pub const DATA_END: u8 = 0x0F;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub profile: String,
    pub library: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterRecord {
    pub summary_start: u64,
    pub summary_offset_start: u64,
    pub summary_crc: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRecord {
    pub id: u16,
    pub name: String,
    pub encoding: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: u16,
    pub schema_id: u16,
    pub topic: String,
    pub message_encoding: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub channel_id: u16,
    pub sequence: u32,
    pub log_time: u64,
    pub publish_time: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub message_start_time: u64,
    pub message_end_time: u64,
    pub uncompressed_size: u64,
    /// CRC32 of the uncompressed plaintext records; 0 means "not computed".
    pub uncompressed_crc: u32,
    /// "" | "lz4" | "zstd", optionally prefixed by an encryption algorithm
    /// as `alg` or `alg+compression`.
    pub compression: String,
    pub records: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageIndexRecord {
    pub channel_id: u16,
    /// `(log_time, offset)` pairs; offsets are into the decompressed chunk.
    pub records: Vec<(u64, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkIndexRecord {
    pub message_start_time: u64,
    pub message_end_time: u64,
    pub chunk_start_offset: u64,
    pub chunk_length: u64,
    pub message_index_offsets: BTreeMap<u16, u64>,
    pub message_index_length: u64,
    pub compression: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub log_time: u64,
    pub create_time: u64,
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
    /// CRC32 of all preceding bytes of the record body; 0 means "not computed".
    pub crc: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentIndexRecord {
    pub offset: u64,
    pub length: u64,
    pub log_time: u64,
    pub create_time: u64,
    pub data_size: u64,
    pub name: String,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub name: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataIndexRecord {
    pub offset: u64,
    pub length: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatisticsRecord {
    pub message_count: u64,
    pub schema_count: u16,
    pub channel_count: u32,
    pub attachment_count: u32,
    pub metadata_count: u32,
    pub chunk_count: u32,
    pub message_start_time: u64,
    pub message_end_time: u64,
    pub channel_message_counts: HashMap<u16, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOffsetRecord {
    pub group_opcode: u8,
    pub group_start: u64,
    pub group_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataEndRecord {
    /// CRC32 of the data section; 0 means "not computed".
    pub data_section_crc: u32,
}

/// Any record the linear reader can yield.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Header(HeaderRecord),
    Footer(FooterRecord),
    Schema(SchemaRecord),
    Channel(ChannelRecord),
    Message(MessageRecord),
    Chunk(ChunkRecord),
    MessageIndex(MessageIndexRecord),
    ChunkIndex(ChunkIndexRecord),
    Attachment(AttachmentRecord),
    AttachmentIndex(AttachmentIndexRecord),
    Statistics(StatisticsRecord),
    Metadata(MetadataRecord),
    MetadataIndex(MetadataIndexRecord),
    SummaryOffset(SummaryOffsetRecord),
    DataEnd(DataEndRecord),
    /// An opcode this reader does not know; skipped, never an error.
    Unknown { opcode: u8, length: u64 },
}
