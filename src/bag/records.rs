//! ROS1 bag v2.0 record model.
//!
//! Every record is `header_len:u32le | header | data_len:u32le | data`,
//! where the header is a flat list of `field_len:u32le | name '=' value`
//! entries. The `op` field selects the record kind.

use std::collections::BTreeMap;

/// Version line at the start of every bag file (13 bytes).
pub const BAG_VERSION_LINE: &[u8] = b"#ROSBAG V2.0\n";

/// Total on-disk size of the padded bag header record.
pub const BAG_HEADER_RECORD_SIZE: u64 = 4096;

/// Nanoseconds per second, for the split sec/nsec time fields.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Record operation codes.
pub mod op {
    /// Message definition (pre-2.0, tolerated on read)
    pub const MSG_DEF: u8 = 0x01;
    pub const MSG_DATA: u8 = 0x02;
    pub const BAG_HEADER: u8 = 0x03;
    pub const INDEX_DATA: u8 = 0x04;
    pub const CHUNK: u8 = 0x05;
    pub const CHUNK_INFO: u8 = 0x06;
    pub const CONNECTION: u8 = 0x07;
}

/// Split a nanosecond timestamp into bag (sec, nsec) words.
pub fn split_time(time_ns: u64) -> (u32, u32) {
    ((time_ns / NSEC_PER_SEC) as u32, (time_ns % NSEC_PER_SEC) as u32)
}

/// Join bag (sec, nsec) words into a nanosecond timestamp.
pub fn join_time(sec: u32, nsec: u32) -> u64 {
    sec as u64 * NSEC_PER_SEC + nsec as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BagHeaderRecord {
    /// Offset of the index section (connections + chunk infos)
    pub index_pos: u64,
    pub conn_count: u32,
    pub chunk_count: u32,
}

/// The connection header carried in a connection record's data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHeader {
    pub topic: String,
    pub msg_type: String,
    pub md5sum: String,
    pub message_definition: String,
    pub callerid: Option<String>,
    pub latching: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub conn: u32,
    /// Topic from the record header (may differ from the connection
    /// header's topic when messages were remapped)
    pub topic: String,
    pub header: ConnectionHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDataRecord {
    pub conn: u32,
    /// Receive time in nanoseconds since the epoch
    pub time: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// "none", "bz2", or "lz4"
    pub compression: String,
    /// Uncompressed size in bytes
    pub size: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDataRecord {
    pub ver: u32,
    pub conn: u32,
    /// `(time_ns, chunk_relative_offset)` per message
    pub entries: Vec<(u64, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfoRecord {
    pub ver: u32,
    /// Offset of the chunk record this info describes
    pub chunk_pos: u64,
    pub start_time: u64,
    pub end_time: u64,
    /// Message count per connection appearing in the chunk
    pub connection_counts: BTreeMap<u32, u32>,
}

/// Any record the parser can yield.
#[derive(Debug, Clone, PartialEq)]
pub enum BagRecord {
    BagHeader(BagHeaderRecord),
    Connection(ConnectionRecord),
    MessageData(MessageDataRecord),
    Chunk(ChunkRecord),
    IndexData(IndexDataRecord),
    ChunkInfo(ChunkInfoRecord),
    /// An op this reader does not know; tolerated and skipped.
    Unknown { op: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_split_join() {
        let ns = 1_234_567_890_123_456_789u64;
        let (sec, nsec) = split_time(ns);
        assert_eq!(sec, 1_234_567_890);
        assert_eq!(nsec, 123_456_789);
        assert_eq!(join_time(sec, nsec), ns);
    }

    #[test]
    fn test_version_line_is_13_bytes() {
        assert_eq!(BAG_VERSION_LINE.len(), 13);
    }
}
