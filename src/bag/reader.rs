//! ROS1 bag file reader.
//!
//! Opens the whole file as a byte view, parses the bag header, then loads
//! the index section (connections and chunk infos) from `index_pos`. When
//! the index section is missing or damaged, a linear scan rebuilds the same
//! tables. Message iteration merges per-chunk index lists by log time,
//! decompressing chunks lazily with a one-chunk cache.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::core::{CodecError, Result};
use crate::io::compression::{decompress, Compression};
use crate::io::read::{ByteReader, FileBuffer};
use crate::bag::record_read::{parse_record, parse_version};
use crate::bag::records::*;

/// Message iteration parameters.
#[derive(Debug, Clone, Default)]
pub struct BagMessageQuery {
    /// Only these topics (all topics when empty)
    pub topics: Vec<String>,
    /// Inclusive lower bound on record time
    pub start_time: Option<u64>,
    /// Exclusive upper bound on record time
    pub end_time: Option<u64>,
    /// Merge to global log-time order; chunk order otherwise
    pub in_log_time_order: bool,
}

impl BagMessageQuery {
    /// Log-time-ordered iteration over one topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topics: vec![topic.into()],
            in_log_time_order: true,
            ..Default::default()
        }
    }

    /// Log-time-ordered iteration over everything.
    pub fn all() -> Self {
        Self {
            in_log_time_order: true,
            ..Default::default()
        }
    }
}

/// ROS1 bag reader.
pub struct BagReader {
    buf: FileBuffer,
    version: String,
    header: BagHeaderRecord,
    connections: BTreeMap<u32, ConnectionRecord>,
    chunk_infos: Vec<ChunkInfoRecord>,
    /// Per-chunk, per-connection index entries `(time, offset)`, keyed by
    /// chunk position; loaded from the IndexData records after each chunk.
    chunk_indexes: RefCell<BTreeMap<u64, BTreeMap<u32, Vec<(u64, u32)>>>>,
    chunk_cache: RefCell<Option<(u64, Arc<Vec<u8>>)>>,
}

impl BagReader {
    /// Open a bag file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_buffer(FileBuffer::open(path)?)
    }

    /// Open from in-memory bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_buffer(FileBuffer::from_bytes(data))
    }

    fn from_buffer(buf: FileBuffer) -> Result<Self> {
        let data = buf.as_slice();
        let mut reader = ByteReader::new(data);
        let version = parse_version(&mut reader)?;
        let header = match parse_record(&mut reader)? {
            Some(BagRecord::BagHeader(header)) => header,
            other => {
                return Err(CodecError::malformed(
                    "bag",
                    format!("expected bag header record, found {other:?}"),
                ))
            }
        };

        let mut this = Self {
            buf,
            version,
            header,
            connections: BTreeMap::new(),
            chunk_infos: Vec::new(),
            chunk_indexes: RefCell::new(BTreeMap::new()),
            chunk_cache: RefCell::new(None),
        };

        let loaded = this.header.index_pos != 0 && this.load_index_section().is_ok();
        if !loaded {
            tracing::warn!("bag index section missing or unreadable, scanning linearly");
            this.scan_data_section()?;
        }
        this.chunk_infos
            .sort_by_key(|info| (info.start_time, info.chunk_pos));
        Ok(this)
    }

    fn load_index_section(&mut self) -> Result<()> {
        let data = self.buf.as_slice();
        let mut reader = ByteReader::new(data);
        reader.seek(self.header.index_pos)?;

        let mut connections = BTreeMap::new();
        let mut chunk_infos = Vec::new();
        while let Some(record) = parse_record(&mut reader)? {
            match record {
                BagRecord::Connection(connection) => {
                    connections.insert(connection.conn, connection);
                }
                BagRecord::ChunkInfo(info) => chunk_infos.push(info),
                // Pre-2.0 bags keep other records after index_pos; ignore.
                _ => {}
            }
        }
        if connections.len() != self.header.conn_count as usize
            || chunk_infos.len() != self.header.chunk_count as usize
        {
            return Err(CodecError::malformed(
                "bag",
                "index section does not match the header counts",
            ));
        }
        self.connections = connections;
        self.chunk_infos = chunk_infos;
        Ok(())
    }

    /// Rebuild connections and chunk infos by scanning the data section.
    fn scan_data_section(&mut self) -> Result<()> {
        let data = self.buf.as_slice();
        let mut reader = ByteReader::new(data);
        reader.seek(BAG_VERSION_LINE.len() as u64 + BAG_HEADER_RECORD_SIZE)?;

        self.connections.clear();
        self.chunk_infos.clear();
        let mut indexes = self.chunk_indexes.borrow_mut();

        loop {
            let record_start = reader.tell();
            let record = match parse_record(&mut reader) {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(position = record_start, error = %err, "stopping bag scan at bad record");
                    break;
                }
            };
            match record {
                BagRecord::Connection(connection) => {
                    self.connections.insert(connection.conn, connection);
                }
                BagRecord::Chunk(chunk) => {
                    let plaintext = decode_bag_chunk(&chunk)?;
                    let mut start_time = u64::MAX;
                    let mut end_time = 0u64;
                    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
                    let mut entries: BTreeMap<u32, Vec<(u64, u32)>> = BTreeMap::new();

                    let mut inner = ByteReader::new(&plaintext);
                    loop {
                        let offset = inner.tell() as u32;
                        match parse_record(&mut inner)? {
                            Some(BagRecord::Connection(connection)) => {
                                self.connections.insert(connection.conn, connection);
                            }
                            Some(BagRecord::MessageData(message)) => {
                                start_time = start_time.min(message.time);
                                end_time = end_time.max(message.time);
                                *counts.entry(message.conn).or_insert(0) += 1;
                                entries
                                    .entry(message.conn)
                                    .or_default()
                                    .push((message.time, offset));
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }

                    self.chunk_infos.push(ChunkInfoRecord {
                        ver: 1,
                        chunk_pos: record_start,
                        start_time: if start_time == u64::MAX { 0 } else { start_time },
                        end_time,
                        connection_counts: counts,
                    });
                    indexes.insert(record_start, entries);
                }
                BagRecord::ChunkInfo(_) | BagRecord::IndexData(_) => {}
                BagRecord::MessageData(_) | BagRecord::BagHeader(_) | BagRecord::Unknown { .. } => {
                }
            }
        }
        Ok(())
    }

    /// Bag format version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Connections by id.
    pub fn connections(&self) -> &BTreeMap<u32, ConnectionRecord> {
        &self.connections
    }

    /// Chunk infos, sorted by start time.
    pub fn chunk_infos(&self) -> &[ChunkInfoRecord] {
        &self.chunk_infos
    }

    /// Number of chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunk_infos.len()
    }

    /// All topics, in connection-id order.
    pub fn topics(&self) -> Vec<&str> {
        self.connections
            .values()
            .map(|c| c.topic.as_str())
            .collect()
    }

    /// Total message count for a topic, from the chunk infos.
    pub fn message_count(&self, topic: &str) -> Result<u64> {
        let wanted = self.connection_ids(&[topic.to_string()])?;
        Ok(self
            .chunk_infos
            .iter()
            .flat_map(|info| info.connection_counts.iter())
            .filter(|(conn, _)| wanted.contains(conn))
            .map(|(_, count)| *count as u64)
            .sum())
    }

    /// Earliest message time across chunks.
    pub fn start_time(&self) -> Option<u64> {
        self.chunk_infos.iter().map(|info| info.start_time).min()
    }

    /// Latest message time across chunks.
    pub fn end_time(&self) -> Option<u64> {
        self.chunk_infos.iter().map(|info| info.end_time).max()
    }

    fn connection_ids(&self, topics: &[String]) -> Result<HashSet<u32>> {
        if topics.is_empty() {
            return Ok(self.connections.keys().copied().collect());
        }
        let mut ids = HashSet::new();
        for topic in topics {
            let matched: Vec<u32> = self
                .connections
                .values()
                .filter(|c| &c.topic == topic)
                .map(|c| c.conn)
                .collect();
            if matched.is_empty() {
                return Err(CodecError::unknown_topic(topic));
            }
            ids.extend(matched);
        }
        Ok(ids)
    }

    /// Iterate messages matching a query.
    pub fn messages(&self, query: BagMessageQuery) -> Result<BagMessageIter<'_>> {
        let wanted = self.connection_ids(&query.topics)?;
        let range = (
            query.start_time.unwrap_or(0),
            query.end_time.unwrap_or(u64::MAX),
        );

        let mut cursors = Vec::new();
        for (rank, info) in self.chunk_infos.iter().enumerate() {
            if info.end_time < range.0 || info.start_time >= range.1 {
                continue;
            }
            if !info
                .connection_counts
                .keys()
                .any(|conn| wanted.contains(conn))
            {
                continue;
            }
            let mut entries: Vec<(u64, u32)> = self
                .chunk_index_entries(info.chunk_pos)?
                .iter()
                .filter(|(conn, _)| wanted.contains(conn))
                .flat_map(|(_, entries)| entries.iter().copied())
                .filter(|(time, _)| *time >= range.0 && *time < range.1)
                .collect();
            if query.in_log_time_order {
                entries.sort_unstable();
            } else {
                // Chunk order is offset order.
                entries.sort_by_key(|(_, offset)| *offset);
            }
            if !entries.is_empty() {
                cursors.push(BagCursor {
                    chunk_pos: info.chunk_pos,
                    rank: rank as u64,
                    entries,
                    pos: 0,
                });
            }
        }

        let mut heap = BinaryHeap::with_capacity(cursors.len());
        for cursor in cursors {
            if let Some(entry) = cursor.current() {
                heap.push(BagHeapItem {
                    key: bag_heap_key(entry, &cursor, query.in_log_time_order),
                    cursor,
                });
            }
        }

        Ok(BagMessageIter {
            reader: self,
            heap,
            in_log_time_order: query.in_log_time_order,
            failed: false,
        })
    }

    /// Per-connection index entries for one chunk, loading the IndexData
    /// records that follow the chunk (or scanning the chunk if absent).
    fn chunk_index_entries(&self, chunk_pos: u64) -> Result<BTreeMap<u32, Vec<(u64, u32)>>> {
        if let Some(entries) = self.chunk_indexes.borrow().get(&chunk_pos) {
            return Ok(entries.clone());
        }

        let data = self.buf.as_slice();
        let mut reader = ByteReader::new(data);
        reader.seek(chunk_pos)?;
        // Skip the chunk record itself.
        let chunk = match parse_record(&mut reader)? {
            Some(BagRecord::Chunk(chunk)) => chunk,
            other => {
                return Err(CodecError::malformed(
                    "bag",
                    format!("chunk info points at {other:?}"),
                ))
            }
        };

        let mut entries: BTreeMap<u32, Vec<(u64, u32)>> = BTreeMap::new();
        let mut found_index = false;
        loop {
            let mark = reader.tell();
            match parse_record(&mut reader) {
                Ok(Some(BagRecord::IndexData(index))) => {
                    found_index = true;
                    entries.entry(index.conn).or_default().extend(index.entries);
                }
                Ok(Some(_)) | Ok(None) | Err(_) => {
                    // First non-index record ends this chunk's index block.
                    let _ = mark;
                    break;
                }
            }
        }

        if !found_index {
            // No index records: enumerate the chunk contents.
            let plaintext = decode_bag_chunk(&chunk)?;
            let mut inner = ByteReader::new(&plaintext);
            loop {
                let offset = inner.tell() as u32;
                match parse_record(&mut inner)? {
                    Some(BagRecord::MessageData(message)) => {
                        entries
                            .entry(message.conn)
                            .or_default()
                            .push((message.time, offset));
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }

        self.chunk_indexes
            .borrow_mut()
            .insert(chunk_pos, entries.clone());
        Ok(entries)
    }

    /// Decompressed chunk payload, cached one chunk at a time.
    fn chunk_plaintext(&self, chunk_pos: u64) -> Result<Arc<Vec<u8>>> {
        if let Some((cached_pos, cached)) = self.chunk_cache.borrow().as_ref() {
            if *cached_pos == chunk_pos {
                return Ok(Arc::clone(cached));
            }
        }
        let data = self.buf.as_slice();
        let mut reader = ByteReader::new(data);
        reader.seek(chunk_pos)?;
        let plaintext = match parse_record(&mut reader)? {
            Some(BagRecord::Chunk(chunk)) => decode_bag_chunk(&chunk)?,
            other => {
                return Err(CodecError::malformed(
                    "bag",
                    format!("chunk info points at {other:?}"),
                ))
            }
        };
        let plaintext = Arc::new(plaintext);
        *self.chunk_cache.borrow_mut() = Some((chunk_pos, Arc::clone(&plaintext)));
        Ok(plaintext)
    }

    fn message_at(&self, chunk_pos: u64, offset: u32) -> Result<MessageDataRecord> {
        let plaintext = self.chunk_plaintext(chunk_pos)?;
        let mut reader = ByteReader::new(&plaintext);
        reader.seek(offset as u64)?;
        match parse_record(&mut reader)? {
            Some(BagRecord::MessageData(message)) => Ok(message),
            other => Err(CodecError::malformed(
                "bag",
                format!("index entry points at {other:?}"),
            )),
        }
    }
}

/// Decompress a bag chunk, validating the declared uncompressed size.
pub fn decode_bag_chunk(chunk: &ChunkRecord) -> Result<Vec<u8>> {
    let compression = Compression::from_bag_name(&chunk.compression)?;
    let plaintext = decompress(compression, &chunk.data)?;
    if plaintext.len() != chunk.size as usize {
        return Err(CodecError::malformed(
            "bag",
            format!(
                "chunk decompressed to {} bytes, header declared {}",
                plaintext.len(),
                chunk.size
            ),
        ));
    }
    Ok(plaintext)
}

struct BagCursor {
    chunk_pos: u64,
    rank: u64,
    entries: Vec<(u64, u32)>,
    pos: usize,
}

impl BagCursor {
    fn current(&self) -> Option<(u64, u32)> {
        self.entries.get(self.pos).copied()
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct BagHeapKey(u64, u64, u32);

struct BagHeapItem {
    key: Reverse<BagHeapKey>,
    cursor: BagCursor,
}

impl PartialEq for BagHeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for BagHeapItem {}
impl PartialOrd for BagHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for BagHeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

fn bag_heap_key(entry: (u64, u32), cursor: &BagCursor, in_log_time_order: bool) -> Reverse<BagHeapKey> {
    let (time, offset) = entry;
    Reverse(if in_log_time_order {
        BagHeapKey(time, cursor.rank, offset)
    } else {
        BagHeapKey(cursor.rank, offset as u64, 0)
    })
}

/// Pull-based bag message iterator.
pub struct BagMessageIter<'a> {
    reader: &'a BagReader,
    heap: BinaryHeap<BagHeapItem>,
    in_log_time_order: bool,
    failed: bool,
}

impl Iterator for BagMessageIter<'_> {
    type Item = Result<MessageDataRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut item = self.heap.pop()?;
        let (_, offset) = item.cursor.current()?;
        let result = self.reader.message_at(item.cursor.chunk_pos, offset);

        item.cursor.pos += 1;
        if let Some(entry) = item.cursor.current() {
            item.key = bag_heap_key(entry, &item.cursor, self.in_log_time_order);
            self.heap.push(item);
        }

        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::writer::{BagWriteOptions, BagWriter};
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

    fn build_bag(chunk_size: u64, count: u64) -> Vec<u8> {
        let mut options = BagWriteOptions::default();
        options.chunk_size = chunk_size;
        let mut writer = BagWriter::new(Cursor::new(Vec::new()), options).unwrap();
        let conn = writer.add_connection("/topic", sample_header("/topic")).unwrap();
        for i in 0..count {
            writer
                .write_message(conn, i * 1_000, format!("payload {i}").as_bytes())
                .unwrap();
        }
        writer.finish().unwrap();
        writer.into_inner().into_inner()
    }

    #[test]
    fn test_open_tables() {
        let reader = BagReader::from_bytes(build_bag(100, 50)).unwrap();
        assert_eq!(reader.version(), "2.0");
        assert_eq!(reader.connections().len(), 1);
        assert!(reader.chunk_count() >= 1);
        assert_eq!(reader.message_count("/topic").unwrap(), 50);
    }

    #[test]
    fn test_iteration_in_time_order() {
        let reader = BagReader::from_bytes(build_bag(100, 50)).unwrap();
        let times: Vec<u64> = reader
            .messages(BagMessageQuery::topic("/topic"))
            .unwrap()
            .map(|m| m.unwrap().time)
            .collect();
        assert_eq!(times.len(), 50);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_unknown_topic() {
        let reader = BagReader::from_bytes(build_bag(1024, 3)).unwrap();
        assert!(matches!(
            reader.messages(BagMessageQuery::topic("/missing")),
            Err(CodecError::UnknownTopic { .. })
        ));
    }

    #[test]
    fn test_time_range() {
        let reader = BagReader::from_bytes(build_bag(1024, 10)).unwrap();
        let mut query = BagMessageQuery::topic("/topic");
        query.start_time = Some(2_000);
        query.end_time = Some(6_000);
        let times: Vec<u64> = reader
            .messages(query)
            .unwrap()
            .map(|m| m.unwrap().time)
            .collect();
        assert_eq!(times, vec![2_000, 3_000, 4_000, 5_000]);
    }

    #[test]
    fn test_zeroed_index_pos_falls_back_to_scan() {
        let mut bytes = build_bag(100, 20);
        // Rewrite the header with a zero index_pos to simulate an
        // unindexed (crashed) bag.
        let mut patch = crate::bag::record_write::BagRecordWriter::new(Vec::new());
        patch
            .write_bag_header(&BagHeaderRecord {
                index_pos: 0,
                conn_count: 0,
                chunk_count: 0,
            })
            .unwrap();
        let header_bytes = patch.into_inner();
        bytes[BAG_VERSION_LINE.len()..BAG_VERSION_LINE.len() + header_bytes.len()]
            .copy_from_slice(&header_bytes);

        let reader = BagReader::from_bytes(bytes).unwrap();
        assert_eq!(reader.message_count("/topic").unwrap(), 20);
        let times: Vec<u64> = reader
            .messages(BagMessageQuery::topic("/topic"))
            .unwrap()
            .map(|m| m.unwrap().time)
            .collect();
        assert_eq!(times.len(), 20);
    }

    #[test]
    fn test_bz2_roundtrip() {
        let mut options = BagWriteOptions::default();
        options.compression = Compression::Bz2;
        options.chunk_size = 64;
        let mut writer = BagWriter::new(Cursor::new(Vec::new()), options).unwrap();
        let conn = writer.add_connection("/t", sample_header("/t")).unwrap();
        for i in 0..5u64 {
            writer.write_message(conn, i, &[i as u8; 32]).unwrap();
        }
        writer.finish().unwrap();
        let bytes = writer.into_inner().into_inner();

        let reader = BagReader::from_bytes(bytes).unwrap();
        let messages: Vec<_> = reader
            .messages(BagMessageQuery::all())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[3].data, vec![3u8; 32]);
    }
}
