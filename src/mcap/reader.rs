//! MCAP file reader.
//!
//! The file is held as a whole-file byte view. Open parses magic, header,
//! and footer, then loads the summary section, falling back to
//! reconstruction when it is missing or damaged. Message iteration merges
//! per-chunk index lists through a heap, decompressing each chunk lazily and
//! holding decompressed payloads in a small LRU cache.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet, VecDeque};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::{CodecError, CrcScope, Result};
use crate::io::crc::crc32;
use crate::io::read::FileBuffer;
use crate::mcap::decode_chunk_records;
use crate::mcap::encryption::EncryptionProvider;
use crate::mcap::record_read::RecordReader;
use crate::mcap::records::*;
use crate::mcap::summary::{load_summary, reconstruct_summary, SummaryInfo};

/// Total size of a framed footer record.
const FOOTER_RECORD_LEN: u64 = 1 + 8 + 20;
/// Total size of a framed data-end record.
const DATA_END_RECORD_LEN: u64 = 1 + 8 + 4;

/// Reader configuration.
#[derive(Default)]
pub struct McapReadOptions {
    /// Decryption provider for encrypted chunks
    pub encryption: Option<Box<dyn EncryptionProvider>>,
    /// Decompressed chunks held in memory (minimum 1)
    pub chunk_cache_size: Option<usize>,
}

/// Message iteration parameters.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    /// Only this topic (all topics when `None`)
    pub topic: Option<String>,
    /// Inclusive lower bound on log time
    pub start_time: Option<u64>,
    /// Exclusive upper bound on log time
    pub end_time: Option<u64>,
    /// Iterate newest-first (requires message indexes)
    pub reverse: bool,
    /// Merge to global log-time order; plain file order otherwise
    pub in_log_time_order: bool,
}

impl MessageQuery {
    /// Log-time-ordered iteration over one topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
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

/// MCAP file reader with random access through the summary tables.
pub struct McapReader {
    buf: FileBuffer,
    header: HeaderRecord,
    footer: Option<FooterRecord>,
    summary: SummaryInfo,
    /// Offset just past the header record
    data_start: u64,
    encryption: Option<Box<dyn EncryptionProvider>>,
    chunk_cache: RefCell<ChunkCache>,
}

impl McapReader {
    /// Open a file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(FileBuffer::open(path)?, McapReadOptions::default())
    }

    /// Open a file from disk with options (encryption, cache size).
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: McapReadOptions) -> Result<Self> {
        Self::with_options(FileBuffer::open(path)?, options)
    }

    /// Open from in-memory bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::with_options(FileBuffer::from_bytes(data), McapReadOptions::default())
    }

    /// Open from in-memory bytes with options.
    pub fn from_bytes_with_options(data: Vec<u8>, options: McapReadOptions) -> Result<Self> {
        Self::with_options(FileBuffer::from_bytes(data), options)
    }

    fn with_options(buf: FileBuffer, options: McapReadOptions) -> Result<Self> {
        let data = buf.as_slice();
        let mut reader = RecordReader::new(data);
        reader.read_magic()?;
        let header = match reader.next_record()? {
            Record::Header(header) => header,
            other => {
                return Err(CodecError::malformed(
                    "mcap",
                    format!("expected header record, found {other:?}"),
                ))
            }
        };
        let data_start = reader.tell();

        let footer = read_footer(data);
        let encryption = options.encryption;
        let summary = match &footer {
            Some(footer) if footer.summary_start != 0 => {
                match load_summary(data, footer) {
                    Ok(summary) => summary,
                    Err(err) => {
                        tracing::warn!(error = %err, "summary section unreadable, reconstructing");
                        reconstruct_summary(data, encryption.as_deref())?
                    }
                }
            }
            _ => reconstruct_summary(data, encryption.as_deref())?,
        };

        Ok(Self {
            buf,
            header,
            footer,
            summary,
            data_start,
            encryption,
            chunk_cache: RefCell::new(ChunkCache::new(
                options.chunk_cache_size.unwrap_or(1).max(1),
            )),
        })
    }

    /// The file profile from the header.
    pub fn profile(&self) -> &str {
        &self.header.profile
    }

    /// The writing library from the header.
    pub fn library(&self) -> &str {
        &self.header.library
    }

    /// Summary statistics (reconstructed when the file had none).
    pub fn statistics(&self) -> &StatisticsRecord {
        &self.summary.statistics
    }

    /// Schemas by id.
    pub fn schemas(&self) -> &BTreeMap<u16, SchemaRecord> {
        &self.summary.schemas
    }

    /// Channels by id.
    pub fn channels(&self) -> &BTreeMap<u16, ChannelRecord> {
        &self.summary.channels
    }

    /// Chunk indexes, sorted by start time.
    pub fn chunk_indexes(&self) -> &[ChunkIndexRecord] {
        &self.summary.chunk_indexes
    }

    /// Attachment index entries.
    pub fn attachment_indexes(&self) -> &[AttachmentIndexRecord] {
        &self.summary.attachment_indexes
    }

    /// Metadata index entries.
    pub fn metadata_indexes(&self) -> &[MetadataIndexRecord] {
        &self.summary.metadata_indexes
    }

    /// All topics, in channel-id order.
    pub fn topics(&self) -> Vec<&str> {
        self.summary
            .channels
            .values()
            .map(|c| c.topic.as_str())
            .collect()
    }

    /// The schema record backing a channel, if it has one.
    pub fn schema_for_channel(&self, channel_id: u16) -> Option<&SchemaRecord> {
        let channel = self.summary.channels.get(&channel_id)?;
        if channel.schema_id == 0 {
            return None;
        }
        self.summary.schemas.get(&channel.schema_id)
    }

    /// Message count for one topic.
    pub fn message_count(&self, topic: &str) -> Result<u64> {
        let ids = self.channel_ids_for_topic(Some(topic))?;
        Ok(ids
            .iter()
            .map(|id| {
                self.summary
                    .statistics
                    .channel_message_counts
                    .get(id)
                    .copied()
                    .unwrap_or(0)
            })
            .sum())
    }

    /// Earliest message log time.
    pub fn start_time(&self) -> u64 {
        self.summary.statistics.message_start_time
    }

    /// Latest message log time.
    pub fn end_time(&self) -> u64 {
        self.summary.statistics.message_end_time
    }

    /// Read a full attachment record through its index entry.
    pub fn read_attachment(&self, index: &AttachmentIndexRecord) -> Result<AttachmentRecord> {
        let mut reader = RecordReader::new(self.buf.as_slice());
        reader.seek(index.offset)?;
        match reader.next_record()? {
            Record::Attachment(attachment) => Ok(attachment),
            other => Err(CodecError::malformed(
                "mcap",
                format!("attachment index points at {other:?}"),
            )),
        }
    }

    /// Read a full metadata record through its index entry.
    pub fn read_metadata(&self, index: &MetadataIndexRecord) -> Result<MetadataRecord> {
        let mut reader = RecordReader::new(self.buf.as_slice());
        reader.seek(index.offset)?;
        match reader.next_record()? {
            Record::Metadata(metadata) => Ok(metadata),
            other => Err(CodecError::malformed(
                "mcap",
                format!("metadata index points at {other:?}"),
            )),
        }
    }

    fn channel_ids_for_topic(&self, topic: Option<&str>) -> Result<HashSet<u16>> {
        match topic {
            None => Ok(self.summary.channels.keys().copied().collect()),
            Some(topic) => {
                let ids: HashSet<u16> = self
                    .summary
                    .channels
                    .values()
                    .filter(|c| c.topic == topic)
                    .map(|c| c.id)
                    .collect();
                if ids.is_empty() {
                    return Err(CodecError::unknown_topic(topic));
                }
                Ok(ids)
            }
        }
    }

    /// Iterate messages matching a query.
    pub fn messages(&self, query: MessageQuery) -> Result<MessageIter<'_>> {
        let wanted = self.channel_ids_for_topic(query.topic.as_deref())?;
        let range = (
            query.start_time.unwrap_or(0),
            query.end_time.unwrap_or(u64::MAX),
        );

        let mut cursors = Vec::new();

        for (chunk_pos, chunk) in self.summary.chunk_indexes.iter().enumerate() {
            // Prune chunks entirely outside the requested time range.
            if chunk.message_end_time < range.0 || chunk.message_start_time >= range.1 {
                continue;
            }
            let mut entries = self.chunk_entries(chunk, &wanted, range, query.reverse)?;
            if !query.in_log_time_order && !query.reverse {
                // File order within the chunk is offset order.
                entries.sort_by_key(|(_, offset)| *offset);
            }
            if !entries.is_empty() {
                cursors.push(Cursor {
                    source: Source::Chunk(chunk.chunk_start_offset),
                    order: chunk_pos as u64,
                    entries,
                    pos: 0,
                });
            }
        }

        let top_level = self.top_level_entries(&wanted, range)?;
        if !top_level.is_empty() {
            if query.reverse {
                let mut entries = top_level;
                entries.reverse();
                cursors.push(Cursor {
                    source: Source::TopLevel,
                    order: u64::MAX,
                    entries,
                    pos: 0,
                });
            } else {
                cursors.push(Cursor {
                    source: Source::TopLevel,
                    order: u64::MAX,
                    entries: top_level,
                    pos: 0,
                });
            }
        }

        Ok(MessageIter {
            reader: self,
            heap: build_heap(cursors, &query),
            query,
            failed: false,
        })
    }

    /// Index entries for one chunk, filtered, sorted by `(log_time, offset)`.
    fn chunk_entries(
        &self,
        chunk: &ChunkIndexRecord,
        wanted: &HashSet<u16>,
        range: (u64, u64),
        reverse: bool,
    ) -> Result<Vec<(u64, u64)>> {
        let mut entries = Vec::new();

        if let Some(indexes) = self
            .summary
            .chunk_message_indexes
            .get(&chunk.chunk_start_offset)
        {
            for (channel_id, index) in indexes {
                if wanted.contains(channel_id) {
                    entries.extend_from_slice(&index.records);
                }
            }
        } else if !chunk.message_index_offsets.is_empty() {
            let mut reader = RecordReader::new(self.buf.as_slice());
            for (channel_id, offset) in &chunk.message_index_offsets {
                if !wanted.contains(channel_id) {
                    continue;
                }
                reader.seek(*offset)?;
                match reader.next_record()? {
                    Record::MessageIndex(index) => entries.extend_from_slice(&index.records),
                    other => {
                        return Err(CodecError::malformed(
                            "mcap",
                            format!("message index offset points at {other:?}"),
                        ))
                    }
                }
            }
        } else {
            if reverse {
                return Err(CodecError::unsupported(
                    "reverse iteration requires message indexes",
                ));
            }
            // No index anywhere: scan the decompressed chunk.
            let plaintext = self.chunk_plaintext(chunk)?;
            let mut inner = RecordReader::new(&plaintext);
            while inner.peek_opcode().is_some() {
                let offset = inner.tell();
                match inner.next_record()? {
                    Record::Message(message) => {
                        if wanted.contains(&message.channel_id) {
                            entries.push((message.log_time, offset));
                        }
                    }
                    _ => {}
                }
            }
        }

        entries.retain(|(log_time, _)| *log_time >= range.0 && *log_time < range.1);
        entries.sort_unstable();
        if reverse {
            entries.reverse();
        }
        Ok(entries)
    }

    /// Entries for messages stored outside chunks, sorted ascending.
    fn top_level_entries(
        &self,
        wanted: &HashSet<u16>,
        range: (u64, u64),
    ) -> Result<Vec<(u64, u64)>> {
        let mut entries: Vec<(u64, u64)> = self
            .summary
            .non_chunked_index
            .iter()
            .filter(|(log_time, _, channel_id)| {
                wanted.contains(channel_id) && *log_time >= range.0 && *log_time < range.1
            })
            .map(|(log_time, offset, _)| (*log_time, *offset))
            .collect();

        // A summary-backed reader has no top-level message index; an
        // unchunked file then needs one linear scan of the data section.
        if entries.is_empty()
            && self.summary.from_summary_section
            && self.summary.chunk_indexes.is_empty()
            && self.summary.statistics.message_count > 0
        {
            let mut reader = RecordReader::new(self.buf.as_slice());
            reader.seek(self.data_start)?;
            loop {
                match reader.peek_opcode() {
                    None | Some(op::FOOTER) => break,
                    Some(op::DATA_END) => break,
                    Some(_) => {}
                }
                let offset = reader.tell();
                if let Record::Message(message) = reader.next_record()? {
                    if wanted.contains(&message.channel_id)
                        && message.log_time >= range.0
                        && message.log_time < range.1
                    {
                        entries.push((message.log_time, offset));
                    }
                }
            }
        }

        entries.sort_unstable();
        Ok(entries)
    }

    /// Decompressed chunk payload through the LRU cache.
    fn chunk_plaintext(&self, chunk: &ChunkIndexRecord) -> Result<Arc<Vec<u8>>> {
        if let Some(cached) = self.chunk_cache.borrow_mut().get(chunk.chunk_start_offset) {
            return Ok(cached);
        }
        let mut reader = RecordReader::new(self.buf.as_slice());
        reader.seek(chunk.chunk_start_offset)?;
        let plaintext = match reader.next_record()? {
            Record::Chunk(record) => decode_chunk_records(&record, self.encryption.as_deref())?,
            other => {
                return Err(CodecError::malformed(
                    "mcap",
                    format!("chunk index points at {other:?}"),
                ))
            }
        };
        let plaintext = Arc::new(plaintext);
        self.chunk_cache
            .borrow_mut()
            .put(chunk.chunk_start_offset, Arc::clone(&plaintext));
        Ok(plaintext)
    }

    fn chunk_index_at(&self, chunk_start_offset: u64) -> Result<&ChunkIndexRecord> {
        self.summary
            .chunk_indexes
            .iter()
            .find(|c| c.chunk_start_offset == chunk_start_offset)
            .ok_or_else(|| {
                CodecError::malformed(
                    "mcap",
                    format!("no chunk index for offset {chunk_start_offset}"),
                )
            })
    }

    /// Parse one message, either inside a chunk or at the top level.
    fn message_at(&self, source: Source, offset: u64) -> Result<MessageRecord> {
        match source {
            Source::Chunk(chunk_start_offset) => {
                let chunk = self.chunk_index_at(chunk_start_offset)?;
                let plaintext = self.chunk_plaintext(chunk)?;
                let mut reader = RecordReader::new(&plaintext);
                reader.seek(offset)?;
                match reader.next_record()? {
                    Record::Message(message) => Ok(message),
                    other => Err(CodecError::malformed(
                        "mcap",
                        format!("message index entry points at {other:?}"),
                    )),
                }
            }
            Source::TopLevel => {
                let mut reader = RecordReader::new(self.buf.as_slice());
                reader.seek(offset)?;
                match reader.next_record()? {
                    Record::Message(message) => Ok(message),
                    other => Err(CodecError::malformed(
                        "mcap",
                        format!("message offset points at {other:?}"),
                    )),
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Explicit CRC validation (the normal read path never checks CRCs)

    /// Validate `data_end.data_section_crc`. A stored zero passes.
    pub fn validate_data_crc(&self) -> Result<()> {
        let data = self.buf.as_slice();
        let data_end_pos = self.find_data_end()?;
        let mut reader = RecordReader::new(data);
        reader.seek(data_end_pos)?;
        let stored = match reader.next_record()? {
            Record::DataEnd(record) => record.data_section_crc,
            other => {
                return Err(CodecError::malformed(
                    "mcap",
                    format!("expected data end record, found {other:?}"),
                ))
            }
        };
        if stored == 0 {
            return Ok(());
        }
        let actual = crc32(&data[self.data_start as usize..data_end_pos as usize]);
        if actual != stored {
            return Err(CodecError::invalid_crc(CrcScope::Data, stored, actual));
        }
        Ok(())
    }

    /// Validate `footer.summary_crc`. A stored zero passes.
    pub fn validate_summary_crc(&self) -> Result<()> {
        let footer = match &self.footer {
            Some(footer) => footer,
            None => return Ok(()),
        };
        if footer.summary_crc == 0 || footer.summary_start == 0 {
            return Ok(());
        }
        let data = self.buf.as_slice();
        let footer_pos = data.len() as u64 - MCAP_MAGIC.len() as u64 - FOOTER_RECORD_LEN;
        // Scope runs to the byte before the summary_crc field of the footer.
        let crc_field_pos = footer_pos + 1 + 8 + 8 + 8;
        let actual = crc32(&data[footer.summary_start as usize..crc_field_pos as usize]);
        if actual != footer.summary_crc {
            return Err(CodecError::invalid_crc(
                CrcScope::Summary,
                footer.summary_crc,
                actual,
            ));
        }
        Ok(())
    }

    /// Validate every chunk's `uncompressed_crc`. Stored zeros pass.
    pub fn validate_chunk_crcs(&self) -> Result<()> {
        let data = self.buf.as_slice();
        let mut reader = RecordReader::new(data);
        for chunk_index in &self.summary.chunk_indexes {
            reader.seek(chunk_index.chunk_start_offset)?;
            let chunk = match reader.next_record()? {
                Record::Chunk(chunk) => chunk,
                other => {
                    return Err(CodecError::malformed(
                        "mcap",
                        format!("chunk index points at {other:?}"),
                    ))
                }
            };
            if chunk.uncompressed_crc == 0 {
                continue;
            }
            let plaintext = decode_chunk_records(&chunk, self.encryption.as_deref())?;
            let actual = crc32(&plaintext);
            if actual != chunk.uncompressed_crc {
                return Err(CodecError::invalid_crc(
                    CrcScope::Chunk,
                    chunk.uncompressed_crc,
                    actual,
                ));
            }
        }
        Ok(())
    }

    fn find_data_end(&self) -> Result<u64> {
        if let Some(footer) = &self.footer {
            if footer.summary_start >= DATA_END_RECORD_LEN {
                let candidate = footer.summary_start - DATA_END_RECORD_LEN;
                let data = self.buf.as_slice();
                if data.get(candidate as usize) == Some(&op::DATA_END) {
                    return Ok(candidate);
                }
            }
        }
        // No usable footer: scan forward.
        let mut reader = RecordReader::new(self.buf.as_slice());
        reader.seek(self.data_start)?;
        loop {
            match reader.peek_opcode() {
                Some(op::DATA_END) => return Ok(reader.tell()),
                None => {
                    return Err(CodecError::malformed("mcap", "no data end record found"))
                }
                Some(_) => reader.skip_record()?,
            }
        }
    }
}

fn read_footer(data: &[u8]) -> Option<FooterRecord> {
    let total = data.len() as u64;
    let magic_len = MCAP_MAGIC.len() as u64;
    if total < magic_len * 2 + FOOTER_RECORD_LEN {
        return None;
    }
    if &data[data.len() - MCAP_MAGIC.len()..] != MCAP_MAGIC {
        return None;
    }
    let footer_pos = total - magic_len - FOOTER_RECORD_LEN;
    let mut reader = RecordReader::new(data);
    reader.seek(footer_pos).ok()?;
    match reader.next_record() {
        Ok(Record::Footer(footer)) => Some(footer),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Iteration machinery

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Chunk(u64),
    TopLevel,
}

struct Cursor {
    source: Source,
    /// File-order rank of the source, for stable tie-breaks
    order: u64,
    entries: Vec<(u64, u64)>,
    pos: usize,
}

impl Cursor {
    fn current(&self) -> Option<(u64, u64)> {
        self.entries.get(self.pos).copied()
    }
}

/// Heap key: `(log_time, source order, offset)`, inverted for reverse.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct HeapKey(u64, u64, u64);

struct HeapItem {
    key: Reverse<HeapKey>,
    cursor: Cursor,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

fn heap_key(entry: (u64, u64), cursor: &Cursor, query: &MessageQuery) -> Reverse<HeapKey> {
    let (log_time, offset) = entry;
    let key = if query.in_log_time_order || query.reverse {
        if query.reverse {
            // Max-first via inverted components.
            HeapKey(u64::MAX - log_time, u64::MAX - cursor.order, u64::MAX - offset)
        } else {
            HeapKey(log_time, cursor.order, offset)
        }
    } else {
        // Plain file order.
        HeapKey(cursor.order, offset, 0)
    };
    Reverse(key)
}

fn build_heap(cursors: Vec<Cursor>, query: &MessageQuery) -> BinaryHeap<HeapItem> {
    let mut heap = BinaryHeap::with_capacity(cursors.len());
    for cursor in cursors {
        if let Some(entry) = cursor.current() {
            let key = heap_key(entry, &cursor, query);
            heap.push(HeapItem { key, cursor });
        }
    }
    heap
}

/// Pull-based message iterator. Dropping it releases nothing beyond the
/// chunk cache entries it touched.
pub struct MessageIter<'a> {
    reader: &'a McapReader,
    heap: BinaryHeap<HeapItem>,
    query: MessageQuery,
    failed: bool,
}

impl Iterator for MessageIter<'_> {
    type Item = Result<MessageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut item = self.heap.pop()?;
        let (_, offset) = item.cursor.current()?;
        let result = self.reader.message_at(item.cursor.source, offset);

        item.cursor.pos += 1;
        if let Some(entry) = item.cursor.current() {
            item.key = heap_key(entry, &item.cursor, &self.query);
            self.heap.push(item);
        }

        if result.is_err() {
            // An iteration error aborts the iteration.
            self.failed = true;
        }
        Some(result)
    }
}

// ---------------------------------------------------------------------------
// Chunk cache

struct ChunkCache {
    capacity: usize,
    map: HashMap<u64, Arc<Vec<u8>>>,
    order: VecDeque<u64>,
}

impl ChunkCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: u64) -> Option<Arc<Vec<u8>>> {
        let value = self.map.get(&key).cloned()?;
        self.touch(key);
        Some(value)
    }

    fn put(&mut self, key: u64, value: Arc<Vec<u8>>) {
        if self.map.insert(key, value).is_none() {
            self.order.push_back(key);
        } else {
            self.touch(key);
        }
        while self.map.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            } else {
                break;
            }
        }
    }

    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
            self.order.push_back(key);
        }
    }
}
