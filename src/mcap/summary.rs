//! MCAP summary loading and reconstruction.
//!
//! Random access needs the summary tables (schemas, channels, chunk indexes,
//! statistics). They come from the summary section when the footer points at
//! one, or from a linear scan of the data section when it is missing,
//! zeroed, or corrupt.

use std::collections::{BTreeMap, HashMap};

use crate::core::{CodecError, Result};
use crate::mcap::encryption::EncryptionProvider;
use crate::mcap::record_read::RecordReader;
use crate::mcap::records::*;
use crate::mcap::decode_chunk_records;

/// Summary tables for one file, loaded or reconstructed.
#[derive(Debug, Default)]
pub struct SummaryInfo {
    pub schemas: BTreeMap<u16, SchemaRecord>,
    pub channels: BTreeMap<u16, ChannelRecord>,
    pub statistics: StatisticsRecord,
    /// Sorted by `(message_start_time, chunk_start_offset)`
    pub chunk_indexes: Vec<ChunkIndexRecord>,
    /// Message indexes keyed by chunk start offset, when known eagerly
    pub chunk_message_indexes: HashMap<u64, BTreeMap<u16, MessageIndexRecord>>,
    /// `(log_time, record_offset, channel_id)` of messages outside chunks
    pub non_chunked_index: Vec<(u64, u64, u16)>,
    pub attachment_indexes: Vec<AttachmentIndexRecord>,
    pub metadata_indexes: Vec<MetadataIndexRecord>,
    /// True when the tables were read from a summary section rather than
    /// reconstructed
    pub from_summary_section: bool,
}

/// Parse the summary section the footer points at.
pub fn load_summary(data: &[u8], footer: &FooterRecord) -> Result<SummaryInfo> {
    let mut info = SummaryInfo {
        from_summary_section: true,
        ..Default::default()
    };
    let mut reader = RecordReader::new(data);
    reader.seek(footer.summary_start)?;

    loop {
        match reader.peek_opcode() {
            None => break,
            Some(op::FOOTER) | Some(op::SUMMARY_OFFSET) => break,
            Some(_) => {}
        }
        match reader.next_record()? {
            Record::Schema(schema) => {
                if schema.id != 0 {
                    info.schemas.insert(schema.id, schema);
                }
            }
            Record::Channel(channel) => {
                info.channels.insert(channel.id, channel);
            }
            Record::ChunkIndex(index) => info.chunk_indexes.push(index),
            Record::Statistics(statistics) => info.statistics = statistics,
            Record::AttachmentIndex(index) => info.attachment_indexes.push(index),
            Record::MetadataIndex(index) => info.metadata_indexes.push(index),
            Record::DataEnd(_) | Record::Unknown { .. } => {}
            other => {
                return Err(CodecError::malformed(
                    "mcap",
                    format!("unexpected record in summary section: {other:?}"),
                ))
            }
        }
    }

    info.chunk_indexes
        .sort_by_key(|idx| (idx.message_start_time, idx.chunk_start_offset));
    Ok(info)
}

/// Rebuild summary tables by scanning the data section.
///
/// Tolerates files with no DataEnd/footer; accumulates statistics and
/// per-chunk message indexes as it goes. Needs the decryption provider when
/// chunks are encrypted.
pub fn reconstruct_summary(
    data: &[u8],
    encryption: Option<&dyn EncryptionProvider>,
) -> Result<SummaryInfo> {
    let mut info = SummaryInfo::default();
    let mut reader = RecordReader::new(data);
    reader.read_magic()?;

    // The first record must be the header.
    match reader.next_record()? {
        Record::Header(_) => {}
        other => {
            return Err(CodecError::malformed(
                "mcap",
                format!("expected header record, found {other:?}"),
            ))
        }
    }

    let mut chunk_indexes: BTreeMap<u64, ChunkIndexRecord> = BTreeMap::new();
    let mut stats = StatisticsRecord {
        message_start_time: u64::MAX,
        ..Default::default()
    };
    let mut last_chunk_start: Option<u64> = None;

    loop {
        match reader.peek_opcode() {
            None | Some(0) | Some(op::FOOTER) => break,
            Some(_) => {}
        }
        let record_start = reader.tell();
        match reader.next_record()? {
            Record::Schema(schema) => {
                if schema.id != 0 {
                    info.schemas.insert(schema.id, schema);
                }
            }
            Record::Channel(channel) => {
                info.channels.insert(channel.id, channel);
            }
            Record::Message(message) => {
                info.non_chunked_index
                    .push((message.log_time, record_start, message.channel_id));
                tally(&mut stats, message.channel_id, message.log_time);
            }
            Record::Chunk(chunk) => {
                let chunk_end = reader.tell();
                last_chunk_start = Some(record_start);

                let plaintext = decode_chunk_records(&chunk, encryption)?;
                let mut channel_indexes: BTreeMap<u16, MessageIndexRecord> = BTreeMap::new();
                let mut inner = RecordReader::new(&plaintext);
                while inner.peek_opcode().is_some() {
                    let inner_start = inner.tell();
                    match inner.next_record()? {
                        Record::Schema(schema) => {
                            if schema.id != 0 {
                                info.schemas.insert(schema.id, schema);
                            }
                        }
                        Record::Channel(channel) => {
                            info.channels.insert(channel.id, channel);
                        }
                        Record::Message(message) => {
                            channel_indexes
                                .entry(message.channel_id)
                                .or_insert_with(|| MessageIndexRecord {
                                    channel_id: message.channel_id,
                                    records: Vec::new(),
                                })
                                .records
                                .push((message.log_time, inner_start));
                            tally(&mut stats, message.channel_id, message.log_time);
                        }
                        _ => {}
                    }
                }

                chunk_indexes.insert(
                    record_start,
                    ChunkIndexRecord {
                        message_start_time: chunk.message_start_time,
                        message_end_time: chunk.message_end_time,
                        chunk_start_offset: record_start,
                        chunk_length: chunk_end - record_start,
                        message_index_offsets: BTreeMap::new(),
                        message_index_length: 0,
                        compression: chunk.compression.clone(),
                        compressed_size: chunk.records.len() as u64,
                        uncompressed_size: chunk.uncompressed_size,
                    },
                );
                info.chunk_message_indexes
                    .insert(record_start, channel_indexes);
            }
            Record::MessageIndex(message_index) => {
                if let Some(chunk_start) = last_chunk_start {
                    let index_end = reader.tell();
                    if let Some(chunk) = chunk_indexes.get_mut(&chunk_start) {
                        chunk
                            .message_index_offsets
                            .insert(message_index.channel_id, record_start);
                        chunk.message_index_length += index_end - record_start;
                    }
                    info.chunk_message_indexes
                        .entry(chunk_start)
                        .or_default()
                        .insert(message_index.channel_id, message_index);
                }
            }
            // An intact chunk index in the data region (unusual but legal)
            // overrides the reconstructed one.
            Record::ChunkIndex(index) => {
                chunk_indexes.insert(index.chunk_start_offset, index);
            }
            Record::Attachment(attachment) => {
                stats.attachment_count += 1;
                info.attachment_indexes.push(AttachmentIndexRecord {
                    offset: record_start,
                    length: reader.tell() - record_start,
                    log_time: attachment.log_time,
                    create_time: attachment.create_time,
                    data_size: attachment.data.len() as u64,
                    name: attachment.name,
                    media_type: attachment.media_type,
                });
            }
            Record::Metadata(metadata) => {
                stats.metadata_count += 1;
                info.metadata_indexes.push(MetadataIndexRecord {
                    offset: record_start,
                    length: reader.tell() - record_start,
                    name: metadata.name,
                });
            }
            // Stale statistics are ignored; they are recomputed below.
            Record::Statistics(_)
            | Record::DataEnd(_)
            | Record::AttachmentIndex(_)
            | Record::MetadataIndex(_)
            | Record::SummaryOffset(_)
            | Record::Unknown { .. } => {}
            Record::Header(_) | Record::Footer(_) => break,
        }
    }

    if stats.message_start_time == u64::MAX {
        stats.message_start_time = 0;
    }
    stats.schema_count = info.schemas.len() as u16;
    stats.channel_count = info.channels.len() as u32;
    stats.chunk_count = chunk_indexes.len() as u32;
    info.statistics = stats;
    info.non_chunked_index.sort_unstable();
    info.chunk_indexes = chunk_indexes.into_values().collect();
    info.chunk_indexes
        .sort_by_key(|idx| (idx.message_start_time, idx.chunk_start_offset));
    Ok(info)
}

fn tally(stats: &mut StatisticsRecord, channel_id: u16, log_time: u64) {
    stats.message_count += 1;
    *stats.channel_message_counts.entry(channel_id).or_insert(0) += 1;
    stats.message_start_time = stats.message_start_time.min(log_time);
    stats.message_end_time = stats.message_end_time.max(log_time);
}
