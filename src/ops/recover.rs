//! Stop-at-first-bad-record MCAP recovery.
//!
//! Reads linearly, forwarding every intact record into a fresh writer. On
//! the first unrecoverable parse error the output is closed cleanly, so the
//! recovered file carries a correct summary for everything salvaged.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::core::{CodecError, Result};
use crate::io::crc::crc32;
use crate::io::read::FileBuffer;
use crate::mcap::decode_chunk_records;
use crate::mcap::encryption::EncryptionProvider;
use crate::mcap::record_read::RecordReader;
use crate::mcap::records::*;
use crate::mcap::writer::{McapWriteOptions, McapWriter};

/// Outcome of a recovery pass.
#[derive(Debug, Clone, Default)]
pub struct RecoverStats {
    pub messages: u64,
    pub chunks: u64,
    pub attachments: u64,
    pub metadata: u64,
    /// Error that terminated the scan, if the file was damaged
    pub error: Option<String>,
    /// File offset of the first bad record
    pub error_position: Option<u64>,
}

/// Recover an MCAP file on disk into a new output path.
pub fn recover_mcap_file<P: AsRef<Path>>(
    input: P,
    output: P,
    mut options: McapWriteOptions,
    encryption: Option<Box<dyn EncryptionProvider>>,
) -> Result<RecoverStats> {
    let buf = FileBuffer::open(input)?;

    // The header must parse; without it there is nothing to recover into.
    let mut probe = RecordReader::new(buf.as_slice());
    probe.read_magic()?;
    let header = match probe.next_record()? {
        Record::Header(header) => header,
        other => {
            return Err(CodecError::malformed(
                "mcap",
                format!("expected header record, found {other:?}"),
            ))
        }
    };
    options.profile = header.profile;

    let mut writer = McapWriter::create(output, options)?;
    let stats = recover_records(buf.as_slice(), &mut writer, encryption.as_deref())?;
    writer.finish()?;
    Ok(stats)
}

/// Copy every intact record from `data` into `writer`, stopping cleanly at
/// the first bad one.
pub fn recover_records<W: Write>(
    data: &[u8],
    writer: &mut McapWriter<W>,
    encryption: Option<&dyn EncryptionProvider>,
) -> Result<RecoverStats> {
    let mut stats = RecoverStats::default();
    let mut reader = RecordReader::new(data);
    reader.read_magic()?;
    match reader.next_record()? {
        Record::Header(_) => {}
        other => {
            return Err(CodecError::malformed(
                "mcap",
                format!("expected header record, found {other:?}"),
            ))
        }
    }

    // Input schema/channel ids remapped onto the writer's ids.
    let mut schema_map: HashMap<u16, u16> = HashMap::new();
    let mut channel_map: HashMap<u16, u16> = HashMap::new();

    loop {
        match reader.peek_opcode() {
            None | Some(0) | Some(op::FOOTER) => break,
            Some(_) => {}
        }
        let position = reader.tell();
        let record = match reader.next_record() {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(position, error = %err, "recovery stopping at bad record");
                stats.error = Some(err.to_string());
                stats.error_position = Some(position);
                break;
            }
        };
        if let Err(err) = replay_record(
            record,
            writer,
            encryption,
            &mut schema_map,
            &mut channel_map,
            &mut stats,
        ) {
            tracing::warn!(position, error = %err, "recovery stopping at bad record");
            stats.error = Some(err.to_string());
            stats.error_position = Some(position);
            break;
        }
    }

    Ok(stats)
}

fn replay_record<W: Write>(
    record: Record,
    writer: &mut McapWriter<W>,
    encryption: Option<&dyn EncryptionProvider>,
    schema_map: &mut HashMap<u16, u16>,
    channel_map: &mut HashMap<u16, u16>,
    stats: &mut RecoverStats,
) -> Result<()> {
    match record {
        Record::Schema(schema) => {
            let new_id = writer.register_schema(&schema.name, &schema.encoding, &schema.data)?;
            schema_map.insert(schema.id, new_id);
        }
        Record::Channel(channel) => {
            let schema_id = match channel.schema_id {
                0 => 0,
                old => *schema_map.get(&old).ok_or_else(|| {
                    CodecError::malformed("mcap", format!("channel references unknown schema {old}"))
                })?,
            };
            let new_id = writer.register_channel(
                schema_id,
                &channel.topic,
                &channel.message_encoding,
                channel.metadata,
            )?;
            channel_map.insert(channel.id, new_id);
        }
        Record::Message(message) => {
            replay_message(message, writer, channel_map, stats)?;
        }
        Record::Chunk(chunk) => {
            // A stored chunk CRC is the integrity line: a mismatch counts
            // as the first bad record.
            let plaintext = decode_chunk_records(&chunk, encryption)?;
            if chunk.uncompressed_crc != 0 {
                let actual = crc32(&plaintext);
                if actual != chunk.uncompressed_crc {
                    return Err(CodecError::invalid_crc(
                        crate::core::CrcScope::Chunk,
                        chunk.uncompressed_crc,
                        actual,
                    ));
                }
            }
            let mut inner = RecordReader::new(&plaintext);
            while inner.peek_opcode().is_some() {
                match inner.next_record()? {
                    Record::Schema(schema) => {
                        let new_id =
                            writer.register_schema(&schema.name, &schema.encoding, &schema.data)?;
                        schema_map.insert(schema.id, new_id);
                    }
                    Record::Channel(channel) => {
                        let schema_id = match channel.schema_id {
                            0 => 0,
                            old => *schema_map.get(&old).ok_or_else(|| {
                                CodecError::malformed(
                                    "mcap",
                                    format!("channel references unknown schema {old}"),
                                )
                            })?,
                        };
                        let new_id = writer.register_channel(
                            schema_id,
                            &channel.topic,
                            &channel.message_encoding,
                            channel.metadata,
                        )?;
                        channel_map.insert(channel.id, new_id);
                    }
                    Record::Message(message) => {
                        replay_message(message, writer, channel_map, stats)?;
                    }
                    _ => {}
                }
            }
            stats.chunks += 1;
        }
        Record::Attachment(attachment) => {
            writer.add_attachment(
                attachment.log_time,
                attachment.create_time,
                &attachment.name,
                &attachment.media_type,
                &attachment.data,
            )?;
            stats.attachments += 1;
        }
        Record::Metadata(metadata) => {
            writer.add_metadata(&metadata.name, metadata.metadata)?;
            stats.metadata += 1;
        }
        // Indexes and statistics are rebuilt by the writer.
        Record::MessageIndex(_)
        | Record::ChunkIndex(_)
        | Record::Statistics(_)
        | Record::AttachmentIndex(_)
        | Record::MetadataIndex(_)
        | Record::SummaryOffset(_)
        | Record::DataEnd(_)
        | Record::Unknown { .. } => {}
        Record::Header(_) | Record::Footer(_) => {}
    }
    Ok(())
}

fn replay_message<W: Write>(
    message: MessageRecord,
    writer: &mut McapWriter<W>,
    channel_map: &HashMap<u16, u16>,
    stats: &mut RecoverStats,
) -> Result<()> {
    let channel_id = *channel_map.get(&message.channel_id).ok_or_else(|| {
        CodecError::malformed(
            "mcap",
            format!("message references unknown channel {}", message.channel_id),
        )
    })?;
    writer.write_message(&MessageRecord {
        channel_id,
        ..message
    })?;
    stats.messages += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcap::reader::{McapReader, MessageQuery};
    use std::collections::BTreeMap;

    fn build_file(count: u64) -> Vec<u8> {
        let mut options = McapWriteOptions::default();
        options.chunk_size = Some(64);
        let mut writer = McapWriter::new(Vec::new(), options).unwrap();
        let schema = writer
            .register_schema("std_msgs/msg/String", "ros2msg", b"string data\n")
            .unwrap();
        let channel = writer
            .register_channel(schema, "/t", "cdr", BTreeMap::new())
            .unwrap();
        for i in 0..count {
            let sequence = writer.next_sequence(channel);
            writer
                .write_message(&MessageRecord {
                    channel_id: channel,
                    sequence,
                    log_time: i,
                    publish_time: i,
                    data: vec![i as u8; 16],
                })
                .unwrap();
        }
        writer.finish().unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_recover_intact_file() {
        let bytes = build_file(10);
        let mut writer = McapWriter::new(Vec::new(), McapWriteOptions::default()).unwrap();
        let stats = recover_records(&bytes, &mut writer, None).unwrap();
        writer.finish().unwrap();
        assert_eq!(stats.messages, 10);
        assert!(stats.error.is_none());

        let recovered = McapReader::from_bytes(writer.into_inner()).unwrap();
        assert_eq!(recovered.statistics().message_count, 10);
    }

    #[test]
    fn test_truncated_file_recovers_prefix() {
        let bytes = build_file(10);
        // Drop the last third of the file, cutting mid-record.
        let truncated = bytes[..bytes.len() * 2 / 3].to_vec();

        let mut writer = McapWriter::new(Vec::new(), McapWriteOptions::default()).unwrap();
        let stats = recover_records(&truncated, &mut writer, None).unwrap();
        writer.finish().unwrap();
        assert!(stats.error.is_some());
        assert!(stats.messages > 0);
        assert!(stats.messages < 10);

        // The recovered output must be a fully valid file.
        let recovered = McapReader::from_bytes(writer.into_inner()).unwrap();
        recovered.validate_data_crc().unwrap();
        recovered.validate_summary_crc().unwrap();
        let messages: Vec<_> = recovered
            .messages(MessageQuery::all())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(messages.len() as u64, stats.messages);
        // The prefix survives in order.
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message.log_time, i as u64);
        }
    }

    #[test]
    fn test_corrupt_chunk_crc_stops_recovery() {
        let mut bytes = build_file(6);
        // Find the first chunk record and flip a payload byte. The chunk
        // opcode is 0x06 followed by a plausible length.
        let reader = McapReader::from_bytes(bytes.clone()).unwrap();
        let chunk_offset = reader.chunk_indexes()[0].chunk_start_offset as usize;
        drop(reader);
        // Flip one byte well inside the chunk body (records are stored
        // uncompressed in this test fixture).
        bytes[chunk_offset + 60] ^= 0xFF;

        let mut writer = McapWriter::new(Vec::new(), McapWriteOptions::default()).unwrap();
        let stats = recover_records(&bytes, &mut writer, None).unwrap();
        writer.finish().unwrap();
        assert!(stats.error.is_some());
    }
}
