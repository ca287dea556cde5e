//! MCAP sorting passes.
//!
//! `by_topic` groups every channel's messages contiguously, preserving
//! per-channel order; `log_time` reorders globally; both together yield
//! topic groups sorted by log time within each group.

use std::io::Write;
use std::path::Path;

use crate::core::{CodecError, Result};
use crate::mcap::reader::{McapReader, MessageQuery};
use crate::mcap::records::MessageRecord;
use crate::mcap::writer::{McapWriteOptions, McapWriter};

/// Which sort passes to apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortOptions {
    pub by_topic: bool,
    pub log_time: bool,
}

/// Outcome of a sort.
#[derive(Debug, Clone, Default)]
pub struct SortStats {
    pub messages: u64,
    pub channels: usize,
}

/// Sort an MCAP file on disk into a new output path.
pub fn sort_mcap_file<P: AsRef<Path>>(
    input: P,
    output: P,
    sort: SortOptions,
    mut options: McapWriteOptions,
) -> Result<SortStats> {
    let reader = McapReader::open(input)?;
    options.profile = reader.profile().to_string();
    let writer = McapWriter::create(output, options)?;
    let (stats, mut writer) = sort_mcap(&reader, writer, sort)?;
    writer.finish()?;
    Ok(stats)
}

/// Sort an open reader into a writer.
pub fn sort_mcap<W: Write>(
    reader: &McapReader,
    mut writer: McapWriter<W>,
    sort: SortOptions,
) -> Result<(SortStats, McapWriter<W>)> {
    if !sort.by_topic && !sort.log_time {
        return Err(CodecError::unsupported(
            "sort requires at least one of by_topic or log_time",
        ));
    }

    let mut channel_map = std::collections::HashMap::new();
    for (old_id, channel) in reader.channels() {
        let schema_id = match reader.schema_for_channel(*old_id) {
            Some(schema) => writer.register_schema(&schema.name, &schema.encoding, &schema.data)?,
            None => 0,
        };
        let new_id = writer.register_channel(
            schema_id,
            &channel.topic,
            &channel.message_encoding,
            channel.metadata.clone(),
        )?;
        channel_map.insert(*old_id, new_id);
    }

    // Collect everything in file order, then reorder by the requested key.
    let mut query = MessageQuery::all();
    query.in_log_time_order = false;
    let mut messages: Vec<MessageRecord> = reader
        .messages(query)?
        .collect::<Result<Vec<_>>>()?;

    match (sort.by_topic, sort.log_time) {
        (true, false) => messages.sort_by_key(|m| m.channel_id),
        (false, true) => messages.sort_by_key(|m| m.log_time),
        (true, true) => messages.sort_by_key(|m| (m.channel_id, m.log_time)),
        (false, false) => unreachable!(),
    }

    let mut stats = SortStats {
        channels: channel_map.len(),
        ..Default::default()
    };
    for message in messages {
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
    }

    Ok((stats, writer))
}
