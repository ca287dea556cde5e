//! K-way merge of MCAP files.
//!
//! All inputs must share one profile. Schemas are deduplicated by content
//! and channels by `(schema, topic, encoding)`; messages merge through a
//! heap keyed `(log_time, file_index)` and are re-sequenced per channel.
//! Attachments and metadata concatenate through.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::io::Write;
use std::path::Path;

use crate::core::{CodecError, Result};
use crate::mcap::reader::{McapReader, MessageQuery};
use crate::mcap::records::MessageRecord;
use crate::mcap::writer::{McapWriteOptions, McapWriter};

/// Outcome of a merge.
#[derive(Debug, Clone, Default)]
pub struct MergeStats {
    pub inputs: usize,
    pub messages: u64,
    pub channels: usize,
    pub attachments: u64,
    pub metadata: u64,
}

/// Merge MCAP files into one output path.
pub fn merge_mcap_files(
    inputs: &[impl AsRef<Path>],
    output: impl AsRef<Path>,
    mut options: McapWriteOptions,
) -> Result<MergeStats> {
    let readers = inputs
        .iter()
        .map(McapReader::open)
        .collect::<Result<Vec<_>>>()?;
    let readers_ref: Vec<&McapReader> = readers.iter().collect();
    let profile = check_shared_profile(&readers_ref)?;
    options.profile = profile;
    let writer = McapWriter::create(output, options)?;
    let (stats, mut writer) = merge_mcap(&readers_ref, writer)?;
    writer.finish()?;
    Ok(stats)
}

/// Verify all inputs share the same profile; returns it.
fn check_shared_profile(readers: &[&McapReader]) -> Result<String> {
    let mut profiles: Vec<&str> = readers.iter().map(|r| r.profile()).collect();
    profiles.dedup();
    match profiles.as_slice() {
        [] => Err(CodecError::unsupported("merge requires at least one input")),
        [profile] => Ok(profile.to_string()),
        _ => Err(CodecError::unsupported(format!(
            "cannot merge files with mixed profiles: {profiles:?}"
        ))),
    }
}

/// Merge already-open readers into a writer.
pub fn merge_mcap<W: Write>(
    readers: &[&McapReader],
    mut writer: McapWriter<W>,
) -> Result<(MergeStats, McapWriter<W>)> {
    check_shared_profile(readers)?;

    let mut stats = MergeStats {
        inputs: readers.len(),
        ..Default::default()
    };

    // Remap every input's channel ids onto the deduplicated output ids.
    let mut channel_maps: Vec<HashMap<u16, u16>> = Vec::with_capacity(readers.len());
    for reader in readers {
        let mut channel_map = HashMap::new();
        for (old_id, channel) in reader.channels() {
            let schema_id = match reader.schema_for_channel(*old_id) {
                Some(schema) => {
                    writer.register_schema(&schema.name, &schema.encoding, &schema.data)?
                }
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
        channel_maps.push(channel_map);
    }

    // Lazy per-file iterators feeding a heap keyed (log_time, file_index).
    let mut iters: Vec<_> = readers
        .iter()
        .map(|reader| reader.messages(MessageQuery::all()))
        .collect::<Result<Vec<_>>>()?;

    // One pending message per input; the heap orders their keys.
    let mut pending: Vec<Option<MessageRecord>> = Vec::with_capacity(iters.len());
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();
    for (file_index, iter) in iters.iter_mut().enumerate() {
        match iter.next().transpose()? {
            Some(message) => {
                heap.push(Reverse((message.log_time, file_index)));
                pending.push(Some(message));
            }
            None => pending.push(None),
        }
    }

    while let Some(Reverse((log_time, file_index))) = heap.pop() {
        let message = pending[file_index].take().ok_or_else(|| {
            CodecError::encode("mcap", "merge heap out of sync with its inputs")
        })?;
        let new_channel_id = *channel_maps[file_index]
            .get(&message.channel_id)
            .ok_or_else(|| {
                CodecError::malformed(
                    "mcap",
                    format!("message references unknown channel {}", message.channel_id),
                )
            })?;
        let sequence = writer.next_sequence(new_channel_id);
        writer.write_message(&MessageRecord {
            channel_id: new_channel_id,
            sequence,
            log_time,
            publish_time: message.publish_time,
            data: message.data,
        })?;
        stats.messages += 1;

        if let Some(next) = iters[file_index].next().transpose()? {
            heap.push(Reverse((next.log_time, file_index)));
            pending[file_index] = Some(next);
        }
    }

    // Attachments and metadata pass straight through.
    for reader in readers {
        for index in reader.attachment_indexes() {
            let attachment = reader.read_attachment(index)?;
            writer.add_attachment(
                attachment.log_time,
                attachment.create_time,
                &attachment.name,
                &attachment.media_type,
                &attachment.data,
            )?;
            stats.attachments += 1;
        }
        for index in reader.metadata_indexes() {
            let metadata = reader.read_metadata(index)?;
            writer.add_metadata(&metadata.name, metadata.metadata)?;
            stats.metadata += 1;
        }
    }

    stats.channels = channel_maps
        .iter()
        .flat_map(|m| m.values())
        .collect::<std::collections::HashSet<_>>()
        .len();
    Ok((stats, writer))
}
