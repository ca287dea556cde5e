//! `roslog inspect` - print file structure and statistics.

use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use clap::Args;

use crate::common::{check_input, Result};
use roslog::{FileFormat, LogReader};

#[derive(Args, Clone)]
pub struct InspectCmd {
    /// File to inspect (.mcap or .bag)
    pub input: PathBuf,

    /// List every chunk
    #[arg(long)]
    pub chunks: bool,

    /// Print summary statistics
    #[arg(long)]
    pub summary: bool,

    /// Print everything
    #[arg(long)]
    pub all: bool,
}

impl InspectCmd {
    pub fn run(&self) -> Result<()> {
        check_input(&self.input)?;
        let reader = LogReader::open(&self.input)?;

        match &reader {
            LogReader::Mcap(mcap) => self.inspect_mcap(mcap)?,
            LogReader::Bag(bag) => self.inspect_bag(bag)?,
        }
        Ok(())
    }

    fn inspect_mcap(&self, reader: &roslog::mcap::McapReader) -> Result<()> {
        println!("File:     {}", self.input.display());
        println!("Format:   {}", FileFormat::Mcap);
        println!("Profile:  {}", reader.profile());
        println!("Library:  {}", reader.library());

        let stats = reader.statistics();
        println!("Messages: {}", stats.message_count);
        println!("Chunks:   {}", stats.chunk_count);
        println!(
            "Range:    {} .. {}",
            format_time(stats.message_start_time),
            format_time(stats.message_end_time)
        );

        println!("Channels:");
        for channel in reader.channels().values() {
            let msg_type = reader
                .schema_for_channel(channel.id)
                .map(|s| s.name.as_str())
                .unwrap_or("<no schema>");
            let count = stats
                .channel_message_counts
                .get(&channel.id)
                .copied()
                .unwrap_or(0);
            println!(
                "  [{}] {} ({}, {}): {} msgs",
                channel.id, channel.topic, msg_type, channel.message_encoding, count
            );
        }

        if self.chunks || self.all {
            println!("Chunk indexes:");
            for chunk in reader.chunk_indexes() {
                println!(
                    "  offset {:>10}  {} .. {}  {} -> {} bytes  [{}]",
                    chunk.chunk_start_offset,
                    format_time(chunk.message_start_time),
                    format_time(chunk.message_end_time),
                    chunk.uncompressed_size,
                    chunk.compressed_size,
                    if chunk.compression.is_empty() {
                        "none"
                    } else {
                        &chunk.compression
                    },
                );
            }
        }

        if self.summary || self.all {
            println!("Statistics:");
            println!("  schemas:     {}", stats.schema_count);
            println!("  channels:    {}", stats.channel_count);
            println!("  attachments: {}", stats.attachment_count);
            println!("  metadata:    {}", stats.metadata_count);
            for index in reader.attachment_indexes() {
                println!(
                    "  attachment '{}' ({}, {} bytes)",
                    index.name, index.media_type, index.data_size
                );
            }
            for index in reader.metadata_indexes() {
                println!("  metadata '{}'", index.name);
            }
        }
        Ok(())
    }

    fn inspect_bag(&self, reader: &roslog::bag::BagReader) -> Result<()> {
        println!("File:     {}", self.input.display());
        println!("Format:   {}", FileFormat::Bag);
        println!("Version:  {}", reader.version());
        println!("Chunks:   {}", reader.chunk_count());
        if let (Some(start), Some(end)) = (reader.start_time(), reader.end_time()) {
            println!(
                "Range:    {} .. {}",
                format_time(start),
                format_time(end)
            );
        }

        println!("Connections:");
        for connection in reader.connections().values() {
            let count = reader.message_count(&connection.topic).unwrap_or(0);
            println!(
                "  [{}] {} ({}): {} msgs",
                connection.conn, connection.topic, connection.header.msg_type, count
            );
        }

        if self.chunks || self.all {
            println!("Chunk infos:");
            for info in reader.chunk_infos() {
                println!(
                    "  pos {:>10}  {} .. {}  {} connections",
                    info.chunk_pos,
                    format_time(info.start_time),
                    format_time(info.end_time),
                    info.connection_counts.len()
                );
            }
        }

        if self.summary || self.all {
            println!("Summary:");
            for connection in reader.connections().values() {
                println!(
                    "  {}: md5 {}",
                    connection.header.msg_type, connection.header.md5sum
                );
            }
        }
        Ok(())
    }
}

/// Nanosecond timestamp as UTC, falling back to the raw number.
fn format_time(nanos: u64) -> String {
    match Utc.timestamp_opt((nanos / 1_000_000_000) as i64, (nanos % 1_000_000_000) as u32) {
        chrono::LocalResult::Single(time) => time.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        _ => nanos.to_string(),
    }
}
