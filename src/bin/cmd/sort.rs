//! `roslog sort` - reorder an MCAP file by topic and/or log time.

use std::path::PathBuf;

use clap::Args;

use crate::common::{check_input, check_output, default_output, parse_mcap_compression, Result};
use roslog::mcap::McapWriteOptions;
use roslog::ops::{sort_mcap_file, SortOptions};

#[derive(Args, Clone)]
pub struct SortCmd {
    /// Input MCAP file
    pub input: PathBuf,

    /// Output file (defaults to INPUT.sorted.mcap)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Group each topic's messages contiguously
    #[arg(long)]
    pub by_topic: bool,

    /// Sort messages by log time
    #[arg(long)]
    pub log_time: bool,

    /// Chunk threshold in bytes
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Chunk compression (none|lz4|zstd)
    #[arg(long, default_value = "zstd")]
    pub chunk_compression: String,

    /// Replace the output file if it exists
    #[arg(long)]
    pub overwrite: bool,
}

impl SortCmd {
    pub fn run(&self) -> Result<()> {
        check_input(&self.input)?;
        if !self.by_topic && !self.log_time {
            anyhow::bail!("nothing to do: pass --by-topic and/or --log-time");
        }
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| default_output(&self.input, "sorted"));
        check_output(&output, self.overwrite)?;

        let mut options = McapWriteOptions {
            compression: parse_mcap_compression(&self.chunk_compression)?,
            ..Default::default()
        };
        if let Some(chunk_size) = self.chunk_size {
            options.chunk_size = Some(chunk_size);
        }

        let stats = sort_mcap_file(
            &self.input,
            &output,
            SortOptions {
                by_topic: self.by_topic,
                log_time: self.log_time,
            },
            options,
        )?;

        println!(
            "Sorted {} messages on {} channels into {}",
            stats.messages,
            stats.channels,
            output.display()
        );
        Ok(())
    }
}
