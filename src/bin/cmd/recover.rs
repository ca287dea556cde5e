//! `roslog recover` - salvage a damaged MCAP file.

use std::path::PathBuf;

use clap::Args;

use crate::common::{check_input, check_output, default_output, parse_mcap_compression, Result};
use roslog::mcap::McapWriteOptions;
use roslog::ops::recover_mcap_file;

#[derive(Args, Clone)]
pub struct RecoverCmd {
    /// Damaged MCAP file
    pub input: PathBuf,

    /// Output file (defaults to INPUT.recovered.mcap)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replace the output file if it exists
    #[arg(long)]
    pub overwrite: bool,

    /// Chunk threshold in bytes
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Chunk compression (none|lz4|zstd)
    #[arg(long, default_value = "zstd")]
    pub chunk_compression: String,

    /// Report every skipped region
    #[arg(short, long)]
    pub verbose: bool,
}

impl RecoverCmd {
    pub fn run(&self) -> Result<()> {
        check_input(&self.input)?;
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| default_output(&self.input, "recovered"));
        check_output(&output, self.overwrite)?;

        let mut options = McapWriteOptions {
            compression: parse_mcap_compression(&self.chunk_compression)?,
            ..Default::default()
        };
        if let Some(chunk_size) = self.chunk_size {
            options.chunk_size = Some(chunk_size);
        }

        let stats = recover_mcap_file(&self.input, &output, options, None)?;

        println!(
            "Recovered {} messages ({} chunks, {} attachments, {} metadata) into {}",
            stats.messages,
            stats.chunks,
            stats.attachments,
            stats.metadata,
            output.display()
        );
        match (&stats.error, stats.error_position) {
            (Some(error), Some(position)) => {
                eprintln!("Stopped at byte {position}: {error}");
            }
            (Some(error), None) => eprintln!("Stopped: {error}"),
            _ => {
                if self.verbose {
                    println!("File was intact; full copy written.");
                }
            }
        }
        Ok(())
    }
}
