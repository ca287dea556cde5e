//! `roslog merge` - merge MCAP files by log time.

use std::path::PathBuf;

use clap::Args;

use crate::common::{check_input, check_output, parse_mcap_compression, spinner, Result};
use roslog::mcap::McapWriteOptions;
use roslog::ops::merge_mcap_files;

#[derive(Args, Clone)]
pub struct MergeCmd {
    /// Input MCAP files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output MCAP file
    #[arg(short, long)]
    pub output: PathBuf,

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

impl MergeCmd {
    pub fn run(&self) -> Result<()> {
        for input in &self.inputs {
            check_input(input)?;
        }
        check_output(&self.output, self.overwrite)?;

        let mut options = McapWriteOptions {
            compression: parse_mcap_compression(&self.chunk_compression)?,
            ..Default::default()
        };
        if let Some(chunk_size) = self.chunk_size {
            options.chunk_size = Some(chunk_size);
        }

        let bar = spinner(&format!("merging {} inputs", self.inputs.len()));
        let stats = merge_mcap_files(&self.inputs, &self.output, options)?;
        bar.finish_and_clear();

        println!(
            "Merged {} messages from {} files into {} ({} channels)",
            stats.messages,
            stats.inputs,
            self.output.display(),
            stats.channels
        );
        Ok(())
    }
}
