//! `roslog convert` - convert between bag and MCAP containers.

use std::path::PathBuf;

use clap::Args;

use crate::common::{
    check_input, check_output, parse_bag_compression, parse_mcap_compression, spinner, Result,
};
use roslog::ops::convert_file;
use roslog::LogWriterOptions;

#[derive(Args, Clone)]
pub struct ConvertCmd {
    /// Input file (.bag or .mcap)
    pub input: PathBuf,

    /// Output file (.mcap or .bag)
    #[arg(short, long)]
    pub output: PathBuf,

    /// MCAP profile for .mcap outputs
    #[arg(long, default_value = "ros2", value_parser = ["ros1", "ros2"])]
    pub profile: String,

    /// Chunk compression for .mcap outputs
    #[arg(long, default_value = "lz4")]
    pub mcap_compression: String,

    /// Chunk compression for .bag outputs
    #[arg(long, default_value = "none")]
    pub bag_compression: String,

    /// Chunk threshold in bytes
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Replace the output file if it exists
    #[arg(long)]
    pub overwrite: bool,
}

impl ConvertCmd {
    pub fn run(&self) -> Result<()> {
        check_input(&self.input)?;
        check_output(&self.output, self.overwrite)?;

        let options = LogWriterOptions {
            profile: self.profile.clone(),
            chunk_size: self.chunk_size,
            mcap_compression: parse_mcap_compression(&self.mcap_compression)?,
            bag_compression: parse_bag_compression(&self.bag_compression)?,
            encryption: None,
        };

        let bar = spinner(&format!(
            "converting {} -> {}",
            self.input.display(),
            self.output.display()
        ));
        let stats = convert_file(&self.input, &self.output, options)?;
        bar.finish_and_clear();

        println!(
            "Converted {} messages on {} channels to {}",
            stats.messages,
            stats.channels,
            self.output.display()
        );
        Ok(())
    }
}
