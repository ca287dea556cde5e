//! # roslog CLI
//!
//! Command-line tool for MCAP and ROS1 bag files.
//!
//! ```sh
//! # Show file information
//! roslog inspect drive.mcap --all
//!
//! # Convert containers (translating ROS1 <-> ROS2 payloads)
//! roslog convert drive.bag -o drive.mcap --profile ros2
//!
//! # Merge recordings by log time
//! roslog merge part1.mcap part2.mcap -o merged.mcap
//!
//! # Salvage a truncated file
//! roslog recover crashed.mcap
//!
//! # Reorder for locality
//! roslog sort drive.mcap --by-topic --log-time
//! ```
//!
//! Exit codes: 0 on success, 1 for usage errors or missing files, 2 for
//! malformed input files.

mod cmd;
mod common;

use std::process;

use clap::{Parser, Subcommand};

use cmd::{ConvertCmd, InspectCmd, MergeCmd, RecoverCmd, SortCmd};
use common::Result;

/// roslog - MCAP and ROS1 bag toolkit
#[derive(Parser, Clone)]
#[command(name = "roslog")]
#[command(about = "Read, write, convert, and repair MCAP and ROS1 bag files", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Convert between bag and MCAP containers
    Convert(ConvertCmd),

    /// Merge MCAP files by log time
    Merge(MergeCmd),

    /// Salvage a damaged MCAP file
    Recover(RecoverCmd),

    /// Print file structure and statistics
    Inspect(InspectCmd),

    /// Reorder an MCAP file by topic and/or log time
    Sort(SortCmd),
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Convert(cmd) => cmd.run(),
        Commands::Merge(cmd) => cmd.run(),
        Commands::Recover(cmd) => cmd.run(),
        Commands::Inspect(cmd) => cmd.run(),
        Commands::Sort(cmd) => cmd.run(),
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        process::exit(common::exit_code(&err));
    }
}
