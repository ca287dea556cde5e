//! Shared CLI plumbing: exit-code mapping and output-path checks.

use std::path::{Path, PathBuf};

use roslog::CodecError;

/// Exit code for usage errors and missing files.
pub const EXIT_USAGE: i32 = 1;
/// Exit code for malformed or unreadable files.
pub const EXIT_FORMAT: i32 = 2;

pub type Result<T> = anyhow::Result<T>;

/// Map an error chain onto the documented exit codes.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CodecError>() {
        Some(codec) if codec.is_format_error() => EXIT_FORMAT,
        _ => EXIT_USAGE,
    }
}

/// Check an input path exists.
pub fn check_input(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("input file not found: {}", path.display());
    }
    Ok(())
}

/// Check an output path, honoring `--overwrite`.
pub fn check_output(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        anyhow::bail!(
            "output file exists: {} (use --overwrite to replace it)",
            path.display()
        );
    }
    Ok(())
}

/// Default output path with an infix before the extension, e.g.
/// `drive.mcap` -> `drive.recovered.mcap`.
pub fn default_output(input: &Path, infix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mcap");
    input.with_file_name(format!("{stem}.{infix}.{ext}"))
}

/// A spinner for long-running passes.
pub fn spinner(message: &str) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new_spinner();
    bar.set_message(message.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}

/// Parse a chunk compression flag for MCAP outputs.
pub fn parse_mcap_compression(name: &str) -> Result<roslog::io::Compression> {
    match name {
        "none" => Ok(roslog::io::Compression::None),
        "lz4" => Ok(roslog::io::Compression::Lz4),
        "zstd" => Ok(roslog::io::Compression::Zstd),
        other => anyhow::bail!("unsupported mcap compression: {other} (use none|lz4|zstd)"),
    }
}

/// Parse a chunk compression flag for bag outputs.
pub fn parse_bag_compression(name: &str) -> Result<roslog::io::Compression> {
    match name {
        "none" => Ok(roslog::io::Compression::None),
        "bz2" => Ok(roslog::io::Compression::Bz2),
        other => anyhow::bail!("unsupported bag compression: {other} (use none|bz2)"),
    }
}
