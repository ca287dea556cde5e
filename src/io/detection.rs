//! Container format detection.

use std::path::Path;

use crate::core::{CodecError, Result};

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Mcap,
    Bag,
}

impl FileFormat {
    /// Detect the format from a file extension.
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Result<Self> {
        match path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("mcap") => Ok(FileFormat::Mcap),
            Some("bag") => Ok(FileFormat::Bag),
            other => Err(CodecError::unsupported(format!(
                "cannot detect container format from extension {other:?}; expected .mcap or .bag"
            ))),
        }
    }

    /// Detect the format from leading file bytes.
    pub fn from_magic(data: &[u8]) -> Option<Self> {
        if data.starts_with(crate::mcap::records::MCAP_MAGIC) {
            Some(FileFormat::Mcap)
        } else if data.starts_with(crate::bag::records::BAG_VERSION_LINE) {
            Some(FileFormat::Bag)
        } else {
            None
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Mcap => write!(f, "mcap"),
            FileFormat::Bag => write!(f, "bag"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(
            FileFormat::from_extension("a/b/file.mcap").unwrap(),
            FileFormat::Mcap
        );
        assert_eq!(
            FileFormat::from_extension("file.BAG").unwrap(),
            FileFormat::Bag
        );
        assert!(FileFormat::from_extension("file.txt").is_err());
        assert!(FileFormat::from_extension("file").is_err());
    }

    #[test]
    fn test_from_magic() {
        assert_eq!(
            FileFormat::from_magic(b"\x89MCAP0\r\nrest"),
            Some(FileFormat::Mcap)
        );
        assert_eq!(
            FileFormat::from_magic(b"#ROSBAG V2.0\nrest"),
            Some(FileFormat::Bag)
        );
        assert_eq!(FileFormat::from_magic(b"garbage"), None);
    }
}
