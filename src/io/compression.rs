//! Chunk compression.
//!
//! MCAP permits none/lz4/zstd; ROS1 bags permit none/bz2 (lz4 is tolerated on
//! read since some tools emit it). Algorithm strings are the on-disk
//! identifiers from the respective specifications.

use std::io::Read;
use std::io::Write;

use crate::core::{CodecError, Result};

/// Chunk compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lz4,
    Zstd,
    Bz2,
}

impl Compression {
    /// The identifier written into chunk records. MCAP uses the empty string
    /// for no compression; bags use the literal "none".
    pub fn mcap_name(self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
            Compression::Bz2 => "bz2",
        }
    }

    /// The identifier used in bag chunk headers.
    pub fn bag_name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
            Compression::Bz2 => "bz2",
        }
    }

    /// Parse an MCAP chunk compression string.
    pub fn from_mcap_name(name: &str) -> Result<Self> {
        match name {
            "" => Ok(Compression::None),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            "bz2" => Err(CodecError::unsupported_compression("bz2", "mcap")),
            other => Err(CodecError::unsupported_compression(other, "mcap")),
        }
    }

    /// Parse a bag chunk compression string.
    pub fn from_bag_name(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(Compression::None),
            "bz2" => Ok(Compression::Bz2),
            // Tolerated on read; the CLI never writes lz4 bags.
            "lz4" => Ok(Compression::Lz4),
            other => Err(CodecError::unsupported_compression(other, "bag")),
        }
    }

    /// Check that this algorithm may be written into an MCAP file.
    pub fn check_mcap_writable(self) -> Result<Self> {
        match self {
            Compression::Bz2 => Err(CodecError::unsupported_compression("bz2", "mcap")),
            other => Ok(other),
        }
    }

    /// Check that this algorithm may be written into a bag file.
    pub fn check_bag_writable(self) -> Result<Self> {
        match self {
            Compression::None | Compression::Bz2 => Ok(self),
            other => Err(CodecError::unsupported_compression(
                other.bag_name(),
                "bag",
            )),
        }
    }
}

/// Compress a chunk payload.
pub fn compress(alg: Compression, data: &[u8]) -> Result<Vec<u8>> {
    match alg {
        Compression::None => Ok(data.to_vec()),
        Compression::Lz4 => {
            let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
            encoder
                .write_all(data)
                .map_err(|e| CodecError::encode("lz4", e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| CodecError::encode("lz4", e.to_string()))
        }
        Compression::Zstd => zstd::stream::encode_all(data, 0)
            .map_err(|e| CodecError::encode("zstd", e.to_string())),
        Compression::Bz2 => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder
                .write_all(data)
                .map_err(|e| CodecError::encode("bz2", e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| CodecError::encode("bz2", e.to_string()))
        }
    }
}

/// Decompress a chunk payload.
pub fn decompress(alg: Compression, data: &[u8]) -> Result<Vec<u8>> {
    match alg {
        Compression::None => Ok(data.to_vec()),
        Compression::Lz4 => {
            let mut decoder = lz4_flex::frame::FrameDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| CodecError::encode("lz4", e.to_string()))?;
            Ok(out)
        }
        Compression::Zstd => zstd::stream::decode_all(data)
            .map_err(|e| CodecError::encode("zstd", e.to_string())),
        Compression::Bz2 => {
            let mut decoder = bzip2::read::BzDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| CodecError::encode("bz2", e.to_string()))?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_algorithms() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(64);
        for alg in [
            Compression::None,
            Compression::Lz4,
            Compression::Zstd,
            Compression::Bz2,
        ] {
            let packed = compress(alg, &payload).unwrap();
            let unpacked = decompress(alg, &packed).unwrap();
            assert_eq!(unpacked, payload, "roundtrip failed for {alg:?}");
        }
    }

    #[test]
    fn test_mcap_rejects_bz2() {
        assert!(Compression::from_mcap_name("bz2").is_err());
        assert!(Compression::Bz2.check_mcap_writable().is_err());
    }

    #[test]
    fn test_bag_rejects_zstd_writes() {
        assert!(Compression::from_bag_name("zstd").is_err());
        assert!(Compression::Zstd.check_bag_writable().is_err());
        assert!(Compression::Lz4.check_bag_writable().is_err());
        assert!(Compression::Bz2.check_bag_writable().is_ok());
    }

    #[test]
    fn test_name_mapping() {
        assert_eq!(Compression::None.mcap_name(), "");
        assert_eq!(Compression::None.bag_name(), "none");
        assert_eq!(Compression::from_mcap_name("").unwrap(), Compression::None);
        assert_eq!(
            Compression::from_bag_name("none").unwrap(),
            Compression::None
        );
    }

    #[test]
    fn test_empty_payload() {
        for alg in [Compression::Lz4, Compression::Zstd, Compression::Bz2] {
            let packed = compress(alg, b"").unwrap();
            assert_eq!(decompress(alg, &packed).unwrap(), b"");
        }
    }
}
