//! MCAP container format.

pub mod encryption;
pub mod reader;
pub mod record_read;
pub mod record_write;
pub mod records;
pub mod summary;
pub mod writer;

pub use encryption::{AesGcmProvider, EncryptionProvider};
pub use reader::{McapReadOptions, McapReader, MessageQuery};
pub use writer::{McapWriteOptions, McapWriter, DEFAULT_CHUNK_SIZE};

use crate::core::{CodecError, Result};
use crate::io::compression::{decompress, Compression};
use records::ChunkRecord;

/// Decrypt (if needed) and decompress a chunk into its plaintext records.
pub fn decode_chunk_records(
    chunk: &ChunkRecord,
    encryption: Option<&dyn EncryptionProvider>,
) -> Result<Vec<u8>> {
    let (algorithm, compression_name) = encryption::split_compression(&chunk.compression);
    let compression = Compression::from_mcap_name(compression_name)?;
    match algorithm {
        None => decompress(compression, &chunk.records),
        Some(algorithm) => {
            let provider = encryption.ok_or_else(|| CodecError::unknown_encryption(""))?;
            if provider.algorithm() != algorithm {
                return Err(CodecError::unknown_encryption(algorithm));
            }
            let plaintext = provider.decrypt(&chunk.records)?;
            decompress(compression, &plaintext)
        }
    }
}
