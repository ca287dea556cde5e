//! Byte I/O, compression, format detection, and the unified façade.

pub mod compression;
pub mod crc;
pub mod detection;
pub mod read;
pub mod unified;

pub use compression::Compression;
pub use detection::FileFormat;
pub use read::{ByteReader, FileBuffer};
pub use unified::{DecodedMessage, LogReader, LogWriter, LogWriterOptions};
