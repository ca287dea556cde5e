//! Running-CRC byte sink.
//!
//! [`CrcWriter`] relays every byte to an inner writer while keeping a running
//! CRC32. The MCAP engine nests these: the chunk buffer is one CRC scope, the
//! file itself another. `get_crc`/`clear_crc` let a scope be read out and
//! restarted without disturbing the outer scope.

use std::io::Write;

use crate::core::Result;

/// CRC32 of a byte slice (IEEE, as used by both container formats).
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// A writer wrapper that tracks position and a running CRC32.
pub struct CrcWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    position: u64,
}

impl<W: Write> CrcWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            position: 0,
        }
    }

    /// Bytes written so far.
    #[inline]
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// CRC32 of every byte relayed since the last [`clear_crc`](Self::clear_crc).
    pub fn get_crc(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Restart the running CRC. Position is unaffected.
    pub fn clear_crc(&mut self) {
        self.hasher = crc32fast::Hasher::new();
    }

    /// Write all bytes, updating position and CRC.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.hasher.update(data);
        self.position += data.len() as u64;
        Ok(())
    }

    /// Flush the inner writer.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Consume the wrapper, returning the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Access the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_value() {
        // CRC32("123456789") is the standard check value.
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_writer_tracks_position_and_crc() {
        let mut writer = CrcWriter::new(Vec::new());
        writer.write_bytes(b"1234").unwrap();
        writer.write_bytes(b"56789").unwrap();
        assert_eq!(writer.tell(), 9);
        assert_eq!(writer.get_crc(), 0xCBF43926);
        assert_eq!(writer.into_inner(), b"123456789");
    }

    #[test]
    fn test_clear_crc_keeps_position() {
        let mut writer = CrcWriter::new(Vec::new());
        writer.write_bytes(b"prefix").unwrap();
        writer.clear_crc();
        writer.write_bytes(b"123456789").unwrap();
        assert_eq!(writer.get_crc(), 0xCBF43926);
        assert_eq!(writer.tell(), 15);
    }

    #[test]
    fn test_nested_scopes() {
        // Chunk buffer CRC is independent of the file CRC.
        let mut file = CrcWriter::new(Vec::new());
        let mut chunk = CrcWriter::new(Vec::new());
        chunk.write_bytes(b"123456789").unwrap();
        let chunk_crc = chunk.get_crc();
        file.write_bytes(&chunk.into_inner()).unwrap();
        assert_eq!(chunk_crc, 0xCBF43926);
        assert_eq!(file.get_crc(), 0xCBF43926);
    }
}
