//! Read-side byte I/O.
//!
//! Files are exposed as whole-file byte views (memory-mapped when possible)
//! and parsed through a small cursor. Random access into chunked containers
//! then reduces to slicing, which keeps the record parsers allocation-free.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::core::{CodecError, Result};

/// A whole-file byte view, memory-mapped or owned.
pub enum FileBuffer {
    /// Memory-mapped file contents
    Mapped(Mmap),
    /// Owned bytes (in-memory files, tests)
    Owned(Vec<u8>),
}

impl FileBuffer {
    /// Map a file into memory. Falls back to reading it if mapping fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // Safety: the map is read-only and the file is not mutated while open.
        match unsafe { Mmap::map(&file) } {
            Ok(map) => Ok(FileBuffer::Mapped(map)),
            Err(_) => {
                let data = std::fs::read(path.as_ref())?;
                Ok(FileBuffer::Owned(data))
            }
        }
    }

    /// Wrap owned bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        FileBuffer::Owned(data)
    }

    /// Get the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            FileBuffer::Mapped(map) => map,
            FileBuffer::Owned(data) => data,
        }
    }

    /// Total length in bytes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cursor over a byte slice with bounds-checked reads.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over the full slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position.
    #[inline]
    pub fn tell(&self) -> u64 {
        self.pos as u64
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// True once the cursor has consumed the whole slice.
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Move the cursor to an absolute position.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.data.len() as u64 {
            return Err(CodecError::buffer_too_short(
                pos as usize - self.data.len(),
                0,
                self.data.len() as u64,
            ));
        }
        self.pos = pos as usize;
        Ok(())
    }

    /// Read `n` bytes, advancing the cursor.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(CodecError::buffer_too_short(n, self.remaining(), self.tell()));
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    /// Look at the next `n` bytes without advancing.
    pub fn peek(&self, n: usize) -> &'a [u8] {
        let end = (self.pos + n).min(self.data.len());
        &self.data[self.pos..end]
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read(n).map(|_| ())
    }

    /// Read a little-endian u8.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_tell() {
        let data = [1u8, 2, 3, 4, 5];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read(2).unwrap(), &[1, 2]);
        assert_eq!(reader.tell(), 2);
        assert_eq!(reader.remaining(), 3);
    }

    #[test]
    fn test_read_past_end() {
        let data = [1u8, 2];
        let mut reader = ByteReader::new(&data);
        assert!(reader.read(3).is_err());
        // Position must be unchanged after a failed read.
        assert_eq!(reader.tell(), 0);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [9u8, 8, 7];
        let reader = ByteReader::new(&data);
        assert_eq!(reader.peek(2), &[9, 8]);
        assert_eq!(reader.peek(10), &[9, 8, 7]);
        assert_eq!(reader.tell(), 0);
    }

    #[test]
    fn test_little_endian_integers() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0102u16.to_le_bytes());
        data.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        data.extend_from_slice(&0x1122334455667788u64.to_le_bytes());
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_u64().unwrap(), 0x1122334455667788);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_seek() {
        let data = [0u8; 10];
        let mut reader = ByteReader::new(&data);
        reader.seek(7).unwrap();
        assert_eq!(reader.tell(), 7);
        assert!(reader.seek(11).is_err());
    }

    #[test]
    fn test_file_buffer_owned() {
        let buf = FileBuffer::from_bytes(vec![1, 2, 3]);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_empty());
    }
}
