//! Byte-addressable storage devices.
//!
//! The file layer talks to its backing storage through the narrow
//! [`StorageDevice`] contract so it can run against a real file or an
//! in-memory buffer. Implementations are sequential: a seek positions the
//! cursor, reads and writes advance it.

use crate::{GrainError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A byte-addressable random-access device.
///
/// Kept deliberately narrow: seek, exact read, full write, flush. Errors
/// surface as the transport variants of [`GrainError`].
pub trait StorageDevice {
    fn seek_to(&mut self, offset: u64) -> Result<()>;
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// A [`StorageDevice`] backed by a file on disk.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
}

impl FileDevice {
    /// Create or truncate the file at `path` for read/write access.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(GrainError::FileOpenFailed)?;
        Ok(Self { file })
    }

    /// Open an existing file at `path` for read/write access.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(GrainError::FileOpenFailed)?;
        Ok(Self { file })
    }
}

impl StorageDevice for FileDevice {
    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(GrainError::FileSeekFailed)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_exact(buf)
            .map_err(GrainError::FileReadFailed)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.file
            .write_all(buf)
            .map_err(GrainError::FileWriteFailed)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_all().map_err(GrainError::FileWriteFailed)
    }
}

/// A [`StorageDevice`] over a growable in-memory buffer.
///
/// Used by tests to exercise the file layer without touching disk and to
/// stage malformed files byte-by-byte.
#[derive(Debug, Default)]
pub struct MemDevice {
    buf: Vec<u8>,
    pos: usize,
}

impl MemDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device pre-loaded with `bytes`, cursor at offset 0.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            buf: bytes.to_vec(),
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl StorageDevice for MemDevice {
    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.pos = offset as usize;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.buf.len() {
            return Err(GrainError::FileReadFailed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of device",
            )));
        }
        buf.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
