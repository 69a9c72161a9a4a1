// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Byte sources for the compressor
//!
//! All readers implement [`ReaderInterface`]. [`buffered::BufferedReader`]
//! adds delimiter reads and checkpointed backward seeks on top of any of them.

pub mod buffered;
pub mod streaming;

use crate::Error;
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

/// Uniform, non-throwing access to a byte source
///
/// Implemented by plain files, in-memory buffers, forward-only streams and
/// the [`buffered::BufferedReader`] that can wrap any of them.
pub trait ReaderInterface {
    /// Reads up to `buf.len()` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfFile`] if the source is exhausted and no byte could be read.
    fn try_read(&mut self, buf: &mut [u8]) -> crate::Result<usize>;

    /// Seeks to an absolute position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the source can't move to `pos`,
    /// and [`Error::Truncated`] if the source ends before `pos`.
    fn try_seek_from_begin(&mut self, pos: u64) -> crate::Result<()>;

    /// Returns the current absolute position.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn try_get_pos(&mut self) -> crate::Result<u64>;

    /// Reads until `delim` is found or the source is exhausted.
    ///
    /// If `append` is false, `out` is cleared first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfFile`] if the source is exhausted before any byte was read.
    fn try_read_to_delimiter(
        &mut self,
        delim: u8,
        keep_delimiter: bool,
        append: bool,
        out: &mut Vec<u8>,
    ) -> crate::Result<()> {
        if !append {
            out.clear();
        }

        let mut num_read = 0;
        let mut byte = [0u8; 1];

        loop {
            match self.try_read(&mut byte) {
                Ok(_) => {}
                Err(Error::EndOfFile) if num_read > 0 => return Ok(()),
                Err(e) => return Err(e),
            }
            num_read += 1;

            let [b] = byte;
            if b == delim {
                if keep_delimiter {
                    out.push(delim);
                }
                return Ok(());
            }
            out.push(b);
        }
    }

    /// Reads exactly `buf.len()` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfFile`] if nothing could be read, and
    /// [`Error::Truncated`] if the source ended part-way.
    fn try_read_exact(&mut self, buf: &mut [u8]) -> crate::Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.try_read(buf.get_mut(filled..).unwrap_or_default()) {
                Ok(n) => filled += n,
                Err(Error::EndOfFile) if filled > 0 => return Err(Error::Truncated),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

impl<R: ReaderInterface + ?Sized> ReaderInterface for Box<R> {
    fn try_read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        (**self).try_read(buf)
    }

    fn try_seek_from_begin(&mut self, pos: u64) -> crate::Result<()> {
        (**self).try_seek_from_begin(pos)
    }

    fn try_get_pos(&mut self) -> crate::Result<u64> {
        (**self).try_get_pos()
    }

    fn try_read_to_delimiter(
        &mut self,
        delim: u8,
        keep_delimiter: bool,
        append: bool,
        out: &mut Vec<u8>,
    ) -> crate::Result<()> {
        (**self).try_read_to_delimiter(delim, keep_delimiter, append, out)
    }
}

fn read_into<R: Read>(reader: &mut R, buf: &mut [u8]) -> crate::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }

    loop {
        match reader.read(buf) {
            Ok(0) => return Err(Error::EndOfFile),
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Seekable reader over a file on disk
pub struct FileReader {
    inner: File,
    pos: u64,
}

impl FileReader {
    /// Opens a file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let inner = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.into()),
            _ => Error::Io(e),
        })?;

        Ok(Self { inner, pos: 0 })
    }
}

impl ReaderInterface for FileReader {
    fn try_read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        let n = read_into(&mut self.inner, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn try_seek_from_begin(&mut self, pos: u64) -> crate::Result<()> {
        let len = self.inner.metadata()?.len();

        if pos > len {
            self.pos = self.inner.seek(SeekFrom::Start(len))?;
            return Err(Error::Truncated);
        }

        self.pos = self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn try_get_pos(&mut self) -> crate::Result<u64> {
        Ok(self.pos)
    }
}

/// Forward-only reader over any [`Read`] (pipes, sockets, decoders)
///
/// Seeking forward skips data; seeking backward is unsupported.
pub struct SequentialReader<R: Read> {
    inner: R,
    pos: u64,
}

impl<R: Read> SequentialReader<R> {
    /// Wraps a reader, treating its current position as 0.
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ReaderInterface for SequentialReader<R> {
    fn try_read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        let n = read_into(&mut self.inner, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn try_seek_from_begin(&mut self, pos: u64) -> crate::Result<()> {
        if pos < self.pos {
            return Err(Error::Unsupported);
        }

        let skipped = std::io::copy(
            &mut (&mut self.inner).take(pos - self.pos),
            &mut std::io::sink(),
        )?;
        self.pos += skipped;

        if self.pos < pos {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    fn try_get_pos(&mut self) -> crate::Result<u64> {
        Ok(self.pos)
    }
}

/// Seekable reader over in-memory bytes
pub struct MemoryReader<T: AsRef<[u8]>> {
    data: T,
    pos: usize,
}

impl<T: AsRef<[u8]>> MemoryReader<T> {
    /// Wraps some bytes.
    pub fn new(data: T) -> Self {
        Self { data, pos: 0 }
    }
}

impl<T: AsRef<[u8]>> ReaderInterface for MemoryReader<T> {
    fn try_read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let remaining = self.data.as_ref().get(self.pos..).unwrap_or_default();
        if remaining.is_empty() {
            return Err(Error::EndOfFile);
        }

        let n = remaining.len().min(buf.len());
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), remaining.get(..n)) {
            dst.copy_from_slice(src);
        }
        self.pos += n;
        Ok(n)
    }

    fn try_seek_from_begin(&mut self, pos: u64) -> crate::Result<()> {
        let len = self.data.as_ref().len();

        match usize::try_from(pos) {
            Ok(pos) if pos <= len => {
                self.pos = pos;
                Ok(())
            }
            _ => {
                self.pos = len;
                Err(Error::Truncated)
            }
        }
    }

    fn try_get_pos(&mut self) -> crate::Result<u64> {
        Ok(self.pos as u64)
    }
}
