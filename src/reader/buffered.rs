// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Buffered reader with checkpoints

use super::ReaderInterface;
use crate::Error;

/// Granularity of reads from the underlying reader
pub const MIN_BUFFER_SIZE: usize = 4_096;

/// Default size of the buffer window
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1_024;

/// Buffered reader with optional checkpointing
///
/// Without a checkpoint, the buffer is a fixed-size window sliding over the
/// underlying reader, and seeking backwards is unsupported.
///
/// Setting a checkpoint pins the current position: from then on the buffer
/// grows instead of sliding, so any position at or after the checkpoint
/// stays reachable, without re-reading the underlying (possibly expensive)
/// source.
#[allow(clippy::module_name_repetitions)]
pub struct BufferedReader<R: ReaderInterface> {
    inner: R,

    base_buffer_size: usize,

    /// Buffered bytes, `buffer[0]` lives at `buffer_begin_pos`
    buffer: Vec<u8>,

    /// Read cursor within `buffer`
    buffer_pos: usize,

    /// Absolute position of the first buffered byte
    buffer_begin_pos: u64,

    highest_read_pos: u64,

    checkpoint_pos: Option<u64>,
}

impl<R: ReaderInterface> BufferedReader<R> {
    /// Wraps a reader using the default buffer size.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the position of the underlying reader can't be retrieved.
    pub fn new(inner: R) -> crate::Result<Self> {
        Self::with_buffer_size(inner, DEFAULT_BUFFER_SIZE)
    }

    /// Wraps a reader using the given base buffer size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParam`] if the size is not a non-zero multiple of [`MIN_BUFFER_SIZE`].
    pub fn with_buffer_size(mut inner: R, base_buffer_size: usize) -> crate::Result<Self> {
        if base_buffer_size == 0 || base_buffer_size % MIN_BUFFER_SIZE != 0 {
            return Err(Error::BadParam(
                "buffer size must be a non-zero multiple of MIN_BUFFER_SIZE",
            ));
        }

        let pos = inner.try_get_pos()?;

        Ok(Self {
            inner,
            base_buffer_size,
            buffer: Vec::with_capacity(base_buffer_size),
            buffer_pos: 0,
            buffer_begin_pos: pos,
            highest_read_pos: pos,
            checkpoint_pos: None,
        })
    }

    fn pos(&self) -> u64 {
        self.buffer_begin_pos + self.buffer_pos as u64
    }

    fn buffer_end_pos(&self) -> u64 {
        self.buffer_begin_pos + self.buffer.len() as u64
    }

    fn update_highest_read_pos(&mut self) {
        self.highest_read_pos = self.highest_read_pos.max(self.pos());
    }

    /// Returns the active checkpoint, if any.
    #[must_use]
    pub fn checkpoint(&self) -> Option<u64> {
        self.checkpoint_pos
    }

    /// Returns the number of bytes currently held in memory.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn drop_content_before_current_pos(&mut self) {
        self.buffer.drain(..self.buffer_pos);
        self.buffer_begin_pos += self.buffer_pos as u64;
        self.buffer_pos = 0;
    }

    /// Reads at least one byte more into the buffer.
    ///
    /// With a checkpoint, `num_bytes` rounded up to the base buffer size are
    /// requested. Without one, the window is only filled up to its base size.
    ///
    /// Returns 0 at the end of the underlying reader.
    fn refill(&mut self, num_bytes: usize) -> crate::Result<usize> {
        let to_read = if self.checkpoint_pos.is_none() {
            // Slide the window instead of growing it
            self.drop_content_before_current_pos();
            self.base_buffer_size
                .saturating_sub(self.buffer.len())
                .max(MIN_BUFFER_SIZE)
        } else {
            num_bytes.max(1).div_ceil(self.base_buffer_size) * self.base_buffer_size
        };

        let old_len = self.buffer.len();
        self.buffer.resize(old_len + to_read, 0);

        let free = self.buffer.get_mut(old_len..).unwrap_or_default();

        let result = match self.inner.try_read(free) {
            Err(Error::EndOfFile) => Ok(0),
            result => result,
        };

        let num_read = *result.as_ref().unwrap_or(&0);
        self.buffer.truncate(old_len + num_read);

        result
    }

    /// Marks the current position as the lowest position seeks may return to.
    ///
    /// If a checkpoint was already active, buffered data before the current
    /// position is discarded first.
    ///
    /// Returns the checkpoint position.
    pub fn set_checkpoint(&mut self) -> u64 {
        if self.checkpoint_pos.is_some() {
            self.drop_content_before_current_pos();
        }

        let pos = self.pos();
        self.checkpoint_pos = Some(pos);
        self.update_highest_read_pos();

        pos
    }

    /// Removes the checkpoint.
    ///
    /// Moves forward to the highest position ever read or sought to, and
    /// discards all buffered data before it.
    pub fn clear_checkpoint(&mut self) {
        if self.checkpoint_pos.take().is_none() {
            return;
        }

        // NOTE: Everything up to the highest read position is still buffered
        #[allow(clippy::cast_possible_truncation)]
        let highest_offset = (self.highest_read_pos - self.buffer_begin_pos) as usize;
        self.buffer_pos = highest_offset.min(self.buffer.len());

        self.drop_content_before_current_pos();

        if self.buffer.capacity() > self.base_buffer_size {
            self.buffer
                .shrink_to(self.buffer.len().max(self.base_buffer_size));
        }
    }
}

impl<R: ReaderInterface> ReaderInterface for BufferedReader<R> {
    fn try_read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut num_read = 0;

        loop {
            let available = self.buffer.get(self.buffer_pos..).unwrap_or_default();
            let dst = buf.get_mut(num_read..).unwrap_or_default();

            let n = available.len().min(dst.len());
            if let (Some(dst), Some(src)) = (dst.get_mut(..n), available.get(..n)) {
                dst.copy_from_slice(src);
            }
            num_read += n;
            self.buffer_pos += n;

            if num_read == buf.len() {
                break;
            }

            match self.refill(buf.len() - num_read) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    self.update_highest_read_pos();
                    return Err(e);
                }
            }
        }

        self.update_highest_read_pos();

        if num_read == 0 {
            return Err(Error::EndOfFile);
        }
        Ok(num_read)
    }

    fn try_seek_from_begin(&mut self, pos: u64) -> crate::Result<()> {
        let current_pos = self.pos();
        if pos == current_pos {
            return Ok(());
        }

        let lowest_pos = self.checkpoint_pos.unwrap_or(current_pos);
        if pos < lowest_pos {
            return Err(Error::Unsupported);
        }

        if self.checkpoint_pos.is_some() {
            // Grow the buffer until it covers the target
            while pos > self.buffer_end_pos() {
                #[allow(clippy::cast_possible_truncation)]
                let missing = (pos - self.buffer_end_pos()) as usize;

                if self.refill(missing)? == 0 {
                    self.buffer_pos = self.buffer.len();
                    self.update_highest_read_pos();
                    return Err(Error::Truncated);
                }
            }
        } else if pos > self.buffer_end_pos() {
            match self.inner.try_seek_from_begin(pos) {
                Ok(()) => {
                    self.buffer.clear();
                    self.buffer_begin_pos = pos;
                    self.buffer_pos = 0;
                    self.update_highest_read_pos();
                    return Ok(());
                }
                Err(Error::Unsupported) => {
                    // Skip forward by reading through the window
                    while pos > self.buffer_end_pos() {
                        self.buffer_pos = self.buffer.len();

                        if self.refill(self.base_buffer_size)? == 0 {
                            self.update_highest_read_pos();
                            return Err(Error::Truncated);
                        }
                    }
                }
                Err(Error::Truncated) => {
                    self.buffer.clear();
                    self.buffer_begin_pos = self.inner.try_get_pos()?;
                    self.buffer_pos = 0;
                    self.update_highest_read_pos();
                    return Err(Error::Truncated);
                }
                Err(e) => return Err(e),
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        let offset = (pos - self.buffer_begin_pos) as usize;
        self.buffer_pos = offset;
        self.update_highest_read_pos();

        Ok(())
    }

    fn try_get_pos(&mut self) -> crate::Result<u64> {
        Ok(self.pos())
    }

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
        let mut found = false;

        loop {
            let available = self.buffer.get(self.buffer_pos..).unwrap_or_default();

            if let Some(idx) = available.iter().position(|&b| b == delim) {
                let end = if keep_delimiter { idx + 1 } else { idx };
                out.extend_from_slice(available.get(..end).unwrap_or_default());
                self.buffer_pos += idx + 1;
                num_read += idx + 1;
                found = true;
                break;
            }

            out.extend_from_slice(available);
            num_read += available.len();
            self.buffer_pos = self.buffer.len();

            match self.refill(self.base_buffer_size) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    self.update_highest_read_pos();
                    return Err(e);
                }
            }
        }

        self.update_highest_read_pos();

        if !found && num_read == 0 {
            return Err(Error::EndOfFile);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{MemoryReader, SequentialReader};
    use test_log::test;

    #[allow(clippy::cast_possible_truncation)]
    fn make_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn buffered_reader_invalid_buffer_size() {
        let reader = MemoryReader::new(vec![]);
        assert!(matches!(
            BufferedReader::with_buffer_size(reader, 1_000),
            Err(Error::BadParam(_))
        ));
    }

    #[test]
    fn buffered_reader_linear_read() -> crate::Result<()> {
        let data = make_data(50_000);
        let mut reader =
            BufferedReader::with_buffer_size(SequentialReader::new(&data[..]), MIN_BUFFER_SIZE)?;

        let mut out = vec![0; data.len()];
        reader.try_read_exact(&mut out)?;
        assert_eq!(data, out);

        let mut buf = [0; 1];
        assert!(matches!(reader.try_read(&mut buf), Err(Error::EndOfFile)));

        Ok(())
    }

    #[test]
    fn buffered_reader_backward_seek_without_checkpoint() -> crate::Result<()> {
        let data = make_data(10_000);
        let mut reader =
            BufferedReader::with_buffer_size(SequentialReader::new(&data[..]), MIN_BUFFER_SIZE)?;

        let mut buf = [0; 100];
        reader.try_read_exact(&mut buf)?;

        assert!(matches!(reader.try_seek_from_begin(50), Err(Error::Unsupported)));

        // Forward seeks are fine
        reader.try_seek_from_begin(9_000)?;
        reader.try_read_exact(&mut buf)?;
        assert_eq!(data.get(9_000..9_100), Some(&buf[..]));

        Ok(())
    }

    #[test]
    fn buffered_reader_checkpoint_allows_rewind() -> crate::Result<()> {
        let data = make_data(40_000);
        let mut reader =
            BufferedReader::with_buffer_size(SequentialReader::new(&data[..]), MIN_BUFFER_SIZE)?;

        reader.try_seek_from_begin(1_000)?;
        assert_eq!(1_000, reader.set_checkpoint());

        // Read far past one window
        let mut buf = vec![0; 20_000];
        reader.try_read_exact(&mut buf)?;
        assert_eq!(data.get(1_000..21_000), Some(&buf[..]));

        // Jump back to the checkpoint and re-read
        reader.try_seek_from_begin(1_000)?;
        let mut buf = vec![0; 500];
        reader.try_read_exact(&mut buf)?;
        assert_eq!(data.get(1_000..1_500), Some(&buf[..]));

        // Before the checkpoint is unsupported
        assert!(matches!(reader.try_seek_from_begin(999), Err(Error::Unsupported)));

        // Seek forward beyond what was ever buffered
        reader.try_seek_from_begin(30_000)?;
        reader.try_read_exact(&mut buf)?;
        assert_eq!(data.get(30_000..30_500), Some(&buf[..]));

        Ok(())
    }

    #[test]
    fn buffered_reader_clear_checkpoint_moves_to_highest_pos() -> crate::Result<()> {
        let data = make_data(30_000);
        let mut reader =
            BufferedReader::with_buffer_size(SequentialReader::new(&data[..]), MIN_BUFFER_SIZE)?;

        reader.set_checkpoint();
        reader.try_seek_from_begin(12_345)?;
        reader.try_seek_from_begin(10)?;

        reader.clear_checkpoint();
        assert_eq!(12_345, reader.try_get_pos()?);
        assert!(reader.buffered_len() <= MIN_BUFFER_SIZE * 3);

        let mut buf = [0; 5];
        reader.try_read_exact(&mut buf)?;
        assert_eq!(data.get(12_345..12_350), Some(&buf[..]));

        assert!(matches!(reader.try_seek_from_begin(12_000), Err(Error::Unsupported)));
        Ok(())
    }

    #[test]
    fn buffered_reader_window_stays_bounded() -> crate::Result<()> {
        let data = make_data(50_000);
        let mut reader =
            BufferedReader::with_buffer_size(SequentialReader::new(&data[..]), MIN_BUFFER_SIZE)?;

        let mut buf = vec![0; 20_000];
        reader.try_read_exact(&mut buf)?;
        assert_eq!(data.get(..20_000), Some(&buf[..]));
        assert!(reader.buffered_len() <= MIN_BUFFER_SIZE);

        let mut line = vec![];
        reader.try_read_to_delimiter(250, true, false, &mut line)?;
        assert!(reader.buffered_len() <= MIN_BUFFER_SIZE);

        Ok(())
    }

    struct BrokenSeek(MemoryReader<Vec<u8>>);

    impl ReaderInterface for BrokenSeek {
        fn try_read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
            self.0.try_read(buf)
        }

        fn try_seek_from_begin(&mut self, _: u64) -> crate::Result<()> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "seek failed",
            )))
        }

        fn try_get_pos(&mut self) -> crate::Result<u64> {
            self.0.try_get_pos()
        }
    }

    #[test]
    fn buffered_reader_failed_seek_keeps_position() -> crate::Result<()> {
        let data = make_data(20_000);
        let mut reader = BufferedReader::with_buffer_size(
            BrokenSeek(MemoryReader::new(data.clone())),
            MIN_BUFFER_SIZE,
        )?;

        let mut buf = [0; 100];
        reader.try_read_exact(&mut buf)?;

        assert!(matches!(reader.try_seek_from_begin(10_000), Err(Error::Io(_))));
        assert_eq!(100, reader.try_get_pos()?);

        reader.try_read_exact(&mut buf)?;
        assert_eq!(data.get(100..200), Some(&buf[..]));

        Ok(())
    }

    #[test]
    fn buffered_reader_seek_past_end_is_truncated() -> crate::Result<()> {
        let data = make_data(5_000);
        let mut reader =
            BufferedReader::with_buffer_size(SequentialReader::new(&data[..]), MIN_BUFFER_SIZE)?;

        reader.set_checkpoint();
        assert!(matches!(reader.try_seek_from_begin(6_000), Err(Error::Truncated)));
        assert_eq!(5_000, reader.try_get_pos()?);

        Ok(())
    }

    #[test]
    fn buffered_reader_read_to_delimiter() -> crate::Result<()> {
        let mut text = String::new();
        for i in 0..2_000 {
            text.push_str(&format!("line number {i}\n"));
        }
        text.push_str("no newline at the end");

        let mut reader = BufferedReader::with_buffer_size(
            SequentialReader::new(text.as_bytes()),
            MIN_BUFFER_SIZE,
        )?;

        let mut line = vec![];
        for i in 0..2_000 {
            reader.try_read_to_delimiter(b'\n', false, false, &mut line)?;
            assert_eq!(format!("line number {i}").as_bytes(), &line[..]);
        }

        reader.try_read_to_delimiter(b'\n', true, false, &mut line)?;
        assert_eq!(b"no newline at the end", &line[..]);

        assert!(matches!(
            reader.try_read_to_delimiter(b'\n', true, false, &mut line),
            Err(Error::EndOfFile)
        ));

        Ok(())
    }

    #[test]
    fn buffered_reader_checkpoint_matches_linear_read() -> crate::Result<()> {
        use rand::{Rng, SeedableRng};

        let data = make_data(100_000);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        let mut reader =
            BufferedReader::with_buffer_size(SequentialReader::new(&data[..]), MIN_BUFFER_SIZE)?;

        let mut checkpoint = reader.set_checkpoint();
        let mut buf = vec![0; 300];

        for _ in 0..200 {
            match rng.gen_range(0..3) {
                0 => {
                    checkpoint = reader.set_checkpoint();
                }
                1 => {
                    let upper = (checkpoint + 5_000).min(data.len() as u64);
                    if upper <= checkpoint {
                        continue;
                    }
                    let target = rng.gen_range(checkpoint..upper);
                    reader.try_seek_from_begin(target)?;
                }
                _ => {
                    let pos = reader.try_get_pos()?;
                    #[allow(clippy::cast_possible_truncation)]
                    let pos = pos as usize;

                    if pos + buf.len() > data.len() {
                        continue;
                    }
                    reader.try_read_exact(&mut buf)?;
                    assert_eq!(data.get(pos..pos + buf.len()), Some(&buf[..]));
                }
            }
        }

        Ok(())
    }
}
