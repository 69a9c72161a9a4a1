// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Cache of open segment decompressors

use crate::{
    compression::{CompressionType, StreamDecompressor},
    id::SegmentId,
    Error,
};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
};

/// Decompression state of one open segment
struct OpenSegment {
    id: SegmentId,
    decompressor: StreamDecompressor<BufReader<File>>,

    /// Current offset in the uncompressed stream
    pos: u64,
}

/// Reads regions of segments, keeping the most recently used ones open
///
/// Decompression is sequential, so reading at or after the current offset of
/// an open segment continues the stream, while reading before it restarts
/// the segment from the beginning.
pub struct SegmentManager {
    folder: PathBuf,
    compression: CompressionType,

    /// Most recently used first
    open: Vec<OpenSegment>,

    capacity: usize,
}

impl std::fmt::Debug for SegmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SegmentManager<{}: {}/{} open>",
            self.folder.display(),
            self.open.len(),
            self.capacity
        )
    }
}

impl SegmentManager {
    /// Creates a manager for the segments in `folder`, without opening any.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(folder: P, compression: CompressionType, capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            folder: folder.into(),
            compression,
            open: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    fn open_segment(&self, id: SegmentId) -> crate::Result<OpenSegment> {
        let path = self.folder.join(id.to_string());

        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.clone()),
            _ => Error::Io(e),
        })?;

        log::trace!("Opening segment {}", path.display());

        Ok(OpenSegment {
            id,
            decompressor: StreamDecompressor::open(self.compression, BufReader::new(file))?,
            pos: 0,
        })
    }

    /// Moves the segment to the front, opening it and evicting the least recently used one if needed.
    fn get_segment(&mut self, id: SegmentId) -> crate::Result<&mut OpenSegment> {
        match self.open.iter().position(|segment| segment.id == id) {
            Some(0) => {}
            Some(ix) => {
                let segment = self.open.remove(ix);
                self.open.insert(0, segment);
            }
            None => {
                let segment = self.open_segment(id)?;
                self.open.insert(0, segment);

                if self.open.len() > self.capacity {
                    if let Some(evicted) = self.open.pop() {
                        log::trace!("Evicting segment {}", evicted.id);
                    }
                }
            }
        }

        self.open
            .first_mut()
            .ok_or(Error::Failure("segment cache is empty".into()))
    }

    /// Fills `buf` with the uncompressed bytes of a segment starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if the segment ends before `buf` is filled.
    pub fn try_read(&mut self, id: SegmentId, offset: u64, buf: &mut [u8]) -> crate::Result<()> {
        if self
            .open
            .iter()
            .any(|segment| segment.id == id && segment.pos > offset)
        {
            // Can't seek backwards in a compressed stream, start over
            if let Some(ix) = self.open.iter().position(|segment| segment.id == id) {
                self.open.remove(ix);
            }
        }

        let segment = self.get_segment(id)?;

        if segment.pos < offset {
            let to_skip = offset - segment.pos;

            let skipped = std::io::copy(
                &mut (&mut segment.decompressor).take(to_skip),
                &mut std::io::sink(),
            )?;
            segment.pos += skipped;

            if skipped < to_skip {
                return Err(Error::Truncated);
            }
        }

        match segment.decompressor.read_exact(buf) {
            Ok(()) => {
                segment.pos += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Stream position is unknown now
                if let Some(ix) = self.open.iter().position(|segment| segment.id == id) {
                    self.open.remove(ix);
                }
                Err(Error::Truncated)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of currently open segments
    #[must_use]
    pub fn num_open_segments(&self) -> usize {
        self.open.len()
    }

    /// Ids of open segments, most recently used first
    pub fn open_segment_ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.open.iter().map(|segment| segment.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::writer::Writer;
    use test_log::test;

    fn write_segments(folder: &std::path::Path, count: u64) -> crate::Result<()> {
        for id in 0..count {
            let mut writer = Writer::new(id, folder.join(id.to_string()), CompressionType::default())?;
            for i in 0..1_000u64 {
                writer.append(&(id * 1_000_000 + i).to_be_bytes())?;
            }
            writer.close()?;
        }
        Ok(())
    }

    fn read_u64(manager: &mut SegmentManager, id: SegmentId, ix: u64) -> crate::Result<u64> {
        let mut buf = [0; 8];
        manager.try_read(id, ix * 8, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    #[test]
    fn segment_manager_lru_bound() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        write_segments(folder.path(), 4)?;

        let mut manager = SegmentManager::new(folder.path(), CompressionType::default(), 2);

        for id in 0..4 {
            assert_eq!(id * 1_000_000 + 10, read_u64(&mut manager, id, 10)?);
            assert!(manager.num_open_segments() <= 2);
        }
        assert_eq!(vec![3, 2], manager.open_segment_ids().collect::<Vec<_>>());

        // Segment 0 was evicted, reading it again decompresses from the start
        assert_eq!(5, read_u64(&mut manager, 0, 5)?);
        assert_eq!(vec![0, 3], manager.open_segment_ids().collect::<Vec<_>>());

        Ok(())
    }

    #[test]
    fn segment_manager_backward_read() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        write_segments(folder.path(), 1)?;

        let mut manager = SegmentManager::new(folder.path(), CompressionType::default(), 2);
        assert_eq!(900, read_u64(&mut manager, 0, 900)?);
        assert_eq!(3, read_u64(&mut manager, 0, 3)?);
        assert_eq!(4, read_u64(&mut manager, 0, 4)?);

        Ok(())
    }

    #[test]
    fn segment_manager_truncated() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        write_segments(folder.path(), 1)?;

        let mut manager = SegmentManager::new(folder.path(), CompressionType::default(), 2);
        assert!(matches!(read_u64(&mut manager, 0, 1_000), Err(Error::Truncated)));
        assert!(matches!(read_u64(&mut manager, 7, 0), Err(Error::FileNotFound(_))));

        Ok(())
    }
}
