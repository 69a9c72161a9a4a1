// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segment writer

use crate::{
    compression::{CompressionType, StreamCompressor},
    id::SegmentId,
    Error,
};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

/// Segment writer
///
/// Everything appended goes into one compressed stream. Appends are addressed
/// by their offset in the uncompressed stream.
pub struct Writer {
    path: PathBuf,
    segment_id: SegmentId,

    inner: StreamCompressor<BufWriter<File>>,

    uncompressed_size: u64,
}

impl Writer {
    /// Initializes a new segment writer.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    #[doc(hidden)]
    pub fn new<P: AsRef<Path>>(
        segment_id: SegmentId,
        path: P,
        compression: CompressionType,
    ) -> crate::Result<Self> {
        let path = path.as_ref();

        let folder = path
            .parent()
            .ok_or(Error::BadParam("segment path has no parent directory"))?;

        std::fs::create_dir_all(folder)?;
        let file = File::create(path)?;

        Ok(Self {
            path: path.into(),
            segment_id,
            inner: StreamCompressor::open(compression, BufWriter::new(file))?,
            uncompressed_size: 0,
        })
    }

    /// Returns the segment ID
    #[must_use]
    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    /// Returns the amount of bytes appended so far.
    #[must_use]
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Appends bytes and returns their offset in the uncompressed stream.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn append(&mut self, bytes: &[u8]) -> crate::Result<u64> {
        let offset = self.uncompressed_size;

        self.inner.write_all(bytes)?;
        self.uncompressed_size += bytes.len() as u64;

        Ok(offset)
    }

    /// Ends the compressed stream and syncs the file.
    ///
    /// Returns the compressed size.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn close(self) -> crate::Result<u64> {
        let writer = self.inner.close()?;
        let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;

        let compressed_size = file.metadata()?.len();

        log::debug!(
            "Closed segment {} at {} ({} bytes, {compressed_size} bytes compressed)",
            self.segment_id,
            self.path.display(),
            self.uncompressed_size
        );

        Ok(compressed_size)
    }
}
