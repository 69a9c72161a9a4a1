// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Dictionary writer

use super::write_header;
use crate::{
    compression::{CompressionType, StreamCompressor},
    id::{DictionaryId, IdGenerator, SegmentId},
    Error,
};
use byteorder::{BigEndian, WriteBytesExt};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

fn create_with_header(path: &Path, compression: CompressionType) -> crate::Result<StreamCompressor<BufWriter<File>>> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_u64::<BigEndian>(0)?;
    StreamCompressor::open(compression, file)
}

/// Dictionary writer
///
/// Assigns dense ids starting at 0 and appends every new value to the value
/// stream. Each closed segment gets one record in the segment index.
pub struct DictionaryWriter {
    name: &'static str,

    value_path: PathBuf,
    index_path: PathBuf,

    values: StreamCompressor<BufWriter<File>>,
    segment_index: StreamCompressor<BufWriter<File>>,

    ids: HashMap<String, DictionaryId, ahash::RandomState>,
    id_generator: IdGenerator,
    max_id: DictionaryId,

    num_segments: u64,

    /// Uncompressed size of the value stream
    data_size: u64,
}

impl std::fmt::Debug for DictionaryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DictionaryWriter<{}: {} entries, {} segments>",
            self.name,
            self.ids.len(),
            self.num_segments
        )
    }
}

impl DictionaryWriter {
    /// Creates both dictionary files.
    ///
    /// `name` is only used in errors and logs.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn create<P: AsRef<Path>, Q: AsRef<Path>>(
        name: &'static str,
        value_path: P,
        index_path: Q,
        compression: CompressionType,
        max_id: DictionaryId,
    ) -> crate::Result<Self> {
        let value_path = value_path.as_ref();
        let index_path = index_path.as_ref();

        log::trace!("Creating {name} dictionary at {}", value_path.display());

        Ok(Self {
            name,
            values: create_with_header(value_path, compression)?,
            segment_index: create_with_header(index_path, compression)?,
            value_path: value_path.into(),
            index_path: index_path.into(),
            ids: HashMap::default(),
            id_generator: IdGenerator::default(),
            max_id,
            num_segments: 0,
            data_size: 0,
        })
    }

    /// Returns the id of `value`, inserting it if it is new.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdSpaceExhausted`] if the id would exceed the maximum id.
    pub fn add_entry(&mut self, value: &str) -> crate::Result<DictionaryId> {
        if let Some(id) = self.ids.get(value) {
            return Ok(*id);
        }

        let id = self.id_generator.peek();
        if id > self.max_id {
            return Err(Error::IdSpaceExhausted {
                dictionary: self.name,
                max_id: self.max_id,
            });
        }
        self.id_generator.next();

        let mut record = Vec::with_capacity(std::mem::size_of::<u64>() + value.len());
        record.write_u64::<BigEndian>(value.len() as u64)?;
        record.write_all(value.as_bytes())?;
        self.values.write_all(&record)?;

        self.data_size += record.len() as u64;
        self.ids.insert(value.into(), id);

        Ok(id)
    }

    /// Records which ids a closed segment references.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn index_segment<'a, I>(&mut self, segment_id: SegmentId, ids: I) -> crate::Result<()>
    where
        I: IntoIterator<Item = &'a DictionaryId>,
        I::IntoIter: ExactSizeIterator,
    {
        let ids = ids.into_iter();

        let mut record = Vec::with_capacity((2 + ids.len()) * std::mem::size_of::<u64>());
        record.write_u64::<BigEndian>(segment_id)?;
        record.write_u64::<BigEndian>(ids.len() as u64)?;

        for id in ids {
            record.write_u64::<BigEndian>(*id)?;
        }

        self.segment_index.write_all(&record)?;
        self.num_segments += 1;

        Ok(())
    }

    /// Makes all entries and segment records written so far readable.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn flush(&mut self) -> crate::Result<()> {
        log::trace!(
            "Flushing {} dictionary ({} entries, {} segments)",
            self.name,
            self.ids.len(),
            self.num_segments
        );

        self.values.flush()?;
        write_header(&self.value_path, self.id_generator.peek())?;

        self.segment_index.flush()?;
        write_header(&self.index_path, self.num_segments)?;

        Ok(())
    }

    /// Ends both compressed streams and writes the final headers.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn close(self) -> crate::Result<()> {
        let values = self.values.close()?;
        values.into_inner().map_err(|e| Error::Io(e.into_error()))?.sync_all()?;
        write_header(&self.value_path, self.id_generator.peek())?;

        let index = self.segment_index.close()?;
        index.into_inner().map_err(|e| Error::Io(e.into_error()))?.sync_all()?;
        write_header(&self.index_path, self.num_segments)?;

        log::trace!("Closed {} dictionary with {} entries", self.name, self.ids.len());

        Ok(())
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Uncompressed size of all value records
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.data_size
    }
}
