// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Incremental dictionary reader with a segment reverse index

use super::{read_header, DictionaryEntry, HEADER_SIZE};
use crate::{
    compression::{CompressionType, StreamDecompressor},
    id::{DictionaryId, SegmentId},
    query::wildcard::{eq_ignore_case, wildcard_match},
    Error,
};
use byteorder::{BigEndian, ReadBytesExt};
use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

type Stream = StreamDecompressor<BufReader<File>>;

fn open_stream(path: &Path, compression: CompressionType) -> crate::Result<Stream> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(HEADER_SIZE))?;
    StreamDecompressor::open(compression, BufReader::new(file))
}

fn map_eof(e: std::io::Error, path: &Path) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::Corrupt(format!("{} ends before its header count", path.display()))
    } else {
        Error::Io(e)
    }
}

/// Dictionary reader
///
/// Entries are loaded incrementally by [`DictionaryReader::read_new_entries`],
/// which can be called again while a writer appends to the same files.
pub struct DictionaryReader<T: DictionaryEntry> {
    value_path: PathBuf,
    index_path: PathBuf,
    compression: CompressionType,

    /// Opened on first use, then kept open to continue where the last read stopped
    values: Option<Stream>,
    segment_index: Option<Stream>,

    entries: Vec<T>,
    ids: HashMap<String, DictionaryId, ahash::RandomState>,

    /// Segments referencing each id
    segment_ids: HashMap<DictionaryId, BTreeSet<SegmentId>, ahash::RandomState>,
    num_segments_read: u64,
}

impl<T: DictionaryEntry> std::fmt::Debug for DictionaryReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DictionaryReader<{}: {} entries>",
            self.value_path.display(),
            self.entries.len()
        )
    }
}

impl<T: DictionaryEntry> DictionaryReader<T> {
    /// Opens a dictionary without loading any entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if one of the files is missing.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        value_path: P,
        index_path: Q,
        compression: CompressionType,
    ) -> crate::Result<Self> {
        let value_path = value_path.as_ref();
        let index_path = index_path.as_ref();

        for path in [value_path, index_path] {
            if !path.try_exists()? {
                return Err(Error::FileNotFound(path.into()));
            }
        }

        Ok(Self {
            value_path: value_path.into(),
            index_path: index_path.into(),
            compression,
            values: None,
            segment_index: None,
            entries: Vec::new(),
            ids: HashMap::default(),
            segment_ids: HashMap::default(),
            num_segments_read: 0,
        })
    }

    /// Loads entries and segment records written since the last call.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or an entry is malformed.
    pub fn read_new_entries(&mut self) -> crate::Result<()> {
        let num_entries = read_header(&self.value_path)?;

        if num_entries > self.entries.len() as u64 {
            let values = match &mut self.values {
                Some(values) => values,
                values @ None => values.insert(open_stream(&self.value_path, self.compression)?),
            };

            while (self.entries.len() as u64) < num_entries {
                let id = self.entries.len() as DictionaryId;

                let len = values
                    .read_u64::<BigEndian>()
                    .map_err(|e| map_eof(e, &self.value_path))?;

                // NOTE: Don't trust the length for preallocation
                let mut bytes = Vec::with_capacity(len.min(4_096) as usize);
                values.by_ref().take(len).read_to_end(&mut bytes)?;

                if bytes.len() as u64 != len {
                    return Err(Error::Corrupt(format!(
                        "dictionary entry {id} in {} is truncated",
                        self.value_path.display()
                    )));
                }

                let value = String::from_utf8(bytes)
                    .map_err(|_| Error::Corrupt(format!("dictionary entry {id} is not UTF-8")))?;

                self.ids.insert(value.clone(), id);
                self.entries.push(T::from_value(id, value)?);
            }

            log::trace!(
                "Loaded {} entries from {}",
                self.entries.len(),
                self.value_path.display()
            );
        }

        let num_segments = read_header(&self.index_path)?;

        if num_segments > self.num_segments_read {
            let index = match &mut self.segment_index {
                Some(index) => index,
                index @ None => index.insert(open_stream(&self.index_path, self.compression)?),
            };

            while self.num_segments_read < num_segments {
                let segment_id = index
                    .read_u64::<BigEndian>()
                    .map_err(|e| map_eof(e, &self.index_path))?;

                let count = index
                    .read_u64::<BigEndian>()
                    .map_err(|e| map_eof(e, &self.index_path))?;

                for _ in 0..count {
                    let id = index
                        .read_u64::<BigEndian>()
                        .map_err(|e| map_eof(e, &self.index_path))?;

                    self.segment_ids.entry(id).or_default().insert(segment_id);
                }

                self.num_segments_read += 1;
            }
        }

        Ok(())
    }

    /// Returns the entry with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the id is unknown.
    pub fn get_entry(&self, id: DictionaryId) -> crate::Result<&T> {
        usize::try_from(id)
            .ok()
            .and_then(|ix| self.entries.get(ix))
            .ok_or_else(|| {
                Error::Corrupt(format!(
                    "id {id} is not in dictionary {}",
                    self.value_path.display()
                ))
            })
    }

    /// Returns the value with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the id is unknown.
    pub fn get_value(&self, id: DictionaryId) -> crate::Result<&str> {
        self.get_entry(id).map(DictionaryEntry::value)
    }

    /// All loaded entries, indexed by id
    #[must_use]
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// Number of loaded entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entry is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the ids of entries equal to `value`.
    ///
    /// Without `ignore_case` there is at most one.
    #[must_use]
    pub fn get_ids_matching_value(&self, value: &str, ignore_case: bool) -> BTreeSet<DictionaryId> {
        if ignore_case {
            (0..)
                .zip(&self.entries)
                .filter(|(_, entry)| eq_ignore_case(entry.value(), value))
                .map(|(id, _)| id)
                .collect()
        } else {
            self.ids.get(value).copied().into_iter().collect()
        }
    }

    /// Returns the ids of entries matching a wildcard pattern.
    #[must_use]
    pub fn get_ids_matching_wildcard(&self, pattern: &str, ignore_case: bool) -> BTreeSet<DictionaryId> {
        (0..)
            .zip(&self.entries)
            .filter(|(_, entry)| wildcard_match(entry.value(), pattern, !ignore_case))
            .map(|(id, _)| id)
            .collect()
    }

    /// Returns the segments that reference `id`.
    #[must_use]
    pub fn get_segments_containing_entry(&self, id: DictionaryId) -> Option<&BTreeSet<SegmentId>> {
        self.segment_ids.get(&id)
    }

    /// Returns the segments that reference any of `ids`.
    #[must_use]
    pub fn get_segments_containing_entries<'a, I>(&self, ids: I) -> BTreeSet<SegmentId>
    where
        I: IntoIterator<Item = &'a DictionaryId>,
    {
        let mut segments = BTreeSet::new();

        for id in ids {
            if let Some(ids) = self.get_segments_containing_entry(*id) {
                segments.extend(ids.iter().copied());
            }
        }

        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dictionary::{DictionaryWriter, LogtypeDictionaryReader, VariableDictionaryReader},
        logtype::VariableKind,
    };
    use test_log::test;

    #[test]
    fn dictionary_reader_incremental() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let value_path = folder.path().join("var.dict");
        let index_path = folder.path().join("var.segindex");

        let mut writer = DictionaryWriter::create(
            "variable",
            &value_path,
            &index_path,
            CompressionType::default(),
            1_000,
        )?;

        let mut reader =
            VariableDictionaryReader::open(&value_path, &index_path, CompressionType::default())?;
        reader.read_new_entries()?;
        assert!(reader.is_empty());

        writer.add_entry("host-1")?;
        writer.add_entry("host-2")?;
        writer.index_segment(0, &BTreeSet::from([0, 1]))?;
        writer.flush()?;

        reader.read_new_entries()?;
        assert_eq!(2, reader.len());
        assert_eq!("host-2", reader.get_value(1)?);
        assert!(reader.get_value(2).is_err());

        writer.add_entry("Host-3")?;
        writer.index_segment(1, &BTreeSet::from([1, 2]))?;
        writer.close()?;

        reader.read_new_entries()?;
        assert_eq!(3, reader.len());
        assert_eq!(
            Some(&BTreeSet::from([0, 1])),
            reader.get_segments_containing_entry(1)
        );
        assert_eq!(
            BTreeSet::from([0, 1]),
            reader.get_segments_containing_entries(&[0, 2])
        );

        assert_eq!(BTreeSet::from([2]), reader.get_ids_matching_value("Host-3", false));
        assert!(reader.get_ids_matching_value("host-3", false).is_empty());
        assert_eq!(BTreeSet::from([2]), reader.get_ids_matching_value("host-3", true));

        assert_eq!(
            BTreeSet::from([0, 1]),
            reader.get_ids_matching_wildcard("host-*", false)
        );
        assert_eq!(
            BTreeSet::from([0, 1, 2]),
            reader.get_ids_matching_wildcard("host-?", true)
        );

        Ok(())
    }

    #[test]
    fn dictionary_reader_logtypes() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let value_path = folder.path().join("logtype.dict");
        let index_path = folder.path().join("logtype.segindex");

        let mut writer = DictionaryWriter::create(
            "logtype",
            &value_path,
            &index_path,
            CompressionType::None,
            1_000,
        )?;
        writer.add_entry(" ERROR code=\u{11}\n")?;
        writer.close()?;

        let mut reader = LogtypeDictionaryReader::open(&value_path, &index_path, CompressionType::None)?;
        reader.read_new_entries()?;

        let entry = reader.get_entry(0)?;
        assert_eq!(1, entry.num_variables());
        assert_eq!(
            vec![VariableKind::Integer],
            entry.variable_kinds().collect::<Vec<_>>()
        );

        Ok(())
    }

    #[test]
    fn dictionary_reader_corrupt_lengths() -> crate::Result<()> {
        use byteorder::WriteBytesExt;

        let folder = tempfile::tempdir()?;
        let value_path = folder.path().join("var.dict");
        let index_path = folder.path().join("var.segindex");

        // One entry claiming 64 TiB, followed by a few bytes
        let mut bytes = vec![];
        bytes.write_u64::<BigEndian>(1)?;
        bytes.write_u64::<BigEndian>(1 << 46)?;
        bytes.extend_from_slice(b"abc");
        std::fs::write(&value_path, &bytes)?;

        // One segment referencing a huge id
        let mut bytes = vec![];
        bytes.write_u64::<BigEndian>(1)?;
        bytes.write_u64::<BigEndian>(0)?;
        bytes.write_u64::<BigEndian>(1)?;
        bytes.write_u64::<BigEndian>(1 << 60)?;
        std::fs::write(&index_path, &bytes)?;

        let mut reader = VariableDictionaryReader::open(&value_path, &index_path, CompressionType::None)?;
        assert!(matches!(reader.read_new_entries(), Err(Error::Corrupt(_))));
        assert!(reader.is_empty());

        // Only the segment index is left to load
        std::fs::write(&value_path, 0u64.to_be_bytes())?;
        let mut reader = VariableDictionaryReader::open(&value_path, &index_path, CompressionType::None)?;
        reader.read_new_entries()?;
        assert_eq!(
            Some(&BTreeSet::from([0])),
            reader.get_segments_containing_entry(1 << 60)
        );

        Ok(())
    }

    #[test]
    fn dictionary_reader_missing_file() {
        let result = VariableDictionaryReader::open(
            "/does/not/exist.dict",
            "/does/not/exist.segindex",
            CompressionType::None,
        );
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }
}
