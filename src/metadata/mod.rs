// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Archive and file metadata, and the databases that hold them
//!
//! Both the per-archive `metadata.db` and the cross-archive `global.db` are
//! small table files:
//!
//! [magic + version][tables][xxh3 of everything before]
//!
//! and are rewritten atomically on every update.

pub mod global;
pub mod local;

use crate::{
    coding::{
        read_bool, read_str, read_uuid, write_bool, write_str, write_uuid, Decode, DecodeError,
        Encode, EncodeError,
    },
    file::{rewrite_atomic, METADATA_FILE},
    id::SegmentId,
    timestamp::{Timestamp, TimestampPatternChanges},
    version::Version,
    CompressionType, Error,
};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::{
    collections::HashMap,
    io::{Read, Write},
    path::Path,
};
use uuid::Uuid;

/// Archive metadata
///
/// Persisted in the archive's `metadata` file, its local metadata DB and
/// the global metadata DB.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ArchiveMetadata {
    /// Archive ID, also the name of the archive folder
    pub id: Uuid,

    /// ID of the process (or user) that created the archive
    pub creator_id: Uuid,

    /// Position of the archive in its creator's sequence of archives
    pub creation_index: u64,

    /// Compression of dictionaries and segments
    pub compression: CompressionType,

    /// Lowest message timestamp
    pub begin_ts: Timestamp,

    /// Highest message timestamp
    pub end_ts: Timestamp,

    /// Total size of all input files
    pub uncompressed_size: u64,

    /// Size of closed segments and dictionaries on disk
    pub compressed_size: u64,
}

impl ArchiveMetadata {
    /// Creates the metadata of an empty archive.
    #[must_use]
    pub fn new(id: Uuid, creator_id: Uuid, creation_index: u64, compression: CompressionType) -> Self {
        Self {
            id,
            creator_id,
            creation_index,
            compression,
            begin_ts: Timestamp::MAX,
            end_ts: Timestamp::MIN,
            uncompressed_size: 0,
            compressed_size: 0,
        }
    }

    /// Returns `true` if the archive holds a message in `[begin_ts, end_ts]`.
    #[must_use]
    pub fn overlaps(&self, begin_ts: Timestamp, end_ts: Timestamp) -> bool {
        self.begin_ts <= end_ts && begin_ts <= self.end_ts
    }

    /// Extends the time range.
    pub fn expand_time_range(&mut self, begin_ts: Timestamp, end_ts: Timestamp) {
        self.begin_ts = self.begin_ts.min(begin_ts);
        self.end_ts = self.end_ts.max(end_ts);
    }

    /// Writes the archive's `metadata` file.
    pub(crate) fn write_to_folder<P: AsRef<Path>>(&self, folder: P) -> crate::Result<()> {
        let path = folder.as_ref().join(METADATA_FILE);
        log::trace!("Writing archive metadata to {}", path.display());

        let mut bytes = vec![];
        Version::CURRENT.write_file_header(&mut bytes)?;
        self.encode_into(&mut bytes)?;

        rewrite_atomic(path, &bytes)
    }

    /// Reads the archive's `metadata` file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] if the format version is not supported.
    pub(crate) fn read_from_folder<P: AsRef<Path>>(folder: P) -> crate::Result<Self> {
        let path = folder.as_ref().join(METADATA_FILE);

        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.clone()),
            _ => Error::Io(e),
        })?;

        Version::parse_file_header(&bytes).map_err(Error::InvalidVersion)?;

        let mut body = bytes.get(Version::len()..).unwrap_or_default();
        Ok(Self::decode_from(&mut body)?)
    }
}

impl Encode for ArchiveMetadata {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_uuid(writer, &self.id)?;
        write_uuid(writer, &self.creator_id)?;
        writer.write_u64::<BigEndian>(self.creation_index)?;
        self.compression.encode_into(writer)?;
        writer.write_i64::<BigEndian>(self.begin_ts)?;
        writer.write_i64::<BigEndian>(self.end_ts)?;
        writer.write_u64::<BigEndian>(self.uncompressed_size)?;
        writer.write_u64::<BigEndian>(self.compressed_size)?;
        Ok(())
    }
}

impl Decode for ArchiveMetadata {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            id: read_uuid(reader)?,
            creator_id: read_uuid(reader)?,
            creation_index: reader.read_u64::<BigEndian>()?,
            compression: CompressionType::decode_from(reader)?,
            begin_ts: reader.read_i64::<BigEndian>()?,
            end_ts: reader.read_i64::<BigEndian>()?,
            uncompressed_size: reader.read_u64::<BigEndian>()?,
            compressed_size: reader.read_u64::<BigEndian>()?,
        })
    }
}

/// Metadata of one (split of an) input file
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FileMetadata {
    /// File ID
    pub id: Uuid,

    /// ID shared by all splits of the same input file
    pub orig_file_id: Uuid,

    /// Path of the input file
    pub path: String,

    /// Caller-defined grouping
    pub group_id: u64,

    /// Lowest message timestamp, 0 if the file has no timestamps
    pub begin_ts: Timestamp,

    /// Highest message timestamp, 0 if the file has no timestamps
    pub end_ts: Timestamp,

    /// Timestamp patterns, keyed by the message index they start at
    pub timestamp_patterns: TimestampPatternChanges,

    /// Size of the file's input bytes
    pub num_uncompressed_bytes: u64,

    /// Index of the first message in the unsplit input file
    pub begin_message_ix: u64,

    /// Number of messages
    pub num_messages: u64,

    /// Number of encoded variables
    pub num_variables: u64,

    /// Whether the input file was split into several files
    pub is_split: bool,

    /// Position among the splits of the input file
    pub split_ix: u64,

    /// Segment holding the file's columns
    pub segment_id: SegmentId,

    /// Offset of the timestamp column in the segment
    pub timestamps_offset: u64,

    /// Offset of the logtype column in the segment
    pub logtypes_offset: u64,

    /// Offset of the variable column in the segment
    pub variables_offset: u64,

    /// Archive holding the file
    pub archive_id: Uuid,
}

impl FileMetadata {
    /// Returns `true` if any message was parsed with a timestamp pattern.
    #[must_use]
    pub fn has_timestamps(&self) -> bool {
        !self.timestamp_patterns.is_empty()
    }

    /// Returns `true` if the file may hold a message in `[begin_ts, end_ts]`.
    #[must_use]
    pub fn overlaps(&self, begin_ts: Timestamp, end_ts: Timestamp) -> bool {
        self.begin_ts <= end_ts && begin_ts <= self.end_ts
    }
}

impl Encode for FileMetadata {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_uuid(writer, &self.id)?;
        write_uuid(writer, &self.orig_file_id)?;
        write_str(writer, &self.path)?;
        writer.write_u64::<BigEndian>(self.group_id)?;
        writer.write_i64::<BigEndian>(self.begin_ts)?;
        writer.write_i64::<BigEndian>(self.end_ts)?;
        self.timestamp_patterns.encode_into(writer)?;
        writer.write_u64::<BigEndian>(self.num_uncompressed_bytes)?;
        writer.write_u64::<BigEndian>(self.begin_message_ix)?;
        writer.write_u64::<BigEndian>(self.num_messages)?;
        writer.write_u64::<BigEndian>(self.num_variables)?;
        write_bool(writer, self.is_split)?;
        writer.write_u64::<BigEndian>(self.split_ix)?;
        writer.write_u64::<BigEndian>(self.segment_id)?;
        writer.write_u64::<BigEndian>(self.timestamps_offset)?;
        writer.write_u64::<BigEndian>(self.logtypes_offset)?;
        writer.write_u64::<BigEndian>(self.variables_offset)?;
        write_uuid(writer, &self.archive_id)?;
        Ok(())
    }
}

impl Decode for FileMetadata {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            id: read_uuid(reader)?,
            orig_file_id: read_uuid(reader)?,
            path: read_str(reader, "FileMetadata::path")?,
            group_id: reader.read_u64::<BigEndian>()?,
            begin_ts: reader.read_i64::<BigEndian>()?,
            end_ts: reader.read_i64::<BigEndian>()?,
            timestamp_patterns: TimestampPatternChanges::decode_from(reader)?,
            num_uncompressed_bytes: reader.read_u64::<BigEndian>()?,
            begin_message_ix: reader.read_u64::<BigEndian>()?,
            num_messages: reader.read_u64::<BigEndian>()?,
            num_variables: reader.read_u64::<BigEndian>()?,
            is_split: read_bool(reader, "FileMetadata::is_split")?,
            split_ix: reader.read_u64::<BigEndian>()?,
            segment_id: reader.read_u64::<BigEndian>()?,
            timestamps_offset: reader.read_u64::<BigEndian>()?,
            logtypes_offset: reader.read_u64::<BigEndian>()?,
            variables_offset: reader.read_u64::<BigEndian>()?,
            archive_id: read_uuid(reader)?,
        })
    }
}

/// Filter over the files of a metadata DB
#[derive(Clone, Debug)]
pub struct FileFilter {
    /// Only files with exactly this path
    pub path: Option<String>,

    /// Only files that overlap `[begin_ts, end_ts]`
    pub begin_ts: Timestamp,

    /// See `begin_ts`
    pub end_ts: Timestamp,

    /// Only files in this segment
    pub segment_id: Option<SegmentId>,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            path: None,
            begin_ts: Timestamp::MIN,
            end_ts: Timestamp::MAX,
            segment_id: None,
        }
    }
}

impl FileFilter {
    /// Returns `true` if the file passes the filter.
    #[must_use]
    pub fn matches(&self, file: &FileMetadata) -> bool {
        self.path.as_ref().map_or(true, |path| *path == file.path)
            && self.segment_id.map_or(true, |id| id == file.segment_id)
            && file.overlaps(self.begin_ts, self.end_ts)
    }
}

/// File rows indexed by file ID
#[derive(Debug, Default)]
pub(crate) struct FileTable {
    rows: Vec<FileMetadata>,
    index: HashMap<Uuid, usize, ahash::RandomState>,
}

impl FileTable {
    pub(crate) fn new(rows: Vec<FileMetadata>) -> Self {
        let index = rows.iter().enumerate().map(|(ix, x)| (x.id, ix)).collect();
        Self { rows, index }
    }

    /// Inserts or replaces the row with the same file ID.
    pub(crate) fn upsert(&mut self, file: FileMetadata) {
        match self.index.get(&file.id).and_then(|&ix| self.rows.get_mut(ix)) {
            Some(row) => *row = file,
            None => {
                self.index.insert(file.id, self.rows.len());
                self.rows.push(file);
            }
        }
    }

    /// Rows in insertion order
    pub(crate) fn rows(&self) -> &[FileMetadata] {
        &self.rows
    }
}

pub(crate) fn write_vec<W: Write, T: Encode>(writer: &mut W, items: &[T]) -> Result<(), EncodeError> {
    writer.write_u64::<BigEndian>(items.len() as u64)?;
    for item in items {
        item.encode_into(writer)?;
    }
    Ok(())
}

pub(crate) fn read_vec<R: Read, T: Decode>(reader: &mut R) -> Result<Vec<T>, DecodeError> {
    let len = reader.read_u64::<BigEndian>()?;

    // NOTE: Don't trust the length for preallocation
    let mut items = Vec::with_capacity(len.min(1_024) as usize);
    for _ in 0..len {
        items.push(T::decode_from(reader)?);
    }
    Ok(items)
}

/// Writes a table file with header and checksum trailer.
pub(crate) fn write_table_file<P: AsRef<Path>>(path: P, body: &[u8]) -> crate::Result<()> {
    let mut bytes = Vec::with_capacity(Version::len() + body.len() + 8);
    Version::CURRENT.write_file_header(&mut bytes)?;
    bytes.extend_from_slice(body);

    let checksum = xxhash_rust::xxh3::xxh3_64(&bytes);
    bytes.write_u64::<BigEndian>(checksum)?;

    rewrite_atomic(path, &bytes)
}

/// Reads a table file and returns its body.
pub(crate) fn read_table_file<P: AsRef<Path>>(path: P) -> crate::Result<Vec<u8>> {
    let path = path.as_ref();

    let mut bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.into()),
        _ => Error::Io(e),
    })?;

    let Some(content_len) = bytes.len().checked_sub(8) else {
        return Err(Error::Corrupt(format!("{} is too short", path.display())));
    };

    let expected = bytes.get(content_len..).map(BigEndian::read_u64);
    let content = bytes.get(..content_len).unwrap_or_default();

    if expected != Some(xxhash_rust::xxh3::xxh3_64(content)) {
        return Err(Error::Corrupt(format!("{} has an invalid checksum", path.display())));
    }

    Version::parse_file_header(content).map_err(Error::InvalidVersion)?;

    bytes.truncate(content_len);
    bytes.drain(..Version::len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::TimestampPattern;
    use test_log::test;

    pub(crate) fn sample_file(path: &str, segment_id: SegmentId) -> FileMetadata {
        FileMetadata {
            id: Uuid::new_v4(),
            orig_file_id: Uuid::new_v4(),
            path: path.into(),
            begin_ts: 100,
            end_ts: 200,
            timestamp_patterns: TimestampPatternChanges(vec![(
                0,
                TimestampPattern::new(0, "%Y-%m-%d"),
            )]),
            num_messages: 3,
            num_variables: 5,
            segment_id,
            ..Default::default()
        }
    }

    #[test]
    fn metadata_file_round_trip() -> crate::Result<()> {
        let file = sample_file("/var/log/a.log", 7);
        let bytes = file.encode_into_vec()?;
        assert_eq!(file, FileMetadata::decode_from(&mut &bytes[..])?);
        Ok(())
    }

    #[test]
    fn metadata_file_table_upsert() {
        let mut files: Vec<_> = (0..1_000).map(|i| sample_file(&format!("{i}.log"), i)).collect();
        let mut table = FileTable::new(files.clone());

        let mut changed = files.get(500).cloned().unwrap_or_default();
        changed.num_messages = 42;
        table.upsert(changed.clone());

        let added = sample_file("new.log", 0);
        table.upsert(added.clone());

        if let Some(row) = files.get_mut(500) {
            *row = changed;
        }
        files.push(added);
        assert_eq!(&files[..], table.rows());
    }

    #[test]
    fn metadata_archive_file() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        let mut archive =
            ArchiveMetadata::new(Uuid::new_v4(), Uuid::new_v4(), 3, CompressionType::default());
        assert!(!archive.overlaps(Timestamp::MIN, Timestamp::MAX));

        archive.expand_time_range(10, 20);
        assert!(archive.overlaps(20, 30));
        assert!(!archive.overlaps(21, 30));

        archive.write_to_folder(folder.path())?;
        assert_eq!(archive, ArchiveMetadata::read_from_folder(folder.path())?);

        Ok(())
    }

    #[test]
    fn metadata_archive_file_version_mismatch() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        std::fs::write(folder.path().join(METADATA_FILE), b"LGA\x09rest")?;

        assert!(matches!(
            ArchiveMetadata::read_from_folder(folder.path()),
            Err(Error::InvalidVersion(Some(9)))
        ));

        std::fs::write(folder.path().join(METADATA_FILE), b"not an archive")?;

        assert!(matches!(
            ArchiveMetadata::read_from_folder(folder.path()),
            Err(Error::InvalidVersion(None))
        ));
        Ok(())
    }

    #[test]
    fn metadata_table_checksum() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let path = folder.path().join("table");

        write_table_file(&path, b"hello")?;
        assert_eq!(b"hello", &read_table_file(&path)?[..]);

        let mut bytes = std::fs::read(&path)?;
        if let Some(byte) = bytes.get_mut(5) {
            *byte ^= 0xFF;
        }
        std::fs::write(&path, bytes)?;

        assert!(matches!(read_table_file(&path), Err(Error::Corrupt(_))));
        Ok(())
    }

    #[test]
    fn metadata_filter() {
        let file = sample_file("a", 1);

        assert!(FileFilter::default().matches(&file));
        assert!(!FileFilter {
            segment_id: Some(2),
            ..Default::default()
        }
        .matches(&file));
        assert!(!FileFilter {
            begin_ts: 201,
            ..Default::default()
        }
        .matches(&file));
        assert!(FileFilter {
            path: Some("a".into()),
            end_ts: 100,
            ..Default::default()
        }
        .matches(&file));
    }
}
