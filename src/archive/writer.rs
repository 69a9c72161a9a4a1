// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Archive writer
//!
//! Files are buffered in memory and appended to one of two open segments,
//! depending on whether they have timestamps. Closing a segment indexes the
//! dictionaries and persists the metadata of its files.

use super::file::WriterFile;
use crate::{
    dictionary::{DictionaryWriter, LOGTYPE_DICTIONARY_MAX_ID, VARIABLE_DICTIONARY_MAX_ID},
    encoding::max_dictionary_id,
    file::{
        fsync_directory, LOGTYPE_DICT_FILE, LOGTYPE_SEGINDEX_FILE, METADATA_DB_FILE, SCHEMA_FILE,
        VAR_DICT_FILE, VAR_SEGINDEX_FILE,
    },
    id::{IdGenerator, LogtypeId, VariableId},
    interpreter::{encode_message, encode_tokens},
    metadata::{global::GlobalMetadataDb, local::MetadataDb, ArchiveMetadata, FileMetadata},
    parser::Token,
    segment::{encode_column, writer::Writer as SegmentWriter, SEGMENTS_FOLDER},
    timestamp::{Timestamp, TimestampPattern},
    Config, Error,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};
use uuid::Uuid;

/// Shared handle to a global metadata DB
pub type SharedGlobalMetadataDb = Arc<dyn GlobalMetadataDb + Send + Sync>;

/// Segment that still accepts files
struct PendingSegment {
    writer: SegmentWriter,

    /// Files appended to the segment, persisted when it closes
    files: Vec<FileMetadata>,

    logtype_ids: BTreeSet<LogtypeId>,
    var_ids: BTreeSet<VariableId>,
}

impl PendingSegment {
    fn new(archive_path: &Path, id: u64, config: &Config) -> crate::Result<Self> {
        let path = archive_path.join(SEGMENTS_FOLDER).join(id.to_string());
        log::trace!("Opening segment {id} at {}", path.display());

        Ok(Self {
            writer: SegmentWriter::new(id, path, config.compression)?,
            files: Vec::new(),
            logtype_ids: BTreeSet::new(),
            var_ids: BTreeSet::new(),
        })
    }
}

/// Everything belonging to the archive currently being written
struct OpenArchive {
    metadata: ArchiveMetadata,
    path: PathBuf,
    metadata_db: MetadataDb,

    logtype_dict: DictionaryWriter,
    var_dict: DictionaryWriter,

    segment_ids: IdGenerator,

    /// Files with and without timestamps go into different segments
    segment_with_ts: Option<PendingSegment>,
    segment_without_ts: Option<PendingSegment>,

    /// Compressed size of all closed segments
    closed_segments_size: u64,
}

fn disk_size(path: &Path) -> crate::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

fn dictionaries_disk_size(archive_path: &Path) -> crate::Result<u64> {
    let mut size = 0;
    for name in [
        LOGTYPE_DICT_FILE,
        LOGTYPE_SEGINDEX_FILE,
        VAR_DICT_FILE,
        VAR_SEGINDEX_FILE,
    ] {
        size += disk_size(&archive_path.join(name))?;
    }
    Ok(size)
}

impl OpenArchive {
    fn create(
        config: &Config,
        creation_index: u64,
        global_db: &dyn GlobalMetadataDb,
    ) -> crate::Result<Self> {
        let id = Uuid::new_v4();
        let path = super::archive_path(&config.archives_dir, id);

        log::debug!(
            "Creating archive {id} (creator {}, creation index {creation_index}) at {}",
            config.creator_id,
            path.display()
        );

        std::fs::create_dir_all(&config.archives_dir)?;
        std::fs::create_dir(&path)?;

        let metadata = ArchiveMetadata::new(id, config.creator_id, creation_index, config.compression);

        let mut logtype_dict = DictionaryWriter::create(
            "logtype",
            path.join(LOGTYPE_DICT_FILE),
            path.join(LOGTYPE_SEGINDEX_FILE),
            config.compression,
            LOGTYPE_DICTIONARY_MAX_ID,
        )?;
        logtype_dict.flush()?;

        let mut var_dict = DictionaryWriter::create(
            "variable",
            path.join(VAR_DICT_FILE),
            path.join(VAR_SEGINDEX_FILE),
            config.compression,
            VARIABLE_DICTIONARY_MAX_ID.min(max_dictionary_id::<i64>()),
        )?;
        var_dict.flush()?;

        if let Some(schema_path) = &config.schema_path {
            std::fs::copy(schema_path, path.join(SCHEMA_FILE))?;
        }

        let mut metadata_db = MetadataDb::create(path.join(METADATA_DB_FILE))?;
        metadata_db.update_archive(&metadata);
        metadata_db.persist()?;

        metadata.write_to_folder(&path)?;

        fsync_directory(&path)?;
        fsync_directory(&config.archives_dir)?;

        global_db.add_archive(&metadata)?;

        Ok(Self {
            metadata,
            path,
            metadata_db,
            logtype_dict,
            var_dict,
            segment_ids: IdGenerator::default(),
            segment_with_ts: None,
            segment_without_ts: None,
            closed_segments_size: 0,
        })
    }

    fn append_file(
        &mut self,
        mut file: WriterFile,
        config: &Config,
        global_db: &dyn GlobalMetadataDb,
    ) -> crate::Result<()> {
        file.finish();

        let has_timestamps = file.metadata.has_timestamps();

        let slot = if has_timestamps {
            &mut self.segment_with_ts
        } else {
            &mut self.segment_without_ts
        };

        if slot.is_none() {
            *slot = Some(PendingSegment::new(&self.path, self.segment_ids.next(), config)?);
        }
        let Some(segment) = slot.as_mut() else {
            return Err(Error::Failure("segment slot is empty".into()));
        };

        #[allow(clippy::cast_sign_loss)]
        let timestamps = encode_column(&file.timestamps, |ts| ts as u64);
        let logtypes = encode_column(&file.logtypes, |id| id);
        #[allow(clippy::cast_sign_loss)]
        let variables = encode_column(&file.variables, |var| var as u64);

        let metadata = &mut file.metadata;
        metadata.archive_id = self.metadata.id;
        metadata.segment_id = segment.writer.segment_id();
        metadata.timestamps_offset = segment.writer.append(&timestamps)?;
        metadata.logtypes_offset = segment.writer.append(&logtypes)?;
        metadata.variables_offset = segment.writer.append(&variables)?;

        log::trace!(
            "Appended file {:?} (split {}, {} messages) to segment {}",
            metadata.path,
            metadata.split_ix,
            metadata.num_messages,
            metadata.segment_id
        );

        // Files without timestamps count as 0..=0, like in their own metadata
        self.metadata
            .expand_time_range(file.metadata.begin_ts, file.metadata.end_ts);
        self.metadata.uncompressed_size += file.metadata.num_uncompressed_bytes;

        segment.logtype_ids.append(&mut file.logtype_ids);
        segment.var_ids.append(&mut file.var_ids);
        segment.files.push(file.metadata);

        if segment.writer.uncompressed_size() >= config.target_segment_uncompressed_size {
            if let Some(segment) = slot.take() {
                self.close_segment(segment, global_db)?;
            }
        }

        Ok(())
    }

    /// Commits a segment.
    ///
    /// Once this returns, the segment's files are readable.
    fn close_segment(
        &mut self,
        segment: PendingSegment,
        global_db: &dyn GlobalMetadataDb,
    ) -> crate::Result<()> {
        let PendingSegment {
            writer,
            files,
            logtype_ids,
            var_ids,
        } = segment;

        let segment_id = writer.segment_id();
        self.closed_segments_size += writer.close()?;

        self.logtype_dict.index_segment(segment_id, &logtype_ids)?;
        self.var_dict.index_segment(segment_id, &var_ids)?;
        self.logtype_dict.flush()?;
        self.var_dict.flush()?;

        self.metadata.compressed_size =
            self.closed_segments_size + dictionaries_disk_size(&self.path)?;

        self.metadata_db.update_files(&files);
        self.metadata_db.update_archive(&self.metadata);
        self.metadata_db.persist()?;

        self.metadata.write_to_folder(&self.path)?;

        global_db.update_metadata_for_files(self.metadata.id, &files)?;
        global_db.update_archive_metadata(&self.metadata)?;

        log::debug!(
            "Committed segment {segment_id} of archive {} with {} files",
            self.metadata.id,
            files.len()
        );

        Ok(())
    }

    fn close(mut self, global_db: &dyn GlobalMetadataDb) -> crate::Result<ArchiveMetadata> {
        for segment in [self.segment_with_ts.take(), self.segment_without_ts.take()]
            .into_iter()
            .flatten()
        {
            self.close_segment(segment, global_db)?;
        }

        let Self {
            mut metadata,
            path,
            mut metadata_db,
            logtype_dict,
            var_dict,
            closed_segments_size,
            ..
        } = self;

        logtype_dict.close()?;
        var_dict.close()?;

        metadata.compressed_size = closed_segments_size + dictionaries_disk_size(&path)?;

        metadata_db.update_archive(&metadata);
        metadata_db.persist()?;

        metadata.write_to_folder(&path)?;
        global_db.update_archive_metadata(&metadata)?;

        log::debug!(
            "Closed archive {} ({} bytes, {} bytes compressed)",
            metadata.id,
            metadata.uncompressed_size,
            metadata.compressed_size
        );

        Ok(metadata)
    }
}

/// State needed to continue a file after a split
struct Continuation {
    path: String,
    group_id: u64,
    orig_file_id: Uuid,
    split_ix: u64,
    begin_message_ix: u64,
    pattern: Option<TimestampPattern>,
}

/// Archive writer
///
/// Writes files message by message into an archive. Files are buffered in
/// memory until closed, then appended to a segment. Closing a segment
/// commits the files in it.
///
/// Splitting a file or an archive is left to the caller,
/// see [`crate::FileCompressor`].
pub struct ArchiveWriter {
    config: Config,
    global_db: SharedGlobalMetadataDb,

    archive: Option<OpenArchive>,
    file: Option<WriterFile>,

    creation_index: u64,

    logtype: String,
    variables: Vec<i64>,
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ArchiveWriter<{:?}, creation index {}>",
            self.archive_id(),
            self.creation_index
        )
    }
}

impl ArchiveWriter {
    /// Creates the first archive and registers it in the global metadata DB.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open(config: Config, global_db: SharedGlobalMetadataDb) -> crate::Result<Self> {
        let archive = OpenArchive::create(&config, 0, &*global_db)?;

        Ok(Self {
            config,
            global_db,
            archive: Some(archive),
            file: None,
            creation_index: 0,
            logtype: String::new(),
            variables: Vec::new(),
        })
    }

    fn archive(&self) -> crate::Result<&OpenArchive> {
        self.archive.as_ref().ok_or(Error::NotInit("no archive is open"))
    }

    fn archive_mut(&mut self) -> crate::Result<&mut OpenArchive> {
        self.archive.as_mut().ok_or(Error::NotInit("no archive is open"))
    }

    /// ID of the archive being written
    #[must_use]
    pub fn archive_id(&self) -> Option<Uuid> {
        self.archive.as_ref().map(|x| x.metadata.id)
    }

    /// Folder of the archive being written
    #[must_use]
    pub fn archive_path(&self) -> Option<&Path> {
        self.archive.as_ref().map(|x| x.path.as_path())
    }

    /// Creation index of the archive being written
    #[must_use]
    pub fn creation_index(&self) -> u64 {
        self.creation_index
    }

    /// Returns `true` if a file is open.
    #[must_use]
    pub fn is_file_open(&self) -> bool {
        self.file.is_some()
    }

    /// Opens a new file.
    ///
    /// `orig_file_id` and `split_ix` identify the file across splits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParam`] if a file is already open.
    pub fn create_and_open_file(
        &mut self,
        path: &str,
        group_id: u64,
        orig_file_id: Uuid,
        split_ix: u64,
    ) -> crate::Result<()> {
        self.open_file_at(path, group_id, orig_file_id, split_ix, 0)
    }

    fn open_file_at(
        &mut self,
        path: &str,
        group_id: u64,
        orig_file_id: Uuid,
        split_ix: u64,
        begin_message_ix: u64,
    ) -> crate::Result<()> {
        if self.file.is_some() {
            return Err(Error::BadParam("a file is already open"));
        }

        let archive_id = self.archive()?.metadata.id;

        self.file = Some(WriterFile::new(FileMetadata {
            id: Uuid::new_v4(),
            orig_file_id,
            path: path.into(),
            group_id,
            begin_message_ix,
            split_ix,
            archive_id,
            ..Default::default()
        }));

        Ok(())
    }

    /// Sets the timestamp pattern of the messages written from now on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInit`] if no file is open.
    pub fn change_ts_pattern(&mut self, pattern: TimestampPattern) -> crate::Result<()> {
        let file = self.file.as_mut().ok_or(Error::NotInit("no file is open"))?;
        log::trace!("Timestamp pattern {pattern} at message {}", file.metadata.num_messages);
        file.change_ts_pattern(pattern);
        Ok(())
    }

    /// Encodes a message with the configured parser and appends it to the open file.
    ///
    /// `message` must not contain the timestamp text, and
    /// `num_uncompressed_bytes` is the size of the original message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInit`] if no file is open, or
    /// [`Error::IdSpaceExhausted`] if a dictionary is full.
    pub fn write_msg(
        &mut self,
        timestamp: Timestamp,
        message: &str,
        num_uncompressed_bytes: u64,
    ) -> crate::Result<()> {
        let file = self.file.as_mut().ok_or(Error::NotInit("no file is open"))?;
        let archive = self.archive.as_mut().ok_or(Error::NotInit("no archive is open"))?;

        encode_message(
            &*self.config.parser,
            message,
            &mut self.logtype,
            &mut self.variables,
            |text| {
                let id = archive.var_dict.add_entry(text)?;
                file.var_ids.insert(id);
                Ok(id)
            },
        )?;

        let logtype_id = archive.logtype_dict.add_entry(&self.logtype)?;
        file.logtype_ids.insert(logtype_id);
        file.write_encoded_msg(timestamp, logtype_id, &self.variables, num_uncompressed_bytes);

        Ok(())
    }

    /// Appends a message that was tokenized by the caller, e.g. using a schema.
    ///
    /// # Errors
    ///
    /// Same as [`ArchiveWriter::write_msg`].
    pub fn write_msg_tokens(
        &mut self,
        timestamp: Timestamp,
        tokens: &[Token<'_>],
        num_uncompressed_bytes: u64,
    ) -> crate::Result<()> {
        let file = self.file.as_mut().ok_or(Error::NotInit("no file is open"))?;
        let archive = self.archive.as_mut().ok_or(Error::NotInit("no archive is open"))?;

        encode_tokens(tokens, &mut self.logtype, &mut self.variables, |text| {
            let id = archive.var_dict.add_entry(text)?;
            file.var_ids.insert(id);
            Ok(id)
        })?;

        let logtype_id = archive.logtype_dict.add_entry(&self.logtype)?;
        file.logtype_ids.insert(logtype_id);
        file.write_encoded_msg(timestamp, logtype_id, &self.variables, num_uncompressed_bytes);

        Ok(())
    }

    /// Closes the open file and appends it to a segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInit`] if no file is open.
    pub fn close_file(&mut self) -> crate::Result<()> {
        let file = self.file.take().ok_or(Error::NotInit("no file is open"))?;
        self.append_file_to_segment(file)
    }

    /// Drops the open file without storing it.
    ///
    /// Splits of the file that were already closed stay in their archives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInit`] if no file is open.
    pub fn discard_file(&mut self) -> crate::Result<()> {
        let file = self.file.take().ok_or(Error::NotInit("no file is open"))?;

        log::debug!(
            "Discarding file {:?} after {} message(s)",
            file.metadata.path,
            file.metadata.num_messages
        );

        Ok(())
    }

    fn append_file_to_segment(&mut self, file: WriterFile) -> crate::Result<()> {
        let archive = self.archive.as_mut().ok_or(Error::NotInit("no archive is open"))?;
        archive.append_file(file, &self.config, &*self.global_db)
    }

    /// Records directories that had no files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn add_empty_directories<I: IntoIterator<Item = String>>(
        &mut self,
        dirs: I,
    ) -> crate::Result<()> {
        let archive = self.archive_mut()?;
        archive.metadata_db.add_empty_directories(dirs);
        archive.metadata_db.persist()
    }

    /// Writer configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Encoded size of the open file
    #[must_use]
    pub fn encoded_file_size(&self) -> u64 {
        self.file.as_ref().map_or(0, WriterFile::encoded_size)
    }

    /// Uncompressed size of both dictionaries
    #[must_use]
    pub fn dictionaries_data_size(&self) -> u64 {
        self.archive
            .as_ref()
            .map_or(0, |x| x.logtype_dict.data_size() + x.var_dict.data_size())
    }

    /// Closes the open file, if any, and returns how to continue it.
    fn close_for_split(&mut self) -> crate::Result<Option<Continuation>> {
        let Some(mut file) = self.file.take() else {
            return Ok(None);
        };

        file.metadata.is_split = true;

        let continuation = Continuation {
            path: file.metadata.path.clone(),
            group_id: file.metadata.group_id,
            orig_file_id: file.metadata.orig_file_id,
            split_ix: file.metadata.split_ix + 1,
            begin_message_ix: file.metadata.begin_message_ix + file.metadata.num_messages,
            pattern: file.current_pattern().cloned(),
        };

        self.append_file_to_segment(file)?;

        Ok(Some(continuation))
    }

    fn continue_file(&mut self, continuation: Continuation) -> crate::Result<()> {
        self.open_file_at(
            &continuation.path,
            continuation.group_id,
            continuation.orig_file_id,
            continuation.split_ix,
            continuation.begin_message_ix,
        )?;

        if let Some(file) = &mut self.file {
            file.metadata.is_split = true;
        }

        if let Some(pattern) = continuation.pattern {
            self.change_ts_pattern(pattern)?;
        }

        Ok(())
    }

    /// Closes the open file and continues it in a new file.
    ///
    /// The new file has the same original file ID and the next split index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInit`] if no file is open.
    pub fn split_file(&mut self) -> crate::Result<()> {
        let continuation = self
            .close_for_split()?
            .ok_or(Error::NotInit("no file is open"))?;

        log::debug!(
            "Splitting file {:?} at message {}",
            continuation.path,
            continuation.begin_message_ix
        );

        self.continue_file(continuation)
    }

    /// Closes the archive and continues in a new one.
    ///
    /// The open file, if any, is split and continued in the new archive.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn split_archive(&mut self) -> crate::Result<()> {
        let continuation = self.close_for_split()?;

        let archive = self.archive.take().ok_or(Error::NotInit("no archive is open"))?;
        archive.close(&*self.global_db)?;

        self.creation_index += 1;
        log::debug!("Splitting archive, creation index {}", self.creation_index);

        self.archive = Some(OpenArchive::create(
            &self.config,
            self.creation_index,
            &*self.global_db,
        )?);

        if let Some(continuation) = continuation {
            self.continue_file(continuation)?;
        }

        Ok(())
    }

    /// Closes the open file and all segments, and finalizes the archive.
    ///
    /// Returns the metadata of the last archive.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn close(mut self) -> crate::Result<ArchiveMetadata> {
        if self.file.is_some() {
            self.close_file()?;
        }

        let archive = self.archive.take().ok_or(Error::NotInit("no archive is open"))?;
        archive.close(&*self.global_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::METADATA_FILE, MockGlobalMetadataDb};
    use test_log::test;

    #[test]
    fn archive_writer_layout() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let global_db = MockGlobalMetadataDb::default();

        let mut writer = ArchiveWriter::open(Config::new(folder.path()), Arc::new(global_db.clone()))?;
        let path = writer.archive_path().map(Path::to_path_buf);

        writer.create_and_open_file("a.log", 0, Uuid::new_v4(), 0)?;
        writer.write_msg(0, "hello world 42\n", 15)?;
        assert_eq!(16 + 8, writer.encoded_file_size());

        let metadata = writer.close()?;
        assert_eq!(15, metadata.uncompressed_size);
        assert!(metadata.compressed_size > 0);

        let path = path.ok_or(Error::NotInit("no archive"))?;
        for name in [
            METADATA_FILE,
            METADATA_DB_FILE,
            LOGTYPE_DICT_FILE,
            LOGTYPE_SEGINDEX_FILE,
            VAR_DICT_FILE,
            VAR_SEGINDEX_FILE,
        ] {
            assert!(path.join(name).try_exists()?, "{name} is missing");
        }
        assert!(path.join(SEGMENTS_FOLDER).join("0").try_exists()?);

        assert_eq!(vec![metadata], global_db.archives()?);

        Ok(())
    }

    #[test]
    fn archive_writer_requires_open_file() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let mut writer = ArchiveWriter::open(
            Config::new(folder.path()),
            Arc::new(MockGlobalMetadataDb::default()),
        )?;

        assert!(matches!(writer.write_msg(0, "x\n", 2), Err(Error::NotInit(_))));
        assert!(matches!(writer.split_file(), Err(Error::NotInit(_))));

        writer.create_and_open_file("a.log", 0, Uuid::new_v4(), 0)?;
        assert!(matches!(
            writer.create_and_open_file("b.log", 0, Uuid::new_v4(), 0),
            Err(Error::BadParam(_))
        ));

        writer.close()?;
        Ok(())
    }

    #[test]
    fn archive_writer_split_archive() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let global_db = MockGlobalMetadataDb::default();

        let mut writer = ArchiveWriter::open(Config::new(folder.path()), Arc::new(global_db.clone()))?;
        let first = writer.archive_id();

        writer.create_and_open_file("a.log", 0, Uuid::new_v4(), 0)?;
        writer.write_msg(0, "one\n", 4)?;
        writer.split_archive()?;

        assert_ne!(first, writer.archive_id());
        assert_eq!(1, writer.creation_index());
        assert!(writer.is_file_open());

        writer.write_msg(0, "two\n", 4)?;
        writer.close()?;

        let archives = global_db.archives()?;
        assert_eq!(2, archives.len());
        assert_eq!(
            vec![0, 1],
            archives.iter().map(|x| x.creation_index).collect::<Vec<_>>()
        );

        Ok(())
    }
}
