// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Archive reader

use super::file::{Message, ReaderFile};
use crate::{
    column_cache::{ColumnCache, Columns},
    dictionary::{LogtypeDictionaryReader, VariableDictionaryReader},
    file::{
        LOGTYPE_DICT_FILE, LOGTYPE_SEGINDEX_FILE, METADATA_DB_FILE, VAR_DICT_FILE,
        VAR_SEGINDEX_FILE,
    },
    interpreter::decode_message,
    metadata::{local::MetadataDb, ArchiveMetadata, FileFilter, FileMetadata},
    query::{Query, QueryMatch, SubQuery},
    segment::{decode_column, manager::SegmentManager, SEGMENTS_FOLDER},
    timestamp::Timestamp,
    Error, ReaderConfig,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

const COLUMN_VALUE_SIZE: u64 = std::mem::size_of::<u64>() as u64;

/// Archive reader
///
/// Opening an archive loads no dictionary entries and opens no segment.
/// Call [`ArchiveReader::refresh_dictionaries`] before reading messages,
/// and again to pick up entries written since, if the archive is still
/// being written.
pub struct ArchiveReader {
    path: PathBuf,
    metadata: ArchiveMetadata,
    metadata_db: MetadataDb,

    logtype_dict: LogtypeDictionaryReader,
    var_dict: VariableDictionaryReader,

    segment_manager: SegmentManager,
    column_cache: Option<Arc<ColumnCache>>,

    /// Scratch buffer for column bytes
    column_bytes: Vec<u8>,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ArchiveReader({})", self.path.display())
    }
}

impl ArchiveReader {
    /// Opens an archive folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the archive does not exist, or
    /// [`Error::InvalidVersion`] if its format version is not supported.
    pub fn open<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> crate::Result<Self> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::FileNotFound(path.into()));
        }

        log::debug!("Opening archive at {}", path.display());

        let metadata = ArchiveMetadata::read_from_folder(path)?;
        let metadata_db = MetadataDb::open(path.join(METADATA_DB_FILE))?;

        let logtype_dict = LogtypeDictionaryReader::open(
            path.join(LOGTYPE_DICT_FILE),
            path.join(LOGTYPE_SEGINDEX_FILE),
            metadata.compression,
        )?;

        let var_dict = VariableDictionaryReader::open(
            path.join(VAR_DICT_FILE),
            path.join(VAR_SEGINDEX_FILE),
            metadata.compression,
        )?;

        let segment_manager = SegmentManager::new(
            path.join(SEGMENTS_FOLDER),
            metadata.compression,
            config.segment_cache_capacity,
        );

        Ok(Self {
            path: path.into(),
            metadata,
            metadata_db,
            logtype_dict,
            var_dict,
            segment_manager,
            column_cache: config.column_cache.clone(),
            column_bytes: Vec::new(),
        })
    }

    /// Folder of the archive
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive metadata, as of opening the archive
    #[must_use]
    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    /// Logtype dictionary
    #[must_use]
    pub fn logtype_dictionary(&self) -> &LogtypeDictionaryReader {
        &self.logtype_dict
    }

    /// Variable dictionary
    #[must_use]
    pub fn variable_dictionary(&self) -> &VariableDictionaryReader {
        &self.var_dict
    }

    /// Segment manager
    #[must_use]
    pub fn segment_manager(&self) -> &SegmentManager {
        &self.segment_manager
    }

    /// Loads dictionary entries and file metadata committed since the last refresh.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or a dictionary is corrupt.
    pub fn refresh_dictionaries(&mut self) -> crate::Result<()> {
        self.logtype_dict.read_new_entries()?;
        self.var_dict.read_new_entries()?;
        self.metadata_db = MetadataDb::open(self.path.join(METADATA_DB_FILE))?;
        Ok(())
    }

    /// Files passing the filter, in segment order
    #[must_use]
    pub fn files(&self, filter: &FileFilter) -> Vec<FileMetadata> {
        self.metadata_db
            .iter_files(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Recorded empty directories
    #[must_use]
    pub fn empty_directories(&self) -> &[String] {
        self.metadata_db.empty_directories()
    }

    /// Loads the columns of a file into `file`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the column offsets are inconsistent, or
    /// [`Error::Truncated`] if the segment ends early.
    pub fn open_file(&mut self, metadata: &FileMetadata, file: &mut ReaderFile) -> crate::Result<()> {
        file.metadata.clone_from(metadata);
        file.reset_cursors();

        if let Some(columns) = self.column_cache.as_ref().and_then(|cache| {
            cache.get(self.metadata.id, metadata.segment_id, metadata.timestamps_offset)
        }) {
            file.columns = columns;
            return Ok(());
        }

        let logtypes_offset = metadata.timestamps_offset + metadata.num_messages * COLUMN_VALUE_SIZE;
        let variables_offset = logtypes_offset + metadata.num_messages * COLUMN_VALUE_SIZE;

        if metadata.logtypes_offset != logtypes_offset || metadata.variables_offset != variables_offset {
            return Err(Error::Corrupt(format!(
                "column offsets of file {} don't match its message count",
                metadata.id
            )));
        }

        let len = (2 * metadata.num_messages + metadata.num_variables) * COLUMN_VALUE_SIZE;
        let len = usize::try_from(len)
            .map_err(|_| Error::Corrupt(format!("file {} is too large", metadata.id)))?;

        self.column_bytes.resize(len, 0);
        self.segment_manager.try_read(
            metadata.segment_id,
            metadata.timestamps_offset,
            &mut self.column_bytes,
        )?;

        // Reuse the previous file's buffers, unless they are shared
        let mut columns = std::mem::take(&mut file.columns);
        let reused = Arc::get_mut(&mut columns).map(std::mem::take);
        let mut columns = reused.unwrap_or_default();

        let split = |ix: u64| usize::try_from(ix * COLUMN_VALUE_SIZE).unwrap_or(usize::MAX);
        let (timestamps, rest) = self
            .column_bytes
            .split_at(split(metadata.num_messages).min(len));
        let (logtypes, variables) = rest.split_at(split(metadata.num_messages).min(rest.len()));

        #[allow(clippy::cast_possible_wrap)]
        decode_column(timestamps, &mut columns.timestamps, |x| x as Timestamp);
        decode_column(logtypes, &mut columns.logtypes, |x| x);
        #[allow(clippy::cast_possible_wrap)]
        decode_column(variables, &mut columns.variables, |x| x as i64);

        let columns = Arc::new(columns);

        if let Some(cache) = &self.column_cache {
            cache.insert(
                (self.metadata.id, metadata.segment_id, metadata.timestamps_offset).into(),
                columns.clone(),
            );
        }

        file.columns = columns;
        Ok(())
    }

    /// Reads the next message of a file into `message`.
    ///
    /// Returns `false` at the end of the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the variable column doesn't hold the
    /// variables the logtype asks for.
    pub fn get_next_message(&self, file: &mut ReaderFile, message: &mut Message) -> crate::Result<bool> {
        let Some(logtype_id) = file.columns.logtypes.get(file.msg_ix).copied() else {
            return Ok(false);
        };

        let entry = self.logtype_dict.get_entry(logtype_id)?;
        let num_vars = entry.num_variables();

        let vars = file
            .columns
            .variables
            .get(file.var_ix..file.var_ix + num_vars)
            .ok_or_else(|| {
                Error::Corrupt(format!(
                    "message {} of file {} has fewer variables than its logtype",
                    file.msg_ix, file.metadata.id
                ))
            })?;

        message.message_ix = file.msg_ix as u64;
        message.logtype_id = logtype_id;
        message.timestamp = file.columns.timestamps.get(file.msg_ix).copied().unwrap_or(0);
        message.vars.clear();
        message.vars.extend_from_slice(vars);

        file.msg_ix += 1;
        file.var_ix += num_vars;

        Ok(true)
    }

    /// Reads the next message with a timestamp in `[begin_ts, end_ts]`.
    ///
    /// # Errors
    ///
    /// Same as [`ArchiveReader::get_next_message`].
    pub fn find_message_in_time_range(
        &self,
        file: &mut ReaderFile,
        begin_ts: Timestamp,
        end_ts: Timestamp,
        message: &mut Message,
    ) -> crate::Result<bool> {
        while self.get_next_message(file, message)? {
            if begin_ts <= message.timestamp && message.timestamp <= end_ts {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reads the next message that satisfies one of the sub-queries.
    ///
    /// Only `sub_queries` are checked, usually the ones relevant to the
    /// file's segment. If the query matches everything, any message in the
    /// time range matches.
    ///
    /// # Errors
    ///
    /// Same as [`ArchiveReader::get_next_message`].
    pub fn find_message_matching_query<'q>(
        &self,
        file: &mut ReaderFile,
        query: &'q Query,
        sub_queries: &[&'q SubQuery],
        message: &mut Message,
    ) -> crate::Result<Option<QueryMatch<'q>>> {
        let ignore_case = query.options().ignore_case;

        while self.get_next_message(file, message)? {
            if !query.timestamp_in_range(message.timestamp) {
                continue;
            }

            if query.matches_everything() {
                return Ok(Some(QueryMatch::Everything));
            }

            let entry = self.logtype_dict.get_entry(message.logtype_id)?;

            let matched = sub_queries.iter().copied().find(|sub_query| {
                sub_query.matches_encoded(
                    message.logtype_id,
                    entry.variable_kinds().zip(message.vars.iter().copied()),
                    ignore_case,
                )
            });

            if let Some(sub_query) = matched {
                return Ok(Some(QueryMatch::SubQuery(sub_query)));
            }
        }

        Ok(None)
    }

    /// Reconstructs a message without its timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the message doesn't fit its logtype.
    pub fn decompress_message_without_ts(&self, message: &Message, out: &mut String) -> crate::Result<()> {
        let entry = self.logtype_dict.get_entry(message.logtype_id)?;
        decode_message(entry, &message.vars, |id| self.var_dict.get_value(id), out)
    }

    /// Reconstructs the original text of a message, including its timestamp.
    ///
    /// Messages must be passed in file order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the message doesn't fit its logtype.
    pub fn decompress_message(
        &self,
        file: &mut ReaderFile,
        message: &Message,
        out: &mut String,
    ) -> crate::Result<()> {
        let pattern = file
            .pattern_cursor
            .active(&file.metadata.timestamp_patterns, message.message_ix);

        match pattern {
            Some(pattern) => {
                let mut text = String::new();
                self.decompress_message_without_ts(message, &mut text)?;
                pattern.insert_formatted(message.timestamp, &text, out)
            }
            None => self.decompress_message_without_ts(message, out),
        }
    }

    /// Decompresses a whole file into `out`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a message is corrupt.
    pub fn decompress_file(&mut self, metadata: &FileMetadata, out: &mut String) -> crate::Result<()> {
        let mut file = ReaderFile::default();
        self.open_file(metadata, &mut file)?;

        let mut message = Message::default();
        while self.get_next_message(&mut file, &mut message)? {
            self.decompress_message(&mut file, &message, out)?;
        }

        Ok(())
    }
}
