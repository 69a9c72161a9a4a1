// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! In-memory files: column buffers while writing, decoded columns and cursors while reading

use crate::{
    column_cache::Columns,
    id::{LogtypeId, VariableId},
    metadata::FileMetadata,
    timestamp::{PatternCursor, Timestamp, TimestampPattern},
};
use std::{collections::BTreeSet, sync::Arc};

/// Size of one message's timestamp and logtype id in the encoded columns
const ENCODED_MESSAGE_SIZE: u64 = 2 * std::mem::size_of::<u64>() as u64;

/// Size of one encoded variable
const ENCODED_VARIABLE_SIZE: u64 = std::mem::size_of::<i64>() as u64;

/// File that is being written
///
/// Columns are buffered in memory until the file is appended to a segment.
#[derive(Debug)]
pub(crate) struct WriterFile {
    pub(crate) metadata: FileMetadata,

    pub(crate) timestamps: Vec<Timestamp>,
    pub(crate) logtypes: Vec<LogtypeId>,
    pub(crate) variables: Vec<i64>,

    /// Dictionary ids referenced by the file, indexed once its segment closes
    pub(crate) logtype_ids: BTreeSet<LogtypeId>,
    pub(crate) var_ids: BTreeSet<VariableId>,
}

impl WriterFile {
    pub(crate) fn new(metadata: FileMetadata) -> Self {
        Self {
            metadata: FileMetadata {
                begin_ts: Timestamp::MAX,
                end_ts: Timestamp::MIN,
                ..metadata
            },
            timestamps: Vec::new(),
            logtypes: Vec::new(),
            variables: Vec::new(),
            logtype_ids: BTreeSet::new(),
            var_ids: BTreeSet::new(),
        }
    }

    /// Pattern applied to the messages written from now on
    pub(crate) fn current_pattern(&self) -> Option<&TimestampPattern> {
        self.metadata
            .timestamp_patterns
            .0
            .last()
            .map(|(_, pattern)| pattern)
    }

    pub(crate) fn change_ts_pattern(&mut self, pattern: TimestampPattern) {
        let changes = &mut self.metadata.timestamp_patterns.0;
        let msg_ix = self.metadata.num_messages;

        // Replaces a change that no message used yet
        if changes.last().is_some_and(|(ix, _)| *ix == msg_ix) {
            changes.pop();
        }

        if changes.last().map(|(_, p)| p) != Some(&pattern) {
            changes.push((msg_ix, pattern));
        }
    }

    pub(crate) fn write_encoded_msg(
        &mut self,
        timestamp: Timestamp,
        logtype_id: LogtypeId,
        variables: &[i64],
        num_uncompressed_bytes: u64,
    ) {
        if self.current_pattern().is_some() {
            self.metadata.begin_ts = self.metadata.begin_ts.min(timestamp);
            self.metadata.end_ts = self.metadata.end_ts.max(timestamp);
        }

        self.timestamps.push(timestamp);
        self.logtypes.push(logtype_id);
        self.variables.extend_from_slice(variables);

        self.metadata.num_messages += 1;
        self.metadata.num_variables += variables.len() as u64;
        self.metadata.num_uncompressed_bytes += num_uncompressed_bytes;
    }

    /// Size of the file's columns
    pub(crate) fn encoded_size(&self) -> u64 {
        self.metadata.num_messages * ENCODED_MESSAGE_SIZE
            + self.metadata.num_variables * ENCODED_VARIABLE_SIZE
    }

    /// Fixes up the time range of files without timestamped messages.
    pub(crate) fn finish(&mut self) {
        if self.metadata.begin_ts > self.metadata.end_ts {
            self.metadata.begin_ts = 0;
            self.metadata.end_ts = 0;
        }
    }
}

/// A decoded message
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Message {
    pub(crate) message_ix: u64,
    pub(crate) logtype_id: LogtypeId,
    pub(crate) timestamp: Timestamp,
    pub(crate) vars: Vec<i64>,
}

impl Message {
    /// Index of the message in its file
    #[must_use]
    pub fn message_ix(&self) -> u64 {
        self.message_ix
    }

    /// Logtype ID
    #[must_use]
    pub fn logtype_id(&self) -> LogtypeId {
        self.logtype_id
    }

    /// Timestamp, 0 if the message has none
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Encoded variables
    #[must_use]
    pub fn vars(&self) -> &[i64] {
        &self.vars
    }
}

/// File that is being read
///
/// Created empty and filled by [`crate::ArchiveReader::open_file`], which
/// reuses the column buffers of the previous file where possible.
#[derive(Debug, Default)]
pub struct ReaderFile {
    pub(crate) metadata: FileMetadata,
    pub(crate) columns: Arc<Columns>,

    /// Next message
    pub(crate) msg_ix: usize,

    /// First variable of the next message
    pub(crate) var_ix: usize,

    pub(crate) pattern_cursor: PatternCursor,
}

impl ReaderFile {
    /// Metadata of the open file
    #[must_use]
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Number of messages
    #[must_use]
    pub fn num_messages(&self) -> usize {
        self.columns.logtypes.len()
    }

    /// Rewinds to the first message.
    pub fn reset_cursors(&mut self) {
        self.msg_ix = 0;
        self.var_ix = 0;
        self.pattern_cursor.reset();
    }
}
