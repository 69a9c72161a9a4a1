// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    column_cache::ColumnCache,
    parser::{HeuristicParser, VariableParser},
    CompressionType,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use uuid::Uuid;

/// Archive writer configuration
#[derive(Clone)]
pub struct Config {
    /// Folder in which archive folders are created
    pub(crate) archives_dir: PathBuf,

    /// ID of the process (or user) creating archives
    pub(crate) creator_id: Uuid,

    /// Target uncompressed size of segments
    pub(crate) target_segment_uncompressed_size: u64,

    /// Target encoded size of a file before it is split
    pub(crate) target_encoded_file_size: u64,

    /// Target data size of both dictionaries before the archive is split
    pub(crate) target_data_size_of_dicts: u64,

    /// Compression of dictionaries and segments
    pub(crate) compression: CompressionType,

    /// Schema file copied into every archive
    pub(crate) schema_path: Option<PathBuf>,

    /// Tokenizer of messages
    pub(crate) parser: Arc<dyn VariableParser + Send + Sync>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("archives_dir", &self.archives_dir)
            .field("creator_id", &self.creator_id)
            .field(
                "target_segment_uncompressed_size",
                &self.target_segment_uncompressed_size,
            )
            .field("target_encoded_file_size", &self.target_encoded_file_size)
            .field("target_data_size_of_dicts", &self.target_data_size_of_dicts)
            .field("compression", &self.compression)
            .field("schema_path", &self.schema_path)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// A random creator ID is assigned.
    pub fn new<P: AsRef<Path>>(archives_dir: P) -> Self {
        Self {
            archives_dir: archives_dir.as_ref().into(),
            creator_id: Uuid::new_v4(),
            target_segment_uncompressed_size: 256 * 1_024 * 1_024,
            target_encoded_file_size: 512 * 1_024 * 1_024,
            target_data_size_of_dicts: 100 * 1_024 * 1_024,
            compression: CompressionType::default(),
            schema_path: None,
            parser: Arc::new(HeuristicParser),
        }
    }

    /// Sets the creator ID.
    ///
    /// Archives of the same creator are ordered by their creation index.
    #[must_use]
    pub fn creator_id(mut self, id: Uuid) -> Self {
        self.creator_id = id;
        self
    }

    /// Sets the target uncompressed size of segments.
    ///
    /// A segment is closed once the files appended to it exceed this size.
    ///
    /// Default = 256 MiB
    #[must_use]
    pub fn target_segment_uncompressed_size(mut self, bytes: u64) -> Self {
        self.target_segment_uncompressed_size = bytes;
        self
    }

    /// Sets the encoded size at which a file is split.
    ///
    /// Default = 512 MiB
    #[must_use]
    pub fn target_encoded_file_size(mut self, bytes: u64) -> Self {
        self.target_encoded_file_size = bytes;
        self
    }

    /// Sets the dictionary data size at which the archive is split.
    ///
    /// This bounds the memory readers need to load both dictionaries.
    ///
    /// Default = 100 MiB
    #[must_use]
    pub fn target_data_size_of_dicts(mut self, bytes: u64) -> Self {
        self.target_data_size_of_dicts = bytes;
        self
    }

    /// Sets the compression & decompression scheme.
    #[must_use]
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets a schema file that is copied into every archive.
    #[must_use]
    pub fn schema_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.schema_path = Some(path.as_ref().into());
        self
    }

    /// Sets the tokenizer used by [`crate::ArchiveWriter::write_msg`].
    #[must_use]
    pub fn parser(mut self, parser: Arc<dyn VariableParser + Send + Sync>) -> Self {
        self.parser = parser;
        self
    }
}

/// Archive reader configuration
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Maximum number of open segments
    pub(crate) segment_cache_capacity: usize,

    /// Column cache to use
    pub(crate) column_cache: Option<Arc<ColumnCache>>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            segment_cache_capacity: 2,
            column_cache: None,
        }
    }
}

impl ReaderConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of segments kept open.
    ///
    /// Default = 2
    #[must_use]
    pub fn segment_cache_capacity(mut self, n: usize) -> Self {
        self.segment_cache_capacity = n.max(1);
        self
    }

    /// Sets the column cache.
    ///
    /// You can create a global [`ColumnCache`] and share it between multiple
    /// archive readers to cap global cache memory usage.
    #[must_use]
    pub fn column_cache(mut self, cache: Arc<ColumnCache>) -> Self {
        self.column_cache = Some(cache);
        self
    }
}
