// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Compressed, searchable log archives.
//!
//! Every log message is split into a *logtype*, the constant text of the
//! message with typed placeholders where variables were, and the list of its
//! variables:
//!
//! ```text
//! 2023-01-01 10:00:00 ERROR code=42 from 10.0.0.1
//! \__________________/\____________\/_____\______/
//!      timestamp        logtype: " ERROR code=<int> from <dict>"
//!                                         vars: [42, id("10.0.0.1")]
//! ```
//!
//! Integers and floats that round-trip exactly are encoded directly into a
//! 64-bit value. Other variables, and logtypes themselves, are deduplicated
//! in dictionaries. The encoded messages of a file are stored as three
//! columns (timestamps, logtype IDs, variables) inside a compressed
//! *segment*, which holds many files.
//!
//! An archive is a directory holding both dictionaries, its segments and
//! the metadata of its files. When a dictionary or a file grows too large,
//! the writer splits the archive or the file; a global metadata DB keeps
//! track of archives across splits.
//!
//! Searching uses wildcard strings (`*` and `?`). A search string is resolved
//! against the dictionaries first, so only segments that can contain a
//! match are decompressed.
//!
//! # Example usage
//!
//! ```
//! # fn main() -> log_archive::Result<()> {
//! use log_archive::{
//!     ArchiveReader, ArchiveWriter, Config, FileCompressor, MemoryReader,
//!     MockGlobalMetadataDb, Query, ReaderConfig, SearchOptions,
//! };
//! use std::sync::Arc;
//!
//! # let folder = tempfile::tempdir()?;
//! # let path = folder.path();
//! let global_db = MockGlobalMetadataDb::default();
//! let writer = ArchiveWriter::open(Config::new(path), Arc::new(global_db.clone()))?;
//!
//! let mut compressor = FileCompressor::new(writer);
//! compressor.compress_reader(
//!     "app.log",
//!     0,
//!     MemoryReader::new(b"2023-01-01 ERROR code=42\n2023-01-01 INFO code=7\n"),
//! )?;
//! let archive = compressor.close()?;
//!
//! let mut reader = ArchiveReader::open(path.join(archive.id.to_string()), &ReaderConfig::default())?;
//! reader.refresh_dictionaries()?;
//!
//! let query = Query::build(
//!     "*code=42*",
//!     SearchOptions::default(),
//!     reader.logtype_dictionary(),
//!     reader.variable_dictionary(),
//! );
//!
//! let mut matches = vec![];
//! log_archive::search(&mut reader, &query, |result| matches.push(result.message))?;
//! assert_eq!(vec!["2023-01-01 ERROR code=42\n"], matches);
//! #
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![deny(clippy::unwrap_used, clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

pub mod archive;
mod coding;
mod column_cache;
mod compression;
mod compressor;
mod config;
pub mod dictionary;
pub mod encoding;
mod error;
mod extract;
mod file;
mod id;
pub mod interpreter;
pub mod logtype;
pub mod metadata;
mod mock;
pub mod parser;
mod path;
pub mod query;
pub mod reader;
pub mod segment;
mod timestamp;
mod version;

pub use {
    archive::{
        file::{Message, ReaderFile},
        reader::ArchiveReader,
        writer::{ArchiveWriter, SharedGlobalMetadataDb},
    },
    coding::{Decode, DecodeError, Encode, EncodeError},
    column_cache::ColumnCache,
    compression::CompressionType,
    compressor::FileCompressor,
    config::{Config, ReaderConfig},
    error::{Error, Result},
    extract::extract_to_dir,
    id::{LogtypeId, SegmentId, VariableId},
    metadata::{
        global::{FileGlobalMetadataDb, GlobalMetadataDb},
        ArchiveMetadata, FileFilter, FileMetadata,
    },
    query::{
        grep::{search, search_archives, SearchResult},
        Query, QueryMatch, SearchOptions, SubQuery,
    },
    reader::{
        buffered::BufferedReader,
        streaming::{StreamState, StreamingReader, StreamingReaderConfig},
        FileReader, MemoryReader, ReaderInterface, SequentialReader,
    },
    timestamp::{Timestamp, TimestampPattern, TimestampPatternChanges},
    version::Version,
};

#[doc(hidden)]
pub use mock::MockGlobalMetadataDb;
