// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};
use std::path::PathBuf;

/// Represents errors that can occur while writing, reading or searching archives
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Invalid argument passed to an operation
    BadParam(&'static str),

    /// Operation called out of order (e.g. writing a message before opening a file)
    NotInit(&'static str),

    /// Reached the end of the underlying data source
    EndOfFile,

    /// A read or seek stopped short of its requested target
    Truncated,

    /// Operation is not valid in the current mode (e.g. backward seek without checkpoint)
    Unsupported,

    /// On-disk or in-memory invariant violated
    Corrupt(String),

    /// Invalid data format version
    ///
    /// Holds the unknown version byte, or `None` if the file header
    /// is not recognized at all.
    InvalidVersion(Option<u8>),

    /// File or directory does not exist
    FileNotFound(PathBuf),

    /// A dictionary ran out of ids
    IdSpaceExhausted {
        /// Name of the dictionary
        dictionary: &'static str,

        /// Maximum id of the dictionary
        max_id: u64,
    },

    /// A blocking operation did not complete in time
    Timeout,

    /// Input text is not valid UTF-8, starting in the line at the given byte offset
    NotUtf8(u64),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// Third-party library failure (compression codec, download source, ...)
    Failure(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Corrupt(what) => write!(f, "LogArchiveError: corrupt data: {what}"),
            Self::FileNotFound(path) => {
                write!(f, "LogArchiveError: file not found: {}", path.display())
            }
            Self::IdSpaceExhausted { dictionary, max_id } => write!(
                f,
                "LogArchiveError: {dictionary} dictionary exhausted its id space (max id {max_id})"
            ),
            Self::InvalidVersion(Some(version)) => {
                write!(f, "LogArchiveError: unsupported format version {version}")
            }
            Self::InvalidVersion(None) => write!(f, "LogArchiveError: unrecognized file header"),
            Self::NotUtf8(offset) => write!(
                f,
                "LogArchiveError: input is not valid UTF-8 (line at byte {offset})"
            ),
            _ => write!(f, "LogArchiveError: {self:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(value: tempfile::PersistError) -> Self {
        Self::Io(value.error)
    }
}

/// Log archive result
pub type Result<T> = std::result::Result<T, Error>;
