// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Insert-or-get string dictionaries
//!
//! A dictionary is persisted in two files:
//!
//! - values: `[u64 entry_count][compressed stream of [u64 len][bytes]*]`
//! - segment index: `[u64 segment_count][compressed stream of [u64 segment_id][u64 count][u64 id]*]`
//!
//! The uncompressed count headers are rewritten in place every time the
//! writer flushes, so a reader can load the entries of a dictionary that is
//! still being written.

pub mod reader;
pub mod writer;

use crate::{
    id::{DictionaryId, LogtypeId, VariableId},
    logtype::LogtypeEntry,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom},
    path::Path,
};

pub use reader::DictionaryReader;
pub use writer::DictionaryWriter;

/// Highest id of the logtype dictionary
pub const LOGTYPE_DICTIONARY_MAX_ID: LogtypeId = u32::MAX as LogtypeId;

/// Highest id of the variable dictionary (stored in 8-byte encoded variables)
pub const VARIABLE_DICTIONARY_MAX_ID: VariableId = i64::MAX as VariableId;

/// Size of the uncompressed count header
pub(crate) const HEADER_SIZE: u64 = std::mem::size_of::<u64>() as u64;

/// An entry type a [`DictionaryReader`] can load
pub trait DictionaryEntry: Sized {
    /// Builds the entry from its stored value.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the value is malformed.
    fn from_value(id: DictionaryId, value: String) -> crate::Result<Self>;

    /// The stored value
    fn value(&self) -> &str;
}

/// Variable dictionary entry
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VariableEntry {
    id: VariableId,
    value: String,
}

impl VariableEntry {
    /// Dictionary id
    #[must_use]
    pub fn id(&self) -> VariableId {
        self.id
    }
}

impl DictionaryEntry for VariableEntry {
    fn from_value(id: DictionaryId, value: String) -> crate::Result<Self> {
        Ok(Self { id, value })
    }

    fn value(&self) -> &str {
        &self.value
    }
}

impl DictionaryEntry for LogtypeEntry {
    fn from_value(id: DictionaryId, value: String) -> crate::Result<Self> {
        Self::parse(id, value)
    }

    fn value(&self) -> &str {
        Self::value(self)
    }
}

/// Logtype dictionary reader
pub type LogtypeDictionaryReader = DictionaryReader<LogtypeEntry>;

/// Variable dictionary reader
pub type VariableDictionaryReader = DictionaryReader<VariableEntry>;

/// Rewrites the count header at the start of a dictionary file.
pub(crate) fn write_header<P: AsRef<Path>>(path: P, count: u64) -> crate::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_u64::<BigEndian>(count)?;
    file.sync_data()?;
    Ok(())
}

/// Reads the count header at the start of a dictionary file.
pub(crate) fn read_header<P: AsRef<Path>>(path: P) -> crate::Result<u64> {
    let mut file = File::open(path)?;
    Ok(file.read_u64::<BigEndian>()?)
}
