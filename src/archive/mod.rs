// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Archive writer and reader
//!
//! An archive is a directory named after its ID, inside the archives
//! directory:
//!
//! ```text
//! <archives_dir>/<archive_id>/
//!   metadata
//!   metadata.db
//!   logtype.dict
//!   logtype.segindex
//!   var.dict
//!   var.segindex
//!   schema.txt
//!   s/<segment_id>
//! ```

pub mod file;
pub mod reader;
pub mod writer;

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Folder of an archive inside the archives directory
#[must_use]
pub fn archive_path<P: AsRef<Path>>(archives_dir: P, archive_id: Uuid) -> PathBuf {
    archives_dir.as_ref().join(archive_id.to_string())
}
