// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-archive metadata DB of files and empty directories

use super::{
    read_table_file, read_vec, write_table_file, write_vec, ArchiveMetadata, FileFilter,
    FileMetadata, FileTable,
};
use crate::coding::{read_str, write_str};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::path::{Path, PathBuf};

/// Per-archive metadata DB
///
/// Holds three tables: the archive itself, its files and the empty
/// directories recorded during compression.
#[derive(Debug)]
pub struct MetadataDb {
    path: PathBuf,
    archives: Vec<ArchiveMetadata>,
    files: FileTable,
    empty_directories: Vec<String>,
}

impl MetadataDb {
    /// Creates an empty DB file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn create<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = Self {
            path: path.as_ref().into(),
            archives: Vec::new(),
            files: FileTable::default(),
            empty_directories: Vec::new(),
        };
        db.persist()?;
        Ok(db)
    }

    /// Loads a DB file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Corrupt`] if the checksum does not match.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        log::trace!("Loading metadata DB from {}", path.display());

        let body = read_table_file(path)?;
        let mut reader = body.as_slice();

        let archives = read_vec(&mut reader)?;
        let files = FileTable::new(read_vec(&mut reader)?);

        let num_dirs = reader.read_u64::<BigEndian>()?;
        let mut empty_directories = Vec::new();
        for _ in 0..num_dirs {
            empty_directories.push(read_str(&mut reader, "empty directory")?);
        }

        Ok(Self {
            path: path.into(),
            archives,
            files,
            empty_directories,
        })
    }

    /// Writes all tables to disk.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn persist(&self) -> crate::Result<()> {
        let mut body = vec![];
        write_vec(&mut body, &self.archives)?;
        write_vec(&mut body, self.files.rows())?;

        body.write_u64::<BigEndian>(self.empty_directories.len() as u64)?;
        for dir in &self.empty_directories {
            write_str(&mut body, dir)?;
        }

        write_table_file(&self.path, &body)
    }

    /// Inserts or replaces the archive row.
    pub fn update_archive(&mut self, archive: &ArchiveMetadata) {
        match self.archives.iter_mut().find(|x| x.id == archive.id) {
            Some(row) => row.clone_from(archive),
            None => self.archives.push(archive.clone()),
        }
    }

    /// Inserts or replaces file rows.
    pub fn update_files(&mut self, files: &[FileMetadata]) {
        for file in files {
            self.files.upsert(file.clone());
        }
    }

    /// Records empty directories.
    pub fn add_empty_directories<I: IntoIterator<Item = String>>(&mut self, dirs: I) {
        for dir in dirs {
            if !self.empty_directories.contains(&dir) {
                self.empty_directories.push(dir);
            }
        }
    }

    /// Archive rows
    #[must_use]
    pub fn archives(&self) -> &[ArchiveMetadata] {
        &self.archives
    }

    /// All file rows, in insertion order
    #[must_use]
    pub fn files(&self) -> &[FileMetadata] {
        self.files.rows()
    }

    /// Files passing the filter, ordered by segment and position in the segment.
    #[must_use]
    pub fn iter_files(&self, filter: &FileFilter) -> Vec<&FileMetadata> {
        let mut files: Vec<_> = self.files.rows().iter().filter(|x| filter.matches(x)).collect();
        files.sort_by_key(|x| (x.segment_id, x.timestamps_offset));
        files
    }

    /// Recorded empty directories
    #[must_use]
    pub fn empty_directories(&self) -> &[String] {
        &self.empty_directories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::tests::sample_file, CompressionType};
    use test_log::test;
    use uuid::Uuid;

    #[test]
    fn metadata_db_round_trip() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let path = folder.path().join("metadata.db");

        let mut db = MetadataDb::create(&path)?;

        let archive = ArchiveMetadata::new(Uuid::new_v4(), Uuid::new_v4(), 0, CompressionType::None);
        db.update_archive(&archive);

        let mut a = sample_file("a.log", 1);
        let b = sample_file("b.log", 0);
        db.update_files(&[a.clone(), b.clone()]);

        a.num_messages = 99;
        db.update_files(&[a.clone()]);

        db.add_empty_directories(["logs/empty".to_string(), "logs/empty".to_string()]);
        db.persist()?;

        let db = MetadataDb::open(&path)?;
        assert_eq!(&[archive], db.archives());
        assert_eq!(2, db.files().len());
        assert_eq!(&["logs/empty".to_string()], db.empty_directories());

        let files = db.iter_files(&FileFilter::default());
        assert_eq!(vec![&b, &a], files);

        Ok(())
    }
}
