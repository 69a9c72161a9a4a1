// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Metadata DB of all archives in an archives directory

use super::{
    read_table_file, read_vec, write_table_file, write_vec, ArchiveMetadata, FileMetadata,
    FileTable,
};
use crate::{file::GLOBAL_DB_FILE, path::absolute_path, timestamp::Timestamp, Error};
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};
use uuid::Uuid;

/// Cross-archive directory of archives and their files
///
/// Writers register every archive they create and report file metadata at
/// each segment close. Readers use it to select archives by time range and
/// to find the splits of an input file.
pub trait GlobalMetadataDb {
    /// Registers a new archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParam`] if the archive is already registered.
    fn add_archive(&self, archive: &ArchiveMetadata) -> crate::Result<()>;

    /// Replaces the metadata of a registered archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParam`] if the archive is not registered.
    fn update_archive_metadata(&self, archive: &ArchiveMetadata) -> crate::Result<()>;

    /// Inserts or replaces file metadata of an archive.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the update could not be persisted.
    fn update_metadata_for_files(&self, archive_id: Uuid, files: &[FileMetadata])
        -> crate::Result<()>;

    /// Returns all archives, ordered by creator and creation index.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the DB could not be read.
    fn archives(&self) -> crate::Result<Vec<ArchiveMetadata>>;

    /// Returns archives holding messages in `[begin_ts, end_ts]`, ordered by
    /// creator and creation index.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the DB could not be read.
    fn archives_in_time_range(
        &self,
        begin_ts: Timestamp,
        end_ts: Timestamp,
    ) -> crate::Result<Vec<ArchiveMetadata>>;

    /// Returns one split of an input file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the DB could not be read.
    fn get_file_split(&self, orig_file_id: Uuid, split_ix: u64)
        -> crate::Result<Option<FileMetadata>>;
}

/// Table state shared by the global DB implementations
#[derive(Debug, Default)]
pub(crate) struct GlobalTables {
    archives: Vec<ArchiveMetadata>,
    files: FileTable,
}

impl GlobalTables {
    pub(crate) fn decode(body: &[u8]) -> crate::Result<Self> {
        let mut reader = body;
        let archives = read_vec(&mut reader)?;
        let files = FileTable::new(read_vec(&mut reader)?);
        Ok(Self { archives, files })
    }

    pub(crate) fn encode(&self) -> crate::Result<Vec<u8>> {
        let mut body = vec![];
        write_vec(&mut body, &self.archives)?;
        write_vec(&mut body, self.files.rows())?;
        Ok(body)
    }

    pub(crate) fn add_archive(&mut self, archive: &ArchiveMetadata) -> crate::Result<()> {
        if self.archives.iter().any(|x| x.id == archive.id) {
            return Err(Error::BadParam("archive is already registered"));
        }
        self.archives.push(archive.clone());
        Ok(())
    }

    pub(crate) fn update_archive(&mut self, archive: &ArchiveMetadata) -> crate::Result<()> {
        let row = self
            .archives
            .iter_mut()
            .find(|x| x.id == archive.id)
            .ok_or(Error::BadParam("archive is not registered"))?;
        row.clone_from(archive);
        Ok(())
    }

    pub(crate) fn update_files(&mut self, archive_id: Uuid, files: &[FileMetadata]) {
        for file in files {
            let mut file = file.clone();
            file.archive_id = archive_id;

            self.files.upsert(file);
        }
    }

    pub(crate) fn archives<F: Fn(&ArchiveMetadata) -> bool>(
        &self,
        predicate: F,
    ) -> Vec<ArchiveMetadata> {
        let mut archives: Vec<_> = self.archives.iter().filter(|&x| predicate(x)).cloned().collect();
        archives.sort_by_key(|x| (x.creator_id, x.creation_index));
        archives
    }

    pub(crate) fn file_split(&self, orig_file_id: Uuid, split_ix: u64) -> Option<FileMetadata> {
        self.files
            .rows()
            .iter()
            .find(|x| x.orig_file_id == orig_file_id && x.split_ix == split_ix)
            .cloned()
    }
}

/// Global metadata DB stored in a single file
///
/// Every update rewrites the file atomically.
pub struct FileGlobalMetadataDb {
    path: PathBuf,
    tables: Mutex<GlobalTables>,
}

impl std::fmt::Debug for FileGlobalMetadataDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileGlobalMetadataDb({})", self.path.display())
    }
}

impl FileGlobalMetadataDb {
    /// Opens the `global.db` file in a folder, creating it if needed.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the file is corrupt.
    pub fn open<P: AsRef<Path>>(folder: P) -> crate::Result<Self> {
        let folder = absolute_path(folder)?;
        std::fs::create_dir_all(&folder)?;

        let path = folder.join(GLOBAL_DB_FILE);

        let tables = if path.try_exists()? {
            log::debug!("Loading global metadata DB from {}", path.display());
            GlobalTables::decode(&read_table_file(&path)?)?
        } else {
            log::debug!("Creating global metadata DB at {}", path.display());
            let tables = GlobalTables::default();
            write_table_file(&path, &tables.encode()?)?;
            tables
        };

        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    /// Path of the DB file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_tables<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&mut GlobalTables) -> crate::Result<T>,
    {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| Error::Failure("global metadata DB lock is poisoned".into()))?;
        f(&mut *tables)
    }

    fn update<F>(&self, f: F) -> crate::Result<()>
    where
        F: FnOnce(&mut GlobalTables) -> crate::Result<()>,
    {
        self.with_tables(|tables| {
            f(tables)?;
            write_table_file(&self.path, &tables.encode()?)
        })
    }
}

impl GlobalMetadataDb for FileGlobalMetadataDb {
    fn add_archive(&self, archive: &ArchiveMetadata) -> crate::Result<()> {
        self.update(|tables| tables.add_archive(archive))
    }

    fn update_archive_metadata(&self, archive: &ArchiveMetadata) -> crate::Result<()> {
        self.update(|tables| tables.update_archive(archive))
    }

    fn update_metadata_for_files(
        &self,
        archive_id: Uuid,
        files: &[FileMetadata],
    ) -> crate::Result<()> {
        self.update(|tables| {
            tables.update_files(archive_id, files);
            Ok(())
        })
    }

    fn archives(&self) -> crate::Result<Vec<ArchiveMetadata>> {
        self.with_tables(|tables| Ok(tables.archives(|_| true)))
    }

    fn archives_in_time_range(
        &self,
        begin_ts: Timestamp,
        end_ts: Timestamp,
    ) -> crate::Result<Vec<ArchiveMetadata>> {
        self.with_tables(|tables| Ok(tables.archives(|x| x.overlaps(begin_ts, end_ts))))
    }

    fn get_file_split(
        &self,
        orig_file_id: Uuid,
        split_ix: u64,
    ) -> crate::Result<Option<FileMetadata>> {
        self.with_tables(|tables| Ok(tables.file_split(orig_file_id, split_ix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::tests::sample_file, CompressionType};
    use test_log::test;

    #[test]
    fn global_db_reopen() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let creator = Uuid::new_v4();

        let mut second = ArchiveMetadata::new(Uuid::new_v4(), creator, 1, CompressionType::None);
        let mut first = ArchiveMetadata::new(Uuid::new_v4(), creator, 0, CompressionType::None);

        let mut file = sample_file("a.log", 0);
        file.split_ix = 1;

        {
            let db = FileGlobalMetadataDb::open(folder.path())?;
            db.add_archive(&second)?;
            db.add_archive(&first)?;
            assert!(matches!(db.add_archive(&first), Err(Error::BadParam(_))));

            first.expand_time_range(0, 10);
            second.expand_time_range(20, 30);
            db.update_archive_metadata(&first)?;
            db.update_archive_metadata(&second)?;

            db.update_metadata_for_files(second.id, &[file.clone()])?;
        }

        let db = FileGlobalMetadataDb::open(folder.path())?;

        assert_eq!(vec![first.clone(), second.clone()], db.archives()?);
        assert_eq!(vec![second.clone()], db.archives_in_time_range(15, 25)?);
        assert!(db.archives_in_time_range(11, 19)?.is_empty());

        let split = db.get_file_split(file.orig_file_id, 1)?;
        assert_eq!(Some(second.id), split.map(|x| x.archive_id));
        assert!(db.get_file_split(file.orig_file_id, 0)?.is_none());

        Ok(())
    }

    #[test]
    fn global_db_update_unknown_archive() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let db = FileGlobalMetadataDb::open(folder.path())?;

        let archive = ArchiveMetadata::new(Uuid::new_v4(), Uuid::new_v4(), 0, CompressionType::None);
        assert!(matches!(
            db.update_archive_metadata(&archive),
            Err(Error::BadParam(_))
        ));
        Ok(())
    }
}
