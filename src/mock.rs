// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    metadata::global::{GlobalMetadataDb, GlobalTables},
    timestamp::Timestamp,
    ArchiveMetadata, Error, FileMetadata,
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

type MockGlobalMetadataDbInner = RwLock<GlobalTables>;

/// Mock in-memory global metadata DB
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default)]
pub struct MockGlobalMetadataDb(Arc<MockGlobalMetadataDbInner>);

impl MockGlobalMetadataDb {
    fn read(&self) -> crate::Result<RwLockReadGuard<'_, GlobalTables>> {
        self.0
            .read()
            .map_err(|_| Error::Failure("lock is poisoned".into()))
    }

    fn write(&self) -> crate::Result<RwLockWriteGuard<'_, GlobalTables>> {
        self.0
            .write()
            .map_err(|_| Error::Failure("lock is poisoned".into()))
    }
}

impl GlobalMetadataDb for MockGlobalMetadataDb {
    fn add_archive(&self, archive: &ArchiveMetadata) -> crate::Result<()> {
        self.write()?.add_archive(archive)
    }

    fn update_archive_metadata(&self, archive: &ArchiveMetadata) -> crate::Result<()> {
        self.write()?.update_archive(archive)
    }

    fn update_metadata_for_files(
        &self,
        archive_id: Uuid,
        files: &[FileMetadata],
    ) -> crate::Result<()> {
        self.write()?.update_files(archive_id, files);
        Ok(())
    }

    fn archives(&self) -> crate::Result<Vec<ArchiveMetadata>> {
        Ok(self.read()?.archives(|_| true))
    }

    fn archives_in_time_range(
        &self,
        begin_ts: Timestamp,
        end_ts: Timestamp,
    ) -> crate::Result<Vec<ArchiveMetadata>> {
        Ok(self.read()?.archives(|x| x.overlaps(begin_ts, end_ts)))
    }

    fn get_file_split(
        &self,
        orig_file_id: Uuid,
        split_ix: u64,
    ) -> crate::Result<Option<FileMetadata>> {
        Ok(self.read()?.file_split(orig_file_id, split_ix))
    }
}
