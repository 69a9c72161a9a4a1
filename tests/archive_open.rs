mod common;

use common::compress_inputs;
use log_archive::{ArchiveReader, Config, Error, MockGlobalMetadataDb, ReaderConfig};
use std::io::{Seek, SeekFrom, Write};
use test_log::test;

#[test]
fn archive_open_missing() -> log_archive::Result<()> {
    let folder = tempfile::tempdir()?;

    assert!(matches!(
        ArchiveReader::open(folder.path().join("nope"), &ReaderConfig::default()),
        Err(Error::FileNotFound(_))
    ));

    Ok(())
}

#[test]
fn archive_open_version_mismatch() -> log_archive::Result<()> {
    let folder = tempfile::tempdir()?;
    let global_db = MockGlobalMetadataDb::default();

    let archive = compress_inputs(
        Config::new(folder.path()),
        &global_db,
        &[("a.log", "hello 1\n")],
    )?;
    let path = folder.path().join(archive.id.to_string());

    ArchiveReader::open(&path, &ReaderConfig::default())?;

    {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(path.join("metadata"))?;

        // Version byte follows the 3 magic bytes
        file.seek(SeekFrom::Start(3))?;
        file.write_all(&[99])?;
        file.sync_all()?;
    }

    assert!(matches!(
        ArchiveReader::open(&path, &ReaderConfig::default()),
        Err(Error::InvalidVersion(_))
    ));

    Ok(())
}
