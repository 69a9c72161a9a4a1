// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    archive::{archive_path, reader::ArchiveReader},
    metadata::{global::GlobalMetadataDb, FileFilter},
    path::strip_root,
    ReaderConfig,
};
use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

/// Decompresses every archive into `output_dir`.
///
/// Archives are visited in creation order. Files are written under their
/// original path, made relative to `output_dir`. Splits of the same input
/// file are concatenated in split order, so the input is reproduced even if
/// it was split across archives.
///
/// Returns the number of files (splits) written.
///
/// # Errors
///
/// Will return `Err` if the output directory or a file can't be written,
/// or an archive can't be read.
pub fn extract_to_dir<P: AsRef<Path>, Q: AsRef<Path>>(
    archives_dir: P,
    global_db: &dyn GlobalMetadataDb,
    output_dir: Q,
    config: &ReaderConfig,
) -> crate::Result<u64> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let mut count = 0;
    let mut text = String::new();

    for archive in global_db.archives()? {
        let path = archive_path(archives_dir.as_ref(), archive.id);
        log::debug!("Extracting archive {}", path.display());

        let mut reader = ArchiveReader::open(&path, config)?;
        reader.refresh_dictionaries()?;

        let mut files = reader.files(&FileFilter::default());
        files.sort_by_key(|x| (x.orig_file_id, x.split_ix));

        for file in &files {
            let target = output_path(output_dir, &file.path);

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            text.clear();
            reader.decompress_file(file, &mut text)?;

            // Later splits continue the output of the first one
            let mut output = OpenOptions::new()
                .create(true)
                .write(true)
                .append(file.split_ix > 0)
                .truncate(file.split_ix == 0)
                .open(&target)?;
            output.write_all(text.as_bytes())?;
            output.sync_all()?;

            count += 1;
        }

        for dir in reader.empty_directories() {
            std::fs::create_dir_all(output_path(output_dir, dir))?;
        }
    }

    log::debug!("Extracted {count} file(s) to {}", output_dir.display());

    Ok(count)
}

fn output_path(output_dir: &Path, original: &str) -> PathBuf {
    output_dir.join(strip_root(original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArchiveWriter, Config, MockGlobalMetadataDb};
    use std::sync::Arc;
    use test_log::test;
    use uuid::Uuid;

    #[test]
    fn extract_splits_across_archives() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        let global_db = MockGlobalMetadataDb::default();

        let mut writer = ArchiveWriter::open(Config::new(dir.path()), Arc::new(global_db.clone()))?;
        writer.create_and_open_file("/logs/a.log", 0, Uuid::new_v4(), 0)?;
        writer.write_msg(0, "first\n", 6)?;
        writer.split_file()?;
        writer.write_msg(0, "second\n", 7)?;
        writer.split_archive()?;
        writer.write_msg(0, "third\n", 6)?;
        writer.close_file()?;
        writer.add_empty_directories(["/logs/empty".to_string()])?;
        writer.close()?;

        let count = extract_to_dir(dir.path(), &global_db, out.path(), &ReaderConfig::default())?;
        assert_eq!(3, count);

        let text = std::fs::read_to_string(out.path().join("logs/a.log"))?;
        assert_eq!("first\nsecond\nthird\n", text);
        assert!(out.path().join("logs/empty").is_dir());

        Ok(())
    }
}
