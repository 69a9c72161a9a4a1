// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Runs queries against archives

use super::{Query, SearchOptions};
use crate::{
    archive::{
        archive_path,
        file::{Message, ReaderFile},
        reader::ArchiveReader,
    },
    metadata::{global::GlobalMetadataDb, FileFilter, FileMetadata},
    timestamp::Timestamp,
    Error, ReaderConfig,
};
use std::path::Path;
use uuid::Uuid;

/// A message matching a search
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchResult {
    /// Archive holding the message
    pub archive_id: Uuid,

    /// Path of the input file
    pub file_path: String,

    /// ID shared by all splits of the input file
    pub orig_file_id: Uuid,

    /// Index of the message in the unsplit input file
    pub message_ix: u64,

    /// Timestamp, 0 if the message has none
    pub timestamp: Timestamp,

    /// Original text of the message
    pub message: String,
}

/// Searches one archive, calling `callback` for every match.
///
/// Files outside the search time range and files in segments that can't
/// hold a match are skipped. A corrupt message ends the scan of its file
/// but not the search.
///
/// Returns the number of matches.
///
/// # Errors
///
/// Will return `Err` if an IO error occurs, or a file's columns can't be loaded.
pub fn search<F>(reader: &mut ArchiveReader, query: &Query, mut callback: F) -> crate::Result<u64>
where
    F: FnMut(SearchResult),
{
    if query.is_empty() {
        return Ok(0);
    }

    let options = query.options();
    let files = reader.files(&FileFilter {
        begin_ts: options.begin_ts,
        end_ts: options.end_ts,
        ..Default::default()
    });

    let mut file = ReaderFile::default();
    let mut message = Message::default();
    let mut count = 0;

    for metadata in &files {
        let sub_queries: Vec<_> = query.relevant_sub_queries(metadata.segment_id).collect();

        if sub_queries.is_empty() && !query.matches_everything() {
            log::trace!("Skipping file {} in segment {}", metadata.id, metadata.segment_id);
            continue;
        }

        reader.open_file(metadata, &mut file)?;

        match search_file(reader, &mut file, query, &sub_queries, &mut message, &mut callback) {
            Ok(n) => count += n,
            Err(Error::Corrupt(e)) => {
                log::warn!("Stopped searching {:?}: {e}", metadata.path);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(count)
}

fn search_file<F>(
    reader: &ArchiveReader,
    file: &mut ReaderFile,
    query: &Query,
    sub_queries: &[&super::SubQuery],
    message: &mut Message,
    callback: &mut F,
) -> crate::Result<u64>
where
    F: FnMut(SearchResult),
{
    let mut count = 0;
    let mut text = String::new();

    while let Some(matched) = reader.find_message_matching_query(file, query, sub_queries, message)? {
        if matched.wildcard_match_required() {
            text.clear();
            reader.decompress_message_without_ts(message, &mut text)?;

            if !query.matches_text(&text) {
                continue;
            }
        }

        let mut out = String::new();
        reader.decompress_message(file, message, &mut out)?;

        count += 1;
        callback(search_result(reader, file.metadata(), message, out));
    }

    Ok(count)
}

fn search_result(
    reader: &ArchiveReader,
    metadata: &FileMetadata,
    message: &Message,
    text: String,
) -> SearchResult {
    SearchResult {
        archive_id: reader.metadata().id,
        file_path: metadata.path.clone(),
        orig_file_id: metadata.orig_file_id,
        message_ix: metadata.begin_message_ix + message.message_ix(),
        timestamp: message.timestamp(),
        message: text,
    }
}

/// Searches every archive overlapping the search time range.
///
/// Archives are visited in creation order. An archive that fails to open
/// or to be searched is logged and skipped.
///
/// Returns the number of matches.
///
/// # Errors
///
/// Will return `Err` if the global metadata DB can't be read.
pub fn search_archives<P, F>(
    archives_dir: P,
    global_db: &dyn GlobalMetadataDb,
    search_string: &str,
    options: &SearchOptions,
    config: &ReaderConfig,
    mut callback: F,
) -> crate::Result<u64>
where
    P: AsRef<Path>,
    F: FnMut(SearchResult),
{
    let archives = global_db.archives_in_time_range(options.begin_ts, options.end_ts)?;
    log::debug!("Searching {} archive(s) for {search_string:?}", archives.len());

    let mut count = 0;

    for archive in archives {
        let path = archive_path(archives_dir.as_ref(), archive.id);

        let result = ArchiveReader::open(&path, config).and_then(|mut reader| {
            reader.refresh_dictionaries()?;

            let query = Query::build(
                search_string,
                options.clone(),
                reader.logtype_dictionary(),
                reader.variable_dictionary(),
            );

            search(&mut reader, &query, &mut callback)
        });

        match result {
            Ok(n) => count += n,
            Err(e) => log::error!("Failed to search archive {}: {e}", path.display()),
        }
    }

    Ok(count)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{ArchiveWriter, Config, MockGlobalMetadataDb};
    use std::sync::Arc;
    use test_log::test;

    fn write_archive(dir: &Path, lines: &[&str]) -> crate::Result<Uuid> {
        let mut writer = ArchiveWriter::open(
            Config::new(dir),
            Arc::new(MockGlobalMetadataDb::default()),
        )?;
        let id = writer.archive_id().expect("archive should be open");

        writer.create_and_open_file("app.log", 0, Uuid::new_v4(), 0)?;
        for line in lines {
            writer.write_msg(0, line, line.len() as u64)?;
        }
        writer.close_file()?;
        writer.close()?;

        Ok(id)
    }

    fn grep(dir: &Path, id: Uuid, search_string: &str, ignore_case: bool) -> crate::Result<Vec<String>> {
        let mut reader = ArchiveReader::open(archive_path(dir, id), &ReaderConfig::default())?;
        reader.refresh_dictionaries()?;

        let options = SearchOptions {
            ignore_case,
            ..Default::default()
        };
        let query = Query::build(
            search_string,
            options,
            reader.logtype_dictionary(),
            reader.variable_dictionary(),
        );

        let mut matches = vec![];
        search(&mut reader, &query, |x| matches.push(x.message))?;
        Ok(matches)
    }

    #[test]
    fn grep_variables() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let id = write_archive(
            dir.path(),
            &[
                "connected to 10.0.0.1 port 8080\n",
                "connected to 10.0.0.2 port 9090\n",
                "retry 3 of 5\n",
                "value 3.25 exceeded\n",
            ],
        )?;

        assert_eq!(
            vec!["connected to 10.0.0.2 port 9090\n"],
            grep(dir.path(), id, "*port 9090*", false)?
        );
        assert_eq!(2, grep(dir.path(), id, "connected to 10.0.0.*", false)?.len());
        assert_eq!(vec!["retry 3 of 5\n"], grep(dir.path(), id, "retry ? of *", false)?);
        assert_eq!(vec!["value 3.25 exceeded\n"], grep(dir.path(), id, "*3.2*", false)?);
        assert_eq!(4, grep(dir.path(), id, "*", false)?.len());
        assert!(grep(dir.path(), id, "*port 7070*", false)?.is_empty());

        Ok(())
    }

    #[test]
    fn grep_ignore_case() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let id = write_archive(dir.path(), &["User ALICE logged in\n", "user bob logged in\n"])?;

        assert_eq!(vec!["user bob logged in\n"], grep(dir.path(), id, "user*", false)?);
        assert_eq!(2, grep(dir.path(), id, "user*", true)?.len());
        assert_eq!(vec!["User ALICE logged in\n"], grep(dir.path(), id, "*alice*", true)?);

        Ok(())
    }
}
