// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use log_archive::{
    search, ArchiveMetadata, ArchiveReader, ArchiveWriter, Config, FileCompressor, FileFilter,
    MemoryReader, MockGlobalMetadataDb, Query, ReaderConfig, SearchOptions, SearchResult,
};
use std::{path::Path, sync::Arc};
use uuid::Uuid;

/// Compresses in-memory inputs into an archive directory.
///
/// Returns the metadata of the last archive written.
#[allow(unused)]
pub fn compress_inputs(
    config: Config,
    global_db: &MockGlobalMetadataDb,
    inputs: &[(&str, &str)],
) -> log_archive::Result<ArchiveMetadata> {
    let writer = ArchiveWriter::open(config, Arc::new(global_db.clone()))?;
    let mut compressor = FileCompressor::new(writer);

    for (path, content) in inputs {
        compressor.compress_reader(path, 0, MemoryReader::new(content.as_bytes().to_vec()))?;
    }

    compressor.close()
}

/// Opens an archive and loads its dictionaries.
#[allow(unused)]
pub fn open_archive(
    archives_dir: &Path,
    id: Uuid,
    config: &ReaderConfig,
) -> log_archive::Result<ArchiveReader> {
    let mut reader = ArchiveReader::open(archives_dir.join(id.to_string()), config)?;
    reader.refresh_dictionaries()?;
    Ok(reader)
}

/// Runs a search against one archive.
#[allow(unused)]
pub fn grep(
    reader: &mut ArchiveReader,
    search_string: &str,
    options: SearchOptions,
) -> log_archive::Result<Vec<SearchResult>> {
    let query = Query::build(
        search_string,
        options,
        reader.logtype_dictionary(),
        reader.variable_dictionary(),
    );

    let mut results = vec![];
    search(reader, &query, |result| results.push(result))?;
    Ok(results)
}

/// Decompresses all files of an archive, in segment order.
#[allow(unused)]
pub fn decompress_all(reader: &mut ArchiveReader) -> log_archive::Result<Vec<(String, String)>> {
    let mut files = vec![];

    for file in reader.files(&FileFilter::default()) {
        let mut text = String::new();
        reader.decompress_file(&file, &mut text)?;
        files.push((file.path.clone(), text));
    }

    Ok(files)
}
