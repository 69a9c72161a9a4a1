// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    archive::writer::ArchiveWriter,
    metadata::ArchiveMetadata,
    reader::{buffered::BufferedReader, FileReader, ReaderInterface},
    timestamp::{Timestamp, TimestampPattern},
    Error,
};
use std::path::Path;
use uuid::Uuid;

/// Message that is still collecting continuation lines
#[derive(Debug)]
struct PendingMessage {
    timestamp: Timestamp,
    pattern: Option<TimestampPattern>,

    /// Text without the timestamp
    text: String,

    num_uncompressed_bytes: u64,
}

/// Splits inputs into messages and writes them to an archive
///
/// Lines are read with a [`BufferedReader`]. A line that starts with a
/// timestamp starts a new message. Once a file had a timestamp, lines
/// without one are appended to the previous message.
///
/// Before each message, the archive is split if the dictionaries reached
/// their target size, else the file is split if it reached its target size.
#[allow(clippy::module_name_repetitions)]
pub struct FileCompressor {
    writer: ArchiveWriter,
    line: Vec<u8>,
}

impl std::fmt::Debug for FileCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileCompressor({:?})", self.writer)
    }
}

impl FileCompressor {
    /// Creates a compressor writing to `writer`.
    #[must_use]
    pub fn new(writer: ArchiveWriter) -> Self {
        Self {
            writer,
            line: Vec::new(),
        }
    }

    /// Archive writer
    #[must_use]
    pub fn writer(&self) -> &ArchiveWriter {
        &self.writer
    }

    /// Compresses a file or, recursively, a directory.
    ///
    /// Files that fail to compress are logged and skipped. Directories
    /// without entries are recorded in the archive.
    ///
    /// Returns the number of compressed files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a directory can't be listed, or the archive
    /// metadata can't be written.
    pub fn compress_path<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<u64> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Ok(u64::from(self.compress_file_logged(path)));
        }

        let mut empty_directories = vec![];
        let count = self.compress_dir(path, &mut empty_directories)?;

        if !empty_directories.is_empty() {
            self.writer.add_empty_directories(empty_directories)?;
        }

        Ok(count)
    }

    fn compress_dir(&mut self, dir: &Path, empty_directories: &mut Vec<String>) -> crate::Result<u64> {
        let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(std::fs::DirEntry::file_name);

        if entries.is_empty() {
            empty_directories.push(dir.to_string_lossy().into());
            return Ok(0);
        }

        let mut count = 0;

        for entry in entries {
            let path = entry.path();

            if entry.file_type()?.is_dir() {
                count += self.compress_dir(&path, empty_directories)?;
            } else {
                count += u64::from(self.compress_file_logged(&path));
            }
        }

        Ok(count)
    }

    fn compress_file_logged(&mut self, path: &Path) -> bool {
        match self.compress_file(path) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to compress {}: {e}", path.display());
                false
            }
        }
    }

    /// Compresses one file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the file does not exist, or
    /// any error of [`FileCompressor::compress_reader`].
    pub fn compress_file<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        let reader = FileReader::open(path)?;
        self.compress_reader(&path.to_string_lossy(), 0, reader)
    }

    /// Compresses an input read from `reader`, stored under `path`.
    ///
    /// If compression fails part-way, the open part of the file is discarded.
    /// Parts that were already split off are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotUtf8`] if the input is not valid UTF-8. Will
    /// return `Err` if an IO error occurs, or a dictionary is full.
    pub fn compress_reader<R: ReaderInterface>(
        &mut self,
        path: &str,
        group_id: u64,
        reader: R,
    ) -> crate::Result<()> {
        log::debug!("Compressing {path:?}");

        self.writer
            .create_and_open_file(path, group_id, Uuid::new_v4(), 0)?;

        match self.compress_messages(reader) {
            Ok(()) => self.writer.close_file(),
            Err(e) => {
                if self.writer.is_file_open() {
                    self.writer.discard_file()?;
                }
                Err(e)
            }
        }
    }

    fn compress_messages<R: ReaderInterface>(&mut self, reader: R) -> crate::Result<()> {
        let mut reader = BufferedReader::new(reader)?;
        let mut pattern: Option<TimestampPattern> = None;
        let mut pending: Option<PendingMessage> = None;
        let mut offset = 0;

        loop {
            match reader.try_read_to_delimiter(b'\n', true, false, &mut self.line) {
                Ok(()) => {}
                Err(Error::EndOfFile) => break,
                Err(e) => return Err(e),
            }

            let line = std::str::from_utf8(&self.line).map_err(|_| Error::NotUtf8(offset))?;
            let num_bytes = self.line.len() as u64;
            offset += num_bytes;

            let parsed = pattern
                .as_ref()
                .and_then(|p| p.parse(&line).map(|(ts, range)| (p.clone(), ts, range)))
                .or_else(|| TimestampPattern::search_known(&line));

            match parsed {
                Some((new_pattern, timestamp, range)) => {
                    let mut text = String::with_capacity(line.len() - range.len());
                    text.push_str(line.get(..range.start).unwrap_or_default());
                    text.push_str(line.get(range.end..).unwrap_or_default());

                    let previous = pending.replace(PendingMessage {
                        timestamp,
                        pattern: Some(new_pattern.clone()),
                        text,
                        num_uncompressed_bytes: num_bytes,
                    });
                    pattern = Some(new_pattern);

                    if let Some(message) = previous {
                        write_message(&mut self.writer, message)?;
                    }
                }
                None => {
                    if let (Some(message), Some(_)) = (pending.as_mut(), &pattern) {
                        message.text.push_str(&line);
                        message.num_uncompressed_bytes += num_bytes;
                        continue;
                    }

                    let previous = pending.replace(PendingMessage {
                        timestamp: 0,
                        pattern: None,
                        text: line.into(),
                        num_uncompressed_bytes: num_bytes,
                    });

                    if let Some(message) = previous {
                        write_message(&mut self.writer, message)?;
                    }
                }
            }
        }

        if let Some(message) = pending {
            write_message(&mut self.writer, message)?;
        }

        Ok(())
    }

    /// Closes the archive writer.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn close(self) -> crate::Result<ArchiveMetadata> {
        self.writer.close()
    }
}

fn write_message(writer: &mut ArchiveWriter, message: PendingMessage) -> crate::Result<()> {
    let config = writer.config();
    let dicts_full = writer.dictionaries_data_size() >= config.target_data_size_of_dicts;
    let file_full = writer.encoded_file_size() > 0
        && writer.encoded_file_size() >= config.target_encoded_file_size;

    if dicts_full {
        writer.split_archive()?;
    } else if file_full {
        writer.split_file()?;
    }

    if let Some(pattern) = message.pattern {
        writer.change_ts_pattern(pattern)?;
    }

    writer.write_msg(
        message.timestamp,
        &message.text,
        message.num_uncompressed_bytes,
    )
}
