mod common;

use common::{compress_inputs, decompress_all, open_archive};
use log_archive::{
    ArchiveWriter, CompressionType, Config, Error, FileCompressor, MemoryReader,
    MockGlobalMetadataDb, ReaderConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use test_log::test;

const INPUT: &str = "\
2024-03-01 08:15:00 INFO user=alice id=42 latency=3.25ms
2024-03-01 08:15:01 WARN path C:\\temp\\x with \\ and \u{11}\u{12}\u{13} bytes
2024-03-01 08:15:02 ERROR value -0.5 and 007 and -0 and 9223372036854775808
Caused by: java.io.IOException at Foo.bar(Foo.java:12)
\tat Baz.qux(Baz.java:1)
2024-03-01 08:15:03 DEBUG 0x1f 1e10 1.2.3.4 v2.0 key=value123 tabs\there
2024-03-01 08:15:04 TRACE unicode: grüße 日本 42€
2024-03-01 08:15:05 trailing spaces   \n";

fn round_trip(compression: CompressionType, input: &str) -> log_archive::Result<()> {
    let folder = tempfile::tempdir()?;
    let global_db = MockGlobalMetadataDb::default();

    let archive = compress_inputs(
        Config::new(folder.path()).compression(compression),
        &global_db,
        &[("input.log", input)],
    )?;

    let mut reader = open_archive(folder.path(), archive.id, &ReaderConfig::default())?;
    let files = decompress_all(&mut reader)?;

    assert_eq!(vec![("input.log".to_string(), input.to_string())], files);

    Ok(())
}

#[test]
fn round_trip_none() -> log_archive::Result<()> {
    round_trip(CompressionType::None, INPUT)
}

#[test]
#[cfg(feature = "lz4")]
fn round_trip_lz4() -> log_archive::Result<()> {
    round_trip(CompressionType::Lz4, INPUT)
}

#[test]
#[cfg(feature = "zstd")]
fn round_trip_zstd() -> log_archive::Result<()> {
    round_trip(CompressionType::Zstd(3), INPUT)
}

#[test]
fn round_trip_without_timestamps() -> log_archive::Result<()> {
    round_trip(
        CompressionType::None,
        "no timestamp here 1\nanother line 2.5\n\n\nlast line without newline",
    )
}

#[test]
fn round_trip_random() -> log_archive::Result<()> {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let words = ["GET", "/api/v1", "status=", "ok", "id", "-", "=", ".", "x9", "\\", "\u{12}"];

    let mut input = String::new();
    for _ in 0..500 {
        input.push_str("2024-01-01 00:00:00 ");

        for _ in 0..rng.gen_range(1..8) {
            match rng.gen_range(0..4) {
                0 => input.push_str(&rng.gen::<i64>().to_string()),
                1 => input.push_str(&format!("{:.3}", rng.gen_range(-1_000.0..1_000.0))),
                2 => input.push_str(&format!("{:x}", rng.gen::<u32>())),
                _ => input.push_str(words[rng.gen_range(0..words.len())]),
            }
            input.push(' ');
        }

        input.push('\n');
    }

    round_trip(CompressionType::None, &input)
}

#[test]
fn round_trip_rejects_invalid_utf8() -> log_archive::Result<()> {
    let folder = tempfile::tempdir()?;
    let global_db = MockGlobalMetadataDb::default();

    let writer = ArchiveWriter::open(Config::new(folder.path()), Arc::new(global_db))?;
    let mut compressor = FileCompressor::new(writer);

    let input = b"2024-01-01 00:00:00 fine 1\n2024-01-01 00:00:01 bad \xFF\xFE 2\n".to_vec();
    assert!(matches!(
        compressor.compress_reader("bad.log", 0, MemoryReader::new(input)),
        Err(Error::NotUtf8(27))
    ));

    // The compressor is still usable, and the rejected input left nothing behind
    compressor.compress_reader("good.log", 0, MemoryReader::new(b"good 1\n".to_vec()))?;
    let archive = compressor.close()?;

    let mut reader = open_archive(folder.path(), archive.id, &ReaderConfig::default())?;
    assert_eq!(
        vec![("good.log".to_string(), "good 1\n".to_string())],
        decompress_all(&mut reader)?
    );
    assert_eq!(7, archive.uncompressed_size);

    Ok(())
}
