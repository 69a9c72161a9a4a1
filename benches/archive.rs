use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use log_archive::{
    search, ArchiveReader, ArchiveWriter, CompressionType, Config, FileCompressor, MemoryReader,
    MockGlobalMetadataDb, Query, ReaderConfig, SearchOptions,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

fn generate_lines(count: usize) -> String {
    let mut rng = StdRng::seed_from_u64(0);
    let levels = ["INFO", "WARN", "ERROR", "DEBUG"];
    let mut input = String::new();

    for i in 0..count {
        let level = levels[rng.gen_range(0..levels.len())];

        let line = match rng.gen_range(0..3) {
            0 => format!(
                "2024-05-01 10:{:02}:{:02},{:03} {level} request id={} took {}.{}ms\n",
                (i / 60_000) % 60,
                (i / 1_000) % 60,
                i % 1_000,
                rng.gen_range(0..100_000),
                rng.gen_range(0..500),
                rng.gen_range(0..10),
            ),
            1 => format!(
                "2024-05-01 10:{:02}:{:02},{:03} {level} conn from 10.0.{}.{} port {}\n",
                (i / 60_000) % 60,
                (i / 1_000) % 60,
                i % 1_000,
                rng.gen_range(0..4),
                rng.gen_range(0..255),
                rng.gen_range(1_024..65_535),
            ),
            _ => format!(
                "2024-05-01 10:{:02}:{:02},{:03} {level} user=u{} session 0x{:x} closed\n",
                (i / 60_000) % 60,
                (i / 1_000) % 60,
                i % 1_000,
                rng.gen_range(0..1_000),
                rng.gen::<u32>(),
            ),
        };

        input.push_str(&line);
    }

    input
}

fn compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    group.sample_size(10);

    let input = generate_lines(100_000);
    group.throughput(Throughput::Bytes(input.len() as u64));

    for compression in [
        CompressionType::None,
        CompressionType::Lz4,
        CompressionType::Zstd(3),
    ] {
        group.bench_function(format!("100k lines ({compression:?})"), |b| {
            b.iter(|| {
                let folder = tempfile::tempdir().unwrap();
                let global_db = MockGlobalMetadataDb::default();

                let writer = ArchiveWriter::open(
                    Config::new(folder.path()).compression(compression),
                    Arc::new(global_db),
                )
                .unwrap();

                let mut compressor = FileCompressor::new(writer);
                compressor
                    .compress_reader("bench.log", 0, MemoryReader::new(input.as_bytes().to_vec()))
                    .unwrap();
                compressor.close().unwrap();
            });
        });
    }
}

fn grep(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);

    let folder = tempfile::tempdir().unwrap();
    let global_db = MockGlobalMetadataDb::default();

    let writer = ArchiveWriter::open(
        Config::new(folder.path()).target_segment_uncompressed_size(256 * 1_024),
        Arc::new(global_db),
    )
    .unwrap();

    let mut compressor = FileCompressor::new(writer);
    let input = generate_lines(100_000);

    for i in 0..8 {
        let path = format!("host{i}.log");
        compressor
            .compress_reader(&path, 0, MemoryReader::new(input.as_bytes().to_vec()))
            .unwrap();
    }

    let archive = compressor.close().unwrap();

    let mut reader = ArchiveReader::open(
        folder.path().join(archive.id.to_string()),
        &ReaderConfig::default(),
    )
    .unwrap();
    reader.refresh_dictionaries().unwrap();

    for search_string in ["*", "user=u42 *", "*10.0.3.*", "*took 499.*", "no such thing"] {
        group.bench_function(format!("{search_string:?}"), |b| {
            b.iter(|| {
                let query = Query::build(
                    search_string,
                    SearchOptions::default(),
                    reader.logtype_dictionary(),
                    reader.variable_dictionary(),
                );

                let mut count = 0;
                search(&mut reader, &query, |_| count += 1).unwrap();
                count
            });
        });
    }
}

criterion_group!(benches, compress, grep);
criterion_main!(benches);
