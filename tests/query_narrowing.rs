mod common;

use common::{compress_inputs, grep, open_archive};
use log_archive::{
    query::{interpretation::normalize, wildcard::wildcard_match},
    ArchiveReader, Config, FileFilter, Message, MockGlobalMetadataDb, Query, ReaderConfig,
    ReaderFile, SearchOptions, SegmentId,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeSet;
use test_log::test;

const QUERIES: &[&str] = &[
    "*",
    "disk",
    "disk /dev/sda? *",
    "*usage=9*",
    "user=bob*",
    "*bob",
    "*42*",
    "*4.5*",
    "-1",
    "job ? done",
    "job 1? done",
    "*sd*",
    "conn*from 10.0.*",
    "from 10.0.0.1 port*",
    "missing",
    "*=*",
];

/// Segments that hold a message matching `search_string`, by decompressing everything
fn segments_with_matches(
    reader: &mut ArchiveReader,
    search_string: &str,
    ignore_case: bool,
) -> log_archive::Result<(BTreeSet<SegmentId>, usize)> {
    let pattern = normalize(search_string);
    let mut segments = BTreeSet::new();
    let mut count = 0;

    let mut file = ReaderFile::default();
    let mut message = Message::default();

    for metadata in reader.files(&FileFilter::default()) {
        reader.open_file(&metadata, &mut file)?;

        while reader.get_next_message(&mut file, &mut message)? {
            let mut text = String::new();
            reader.decompress_message(&mut file, &message, &mut text)?;

            if wildcard_match(&text, &pattern, !ignore_case) {
                segments.insert(metadata.segment_id);
                count += 1;
            }
        }
    }

    Ok((segments, count))
}

fn random_input(rng: &mut StdRng) -> String {
    let users = ["alice", "bob", "Bob", "carol"];
    let mut input = String::new();

    for _ in 0..200 {
        let line = match rng.gen_range(0..5) {
            0 => format!(
                "disk /dev/sd{} usage={}%\n",
                ['a', 'b', 'c'][rng.gen_range(0..3)],
                rng.gen_range(0..100)
            ),
            1 => format!("user={} logged in\n", users[rng.gen_range(0..users.len())]),
            2 => format!("job {} done in {}.{}s\n", rng.gen_range(0..20), rng.gen_range(0..9), rng.gen_range(0..9)),
            3 => format!(
                "conn from 10.0.{}.{} port {}\n",
                rng.gen_range(0..2),
                rng.gen_range(0..3),
                rng.gen_range(40..45)
            ),
            _ => format!("delta {}\n", rng.gen_range(-3..3)),
        };
        input.push_str(&line);
    }

    input
}

#[test]
fn query_narrowing_soundness() -> log_archive::Result<()> {
    let folder = tempfile::tempdir()?;
    let global_db = MockGlobalMetadataDb::default();
    let mut rng = StdRng::seed_from_u64(7);

    let inputs = (0..12)
        .map(|i| (format!("host{i}.log"), random_input(&mut rng)))
        .collect::<Vec<_>>();
    let inputs_ref = inputs
        .iter()
        .map(|(path, content)| (path.as_str(), content.as_str()))
        .collect::<Vec<_>>();

    // Small segments, so files end up in different segments
    let archive = compress_inputs(
        Config::new(folder.path()).target_segment_uncompressed_size(8 * 1_024),
        &global_db,
        &inputs_ref,
    )?;

    let mut reader = open_archive(folder.path(), archive.id, &ReaderConfig::default())?;

    let all_segments = reader
        .files(&FileFilter::default())
        .iter()
        .map(|x| x.segment_id)
        .collect::<BTreeSet<_>>();
    assert!(all_segments.len() > 1);

    for ignore_case in [false, true] {
        for search_string in QUERIES {
            let (expected_segments, expected_count) =
                segments_with_matches(&mut reader, search_string, ignore_case)?;

            let options = SearchOptions {
                ignore_case,
                ..Default::default()
            };

            let query = Query::build(
                search_string,
                options.clone(),
                reader.logtype_dictionary(),
                reader.variable_dictionary(),
            );

            if let Some(segments) = query.matching_segments() {
                assert!(
                    segments.is_superset(&expected_segments),
                    "{search_string:?} (ignore_case={ignore_case}) narrowed to {segments:?}, but {expected_segments:?} have matches"
                );
            }

            let results = grep(&mut reader, search_string, options)?;
            assert_eq!(
                expected_count,
                results.len(),
                "{search_string:?} (ignore_case={ignore_case})"
            );
        }
    }

    Ok(())
}
