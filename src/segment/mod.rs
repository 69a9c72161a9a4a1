// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segments hold the columns of many files in one compressed stream.
//!
//! Per file, three columns are appended back to back:
//!
//! [timestamps: i64*][logtype ids: u64*][encoded variables: i64*]
//!
//! All values are big-endian.

pub mod manager;
pub mod writer;

use byteorder::{BigEndian, ByteOrder};

/// Name of the segment folder inside an archive
pub const SEGMENTS_FOLDER: &str = "s";

/// Serializes a column of 64-bit values.
pub(crate) fn encode_column<T: Copy>(values: &[T], to_bits: impl Fn(T) -> u64) -> Vec<u8> {
    let mut bytes = vec![0; values.len() * std::mem::size_of::<u64>()];

    for (chunk, value) in bytes.chunks_exact_mut(8).zip(values) {
        BigEndian::write_u64(chunk, to_bits(*value));
    }

    bytes
}

/// Deserializes a column of 64-bit values.
pub(crate) fn decode_column<T>(bytes: &[u8], out: &mut Vec<T>, from_bits: impl Fn(u64) -> T) {
    out.clear();
    out.extend(bytes.chunks_exact(8).map(|chunk| from_bits(BigEndian::read_u64(chunk))));
}
