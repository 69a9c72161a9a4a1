// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Dense id of a segment within one archive
#[allow(clippy::module_name_repetitions)]
pub type SegmentId = u64;

/// Dense id of a dictionary entry
pub type DictionaryId = u64;

/// Id of a logtype dictionary entry
pub type LogtypeId = DictionaryId;

/// Id of a variable dictionary entry
pub type VariableId = DictionaryId;

/// Hands out dense, monotonically increasing ids starting at 0
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default)]
pub struct IdGenerator(u64);

impl IdGenerator {
    pub fn next(&mut self) -> u64 {
        let id = self.0;
        self.0 += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn peek(&self) -> u64 {
        self.0
    }
}
