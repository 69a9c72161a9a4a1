// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::id::SegmentId;
use quick_cache::{sync::Cache, Equivalent, Weighter};
use std::sync::Arc;
use uuid::Uuid;

/// Decompressed columns of one file
#[derive(Debug, Default)]
pub struct Columns {
    /// Message timestamps
    pub timestamps: Vec<i64>,

    /// Message logtype ids
    pub logtypes: Vec<u64>,

    /// Encoded variables of all messages
    pub variables: Vec<i64>,
}

impl Columns {
    fn size(&self) -> usize {
        (self.timestamps.len() + self.logtypes.len() + self.variables.len()) * std::mem::size_of::<u64>()
    }
}

type Item = Arc<Columns>;

/// Archive ID, segment ID and offset of the file's first column
#[derive(Eq, std::hash::Hash, PartialEq)]
pub struct CacheKey(Uuid, SegmentId, u64);

impl Equivalent<CacheKey> for (Uuid, SegmentId, u64) {
    fn equivalent(&self, key: &CacheKey) -> bool {
        self.0 == key.0 && self.1 == key.1 && self.2 == key.2
    }
}

impl From<(Uuid, SegmentId, u64)> for CacheKey {
    fn from((archive_id, segment_id, offset): (Uuid, SegmentId, u64)) -> Self {
        Self(archive_id, segment_id, offset)
    }
}

#[derive(Clone)]
struct ColumnWeighter;

impl Weighter<CacheKey, Item> for ColumnWeighter {
    fn weight(&self, _: &CacheKey, columns: &Item) -> u64 {
        columns.size() as u64
    }
}

/// Column cache, in which decompressed file columns are cached in-memory
/// after being read from a segment
///
/// Re-opening a file skips segment decompression while its columns are cached.
/// The cache is thread-safe and can be shared between archive readers to cap
/// global memory usage.
pub struct ColumnCache {
    /// Concurrent cache implementation
    data: Cache<CacheKey, Item, ColumnWeighter, ahash::RandomState>,

    /// Capacity in bytes
    capacity: u64,
}

impl std::fmt::Debug for ColumnCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ColumnCache<cap: {} bytes>", self.capacity)
    }
}

impl ColumnCache {
    /// Creates a new column cache with roughly `n` bytes of capacity.
    #[must_use]
    pub fn with_capacity_bytes(bytes: u64) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        #[allow(clippy::default_trait_access)]
        let quick_cache = Cache::with(
            1_000,
            bytes,
            ColumnWeighter,
            Default::default(),
            DefaultLifecycle::default(),
        );

        Self {
            data: quick_cache,
            capacity: bytes,
        }
    }

    pub(crate) fn insert(&self, key: CacheKey, columns: Item) {
        self.data.insert(key, columns);
    }

    pub(crate) fn get(&self, archive_id: Uuid, segment_id: SegmentId, offset: u64) -> Option<Item> {
        self.data.get(&(archive_id, segment_id, offset))
    }

    /// Returns the cache capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.weight()
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if there are no cached files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
