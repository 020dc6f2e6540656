//! Per-shard cache of fetched bytes keyed by file offset.
//!
//! The cache tracks two things:
//!
//! - A logical coverage set ([`IntervalSet`]) of every byte offset that has
//!   been fetched. Touching or overlapping insertions merge here.
//! - The physical chunks as they arrived from the network. Chunks are kept
//!   disjoint (an insertion only stores bytes that were not already present),
//!   but neighbouring chunks are not copied together.
//!
//! Reads that fall inside one chunk are zero-copy slices; reads that span
//! several chunks are assembled into a fresh buffer.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::interval::{ByteRange, IntervalSet};

/// Fetched bytes for one shard.
#[derive(Debug, Clone, Default)]
pub struct ByteRangeCache {
    coverage: IntervalSet,
    chunks: BTreeMap<u64, Bytes>,
}

impl ByteRangeCache {
    /// Construct an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical coverage of the cache.
    pub fn coverage(&self) -> &IntervalSet {
        &self.coverage
    }

    /// True if every byte of `range` is cached.
    pub fn covers(&self, range: ByteRange) -> bool {
        self.coverage.covers(range)
    }

    /// Parts of `range` that are not cached yet.
    pub fn missing(&self, range: ByteRange) -> Vec<ByteRange> {
        self.coverage.missing(range)
    }

    /// Total cached bytes.
    pub fn cached_bytes(&self) -> u64 {
        self.coverage.total_len()
    }

    /// Number of physical chunks held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Store `data` fetched from offset `start`.
    ///
    /// Bytes for offsets that are already cached are dropped, so the first
    /// copy of any offset wins.
    pub fn insert(&mut self, start: u64, data: Bytes) {
        let range = ByteRange::with_len(start, data.len() as u64);
        if range.is_empty() {
            return;
        }

        for gap in self.coverage.missing(range) {
            let lo = (gap.start - start) as usize;
            let hi = (gap.end - start) as usize;
            self.chunks.insert(gap.start, data.slice(lo..hi));
        }
        self.coverage.insert(range);
    }

    /// Drop every cached byte at or after `offset`.
    ///
    /// Used when the remote file has grown: bytes past the old data region
    /// (the previous footer) no longer describe the file.
    pub fn truncate_from(&mut self, offset: u64) {
        self.coverage.remove(ByteRange::new(offset, u64::MAX));
        let tail: Vec<u64> = self.chunks.range(offset..).map(|(&s, _)| s).collect();
        for s in tail {
            self.chunks.remove(&s);
        }

        let straddle = self
            .chunks
            .range(..offset)
            .next_back()
            .map(|(&s, b)| (s, b.len() as u64));
        if let Some((s, len)) = straddle
            && s + len > offset
            && let Some(chunk) = self.chunks.get_mut(&s)
        {
            *chunk = chunk.slice(..(offset - s) as usize);
        }
    }

    /// Return the bytes for `range`, or `None` if any byte is not cached.
    pub fn bytes_at(&self, range: ByteRange) -> Option<Bytes> {
        if range.is_empty() {
            return Some(Bytes::new());
        }
        if !self.covers(range) {
            return None;
        }

        let (&first_start, first) = self.chunks.range(..=range.start).next_back()?;
        let first_end = first_start + first.len() as u64;
        if first_end >= range.end {
            let lo = (range.start - first_start) as usize;
            let hi = (range.end - first_start) as usize;
            return Some(first.slice(lo..hi));
        }

        let mut out = BytesMut::with_capacity(range.len() as usize);
        for (&s, chunk) in self.chunks.range(first_start..range.end) {
            let chunk_range = ByteRange::with_len(s, chunk.len() as u64);
            let lo = range.start.max(chunk_range.start);
            let hi = range.end.min(chunk_range.end);
            if lo >= hi {
                continue;
            }
            out.extend_from_slice(&chunk[(lo - s) as usize..(hi - s) as usize]);
        }

        debug_assert_eq!(out.len() as u64, range.len());
        Some(out.freeze())
    }

    /// Convenience wrapper for [`ByteRangeCache::bytes_at`] taking offset and length.
    pub fn read(&self, offset: u64, len: u64) -> Option<Bytes> {
        self.bytes_at(ByteRange::with_len(offset, len))
    }
}
