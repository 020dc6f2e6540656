//! Disjoint byte-interval sets and gap analysis.
//!
//! This module is intentionally small and generic:
//!
//! - It wraps a `BTreeMap<start, end>` in an [`IntervalSet`].
//! - It does not know about shards, row groups, or HTTP.
//! - Callers map their own domain (file offsets) into [`ByteRange`]s.
//!
//! The set is always kept minimal: no two stored runs overlap or touch.
//! Inserting `[0, 10)` and then `[10, 20)` leaves a single run `[0, 20)`.
//!
//! ```
//! use timeseries_window_core::interval::{ByteRange, IntervalSet};
//!
//! let mut set = IntervalSet::new();
//! set.insert(ByteRange::new(0, 100));
//! set.insert(ByteRange::new(200, 300));
//!
//! let gaps = set.missing(ByteRange::new(50, 250));
//! assert_eq!(gaps, vec![ByteRange::new(100, 200)]);
//! assert!(set.covers(ByteRange::new(210, 290)));
//! ```

use std::{collections::BTreeMap, fmt, ops::Bound};

use serde::{Deserialize, Serialize};

/// Half-open byte interval `[start, end)` within a remote file.
///
/// HTTP range headers use closed intervals; [`ByteRange::last`] gives the
/// inclusive end offset for that conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte offset (inclusive).
    pub start: u64,
    /// One past the last byte offset (exclusive).
    pub end: u64,
}

impl ByteRange {
    /// Construct a range. `start > end` is clamped to an empty range at `start`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "ByteRange start {start} > end {end}");
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Range covering `len` bytes from `start`.
    pub fn with_len(start: u64, len: u64) -> Self {
        Self::new(start, start.saturating_add(len))
    }

    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True when the range holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Inclusive last offset, or `None` for an empty range.
    pub fn last(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.end - 1)
    }

    /// True if `other` lies entirely within `self`.
    pub fn contains(&self, other: &ByteRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// True if the two ranges share at least one byte.
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Number of bytes strictly between the two ranges (0 when they touch or overlap).
    pub fn gap_to(&self, other: &ByteRange) -> u64 {
        if self.end <= other.start {
            other.start - self.end
        } else if other.end <= self.start {
            self.start - other.end
        } else {
            0
        }
    }

    /// Smallest range covering both inputs.
    pub fn hull(&self, other: &ByteRange) -> ByteRange {
        ByteRange::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Minimal disjoint, non-adjacent set of byte ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    runs: BTreeMap<u64, u64>,
}

impl IntervalSet {
    /// Construct an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no bytes are present.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of stored runs.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Total bytes covered by the set.
    pub fn total_len(&self) -> u64 {
        self.runs.iter().map(|(s, e)| e - s).sum()
    }

    /// Iterate stored runs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ByteRange> + '_ {
        self.runs.iter().map(|(&s, &e)| ByteRange::new(s, e))
    }

    /// Union `range` into the set, merging any run it overlaps or touches.
    pub fn insert(&mut self, range: ByteRange) {
        if range.is_empty() {
            return;
        }

        let mut start = range.start;
        let mut end = range.end;

        let prev = self.runs.range(..=start).next_back().map(|(&s, &e)| (s, e));
        if let Some((s, e)) = prev
            && e >= start
        {
            start = s;
            end = end.max(e);
            self.runs.remove(&s);
        }

        loop {
            let next = self.runs.range(start..).next().map(|(&s, &e)| (s, e));
            match next {
                Some((s, e)) if s <= end => {
                    end = end.max(e);
                    self.runs.remove(&s);
                }
                _ => break,
            }
        }

        self.runs.insert(start, end);
    }

    /// Subtract `range` from the set, splitting runs that straddle its bounds.
    pub fn remove(&mut self, range: ByteRange) {
        if range.is_empty() {
            return;
        }

        let hit: Vec<(u64, u64)> = self
            .runs
            .range(..range.end)
            .rev()
            .take_while(|(_, e)| **e > range.start)
            .map(|(&s, &e)| (s, e))
            .collect();

        for (s, e) in hit {
            self.runs.remove(&s);
            if s < range.start {
                self.runs.insert(s, range.start);
            }
            if e > range.end {
                self.runs.insert(range.end, e);
            }
        }
    }

    /// True if every byte of `range` is present. Empty ranges are vacuously covered.
    pub fn covers(&self, range: ByteRange) -> bool {
        if range.is_empty() {
            return true;
        }
        self.runs
            .range(..=range.start)
            .next_back()
            .is_some_and(|(_, &e)| e >= range.end)
    }

    /// True if any byte of `range` is present.
    pub fn intersects(&self, range: ByteRange) -> bool {
        if range.is_empty() {
            return false;
        }
        self.runs
            .range(..range.end)
            .next_back()
            .is_some_and(|(_, &e)| e > range.start)
    }

    /// Return the parts of `range` not present in the set, in ascending order.
    ///
    /// This is `range - union(runs)`.
    pub fn missing(&self, range: ByteRange) -> Vec<ByteRange> {
        if range.is_empty() {
            return Vec::new();
        }

        let mut gaps = Vec::new();
        let mut cursor = range.start;

        if let Some((_, &e)) = self.runs.range(..=range.start).next_back() {
            cursor = cursor.max(e);
        }

        let inner = (Bound::Excluded(range.start), Bound::Excluded(range.end));
        for (&s, &e) in self.runs.range(inner) {
            if s > cursor {
                gaps.push(ByteRange::new(cursor, s));
            }
            cursor = cursor.max(e);
        }

        if cursor < range.end {
            gaps.push(ByteRange::new(cursor, range.end));
        }
        gaps
    }

    /// Subtract the whole set from each input range, concatenating the gaps.
    pub fn missing_all(&self, ranges: &[ByteRange]) -> Vec<ByteRange> {
        ranges.iter().flat_map(|r| self.missing(*r)).collect()
    }
}

impl FromIterator<ByteRange> for IntervalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = ByteRange>,
    {
        let mut set = IntervalSet::new();
        for r in iter {
            set.insert(r);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, end: u64) -> ByteRange {
        ByteRange::new(start, end)
    }

    #[test]
    fn insert_merges_touching_and_overlapping_runs() {
        let mut set = IntervalSet::new();
        set.insert(r(0, 10));
        set.insert(r(20, 30));
        assert_eq!(set.run_count(), 2);

        set.insert(r(10, 20));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![r(0, 30)]);

        set.insert(r(25, 40));
        set.insert(r(50, 60));
        set.insert(r(5, 55));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![r(0, 60)]);
    }

    #[test]
    fn insert_ignores_empty_ranges() {
        let mut set = IntervalSet::new();
        set.insert(r(5, 5));
        assert!(set.is_empty());
    }

    #[test]
    fn missing_returns_gaps_in_order() {
        let set: IntervalSet = [r(10, 20), r(30, 40)].into_iter().collect();

        assert_eq!(
            set.missing(r(0, 50)),
            vec![r(0, 10), r(20, 30), r(40, 50)]
        );
        assert_eq!(set.missing(r(12, 18)), Vec::<ByteRange>::new());
        assert_eq!(set.missing(r(15, 35)), vec![r(20, 30)]);
        assert_eq!(set.missing(r(40, 45)), vec![r(40, 45)]);
    }

    #[test]
    fn covers_requires_a_single_run() {
        let set: IntervalSet = [r(0, 10), r(11, 20)].into_iter().collect();
        assert!(set.covers(r(0, 10)));
        assert!(!set.covers(r(0, 11)));
        assert!(set.covers(r(3, 3)));
        assert!(!set.covers(r(9, 12)));
    }

    #[test]
    fn remove_splits_straddling_runs() {
        let mut set: IntervalSet = [r(0, 100)].into_iter().collect();
        set.remove(r(40, 60));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![r(0, 40), r(60, 100)]);

        set.remove(r(30, 70));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![r(0, 30), r(70, 100)]);

        set.remove(r(0, 1_000));
        assert!(set.is_empty());
    }

    #[test]
    fn intersects_detects_partial_overlap() {
        let set: IntervalSet = [r(10, 20)].into_iter().collect();
        assert!(set.intersects(r(19, 30)));
        assert!(!set.intersects(r(20, 30)));
        assert!(!set.intersects(r(0, 10)));
    }

    #[test]
    fn gap_to_is_zero_for_touching_ranges() {
        assert_eq!(r(0, 10).gap_to(&r(10, 20)), 0);
        assert_eq!(r(0, 10).gap_to(&r(15, 20)), 5);
        assert_eq!(r(15, 20).gap_to(&r(0, 10)), 5);
        assert_eq!(r(0, 10).last(), Some(9));
        assert_eq!(r(3, 3).last(), None);
    }
}
