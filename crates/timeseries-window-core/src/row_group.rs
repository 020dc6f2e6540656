//! Per-shard row-group index.
//!
//! The index is an ordered table of [`RowGroupDescriptor`]s built from a
//! decoded footer. It answers one question for the planner: which row groups
//! intersect a requested window?
//!
//! Ordering invariants checked by [`RowGroupIndex::build`]:
//!
//! - descriptors are ordered by byte start and their indices are `0..n`;
//! - row spans are contiguous and non-overlapping;
//! - byte spans do not overlap (gaps for padding are allowed);
//! - time spans, where statistics exist, are non-decreasing and do not overlap.
//!
//! A violation is reported as [`FooterError::InvalidLayout`]: the file layout
//! is corrupt or unsupported, so the shard is unreadable.

use chrono::{DateTime, Utc};

use crate::{
    footer::{FooterError, FooterMetadata, FooterResult},
    interval::ByteRange,
};

/// Closed time interval covered by one row group's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    /// Smallest timestamp in the group.
    pub min: DateTime<Utc>,
    /// Largest timestamp in the group.
    pub max: DateTime<Utc>,
}

/// Layout of one row group inside a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowGroupDescriptor {
    /// Position of the group in the footer.
    pub index: usize,
    /// First row (inclusive).
    pub row_start: u64,
    /// One past the last row.
    pub row_end: u64,
    /// Byte span covering every column chunk of the group.
    pub bytes: ByteRange,
    /// Time span from statistics; `None` excludes the group from time windows.
    pub time: Option<TimeSpan>,
}

impl RowGroupDescriptor {
    /// Number of rows in the group.
    pub fn num_rows(&self) -> u64 {
        self.row_end - self.row_start
    }
}

/// A window of data to fetch from one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// Half-open instant range `[start, end)`.
    Time {
        /// Inclusive lower bound.
        start: DateTime<Utc>,
        /// Exclusive upper bound.
        end: DateTime<Utc>,
    },
    /// Half-open row range `[start, end)` within the shard.
    Rows {
        /// First row (inclusive).
        start: u64,
        /// One past the last row.
        end: u64,
    },
}

/// Byte gap between consecutive row groups larger than the configured tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discontinuity {
    /// Index of the group before the gap.
    pub after: usize,
    /// Gap size in bytes.
    pub gap_bytes: u64,
}

/// Ordered row-group table for one shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowGroupIndex {
    groups: Vec<RowGroupDescriptor>,
    /// Positions (into `groups`) of groups that carry time statistics.
    timed: Vec<usize>,
    discontinuities: Vec<Discontinuity>,
}

impl RowGroupIndex {
    /// Build and validate an index from decoded footer metadata.
    pub fn build(meta: &FooterMetadata, gap_tolerance: u64) -> FooterResult<Self> {
        Self::from_descriptors(meta.row_groups.clone(), gap_tolerance)
    }

    /// Build and validate an index from descriptors in any order.
    pub fn from_descriptors(
        mut groups: Vec<RowGroupDescriptor>,
        gap_tolerance: u64,
    ) -> FooterResult<Self> {
        groups.sort_by_key(|rg| rg.bytes.start);

        let mut discontinuities = Vec::new();
        let mut last_time: Option<TimeSpan> = None;

        for (pos, rg) in groups.iter().enumerate() {
            if rg.index != pos {
                return invalid(format!(
                    "row group at byte {} has index {} but is position {pos}",
                    rg.bytes.start, rg.index
                ));
            }
            if rg.row_end < rg.row_start {
                return invalid(format!("row group {pos} has inverted row span"));
            }

            if pos > 0 {
                let prev = &groups[pos - 1];
                if rg.row_start != prev.row_end {
                    return invalid(format!(
                        "row group {pos} starts at row {} but previous ends at {}",
                        rg.row_start, prev.row_end
                    ));
                }
                if rg.bytes.start < prev.bytes.end {
                    return invalid(format!(
                        "row group {pos} bytes {} overlap previous {}",
                        rg.bytes, prev.bytes
                    ));
                }
                let gap = rg.bytes.start - prev.bytes.end;
                if gap > gap_tolerance {
                    tracing::warn!(
                        after = prev.index,
                        gap_bytes = gap,
                        tolerance = gap_tolerance,
                        "Row-group byte discontinuity"
                    );
                    discontinuities.push(Discontinuity {
                        after: prev.index,
                        gap_bytes: gap,
                    });
                }
            } else if rg.row_start != 0 {
                return invalid(format!("first row group starts at row {}", rg.row_start));
            }

            if let Some(t) = rg.time {
                if t.max < t.min {
                    return invalid(format!("row group {pos} has inverted time span"));
                }
                if let Some(prev) = last_time
                    && t.min < prev.max
                {
                    return invalid(format!(
                        "row group {pos} time {} precedes previous max {}",
                        t.min, prev.max
                    ));
                }
                last_time = Some(t);
            }
        }

        let timed = groups
            .iter()
            .enumerate()
            .filter(|(_, rg)| rg.time.is_some())
            .map(|(pos, _)| pos)
            .collect();

        Ok(Self {
            groups,
            timed,
            discontinuities,
        })
    }

    /// All descriptors in byte order.
    pub fn groups(&self) -> &[RowGroupDescriptor] {
        &self.groups
    }

    /// Number of row groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when the shard has no row groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Last row group in the file, if any.
    pub fn tail(&self) -> Option<&RowGroupDescriptor> {
        self.groups.last()
    }

    /// Gaps larger than the tolerance, for diagnostics only.
    pub fn discontinuities(&self) -> &[Discontinuity] {
        &self.discontinuities
    }

    /// Total rows indexed.
    pub fn total_rows(&self) -> u64 {
        self.groups.last().map(|rg| rg.row_end).unwrap_or(0)
    }

    /// Earliest timestamp covered by statistics.
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.timed
            .first()
            .and_then(|&pos| self.groups[pos].time)
            .map(|t| t.min)
    }

    /// Latest timestamp covered by statistics.
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.timed
            .last()
            .and_then(|&pos| self.groups[pos].time)
            .map(|t| t.max)
    }

    /// Row groups whose span intersects `window`, in file order.
    ///
    /// Time windows consult only groups with statistics; row windows consult
    /// every group. Both are binary searches followed by a walk over the hits.
    pub fn locate(&self, window: &FetchWindow) -> Vec<&RowGroupDescriptor> {
        match *window {
            FetchWindow::Time { start, end } => {
                if start >= end {
                    return Vec::new();
                }
                let time_of = |pos: &usize| self.groups[*pos].time;
                let lo = self
                    .timed
                    .partition_point(|p| time_of(p).is_some_and(|t| t.max < start));
                let hi = self
                    .timed
                    .partition_point(|p| time_of(p).is_some_and(|t| t.min < end));
                self.timed[lo..hi.max(lo)]
                    .iter()
                    .map(|&pos| &self.groups[pos])
                    .collect()
            }
            FetchWindow::Rows { start, end } => {
                if start >= end {
                    return Vec::new();
                }
                let lo = self.groups.partition_point(|rg| rg.row_end <= start);
                let hi = self.groups.partition_point(|rg| rg.row_start < end);
                self.groups[lo..hi.max(lo)].iter().collect()
            }
        }
    }

    /// Combine retained descriptors before `offset` with freshly parsed ones at or after it.
    ///
    /// Used by refresh: groups that start before the refreshed tail are kept
    /// exactly as they were.
    pub fn splice_tail(
        &self,
        offset: u64,
        fresh: &[RowGroupDescriptor],
        gap_tolerance: u64,
    ) -> FooterResult<Self> {
        let mut groups: Vec<RowGroupDescriptor> = self
            .groups
            .iter()
            .filter(|rg| rg.bytes.start < offset)
            .copied()
            .collect();

        if let Some(mismatch) = fresh
            .iter()
            .filter(|rg| rg.bytes.start < offset)
            .find(|rg| groups.get(rg.index) != Some(*rg))
        {
            return invalid(format!(
                "refreshed footer rewrote row group {} before offset {offset}",
                mismatch.index
            ));
        }

        groups.extend(fresh.iter().filter(|rg| rg.bytes.start >= offset).copied());
        Self::from_descriptors(groups, gap_tolerance)
    }
}

fn invalid<T>(detail: String) -> FooterResult<T> {
    Err(FooterError::InvalidLayout { detail })
}
