//! Merge planned byte ranges into as few range requests as possible.
//!
//! Two ranges whose gap is at most `gap_tolerance` bytes are fetched by one
//! request covering both (the gap bytes are fetched too). Larger gaps stay as
//! separate requests so unrelated regions of the file are never downloaded.

use crate::interval::ByteRange;

/// One physical range request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// Bytes the request fetches.
    pub range: ByteRange,
    /// The planned ranges it serves.
    pub parts: Vec<ByteRange>,
}

impl RangeRequest {
    /// Bytes fetched that no planned range asked for.
    pub fn overfetch(&self) -> u64 {
        let wanted: u64 = self.parts.iter().map(ByteRange::len).sum();
        self.range.len().saturating_sub(wanted)
    }
}

/// Sort `intervals` by start and merge neighbours whose gap is `<= gap_tolerance`.
///
/// Overlapping inputs are merged regardless of tolerance; empty inputs are dropped.
pub fn coalesce(intervals: &[ByteRange], gap_tolerance: u64) -> Vec<RangeRequest> {
    let mut sorted: Vec<ByteRange> = intervals.iter().copied().filter(|r| !r.is_empty()).collect();
    sorted.sort();

    let mut out: Vec<RangeRequest> = Vec::new();
    for r in sorted {
        match out.last_mut() {
            Some(cur) if r.start <= cur.range.end.saturating_add(gap_tolerance) => {
                cur.range = cur.range.hull(&r);
                cur.parts.push(r);
            }
            _ => out.push(RangeRequest {
                range: r,
                parts: vec![r],
            }),
        }
    }
    out
}
