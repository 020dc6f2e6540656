//! Fetch planning: which bytes must be requested to serve a window?
//!
//! The planner is pure: it looks at a shard's row-group index, its byte
//! cache and the ranges another batch is already fetching, and decides one of:
//!
//! 1. **Bootstrap**: no footer yet; a suffix fetch must come first and no
//!    data requests are planned.
//! 2. **No-op**: every needed byte (row groups + footer) is cached. This
//!    must issue zero network calls.
//! 3. **Await pending**: the remaining bytes are all in flight already.
//! 4. **Fetch**: the uncached, not-in-flight remainder, coalesced into
//!    range requests.

use crate::{
    coalesce::{RangeRequest, coalesce},
    interval::{ByteRange, IntervalSet},
    range_cache::ByteRangeCache,
    row_group::{FetchWindow, RowGroupIndex},
};

/// What the caller has to do to serve a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    /// Fetch the last `suffix_len` bytes of the file and parse the footer.
    Bootstrap {
        /// Suffix length to request.
        suffix_len: u64,
    },
    /// All needed bytes are cached.
    NoOp,
    /// All uncached bytes are already being fetched by another batch.
    AwaitPending {
        /// The in-flight ranges this window depends on.
        ranges: Vec<ByteRange>,
    },
    /// Issue these requests.
    Fetch {
        /// Coalesced requests, ascending by offset.
        requests: Vec<RangeRequest>,
    },
}

/// Planner output for one shard and window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Indices of row groups intersecting the window.
    pub groups: Vec<usize>,
    /// Union of the byte spans needed (row groups plus footer).
    pub needed: Vec<ByteRange>,
    /// Next step.
    pub action: PlanAction,
}

impl FetchPlan {
    /// True if serving the window needs no network call.
    pub fn is_noop(&self) -> bool {
        self.action == PlanAction::NoOp
    }

    /// Requests to issue, empty unless the action is `Fetch`.
    pub fn requests(&self) -> &[RangeRequest] {
        match &self.action {
            PlanAction::Fetch { requests } => requests,
            _ => &[],
        }
    }
}

/// Shard state the planner reads.
#[derive(Debug, Clone, Copy)]
pub struct ShardView<'a> {
    /// Row-group index, `None` until the footer has been parsed.
    pub index: Option<&'a RowGroupIndex>,
    /// Footer span, `None` until the footer has been located.
    pub footer: Option<ByteRange>,
    /// Bytes already fetched.
    pub cache: &'a ByteRangeCache,
    /// Bytes currently being fetched.
    pub pending: &'a IntervalSet,
}

/// Pure planner parameterised by the fetch tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlanner {
    /// Maximum gap bridged when coalescing.
    pub gap_tolerance: u64,
    /// Suffix length used to bootstrap an unparsed shard.
    pub bootstrap_suffix_len: u64,
}

impl FetchPlanner {
    /// Construct a planner.
    pub fn new(gap_tolerance: u64, bootstrap_suffix_len: u64) -> Self {
        Self {
            gap_tolerance,
            bootstrap_suffix_len,
        }
    }

    /// Plan the fetches needed to serve `window` from the shard described by `view`.
    pub fn plan(&self, window: &FetchWindow, view: ShardView<'_>) -> FetchPlan {
        let (Some(index), Some(footer)) = (view.index, view.footer) else {
            return FetchPlan {
                groups: Vec::new(),
                needed: Vec::new(),
                action: PlanAction::Bootstrap {
                    suffix_len: self.bootstrap_suffix_len,
                },
            };
        };

        let hits = index.locate(window);
        let groups: Vec<usize> = hits.iter().map(|rg| rg.index).collect();
        let needed: IntervalSet = hits
            .iter()
            .map(|rg| rg.bytes)
            .chain(std::iter::once(footer))
            .collect();
        let needed: Vec<ByteRange> = needed.iter().collect();

        let uncached = view.cache.coverage().missing_all(&needed);
        if uncached.is_empty() {
            tracing::trace!(groups = groups.len(), "Window fully cached");
            return FetchPlan {
                groups,
                needed,
                action: PlanAction::NoOp,
            };
        }

        let unfetched = view.pending.missing_all(&uncached);
        if unfetched.is_empty() {
            return FetchPlan {
                groups,
                needed,
                action: PlanAction::AwaitPending { ranges: uncached },
            };
        }

        let requests = coalesce(&unfetched, self.gap_tolerance);
        tracing::debug!(
            groups = groups.len(),
            gaps = unfetched.len(),
            requests = requests.len(),
            bytes = requests.iter().map(|q| q.range.len()).sum::<u64>(),
            "Planned range fetch"
        );

        FetchPlan {
            groups,
            needed,
            action: PlanAction::Fetch { requests },
        }
    }
}
