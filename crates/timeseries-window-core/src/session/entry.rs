//! Per-shard cache entry.
//!
//! Each entry owns everything the session knows about one shard. Mutable
//! state sits behind a `std::sync::Mutex` that is only held for synchronous
//! planning and applying; it is never held across an `.await`.
//!
//! At most one fetch batch runs per shard. The batch holder owns a
//! [`BatchSlot`]; everyone else waits on the entry's [`Notify`] and re-plans
//! once the slot is released.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::{
    footer::FooterMetadata,
    interval::{ByteRange, IntervalSet},
    planner::ShardView,
    range_cache::ByteRangeCache,
    row_group::RowGroupIndex,
    shard::{Shard, ShardKey},
};

/// Mutable state of one shard.
#[derive(Debug)]
pub(crate) struct EntryState {
    pub(crate) shard: Shard,
    pub(crate) footer: Option<FooterMetadata>,
    pub(crate) index: Option<RowGroupIndex>,
    pub(crate) cache: ByteRangeCache,
    /// Ranges requested by the batch in flight.
    pub(crate) pending: IntervalSet,
    pub(crate) in_flight: bool,
    /// Bumped by every navigation load; results from older loads are dropped.
    pub(crate) generation: u64,
    /// Set once a format error makes the shard unreadable.
    pub(crate) failure: Option<String>,
    pub(crate) requests: u64,
    pub(crate) bytes_fetched: u64,
}

impl EntryState {
    pub(crate) fn view(&self) -> ShardView<'_> {
        ShardView {
            index: self.index.as_ref(),
            footer: self.footer.as_ref().map(FooterMetadata::footer_span),
            cache: &self.cache,
            pending: &self.pending,
        }
    }

    /// Offset below which bytes never change while the file only grows.
    pub(crate) fn data_limit(&self) -> Option<u64> {
        self.footer.as_ref().map(|f| f.footer_span().start)
    }
}

/// One shard's entry in the session.
#[derive(Debug)]
pub(crate) struct ShardEntry {
    state: Mutex<EntryState>,
    notify: Notify,
    /// Serialises footer bootstrap so concurrent first contacts probe once.
    pub(crate) resolve_lock: AsyncMutex<()>,
}

impl ShardEntry {
    pub(crate) fn new(key: ShardKey, extension: &str) -> Self {
        Self {
            state: Mutex::new(EntryState {
                shard: Shard::new(key, extension),
                footer: None,
                index: None,
                cache: ByteRangeCache::new(),
                pending: IntervalSet::new(),
                in_flight: false,
                generation: 0,
                failure: None,
                requests: 0,
                bytes_fetched: 0,
            }),
            notify: Notify::new(),
            resolve_lock: AsyncMutex::new(()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify(&self) -> &Notify {
        &self.notify
    }

    /// Claim the batch slot while `state` is locked. Returns `None` if a
    /// batch is already in flight.
    pub(crate) fn try_claim<'a>(
        &'a self,
        state: &mut EntryState,
        ranges: Vec<ByteRange>,
    ) -> Option<BatchSlot<'a>> {
        if state.in_flight {
            return None;
        }
        state.in_flight = true;
        for r in &ranges {
            state.pending.insert(*r);
        }
        Some(BatchSlot {
            entry: self,
            ranges,
        })
    }

    /// Wait until the batch slot is free and claim it.
    pub(crate) async fn claim(&self) -> BatchSlot<'_> {
        loop {
            let notified = {
                let mut state = self.lock();
                if let Some(slot) = self.try_claim(&mut state, Vec::new()) {
                    return slot;
                }
                self.notify.notified()
            };
            notified.await;
        }
    }
}

/// Ownership of a shard's single in-flight batch. Dropping it clears the
/// pending ranges and wakes waiters, including when the fetch was cancelled.
#[derive(Debug)]
pub(crate) struct BatchSlot<'a> {
    entry: &'a ShardEntry,
    ranges: Vec<ByteRange>,
}

impl Drop for BatchSlot<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.entry.lock();
            state.in_flight = false;
            for r in &self.ranges {
                state.pending.remove(*r);
            }
        }
        self.entry.notify.notify_waiters();
    }
}
