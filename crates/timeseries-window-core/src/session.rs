//! Session-scoped shard store: resolve, load, refresh.
//!
//! A [`ShardSession`] owns one cache entry per shard and is the only place
//! that talks to the transport. It ties the pure components together:
//!
//! ```text
//! load_window ─► FetchPlanner ─► coalesce ─► transport GET ─► ByteRangeCache
//!      │                                                         │
//!      └─ resolve (suffix GET, footer parse) ─► RowGroupIndex ◄──┘
//! ```
//!
//! Two entry points issue network calls with different guarantees:
//!
//! - **Navigation** (`resolve`, `load_window`, `load_span`) only ever sends
//!   ranged `GET`s. A shard is probed once: the bootstrap suffix fetch doubles
//!   as the existence check, and its outcome (present, absent, unreadable) is
//!   remembered for the session. Windows whose bytes are cached issue no
//!   requests at all.
//! - **Refresh** (`refresh`) is the only caller of `HEAD`. It picks up bytes
//!   appended since the shard was last seen.

mod entry;
mod error;

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use snafu::ResultExt;

pub use error::{SessionError, SessionResult};

use crate::{
    config::FetchConfig,
    footer::{FooterError, ShardSummary, parse_footer},
    interval::ByteRange,
    planner::{FetchPlanner, PlanAction},
    row_group::{FetchWindow, RowGroupDescriptor, RowGroupIndex},
    shard::{EntityId, MonthKey, Shard, ShardKey, ShardState},
    transport::{
        Probe, RangeBody, RangeResponse, RangeSpec, RangeTransport, TransportError,
        TransportResult, with_retry,
    },
};

use entry::{EntryState, ShardEntry};
use error::{UnavailableSnafu, UnreadableSnafu};

/// Row groups of one shard that are now fully cached for a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowData {
    /// Shard the data came from.
    pub key: ShardKey,
    /// Row groups intersecting the window, all cached.
    pub row_groups: Vec<RowGroupDescriptor>,
    /// Requests issued by this load (zero when served from cache).
    pub requests: usize,
    /// Bytes received by this load.
    pub bytes_fetched: u64,
}

/// Outcome of loading one shard's window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Data for the window is cached.
    Ready(WindowData),
    /// The shard does not exist; the month has no data.
    NoData,
    /// A newer navigation load started on this shard before this one finished.
    Superseded,
}

impl WindowOutcome {
    /// The loaded data, if any.
    pub fn data(&self) -> Option<&WindowData> {
        match self {
            WindowOutcome::Ready(d) => Some(d),
            _ => None,
        }
    }
}

/// A time window loaded across monthly shards.
#[derive(Debug, Default)]
pub struct SpanData {
    /// Per-shard data for months that exist, ascending.
    pub windows: Vec<WindowData>,
    /// Months without a shard.
    pub absent: Vec<MonthKey>,
    /// Shards that failed; other months are still served.
    pub failed: Vec<SessionError>,
    /// True if any shard load was superseded by a newer one.
    pub superseded: bool,
}

impl SpanData {
    /// Requests issued across all shards.
    pub fn requests(&self) -> usize {
        self.windows.iter().map(|w| w.requests).sum()
    }

    /// Row groups across all shards.
    pub fn row_group_count(&self) -> usize {
        self.windows.iter().map(|w| w.row_groups.len()).sum()
    }
}

/// What a refresh found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The shard was never classified; refresh resolved it.
    Resolved(ShardState),
    /// Known to be absent; not probed again.
    Absent,
    /// Length unchanged.
    Unchanged {
        /// Current length.
        file_len: u64,
    },
    /// New bytes were appended and the tail was re-read.
    Grew {
        /// Length before the refresh.
        old_len: u64,
        /// Length after the refresh.
        new_len: u64,
        /// Row groups in the shard after the refresh.
        row_groups: usize,
    },
    /// The shard disappeared since it was resolved; cached data is kept.
    Missing,
}

/// Per-shard counters reported by [`ShardSession::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStats {
    /// Shard.
    pub key: ShardKey,
    /// Existence classification.
    pub state: ShardState,
    /// Known file length.
    pub file_len: Option<u64>,
    /// Row groups indexed.
    pub row_groups: usize,
    /// Bytes held in the cache.
    pub cached_bytes: u64,
    /// Requests issued, counting retries.
    pub requests: u64,
    /// Bytes received.
    pub bytes_fetched: u64,
    /// True if the shard is unreadable.
    pub unreadable: bool,
}

/// Snapshot of the whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// One row per known shard, ordered by key.
    pub shards: Vec<ShardStats>,
}

impl SessionStats {
    /// Requests issued across all shards.
    pub fn requests(&self) -> u64 {
        self.shards.iter().map(|s| s.requests).sum()
    }

    /// Bytes received across all shards.
    pub fn bytes_fetched(&self) -> u64 {
        self.shards.iter().map(|s| s.bytes_fetched).sum()
    }

    /// Bytes cached across all shards.
    pub fn cached_bytes(&self) -> u64 {
        self.shards.iter().map(|s| s.cached_bytes).sum()
    }
}

/// The session-owned shard store.
#[derive(Debug)]
pub struct ShardSession {
    transport: Arc<dyn RangeTransport>,
    config: FetchConfig,
    planner: FetchPlanner,
    entries: Mutex<HashMap<ShardKey, Arc<ShardEntry>>>,
}

impl ShardSession {
    /// Construct an empty session over `transport`.
    pub fn new(transport: Arc<dyn RangeTransport>, config: FetchConfig) -> Self {
        let planner = FetchPlanner::new(config.gap_tolerance, config.bootstrap_suffix_len);
        Self {
            transport,
            config,
            planner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch configuration in use.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ShardKey, Arc<ShardEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, key: &ShardKey) -> Arc<ShardEntry> {
        match self.entries().entry(key.clone()) {
            Entry::Occupied(e) => Arc::clone(e.get()),
            Entry::Vacant(v) => {
                let entry = Arc::new(ShardEntry::new(key.clone(), &self.config.file_extension));
                Arc::clone(v.insert(entry))
            }
        }
    }

    fn existing(&self, key: &ShardKey) -> Option<Arc<ShardEntry>> {
        self.entries().get(key).cloned()
    }

    fn unreadable(key: &ShardKey, state: &EntryState) -> SessionResult<()> {
        match &state.failure {
            Some(reason) => UnreadableSnafu {
                key: key.clone(),
                reason: reason.clone(),
            }
            .fail(),
            None => Ok(()),
        }
    }

    fn mark_unreadable(key: &ShardKey, state: &mut EntryState, err: &FooterError) -> SessionError {
        tracing::error!(entity = %key.entity, month = %key.month, error = %err, "Shard unreadable");
        let reason = err.to_string();
        state.failure = Some(reason.clone());
        SessionError::Unreadable {
            key: key.clone(),
            reason,
        }
    }

    /// One transport call with retries, counted against the entry.
    async fn get(
        &self,
        entry: &ShardEntry,
        url: &str,
        spec: RangeSpec,
    ) -> TransportResult<RangeResponse> {
        let transport = &self.transport;
        let resp = with_retry(&self.config.retry, "GET", || {
            entry.lock().requests += 1;
            transport.get(url, spec)
        })
        .await?;
        if let RangeResponse::Found(body) = &resp {
            entry.lock().bytes_fetched += body.data.len() as u64;
        }
        Ok(resp)
    }

    async fn head(&self, entry: &ShardEntry, url: &str) -> TransportResult<Probe> {
        let transport = &self.transport;
        with_retry(&self.config.retry, "HEAD", || {
            entry.lock().requests += 1;
            transport.head(url)
        })
        .await
    }

    /// Classify a shard, bootstrapping its footer on first contact.
    ///
    /// Already-classified shards return without any network call. First
    /// contact issues a single suffix `GET`; a second, corrective `GET` is
    /// issued only when the footer is longer than the suffix.
    pub async fn resolve(&self, key: &ShardKey) -> SessionResult<ShardState> {
        let entry = self.entry(key);
        self.resolve_entry(key, &entry).await
    }

    async fn resolve_entry(&self, key: &ShardKey, entry: &ShardEntry) -> SessionResult<ShardState> {
        {
            let state = entry.lock();
            Self::unreadable(key, &state)?;
            if state.shard.is_resolved() {
                return Ok(state.shard.state);
            }
        }

        let _resolving = entry.resolve_lock.lock().await;
        let url = {
            let state = entry.lock();
            Self::unreadable(key, &state)?;
            if state.shard.is_resolved() {
                return Ok(state.shard.state);
            }
            state.shard.url.clone()
        };

        let suffix = RangeSpec::Suffix(self.config.bootstrap_suffix_len);
        let resp = match self.get(entry, &url, suffix).await {
            Ok(resp) => resp,
            // Only an empty object cannot satisfy a suffix range.
            Err(TransportError::RangeNotSatisfiable { .. }) => {
                let mut state = entry.lock();
                state.shard.file_len = Some(0);
                return Err(Self::mark_unreadable(key, &mut state, &FooterError::TooShort { len: 0 }));
            }
            Err(source) => {
                return Err(SessionError::Unavailable {
                    key: key.clone(),
                    source,
                });
            }
        };

        let RangeResponse::Found(body) = resp else {
            entry.lock().shard.state = ShardState::Absent;
            tracing::info!(entity = %key.entity, month = %key.month, "Shard absent");
            return Ok(ShardState::Absent);
        };

        let file_len = body.total_len;
        let tail_start = body.offset;
        {
            let mut state = entry.lock();
            state.shard.file_len = Some(file_len);
            state.cache.insert(body.offset, body.data.clone());
        }

        let meta = match parse_footer(&body.data, file_len, &self.config.time_column) {
            Ok(meta) => meta,
            Err(FooterError::Truncated { footer_start, .. }) if body.range().end == file_len => {
                tracing::debug!(
                    entity = %key.entity,
                    month = %key.month,
                    footer_start,
                    fetched_from = tail_start,
                    "Footer longer than bootstrap suffix, fetching remainder"
                );
                let spec = RangeSpec::Closed {
                    start: footer_start,
                    end_inclusive: tail_start - 1,
                };
                let resp = self
                    .get(entry, &url, spec)
                    .await
                    .context(UnavailableSnafu { key: key.clone() })?;
                let RangeResponse::Found(prefix) = resp else {
                    entry.lock().shard.state = ShardState::Absent;
                    return Ok(ShardState::Absent);
                };

                let mut state = entry.lock();
                state.cache.insert(prefix.offset, prefix.data);
                let tail = state
                    .cache
                    .bytes_at(ByteRange::new(footer_start, file_len))
                    .unwrap_or_default();
                match parse_footer(&tail, file_len, &self.config.time_column) {
                    Ok(meta) => meta,
                    Err(e) => return Err(Self::mark_unreadable(key, &mut state, &e)),
                }
            }
            Err(e) => {
                let mut state = entry.lock();
                return Err(Self::mark_unreadable(key, &mut state, &e));
            }
        };

        let mut state = entry.lock();
        let index = match RowGroupIndex::build(&meta, self.config.discontinuity_tolerance) {
            Ok(index) => index,
            Err(e) => return Err(Self::mark_unreadable(key, &mut state, &e)),
        };

        tracing::info!(
            entity = %key.entity,
            month = %key.month,
            file_len,
            row_groups = index.len(),
            rows = index.total_rows(),
            "Shard resolved"
        );
        state.footer = Some(meta);
        state.index = Some(index);
        state.shard.state = ShardState::Present;
        Ok(ShardState::Present)
    }

    /// Make every byte needed for `window` in the shard available in the cache.
    ///
    /// Starts a new navigation generation for the shard: if another load
    /// starts before this one's fetch returns, the fetched bytes are still
    /// cached but this load reports [`WindowOutcome::Superseded`].
    pub async fn load_window(&self, key: &ShardKey, window: FetchWindow) -> SessionResult<WindowOutcome> {
        let entry = self.entry(key);
        if self.resolve_entry(key, &entry).await? == ShardState::Absent {
            return Ok(WindowOutcome::NoData);
        }

        let generation = {
            let mut state = entry.lock();
            state.generation += 1;
            state.generation
        };

        let mut requests = 0usize;
        let mut bytes_fetched = 0u64;

        loop {
            let (slot, batch) = {
                let mut state = entry.lock();
                Self::unreadable(key, &state)?;
                if state.generation != generation {
                    return Ok(WindowOutcome::Superseded);
                }

                let plan = self.planner.plan(&window, state.view());
                match plan.action {
                    PlanAction::NoOp => {
                        let row_groups = state
                            .index
                            .as_ref()
                            .map(|index| {
                                plan.groups
                                    .iter()
                                    .filter_map(|&i| index.groups().get(i).copied())
                                    .collect()
                            })
                            .unwrap_or_default();
                        return Ok(WindowOutcome::Ready(WindowData {
                            key: key.clone(),
                            row_groups,
                            requests,
                            bytes_fetched,
                        }));
                    }
                    PlanAction::Bootstrap { .. } => {
                        return UnreadableSnafu {
                            key: key.clone(),
                            reason: "footer missing after resolve",
                        }
                        .fail();
                    }
                    PlanAction::AwaitPending { .. } => (None, Vec::new()),
                    PlanAction::Fetch { requests: batch } => {
                        let ranges = batch.iter().map(|q| q.range).collect();
                        (entry.try_claim(&mut state, ranges), batch)
                    }
                }
            };

            let Some(slot) = slot else {
                let notified = entry.notify().notified();
                // Re-check under the lock so a release between planning and
                // registering the waiter is not missed.
                let busy = entry.lock().in_flight;
                if busy {
                    tracing::trace!(entity = %key.entity, month = %key.month, "Waiting for in-flight batch");
                    notified.await;
                }
                continue;
            };

            let url = entry.lock().shard.url.clone();
            let mut bodies = Vec::with_capacity(batch.len());
            for req in &batch {
                let Some(spec) = RangeSpec::closed(req.range) else {
                    continue;
                };
                let resp = self
                    .get(&entry, &url, spec)
                    .await
                    .context(UnavailableSnafu { key: key.clone() })?;
                requests += 1;
                let RangeResponse::Found(body) = resp else {
                    tracing::warn!(entity = %key.entity, month = %key.month, "Shard vanished during fetch");
                    return Err(SessionError::Unavailable {
                        key: key.clone(),
                        source: TransportError::UnexpectedStatus { url, status: 404 },
                    });
                };
                bytes_fetched += body.data.len() as u64;
                bodies.push(body);
            }

            {
                let mut state = entry.lock();
                // Fetched bytes always land in the cache; a newer load may be
                // waiting on exactly these ranges.
                Self::apply_bodies(key, &mut state, bodies);
                if state.generation != generation {
                    tracing::debug!(
                        entity = %key.entity,
                        month = %key.month,
                        generation,
                        current = state.generation,
                        "Discarding superseded result"
                    );
                    drop(state);
                    drop(slot);
                    return Ok(WindowOutcome::Superseded);
                }

                let uncovered = batch
                    .iter()
                    .flat_map(|q| q.parts.iter())
                    .find(|part| !state.cache.covers(**part));
                if let Some(part) = uncovered {
                    return Err(SessionError::Unavailable {
                        key: key.clone(),
                        source: TransportError::BadContentRange {
                            url,
                            value: Some(format!("response did not cover {part}")),
                        },
                    });
                }
            }
            drop(slot);
        }
    }

    /// Insert navigation results. Bytes at or past the known footer start are
    /// only trusted when the object length still matches.
    fn apply_bodies(key: &ShardKey, state: &mut EntryState, bodies: Vec<RangeBody>) {
        let limit = state.data_limit();
        for body in bodies {
            let same_len = state.shard.file_len == Some(body.total_len);
            if !same_len {
                tracing::info!(
                    entity = %key.entity,
                    month = %key.month,
                    known = ?state.shard.file_len,
                    reported = body.total_len,
                    "Shard length changed; keeping data region only until refresh"
                );
            }
            let span = body.range();
            let keep_end = match (same_len, limit) {
                (false, Some(limit)) => span.end.min(limit),
                _ => span.end,
            };
            if keep_end <= span.start {
                continue;
            }
            let data = body.data.slice(..(keep_end - span.start) as usize);
            tracing::trace!(
                entity = %key.entity,
                month = %key.month,
                start = span.start,
                end = keep_end,
                "Caching range"
            );
            state.cache.insert(span.start, data);
        }
    }

    /// Load `[start, end)` for `entity` across every month it overlaps.
    ///
    /// Absent months are reported in [`SpanData::absent`]; failing shards in
    /// [`SpanData::failed`]. Neither stops the remaining months.
    pub async fn load_span(
        &self,
        entity: &EntityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SpanData {
        let mut out = SpanData::default();
        for month in MonthKey::spanning(start, end) {
            let key = ShardKey::new(entity.clone(), month);
            let window = FetchWindow::Time {
                start: start.max(month.start()),
                end: end.min(month.end()),
            };
            match self.load_window(&key, window).await {
                Ok(WindowOutcome::Ready(data)) => out.windows.push(data),
                Ok(WindowOutcome::NoData) => out.absent.push(month),
                Ok(WindowOutcome::Superseded) => out.superseded = true,
                Err(e) => {
                    tracing::warn!(entity = %entity, month = %month, error = %e, "Shard skipped");
                    out.failed.push(e);
                }
            }
        }
        out
    }

    /// Pick up bytes appended to a shard since it was last seen.
    ///
    /// Sends a `HEAD`; if the object grew, re-reads from the start of the
    /// last cached row group to the new end of file, re-parses the footer
    /// and splices the new tail onto the retained row groups.
    pub async fn refresh(&self, key: &ShardKey) -> SessionResult<RefreshOutcome> {
        let entry = self.entry(key);
        let (state, url) = {
            let state = entry.lock();
            Self::unreadable(key, &state)?;
            (state.shard.state, state.shard.url.clone())
        };
        match state {
            ShardState::Absent => return Ok(RefreshOutcome::Absent),
            ShardState::Unresolved => {
                let state = self.resolve_entry(key, &entry).await?;
                return Ok(RefreshOutcome::Resolved(state));
            }
            ShardState::Present => {}
        }

        let slot = entry.claim().await;

        let probe = self
            .head(&entry, &url)
            .await
            .context(UnavailableSnafu { key: key.clone() })?;
        let Probe::Found { len } = probe else {
            tracing::warn!(entity = %key.entity, month = %key.month, "Shard missing on refresh");
            return Ok(RefreshOutcome::Missing);
        };

        let (old_len, offset) = {
            let state = entry.lock();
            let old_len = state.shard.file_len.unwrap_or(0);
            let offset = state
                .index
                .as_ref()
                .and_then(RowGroupIndex::tail)
                .map(|rg| rg.bytes.start)
                .or(state.data_limit())
                .unwrap_or(0);
            (old_len, offset)
        };

        if len == old_len {
            tracing::debug!(entity = %key.entity, month = %key.month, file_len = len, "Shard unchanged");
            return Ok(RefreshOutcome::Unchanged { file_len: len });
        }
        if len < old_len {
            let mut state = entry.lock();
            let err = FooterError::InvalidLayout {
                detail: format!("shard shrank from {old_len} to {len} bytes"),
            };
            return Err(Self::mark_unreadable(key, &mut state, &err));
        }

        let resp = self
            .get(&entry, &url, RangeSpec::FromOffset(offset))
            .await
            .context(UnavailableSnafu { key: key.clone() })?;
        let RangeResponse::Found(body) = resp else {
            return Ok(RefreshOutcome::Missing);
        };
        let new_len = body.total_len;

        let mut state = entry.lock();
        let tail = if body.offset == offset {
            body.data.clone()
        } else {
            body.data.slice((offset.saturating_sub(body.offset) as usize).min(body.data.len())..)
        };
        let meta = match parse_footer(&tail, new_len, &self.config.time_column) {
            Ok(meta) => meta,
            Err(e) => return Err(Self::mark_unreadable(key, &mut state, &e)),
        };
        let spliced = match state.index.as_ref() {
            Some(index) => index.splice_tail(offset, &meta.row_groups, self.config.discontinuity_tolerance),
            None => RowGroupIndex::build(&meta, self.config.discontinuity_tolerance),
        };
        let index = match spliced {
            Ok(index) => index,
            Err(e) => return Err(Self::mark_unreadable(key, &mut state, &e)),
        };

        state.cache.truncate_from(offset);
        state.cache.insert(offset, tail);
        state.shard.file_len = Some(new_len);
        state.footer = Some(meta);
        let row_groups = index.len();
        state.index = Some(index);
        drop(state);
        drop(slot);

        tracing::info!(
            entity = %key.entity,
            month = %key.month,
            old_len,
            new_len,
            row_groups,
            "Shard grew"
        );
        Ok(RefreshOutcome::Grew {
            old_len,
            new_len,
            row_groups,
        })
    }

    /// Bytes for `range` if they are cached. Never touches the network.
    pub fn read(&self, key: &ShardKey, range: ByteRange) -> Option<Bytes> {
        self.existing(key)?.lock().cache.bytes_at(range)
    }

    /// Snapshot of the shard's identity and state.
    pub fn shard(&self, key: &ShardKey) -> Option<Shard> {
        Some(self.existing(key)?.lock().shard.clone())
    }

    /// Copy of the shard's row-group index, once resolved.
    pub fn index(&self, key: &ShardKey) -> Option<RowGroupIndex> {
        self.existing(key)?.lock().index.clone()
    }

    /// Footer-derived summary of a resolved shard.
    pub fn summary(&self, key: &ShardKey) -> Option<ShardSummary> {
        self.existing(key)?.lock().footer.as_ref().map(|f| f.summary())
    }

    /// Earliest timestamp of `entity` known to be the first row of its data:
    /// the earliest row of the first present month whose preceding month is
    /// known to be absent. `None` while the boundary has not been seen.
    pub fn known_earliest(&self, entity: &EntityId) -> Option<DateTime<Utc>> {
        let mut months: Vec<(MonthKey, ShardState, Option<DateTime<Utc>>)> = self
            .entries()
            .iter()
            .filter(|(k, _)| &k.entity == entity)
            .map(|(k, e)| {
                let state = e.lock();
                (
                    k.month,
                    state.shard.state,
                    state.index.as_ref().and_then(RowGroupIndex::earliest),
                )
            })
            .collect();
        months.sort_by_key(|(m, _, _)| *m);

        months
            .iter()
            .filter(|(_, s, _)| *s == ShardState::Present)
            .find(|(m, _, _)| {
                let prev = m.prev();
                months
                    .iter()
                    .any(|(pm, ps, _)| *pm == prev && *ps == ShardState::Absent)
            })
            .and_then(|(_, _, earliest)| *earliest)
    }

    /// Walk back month by month from `from` to find the first month of data.
    ///
    /// Stops at the first absent month preceded by data, or after
    /// `max_months` months. Returns the earliest present month and its first
    /// timestamp.
    pub async fn find_earliest(
        &self,
        entity: &EntityId,
        from: MonthKey,
        max_months: u32,
    ) -> SessionResult<Option<(MonthKey, DateTime<Utc>)>> {
        let mut month = from;
        let mut found: Option<(MonthKey, DateTime<Utc>)> = None;
        for _ in 0..max_months {
            let key = ShardKey::new(entity.clone(), month);
            match self.resolve(&key).await? {
                ShardState::Present => {
                    if let Some(ts) = self.index(&key).as_ref().and_then(RowGroupIndex::earliest) {
                        found = Some((month, ts));
                    }
                }
                ShardState::Absent if found.is_some() => break,
                _ => {}
            }
            month = month.prev();
        }
        Ok(found)
    }

    /// Counters for every known shard.
    pub fn stats(&self) -> SessionStats {
        let mut shards: Vec<ShardStats> = self
            .entries()
            .iter()
            .map(|(key, entry)| {
                let state = entry.lock();
                ShardStats {
                    key: key.clone(),
                    state: state.shard.state,
                    file_len: state.shard.file_len,
                    row_groups: state.index.as_ref().map(RowGroupIndex::len).unwrap_or(0),
                    cached_bytes: state.cache.cached_bytes(),
                    requests: state.requests,
                    bytes_fetched: state.bytes_fetched,
                    unreadable: state.failure.is_some(),
                }
            })
            .collect();
        shards.sort_by(|a, b| a.key.cmp(&b.key));
        SessionStats { shards }
    }

    /// Drop every entry. Later calls start from scratch.
    pub fn clear(&self) {
        self.entries().clear();
    }
}
