//! Range-request fetch and cache engine for monthly-sharded Parquet time series.
//!
//! Each entity's readings live in one Parquet file per calendar month,
//! stored in object storage and read with HTTP range requests. This crate
//! serves arbitrary time or row windows of those files while keeping bytes
//! transferred and round trips to a minimum:
//!
//! - The footer is decoded from a single suffix fetch (`footer` module) into
//!   an ordered row-group table (`row_group` module).
//! - A per-shard byte cache (`range_cache` module) records every range
//!   already fetched, so a window whose bytes are cached costs no requests.
//! - The planner (`planner` module) subtracts cached and in-flight ranges
//!   from what a window needs; the coalescer (`coalesce` module) merges the
//!   remainder into as few requests as possible.
//! - A [`session::ShardSession`] owns the caches and the transport
//!   (`transport` module). Navigation only ever reads; a background
//!   [`refresh::RefreshController`] picks up appended rows.
//! - The [`navigation::NavigationController`] is a state machine over
//!   [`window::TimeWindow`]s, including the compact text form used to
//!   persist them.
#![deny(missing_docs)]
pub mod clock;
pub mod coalesce;
pub mod config;
pub mod footer;
pub mod interval;
pub mod navigation;
pub mod planner;
pub mod range_cache;
pub mod refresh;
pub mod row_group;
pub mod session;
pub mod shard;
pub mod transport;
pub mod window;

#[cfg(test)]
pub(crate) mod test_util;
