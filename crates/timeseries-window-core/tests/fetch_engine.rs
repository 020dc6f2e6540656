//! Fetch-engine properties checked by counting transport requests.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::{sync::Arc, time::Duration};

use common::{TestResult, build_shard, requests_for, session, tight_config, utc};
use timeseries_window_core::row_group::{FetchWindow, RowGroupIndex};
use timeseries_window_core::session::{RefreshOutcome, SessionError, ShardSession, WindowOutcome};
use timeseries_window_core::shard::{EntityId, MonthKey, ShardKey, ShardState};
use timeseries_window_core::transport::{MemoryTransport, Method, RangeSpec};

const NOV: &str = "s1/2025-11.parquet";

fn key(entity: &str, month: &str) -> TestResult<ShardKey> {
    Ok(ShardKey::new(entity.parse()?, month.parse()?))
}

/// Two days of minute rows in November, two hours per row group.
fn november(transport: &MemoryTransport) -> TestResult<bytes::Bytes> {
    let file = build_shard(utc(2025, 11, 1, 0, 0), 2880, 120)?;
    transport.put(NOV, file.clone());
    Ok(file)
}

fn hours(from: u32, to: u32) -> FetchWindow {
    FetchWindow::Time {
        start: utc(2025, 11, 1, from, 0),
        end: utc(2025, 11, 1, to, 0),
    }
}

fn ready(outcome: WindowOutcome) -> timeseries_window_core::session::WindowData {
    match outcome {
        WindowOutcome::Ready(data) => data,
        other => panic!("expected data, got {other:?}"),
    }
}

#[tokio::test]
async fn cached_windows_issue_no_requests() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let key = key("s1", "2025-11")?;

    let first = ready(session.load_window(&key, hours(2, 8)).await?);
    assert_eq!(first.row_groups.len(), 3);
    assert_eq!(first.requests, 1);
    let after_first = transport.request_count();

    let again = ready(session.load_window(&key, hours(2, 8)).await?);
    assert_eq!(again.requests, 0);
    let inner = ready(session.load_window(&key, hours(3, 5)).await?);
    assert_eq!(inner.requests, 0);
    assert_eq!(transport.request_count(), after_first);

    for rg in &first.row_groups {
        assert!(session.read(&key, rg.bytes).is_some());
    }
    Ok(())
}

#[tokio::test]
async fn adjacent_row_groups_coalesce_and_gaps_fill_once() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let key = key("s1", "2025-11")?;

    ready(session.load_window(&key, hours(0, 4)).await?);
    ready(session.load_window(&key, hours(12, 16)).await?);
    transport.clear_log();

    let spanning = ready(session.load_window(&key, hours(0, 16)).await?);
    assert_eq!(spanning.row_groups.len(), 8);
    assert_eq!(spanning.requests, 1);

    let gets = transport.requests();
    assert_eq!(gets.len(), 1);
    let hole_start = spanning.row_groups[2].bytes.start;
    let hole_end = spanning.row_groups[5].bytes.end;
    assert_eq!(
        gets[0].range,
        Some(RangeSpec::Closed {
            start: hole_start,
            end_inclusive: hole_end - 1,
        })
    );
    Ok(())
}

#[tokio::test]
async fn navigation_never_sends_head() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let entity: EntityId = "s1".parse()?;

    session
        .load_span(&entity, utc(2025, 11, 1, 6, 0), utc(2025, 11, 2, 6, 0))
        .await;
    session
        .load_span(&entity, utc(2025, 10, 30, 0, 0), utc(2025, 11, 1, 3, 0))
        .await;
    session.find_earliest(&entity, "2025-11".parse()?, 6).await?;

    assert!(transport.request_count() > 0);
    assert_eq!(transport.count(Method::Head), 0);
    Ok(())
}

#[tokio::test]
async fn absent_month_yields_partial_data_without_retries() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let entity: EntityId = "s1".parse()?;
    let october: MonthKey = "2025-10".parse()?;

    let span = session
        .load_span(&entity, utc(2025, 10, 31, 12, 0), utc(2025, 11, 1, 12, 0))
        .await;
    assert_eq!(span.absent, vec![october]);
    assert_eq!(span.windows.len(), 1);
    assert!(span.failed.is_empty());
    assert_eq!(requests_for(&transport, "s1/2025-10.parquet"), 1);

    let span = session
        .load_span(&entity, utc(2025, 10, 31, 12, 0), utc(2025, 11, 1, 12, 0))
        .await;
    assert_eq!(span.absent, vec![october]);
    assert_eq!(span.requests(), 0);
    assert_eq!(requests_for(&transport, "s1/2025-10.parquet"), 1);

    let shard = session.shard(&ShardKey::new(entity, october)).expect("known");
    assert_eq!(shard.state, ShardState::Absent);
    Ok(())
}

#[tokio::test]
async fn long_footer_gets_one_corrective_fetch() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let mut config = tight_config(&file);
    config.bootstrap_suffix_len = 16;
    let session = session(&transport, config);
    let key = key("s1", "2025-11")?;

    assert_eq!(session.resolve(&key).await?, ShardState::Present);
    let gets = transport.requests();
    assert_eq!(gets.len(), 2);
    assert_eq!(gets[0].range, Some(RangeSpec::Suffix(16)));
    assert!(matches!(gets[1].range, Some(RangeSpec::Closed { .. })));

    let summary = session.summary(&key).expect("resolved");
    assert_eq!(summary.row_count, 2880);
    assert_eq!(summary.row_groups, 24);
    assert_eq!(summary.file_len, file.len() as u64);

    assert_eq!(session.resolve(&key).await?, ShardState::Present);
    assert_eq!(transport.request_count(), 2);
    Ok(())
}

#[tokio::test]
async fn transient_errors_are_retried() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let key = key("s1", "2025-11")?;

    transport.fail_next(NOV, 2, 503);
    assert_eq!(session.resolve(&key).await?, ShardState::Present);
    assert_eq!(transport.request_count(), 3);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_leave_the_shard_retryable() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let key = key("s1", "2025-11")?;

    transport.fail_next(NOV, 3, 500);
    let err = session.resolve(&key).await.expect_err("retries exhausted");
    assert!(matches!(err, SessionError::Unavailable { .. }));
    assert!(!err.is_permanent());
    assert_eq!(transport.request_count(), 3);

    assert_eq!(session.resolve(&key).await?, ShardState::Present);
    Ok(())
}

#[tokio::test]
async fn unreadable_shard_fails_once_and_is_remembered() -> TestResult {
    let transport = MemoryTransport::new();
    transport.put("bad/2025-11.parquet", b"definitely not a parquet file".to_vec());
    let session = session(&transport, tight_config(&build_shard(utc(2025, 11, 1, 0, 0), 10, 10)?));
    let key = key("bad", "2025-11")?;

    let err = session.resolve(&key).await.expect_err("bad magic");
    assert!(matches!(err, SessionError::Unreadable { .. }));
    assert!(err.is_permanent());
    let requests = transport.request_count();

    let err = session.load_window(&key, hours(0, 1)).await.expect_err("still bad");
    assert!(matches!(err, SessionError::Unreadable { .. }));
    assert_eq!(transport.request_count(), requests);

    let stats = session.stats();
    assert!(stats.shards[0].unreadable);
    Ok(())
}

#[tokio::test]
async fn newer_load_supersedes_older_one() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let key = key("s1", "2025-11")?;
    session.resolve(&key).await?;

    transport.set_latency(Duration::from_millis(20));
    let (older, newer) = tokio::join!(
        session.load_window(&key, hours(0, 4)),
        session.load_window(&key, hours(10, 14)),
    );
    assert_eq!(older?, WindowOutcome::Superseded);
    let newer = ready(newer?);
    assert_eq!(newer.row_groups.len(), 2);

    // The superseded load's bytes were still cached.
    transport.set_latency(Duration::ZERO);
    transport.clear_log();
    ready(session.load_window(&key, hours(10, 14)).await?);
    let older = ready(session.load_window(&key, hours(0, 4)).await?);
    assert_eq!(older.requests, 0);
    assert_eq!(transport.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_loads_of_one_window_fetch_once() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let key = key("s1", "2025-11")?;
    session.resolve(&key).await?;
    transport.clear_log();

    transport.set_latency(Duration::from_millis(20));
    let (first, second) = tokio::join!(
        session.load_window(&key, hours(6, 12)),
        session.load_window(&key, hours(6, 12)),
    );
    assert_eq!(first?, WindowOutcome::Superseded);
    let second = ready(second?);
    assert_eq!(second.row_groups.len(), 3);
    assert_eq!(second.requests, 0);

    assert_eq!(transport.request_count(), 1);
    for rg in &second.row_groups {
        assert!(session.read(&key, rg.bytes).is_some());
    }
    Ok(())
}

#[tokio::test]
async fn empty_object_is_remembered_as_unreadable() -> TestResult {
    let transport = MemoryTransport::new();
    transport.put("s1/2025-11.parquet", Vec::new());
    let session = session(&transport, tight_config(&build_shard(utc(2025, 11, 1, 0, 0), 10, 10)?));
    let key = key("s1", "2025-11")?;

    let err = session.resolve(&key).await.expect_err("empty object");
    assert!(matches!(err, SessionError::Unreadable { .. }));
    assert_eq!(transport.request_count(), 1);

    let err = session.load_window(&key, hours(0, 1)).await.expect_err("still empty");
    assert!(err.is_permanent());
    assert_eq!(transport.request_count(), 1);
    Ok(())
}

fn grew(outcome: RefreshOutcome) -> bool {
    matches!(outcome, RefreshOutcome::Grew { .. })
}

/// Cache state that the refresh and window-load ordering must not affect.
fn settled(session: &ShardSession, key: &ShardKey) -> TestResult<(RowGroupIndex, u64, Vec<bool>)> {
    let index = session.index(key).ok_or("index")?;
    let cached = session.stats().cached_bytes();
    let present = index
        .groups()
        .iter()
        .map(|rg| session.read(key, rg.bytes).is_some())
        .collect();
    Ok((index, cached, present))
}

#[tokio::test]
async fn refresh_racing_a_load_settles_like_either_order() -> TestResult {
    let grown = build_shard(utc(2025, 11, 1, 0, 0), 3000, 120)?;

    // Prepared session: footer bootstrapped, first hours cached, then the
    // object grows.
    async fn prepared(grown: &bytes::Bytes) -> TestResult<(MemoryTransport, Arc<ShardSession>, ShardKey)> {
        let transport = MemoryTransport::new();
        let file = november(&transport)?;
        let session = session(&transport, tight_config(&file));
        let key = key("s1", "2025-11")?;
        ready(session.load_window(&key, hours(0, 2)).await?);
        transport.put(NOV, grown.clone());
        Ok((transport, session, key))
    }

    let (_, sequential, key) = prepared(&grown).await?;
    ready(sequential.load_window(&key, hours(6, 12)).await?);
    assert!(grew(sequential.refresh(&key).await?));
    let expected = settled(&sequential, &key)?;
    assert_eq!(expected.0.len(), 25);

    let (_, reversed, _) = prepared(&grown).await?;
    assert!(grew(reversed.refresh(&key).await?));
    ready(reversed.load_window(&key, hours(6, 12)).await?);
    assert_eq!(settled(&reversed, &key)?, expected);

    // The load's response reports the new length before refresh has seen it.
    let (transport, racing, _) = prepared(&grown).await?;
    transport.set_latency(Duration::from_millis(20));
    let (loaded, refreshed) = tokio::join!(racing.load_window(&key, hours(6, 12)), racing.refresh(&key));
    assert_eq!(ready(loaded?).row_groups.len(), 3);
    assert!(grew(refreshed?));
    assert_eq!(settled(&racing, &key)?, expected);

    let (transport, racing, _) = prepared(&grown).await?;
    transport.set_latency(Duration::from_millis(20));
    let (refreshed, loaded) = tokio::join!(racing.refresh(&key), racing.load_window(&key, hours(6, 12)));
    assert!(grew(refreshed?));
    assert_eq!(ready(loaded?).row_groups.len(), 3);
    assert_eq!(settled(&racing, &key)?, expected);
    Ok(())
}

#[tokio::test]
async fn refresh_splices_appended_row_groups() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let key = key("s1", "2025-11")?;

    ready(session.load_window(&key, hours(0, 6)).await?);
    assert_eq!(session.refresh(&key).await?, RefreshOutcome::Unchanged {
        file_len: file.len() as u64
    });

    let grown = build_shard(utc(2025, 11, 1, 0, 0), 3000, 120)?;
    transport.put(NOV, grown.clone());

    // Navigation does not see new rows until a refresh.
    let day3 = FetchWindow::Time {
        start: utc(2025, 11, 3, 0, 0),
        end: utc(2025, 11, 3, 2, 0),
    };
    assert!(ready(session.load_window(&key, day3).await?).row_groups.is_empty());

    let outcome = session.refresh(&key).await?;
    assert_eq!(outcome, RefreshOutcome::Grew {
        old_len: file.len() as u64,
        new_len: grown.len() as u64,
        row_groups: 25,
    });
    assert_eq!(transport.count(Method::Head), 2);
    let tail_get = transport.requests().pop().expect("refresh get");
    assert!(matches!(tail_get.range, Some(RangeSpec::FromOffset(_))));

    transport.clear_log();
    let fresh = ready(session.load_window(&key, day3).await?);
    assert_eq!(fresh.row_groups.len(), 1);
    assert_eq!(fresh.requests, 0);
    let old = ready(session.load_window(&key, hours(0, 6)).await?);
    assert_eq!(old.requests, 0);
    assert_eq!(transport.request_count(), 0);
    assert_eq!(session.summary(&key).map(|s| s.row_count), Some(3000));
    Ok(())
}

#[tokio::test]
async fn stats_and_clear() -> TestResult {
    let transport = MemoryTransport::new();
    let file = november(&transport)?;
    let session = session(&transport, tight_config(&file));
    let key = key("s1", "2025-11")?;

    let data = ready(session.load_window(&key, hours(0, 2)).await?);
    let stats = session.stats();
    assert_eq!(stats.shards.len(), 1);
    assert_eq!(stats.requests(), 2);
    assert_eq!(stats.shards[0].row_groups, 24);
    assert!(stats.cached_bytes() >= data.row_groups[0].bytes.len());

    session.clear();
    assert!(session.stats().shards.is_empty());
    assert!(session.shard(&key).is_none());
    Ok(())
}
