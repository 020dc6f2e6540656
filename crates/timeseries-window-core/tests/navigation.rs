//! Navigation controller against in-memory shards.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{TestResult, build_shard, session, tight_config, utc};
use timeseries_window_core::clock::ManualClock;
use timeseries_window_core::config::NavigationConfig;
use timeseries_window_core::navigation::{EntityLoad, NavAction, NavOutcome, NavigationController};
use timeseries_window_core::transport::{MemoryTransport, Method};
use timeseries_window_core::window::TimeWindow;

/// Data from 2025-11-01 00:00 to 2025-11-02 23:59; the clock reads 2025-11-03 00:00.
fn controller(transport: &MemoryTransport) -> TestResult<NavigationController> {
    let file = build_shard(utc(2025, 11, 1, 0, 0), 2880, 120)?;
    transport.put("s1/2025-11.parquet", file.clone());
    let session = session(transport, tight_config(&file));
    let clock = Arc::new(ManualClock::new(utc(2025, 11, 3, 0, 0)));
    Ok(NavigationController::new(
        session,
        clock,
        NavigationConfig::default(),
        vec!["s1".parse()?],
        TimeWindow::default(),
    ))
}

fn requests(loads: &[EntityLoad]) -> usize {
    loads.iter().map(|l| l.span.requests()).sum()
}

fn loaded(outcome: NavOutcome) -> Vec<EntityLoad> {
    match outcome {
        NavOutcome::Loaded(loads) => loads,
        NavOutcome::Disabled => panic!("action unexpectedly disabled"),
    }
}

#[tokio::test]
async fn pan_back_then_forward_is_served_from_cache() -> TestResult {
    let transport = MemoryTransport::new();
    let nav = controller(&transport)?;

    let initial = nav.load().await;
    assert!(requests(&initial) > 0);
    assert_eq!(initial[0].span.row_group_count(), 12);
    let state = nav.state();
    assert!(state.window.is_latest());
    assert!(!state.can_go_forward);

    let back = loaded(nav.apply(NavAction::PanBackSmall).await?);
    assert_eq!(requests(&back), 1);
    assert_eq!(nav.state().window.end(), Some(utc(2025, 11, 2, 23, 40)));
    assert!(nav.state().can_go_forward);

    let forward = loaded(nav.apply(NavAction::PanForwardSmall).await?);
    assert_eq!(requests(&forward), 0);
    assert_eq!(nav.state().window, TimeWindow::default());
    Ok(())
}

#[tokio::test]
async fn forward_is_disabled_at_latest() -> TestResult {
    let transport = MemoryTransport::new();
    let nav = controller(&transport)?;
    nav.load().await;
    let before = transport.request_count();

    assert!(matches!(nav.apply(NavAction::PanForwardPlot).await?, NavOutcome::Disabled));
    assert!(matches!(nav.apply(NavAction::JumpLatest).await?, NavOutcome::Disabled));
    assert_eq!(transport.request_count(), before);
    Ok(())
}

#[tokio::test]
async fn jump_to_earliest_disables_backward_moves() -> TestResult {
    let transport = MemoryTransport::new();
    let nav = controller(&transport)?;
    let mut rx = nav.subscribe();

    loaded(nav.apply(NavAction::JumpEarliest).await?);
    assert!(rx.has_changed()?);
    let state = rx.borrow_and_update().clone();
    assert_eq!(state.window, TimeWindow::fixed(utc(2025, 11, 2, 0, 0), Duration::days(1)));
    assert!(!state.can_go_back);
    assert!(state.can_go_forward);

    let before = transport.request_count();
    assert!(matches!(nav.apply(NavAction::PanBackSmall).await?, NavOutcome::Disabled));
    assert!(matches!(nav.apply(NavAction::PanBackPlot).await?, NavOutcome::Disabled));
    assert_eq!(transport.request_count(), before);

    loaded(nav.apply(NavAction::PanForwardPlot).await?);
    assert!(nav.state().window.is_latest());
    Ok(())
}

#[tokio::test]
async fn page_back_into_an_absent_month() -> TestResult {
    let transport = MemoryTransport::new();
    let nav = controller(&transport)?;
    nav.load().await;

    let back = loaded(nav.apply(NavAction::PanBackPlot).await?);
    assert_eq!(back[0].span.row_group_count(), 12);
    let back = loaded(nav.apply(NavAction::PanBackPlot).await?);
    assert_eq!(back[0].span.absent.len(), 1);
    assert!(back[0].span.windows.is_empty());

    // The month before the first shard is now known absent.
    assert_eq!(nav.bounds().earliest, Some(utc(2025, 11, 1, 0, 0)));
    assert!(!nav.state().can_go_back);
    Ok(())
}

#[tokio::test]
async fn navigation_sends_only_gets() -> TestResult {
    let transport = MemoryTransport::new();
    let nav = controller(&transport)?;
    nav.load().await;
    for action in [
        NavAction::PanBackSmall,
        NavAction::PanBackPlot,
        NavAction::JumpTo(utc(2025, 11, 1, 12, 0)),
        NavAction::SetDuration(Duration::hours(6)),
        NavAction::JumpEarliest,
        NavAction::JumpLatest,
    ] {
        nav.apply(action).await?;
    }
    assert!(transport.count(Method::Get) > 0);
    assert_eq!(transport.count(Method::Head), 0);
    Ok(())
}

#[tokio::test]
async fn restoring_a_compact_window() -> TestResult {
    let transport = MemoryTransport::new();
    let nav = controller(&transport)?;

    let window: TimeWindow = "251102T06-6h".parse()?;
    let loads = nav.set_window(window).await;
    assert_eq!(loads[0].span.row_group_count(), 3);
    assert_eq!(nav.state().window.encode().as_deref(), Some("251102T06-6h"));
    Ok(())
}
