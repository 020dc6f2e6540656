//! Text and JSON rendering for command output.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use timeseries_window_core::{
    footer::ShardSummary,
    navigation::{EntityLoad, NavigationState},
    refresh::RefreshEvent,
    row_group::{RowGroupDescriptor, RowGroupIndex},
    session::{RefreshOutcome, SessionStats, SpanData},
    shard::ShardKey,
};

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn opt_ts(t: Option<DateTime<Utc>>) -> String {
    t.map(ts).unwrap_or_else(|| "-".to_string())
}

fn row_group_line(out: &mut String, rg: &RowGroupDescriptor) {
    let (min, max) = match rg.time {
        Some(span) => (ts(span.min), ts(span.max)),
        None => ("-".to_string(), "-".to_string()),
    };
    let _ = writeln!(
        out,
        "  {:>4}  rows {:>8}..{:<8}  bytes {:<22}  {min} .. {max}",
        rg.index,
        rg.row_start,
        rg.row_end,
        rg.bytes.to_string(),
    );
}

fn row_group_json(rg: &RowGroupDescriptor) -> Value {
    json!({
        "index": rg.index,
        "row_start": rg.row_start,
        "row_end": rg.row_end,
        "byte_start": rg.bytes.start,
        "byte_end": rg.bytes.end,
        "time_min": rg.time.map(|t| ts(t.min)),
        "time_max": rg.time.map(|t| ts(t.max)),
    })
}

pub fn shard_text(key: &ShardKey, summary: &ShardSummary, index: &RowGroupIndex) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "shard: {key}");
    let _ = writeln!(out, "file length: {} bytes", summary.file_len);
    let _ = writeln!(out, "rows: {}", summary.row_count);
    let _ = writeln!(
        out,
        "time range: {} .. {}",
        opt_ts(summary.earliest),
        opt_ts(summary.latest)
    );
    let _ = writeln!(out, "row groups: {}", summary.row_groups);
    for rg in index.groups() {
        row_group_line(&mut out, rg);
    }
    for gap in index.discontinuities() {
        let _ = writeln!(out, "  gap after row group {}: {} bytes", gap.after, gap.gap_bytes);
    }
    out
}

pub fn shard_json(key: &ShardKey, summary: &ShardSummary, index: &RowGroupIndex) -> Value {
    json!({
        "shard": key.to_string(),
        "file_len": summary.file_len,
        "rows": summary.row_count,
        "earliest": summary.earliest.map(ts),
        "latest": summary.latest.map(ts),
        "row_groups": index.groups().iter().map(row_group_json).collect::<Vec<_>>(),
    })
}

fn span_text(out: &mut String, entity: &str, span: &SpanData) {
    let _ = writeln!(
        out,
        "{entity}: {} row groups, {} requests",
        span.row_group_count(),
        span.requests()
    );
    for w in &span.windows {
        let rows: u64 = w.row_groups.iter().map(RowGroupDescriptor::num_rows).sum();
        let _ = writeln!(
            out,
            "  {}: {} row groups, {rows} rows, {} requests, {} bytes",
            w.key.month,
            w.row_groups.len(),
            w.requests,
            w.bytes_fetched
        );
    }
    for month in &span.absent {
        let _ = writeln!(out, "  {month}: no data");
    }
    for err in &span.failed {
        let _ = writeln!(out, "  {}: failed: {err}", err.key().month);
    }
    if span.superseded {
        let _ = writeln!(out, "  (superseded by a newer load)");
    }
}

pub fn loads_text(start: DateTime<Utc>, end: DateTime<Utc>, loads: &[EntityLoad]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "window: {} .. {}", ts(start), ts(end));
    for load in loads {
        span_text(&mut out, load.entity.as_str(), &load.span);
    }
    out
}

pub fn loads_json(start: DateTime<Utc>, end: DateTime<Utc>, loads: &[EntityLoad]) -> Value {
    let entities: Vec<Value> = loads
        .iter()
        .map(|load| {
            json!({
                "entity": load.entity.as_str(),
                "requests": load.span.requests(),
                "shards": load.span.windows.iter().map(|w| json!({
                    "month": w.key.month.to_string(),
                    "requests": w.requests,
                    "bytes_fetched": w.bytes_fetched,
                    "row_groups": w.row_groups.iter().map(row_group_json).collect::<Vec<_>>(),
                })).collect::<Vec<_>>(),
                "absent": load.span.absent.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "failed": load.span.failed.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "start": ts(start), "end": ts(end), "entities": entities })
}

pub fn stats_text(stats: &SessionStats) -> String {
    let mut out = String::new();
    for s in &stats.shards {
        let _ = writeln!(
            out,
            "{:<28} {:<8} len {:>10}  groups {:>4}  cached {:>10}  requests {:>4}  fetched {:>10}{}",
            s.key.to_string(),
            format!("{:?}", s.state).to_lowercase(),
            s.file_len.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()),
            s.row_groups,
            s.cached_bytes,
            s.requests,
            s.bytes_fetched,
            if s.unreadable { "  UNREADABLE" } else { "" },
        );
    }
    let _ = writeln!(
        out,
        "total: {} requests, {} bytes fetched, {} bytes cached",
        stats.requests(),
        stats.bytes_fetched(),
        stats.cached_bytes()
    );
    out
}

pub fn refresh_text(event: &RefreshEvent) -> String {
    match event {
        RefreshEvent::Refreshed { key, outcome } => match outcome {
            RefreshOutcome::Resolved(state) => {
                format!("{key}: resolved ({})", format!("{state:?}").to_lowercase())
            }
            RefreshOutcome::Absent => format!("{key}: absent"),
            RefreshOutcome::Unchanged { file_len } => format!("{key}: unchanged ({file_len} bytes)"),
            RefreshOutcome::Grew {
                old_len,
                new_len,
                row_groups,
            } => format!("{key}: grew {old_len} -> {new_len} bytes, {row_groups} row groups"),
            RefreshOutcome::Missing => format!("{key}: missing"),
        },
        RefreshEvent::Failed { key, error } => format!("{key}: refresh failed: {error}"),
    }
}

pub fn state_text(state: &NavigationState, now: DateTime<Utc>) -> String {
    let (start, end) = state.window.resolve(now);
    let mode = if state.window.is_latest() { "latest" } else { "fixed" };
    let code = state.window.encode().unwrap_or_default();
    let mut flags = Vec::new();
    if !state.can_go_back {
        flags.push("at earliest");
    }
    if !state.can_go_forward {
        flags.push("at latest");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    format!("{mode} {} .. {} (window '{code}'){flags}", ts(start), ts(end))
}
