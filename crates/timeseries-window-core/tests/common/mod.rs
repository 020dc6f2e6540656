//! Shared fixtures: in-memory Parquet shards served from a `MemoryTransport`.
#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{Float64Builder, Int64Builder, TimestampMillisecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use timeseries_window_core::config::{FetchConfig, RetryPolicy};
use timeseries_window_core::session::ShardSession;
use timeseries_window_core::transport::MemoryTransport;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// One row per minute from `base`, `rows_per_group` rows per row group.
pub fn build_shard(base: DateTime<Utc>, rows: usize, rows_per_group: usize) -> TestResult<Bytes> {
    let mut ts = TimestampMillisecondBuilder::with_capacity(rows);
    let mut temp = Float64Builder::with_capacity(rows);
    let mut co2 = Int64Builder::with_capacity(rows);
    let mut pm25 = Float64Builder::with_capacity(rows);

    let base_ms = base.timestamp_millis();
    for i in 0..rows {
        ts.append_value(base_ms + i as i64 * 60_000);
        temp.append_value(18.0 + (i % 50) as f64 / 10.0);
        co2.append_value(410 + (i as i64 * 11) % 500);
        pm25.append_value((i % 17) as f64 * 0.5);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new("temp", DataType::Float64, false),
        Field::new("co2", DataType::Int64, false),
        Field::new("pm25", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ts.finish()) as _,
            Arc::new(temp.finish()),
            Arc::new(co2.finish()),
            Arc::new(pm25.finish()),
        ],
    )?;

    let props = WriterProperties::builder()
        .set_max_row_group_size(rows_per_group)
        .build();
    let mut buf = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
    }
    Ok(Bytes::from(buf))
}

/// Footer plus trailer length of a Parquet file.
pub fn footer_len(file: &[u8]) -> u64 {
    let n = file.len();
    let raw = [file[n - 8], file[n - 7], file[n - 6], file[n - 5]];
    u64::from(u32::from_le_bytes(raw)) + 8
}

/// Config whose bootstrap suffix covers exactly the footer of `file`, so row
/// group bytes are only ever fetched by window loads.
pub fn tight_config(file: &[u8]) -> FetchConfig {
    FetchConfig {
        bootstrap_suffix_len: footer_len(file),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
            ..RetryPolicy::default()
        },
        ..FetchConfig::default()
    }
}

pub fn session(transport: &MemoryTransport, config: FetchConfig) -> Arc<ShardSession> {
    Arc::new(ShardSession::new(Arc::new(transport.clone()), config))
}

/// Requests recorded against one object.
pub fn requests_for(transport: &MemoryTransport, url: &str) -> usize {
    transport.requests().iter().filter(|r| r.url == url).count()
}
