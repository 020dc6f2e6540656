use std::sync::Arc;

use arrow::array::{Float64Builder, Int64Builder, TimestampMillisecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

pub(crate) type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub(crate) fn minutes_from(rfc3339: &str) -> TestResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(rfc3339)?.with_timezone(&Utc))
}

/// In-memory sensor shard: one row per minute starting at `base`.
pub(crate) fn build_shard(
    base: DateTime<Utc>,
    rows: usize,
    rows_per_group: usize,
) -> TestResult<Bytes> {
    let mut ts_builder = TimestampMillisecondBuilder::with_capacity(rows);
    let mut temp_builder = Float64Builder::with_capacity(rows);
    let mut co2_builder = Int64Builder::with_capacity(rows);
    let mut pm25_builder = Float64Builder::with_capacity(rows);

    let base_ms = base.timestamp_millis();
    for i in 0..rows {
        ts_builder.append_value(base_ms + (i as i64) * 60_000);
        temp_builder.append_value(20.0 + (i % 40) as f64 / 10.0);
        co2_builder.append_value(400 + (i as i64 * 7) % 600);
        pm25_builder.append_value((i % 13) as f64);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("temp", DataType::Float64, false),
        Field::new("co2", DataType::Int64, false),
        Field::new("pm25", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ts_builder.finish()) as _,
            Arc::new(temp_builder.finish()),
            Arc::new(co2_builder.finish()),
            Arc::new(pm25_builder.finish()),
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
