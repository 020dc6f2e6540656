use std::{path::Path, sync::Arc};

use arrow::array::{Float64Builder, TimestampMillisecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{TimeZone, Utc};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Write `<root>/<entity>/<month>.parquet` with one row per minute from
/// the first of the month, `rows_per_group` rows per row group.
pub fn write_shard(
    root: &Path,
    entity: &str,
    (year, month): (i32, u32),
    rows: usize,
    rows_per_group: usize,
) -> TestResult {
    let dir = root.join(entity);
    std::fs::create_dir_all(&dir)?;

    let base = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or("invalid month")?
        .timestamp_millis();
    let mut ts = TimestampMillisecondBuilder::with_capacity(rows);
    let mut temp = Float64Builder::with_capacity(rows);
    for i in 0..rows {
        ts.append_value(base + i as i64 * 60_000);
        temp.append_value(21.0 + (i % 30) as f64 / 10.0);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new("temp", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(ts.finish()) as _, Arc::new(temp.finish())],
    )?;

    let props = WriterProperties::builder()
        .set_max_row_group_size(rows_per_group)
        .build();
    let file = std::fs::File::create(dir.join(format!("{year:04}-{month:02}.parquet")))?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
